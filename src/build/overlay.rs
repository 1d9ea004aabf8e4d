//! Scoped edits of the configuration draft
//!
//! A temporary edit returns a guard that derefs to the session; dropping the
//! guard restores the previous value, on normal exit, `?` propagation and
//! unwinding alike.

use super::BuildSession;
use crate::engine::ImageConfig;
use std::ops::{Deref, DerefMut};

/// Guard restoring the draft command on drop
pub struct TemporaryCmd<'a> {
    session: &'a mut BuildSession,
    saved: Option<Vec<String>>,
}

/// Guard restoring the whole draft configuration on drop
pub struct TemporaryConfig<'a> {
    session: &'a mut BuildSession,
    saved: ImageConfig,
}

/// Merge labels into a configuration, creating the map if absent
pub fn merge_labels<I, K, V>(config: &mut ImageConfig, labels: I)
where
    I: IntoIterator<Item = (K, V)>,
    K: Into<String>,
    V: Into<String>,
{
    let map = config.labels.get_or_insert_with(Default::default);
    for (k, v) in labels {
        map.insert(k.into(), v.into());
    }
}

impl BuildSession {
    /// Replace the draft command until the returned guard drops
    pub fn temporary_cmd(&mut self, cmd: Vec<String>) -> TemporaryCmd<'_> {
        let saved = self.config.cmd.replace(cmd);
        TemporaryCmd {
            session: self,
            saved,
        }
    }

    /// Snapshot the draft, apply `mutate`, and restore the snapshot when
    /// the returned guard drops
    pub fn temporary_config(&mut self, mutate: impl FnOnce(&mut ImageConfig)) -> TemporaryConfig<'_> {
        let saved = self.config.clone();
        mutate(&mut self.config);
        TemporaryConfig {
            session: self,
            saved,
        }
    }

    /// Merge labels into the draft; later values win
    pub fn add_labels<I, K, V>(&mut self, labels: I)
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        merge_labels(&mut self.config, labels);
    }
}

impl Deref for TemporaryCmd<'_> {
    type Target = BuildSession;

    fn deref(&self) -> &BuildSession {
        &*self.session
    }
}

impl DerefMut for TemporaryCmd<'_> {
    fn deref_mut(&mut self) -> &mut BuildSession {
        &mut *self.session
    }
}

impl Drop for TemporaryCmd<'_> {
    fn drop(&mut self) {
        self.session.config.cmd = self.saved.take();
    }
}

impl Deref for TemporaryConfig<'_> {
    type Target = BuildSession;

    fn deref(&self) -> &BuildSession {
        &*self.session
    }
}

impl DerefMut for TemporaryConfig<'_> {
    fn deref_mut(&mut self) -> &mut BuildSession {
        &mut *self.session
    }
}

impl Drop for TemporaryConfig<'_> {
    fn drop(&mut self) {
        self.session.config = std::mem::take(&mut self.saved);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::build::testing::harness;
    use crate::error::{CairnError, CairnResult};
    use std::panic::{catch_unwind, AssertUnwindSafe};

    fn sh(cmd: &str) -> Vec<String> {
        vec!["/bin/sh".to_string(), "-c".to_string(), cmd.to_string()]
    }

    #[test]
    fn temporary_cmd_restores_on_scope_end() {
        let mut h = harness();
        h.session.config_mut().cmd = Some(vec!["/app".to_string()]);

        {
            let guard = h.session.temporary_cmd(sh("make"));
            assert_eq!(guard.config().cmd, Some(sh("make")));
        }

        assert_eq!(h.session.config().cmd, Some(vec!["/app".to_string()]));
    }

    #[test]
    fn temporary_cmd_restores_absent_cmd() {
        let mut h = harness();
        drop(h.session.temporary_cmd(sh("true")));
        assert_eq!(h.session.config().cmd, None);
    }

    #[test]
    fn temporary_cmd_restores_on_error() {
        fn failing(session: &mut BuildSession) -> CairnResult<()> {
            let guard = session.temporary_cmd(sh("false"));
            Err::<(), _>(CairnError::Internal(format!("{:?}", guard.config().cmd)))?;
            Ok(())
        }

        let mut h = harness();
        assert!(failing(&mut h.session).is_err());
        assert_eq!(h.session.config().cmd, None);
    }

    #[test]
    fn temporary_config_restores_on_panic() {
        let mut h = harness();
        h.session.add_labels([("keep", "1")]);

        let result = catch_unwind(AssertUnwindSafe(|| {
            let guard = h.session.temporary_config(|c| {
                c.working_dir = "/tmp".to_string();
                c.labels = None;
            });
            assert_eq!(guard.config().working_dir, "/tmp");
            panic!("boom");
        }));

        assert!(result.is_err());
        assert_eq!(h.session.config().working_dir, "");
        assert_eq!(
            h.session.config().labels.as_ref().unwrap().get("keep"),
            Some(&"1".to_string())
        );
    }

    #[test]
    fn add_labels_merges_and_overwrites() {
        let mut h = harness();
        h.session.add_labels([("a", "1"), ("b", "2")]);
        h.session.add_labels([("b", "3")]);

        let labels = h.session.config().labels.clone().unwrap();
        assert_eq!(labels.len(), 2);
        assert_eq!(labels["a"], "1");
        assert_eq!(labels["b"], "3");
    }
}
