//! Auxiliary containers and mount bookkeeping

use super::BuildSession;
use crate::build::overlay::merge_labels;
use crate::engine::{Empty, ImageConfig};
use crate::error::{CairnError, CairnResult};
use std::collections::{BTreeMap, HashSet};
use std::path::{Component, Path, PathBuf};
use tracing::{debug, info};

/// A mount attached to build containers
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mount {
    /// Host path for binds, volume path for container-backed mounts
    pub src: String,
    pub dest: String,
    /// Backing auxiliary container; `None` for host binds
    pub container_id: Option<String>,
}

impl Mount {
    /// Host directory bound into the container
    pub fn bind(src: impl Into<String>, dest: impl Into<String>) -> Self {
        Self {
            src: src.into(),
            dest: dest.into(),
            container_id: None,
        }
    }

    /// Volume provided by an auxiliary container
    pub fn volume(container_id: impl Into<String>, dest: impl Into<String>) -> Self {
        let dest = dest.into();
        Self {
            src: dest.clone(),
            dest,
            container_id: Some(container_id.into()),
        }
    }

    pub fn is_bind(&self) -> bool {
        self.container_id.as_deref().map_or(true, str::is_empty)
    }
}

/// Resolve `.` and `..` without touching the filesystem
fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    out.push("..");
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

fn unique_container_ids<'a>(mounts: impl Iterator<Item = &'a Mount>) -> Vec<String> {
    let mut seen = HashSet::new();
    mounts
        .filter_map(|m| m.container_id.as_deref())
        .filter(|id| !id.is_empty())
        .filter(|id| seen.insert(*id))
        .map(str::to_string)
        .collect()
}

impl BuildSession {
    /// Record a mount as active and remember it for the whole session
    pub fn add_mount(&mut self, mount: Mount) {
        self.all_mounts.push(mount.clone());
        self.mounts.push(mount);
    }

    /// Drop all active mounts; the session-wide record is kept
    pub fn clear_mounts(&mut self) {
        self.mounts.clear();
    }

    pub fn mounts(&self) -> &[Mount] {
        &self.mounts
    }

    /// Resolve a mount source against the context directory
    pub fn context_mount_src(&self, path: &str) -> PathBuf {
        let path = Path::new(path);
        if path.is_absolute() {
            normalize(path)
        } else {
            normalize(&self.options.context_dir.join(path))
        }
    }

    /// Auxiliary containers backing the active mounts, first-seen order
    pub fn mount_container_ids(&self) -> Vec<String> {
        unique_container_ids(self.mounts.iter())
    }

    /// Auxiliary containers backing any mount of this session
    pub fn all_mount_container_ids(&self) -> Vec<String> {
        unique_container_ids(self.all_mounts.iter())
    }

    /// `src:dest` strings for the active host binds
    pub fn binds(&self) -> Vec<String> {
        self.mounts
            .iter()
            .filter(|m| m.is_bind())
            .map(|m| format!("{}:{}", m.src, m.dest))
            .collect()
    }

    /// Return the session's export container, creating it on first use
    pub async fn make_exports_container(&mut self) -> CairnResult<String> {
        if let Some(id) = &self.exports_container_id {
            return Ok(id.clone());
        }

        let exports = &self.options.exports;
        let mut config = ImageConfig {
            image: exports.rsync_image.clone(),
            volumes: Some(BTreeMap::from([
                (exports.rsync_volume.clone(), Empty {}),
                (exports.exports_volume.clone(), Empty {}),
            ])),
            ..Default::default()
        };
        merge_labels(
            &mut config,
            [
                ("Buildfile", self.options.build_file.display().to_string()),
                ("ImageId", self.image_id.clone()),
            ],
        );

        let name = self.exports_container_name();
        let id = self.ensure_container(&name, &config, "exports").await?;
        self.exports_container_id = Some(id.clone());
        Ok(id)
    }

    /// Return the id of the named container, creating it if absent.
    ///
    /// The container's image is pulled first when the engine lacks it.
    pub async fn ensure_container(
        &mut self,
        name: &str,
        config: &ImageConfig,
        purpose: &str,
    ) -> CairnResult<String> {
        if let Some(existing) = self.engine.inspect_container(name).await? {
            debug!("Reusing {} container {} ({})", purpose, name, existing.id);
            return Ok(existing.id);
        }

        self.ensure_image(&config.image, &format!("{} container", purpose))
            .await?;

        let id = self
            .engine
            .create_container(name, config)
            .await
            .map_err(|e| CairnError::ContainerCreate {
                name: name.to_string(),
                purpose: purpose.to_string(),
                reason: e.to_string(),
            })?;
        info!("Created {} container {} ({})", purpose, name, id);
        Ok(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::build::testing::harness;
    use crate::engine::fake::{image, Call};

    fn creates(call: &Call) -> bool {
        matches!(call, Call::CreateContainer(_))
    }

    #[tokio::test]
    async fn exports_container_is_created_once() {
        let mut h = harness();
        h.engine.add_image(image(
            "grammarly/rsync-static:1",
            "",
            0,
            ImageConfig::default(),
        ));
        h.session.image_id = "abc".to_string();

        let first = h.session.make_exports_container().await.unwrap();
        let second = h.session.make_exports_container().await.unwrap();

        assert_eq!(first, second);
        assert!(first.starts_with("container-cairn_exports_"));
        assert_eq!(h.engine.count(creates), 1);
        assert_eq!(
            h.engine.count(|c| matches!(c, Call::InspectContainer(_))),
            1
        );
    }

    #[tokio::test]
    async fn existing_container_is_reused() {
        let mut h = harness();
        let name = h.session.exports_container_name();
        h.engine.add_container(&name, "existing-id");

        let id = h.session.make_exports_container().await.unwrap();
        assert_eq!(id, "existing-id");
        assert_eq!(h.engine.count(creates), 0);
    }

    #[tokio::test]
    async fn missing_rsync_image_is_pulled() {
        let mut h = harness();
        h.engine.script_pull(Some(image(
            "grammarly/rsync-static:1",
            "",
            0,
            ImageConfig::default(),
        )));

        h.session.make_exports_container().await.unwrap();
        assert!(h
            .engine
            .calls()
            .contains(&Call::Pull("grammarly/rsync-static:1".to_string())));
        assert!(h
            .output
            .contents()
            .contains("Pulling image: grammarly/rsync-static:1 for exports container"));
    }

    #[test]
    fn container_ids_are_unique_and_skip_binds() {
        let mut h = harness();
        h.session.add_mount(Mount::volume("c1", "/cache"));
        h.session.add_mount(Mount::bind("/src", "/app"));
        h.session.add_mount(Mount::volume("c2", "/data"));
        h.session.add_mount(Mount::volume("c1", "/other"));

        assert_eq!(h.session.mount_container_ids(), vec!["c1", "c2"]);
        assert_eq!(h.session.binds(), vec!["/src:/app"]);
    }

    #[test]
    fn clear_keeps_session_record() {
        let mut h = harness();
        h.session.add_mount(Mount::volume("c1", "/cache"));
        h.session.clear_mounts();
        h.session.add_mount(Mount::volume("c2", "/data"));

        assert_eq!(h.session.mount_container_ids(), vec!["c2"]);
        assert_eq!(h.session.all_mount_container_ids(), vec!["c1", "c2"]);
    }

    #[test]
    fn empty_container_id_counts_as_bind() {
        let mount = Mount {
            src: "/src".to_string(),
            dest: "/app".to_string(),
            container_id: Some(String::new()),
        };
        assert!(mount.is_bind());
        assert!(!Mount::volume("c1", "/data").is_bind());
    }

    #[test]
    fn mount_src_resolves_against_context() {
        let h = harness();
        let context = h.context.path();
        assert_eq!(h.session.context_mount_src("./src/../lib"), context.join("lib"));
        assert_eq!(
            h.session.context_mount_src("/abs/./path"),
            PathBuf::from("/abs/path")
        );
    }
}
