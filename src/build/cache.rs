//! Lineage-based cache probing
//!
//! A step can reuse an existing image when one of the current image's
//! children was committed from a configuration equal to the draft.
//! Children are inspected concurrently under a single deadline; a timeout or
//! any failed inspection aborts the probe and cancels outstanding lookups.

use super::BuildSession;
use crate::engine::{compare_configs, Engine, ImageConfig, ImageRecord};
use crate::error::{CairnError, CairnResult};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use tracing::{debug, info};

impl BuildSession {
    /// Look for a cached child of the current image matching the draft.
    ///
    /// On a hit the session moves to the cached image. On a miss the
    /// session is cache-busted and later probes return immediately.
    pub async fn probe_cache(&mut self) -> CairnResult<bool> {
        if !self.options.utilize_cache || self.cache_busted {
            return Ok(false);
        }

        let cached = find_cached_child(
            Arc::clone(&self.engine),
            &self.image_id,
            &self.config,
            self.options.probe_timeout,
        )
        .await?;

        let Some(image) = cached else {
            debug!("Cache miss on top of {}, disabling cache", self.image_id);
            self.cache_busted = true;
            return Ok(false);
        };

        self.sink.notice(" ---> Using cache");
        info!("Using cached image {}", image.id);
        self.image_id = image.id;
        Ok(true)
    }
}

/// Find the newest child of `parent_id` whose originating configuration
/// equals `config`.
///
/// Equally new matches keep the first one seen.
pub(crate) async fn find_cached_child(
    engine: Arc<dyn Engine>,
    parent_id: &str,
    config: &ImageConfig,
    timeout: Duration,
) -> CairnResult<Option<ImageRecord>> {
    let children: Vec<String> = engine
        .list_images()
        .await?
        .into_iter()
        .filter(|img| img.parent_id == parent_id)
        .map(|img| img.id)
        .collect();

    if children.is_empty() {
        return Ok(None);
    }

    debug!(
        "Inspecting {} cache candidates of {}",
        children.len(),
        parent_id
    );

    // dropping the set aborts every inspection still running
    let mut inspections = JoinSet::new();
    for child in children {
        let engine = Arc::clone(&engine);
        inspections.spawn(async move {
            match engine.inspect_image(&child).await {
                Ok(Some(image)) => Ok(image),
                Ok(None) => Err(CairnError::CacheCandidate {
                    image: child,
                    reason: "image disappeared".to_string(),
                }),
                Err(e) => Err(CairnError::CacheCandidate {
                    image: child,
                    reason: e.to_string(),
                }),
            }
        });
    }

    let collect = async {
        let mut best: Option<ImageRecord> = None;
        while let Some(joined) = inspections.join_next().await {
            let image = joined.map_err(|e| CairnError::Internal(e.to_string()))??;
            if !compare_configs(&image.container_config, config) {
                continue;
            }
            if best.as_ref().map_or(true, |b| b.created < image.created) {
                best = Some(image);
            }
        }
        Ok::<_, CairnError>(best)
    };

    match tokio::time::timeout(timeout, collect).await {
        Ok(result) => result,
        Err(_) => Err(CairnError::CacheProbeTimeout {
            millis: timeout.as_millis() as u64,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::build::testing::{harness, harness_with};
    use crate::engine::fake::{image, Call};
    use std::collections::BTreeMap;

    fn run_config(cmd: &str) -> ImageConfig {
        ImageConfig {
            cmd: Some(vec!["/bin/sh".into(), "-c".into(), cmd.into()]),
            labels: Some(BTreeMap::from([("team".to_string(), "core".to_string())])),
            ..Default::default()
        }
    }

    fn inspects(call: &Call) -> bool {
        matches!(call, Call::InspectImage(_))
    }

    #[tokio::test]
    async fn disabled_cache_makes_no_engine_calls() {
        let mut h = harness_with(|o| o.utilize_cache = false);
        assert!(!h.session.probe_cache().await.unwrap());
        assert!(h.engine.calls().is_empty());
        assert!(!h.session.is_cache_busted());
    }

    #[tokio::test]
    async fn miss_without_children_busts_cache() {
        let mut h = harness();
        h.engine.add_image(image("base", "", 0, ImageConfig::default()));
        h.session.image_id = "base".to_string();

        assert!(!h.session.probe_cache().await.unwrap());
        assert!(h.session.is_cache_busted());
    }

    #[tokio::test]
    async fn cache_bust_is_sticky() {
        let mut h = harness();
        h.engine.add_image(image("base", "", 0, ImageConfig::default()));
        h.engine.add_image(image("child", "base", 1, run_config("make")));
        h.session.image_id = "base".to_string();
        h.session.config = run_config("make test");

        assert!(!h.session.probe_cache().await.unwrap());
        assert!(h.session.is_cache_busted());
        let calls_after_miss = h.engine.calls().len();

        // would hit now, but the session already gave up on the cache
        h.session.config = run_config("make");
        assert!(!h.session.probe_cache().await.unwrap());
        assert_eq!(h.engine.calls().len(), calls_after_miss);
    }

    #[tokio::test]
    async fn single_match_is_selected() {
        let mut h = harness();
        h.engine.add_image(image("base", "", 0, ImageConfig::default()));
        h.engine.add_image(image("hit", "base", 1, run_config("make")));
        h.engine.add_image(image("other", "base", 2, run_config("make test")));
        h.engine.add_image(image("unrelated", "elsewhere", 3, run_config("make")));
        h.session.image_id = "base".to_string();
        h.session.config = run_config("make");

        assert!(h.session.probe_cache().await.unwrap());
        assert_eq!(h.session.image_id(), "hit");
        assert!(!h.session.is_cache_busted());
        assert_eq!(h.engine.count(inspects), 2);
        assert!(h.output.contents().contains("Using cache"));
    }

    #[tokio::test]
    async fn newest_match_wins() {
        let mut h = harness();
        h.engine.add_image(image("old", "base", 10, run_config("make")));
        h.engine.add_image(image("newest", "base", 30, run_config("make")));
        h.engine.add_image(image("middle", "base", 20, run_config("make")));
        h.session.image_id = "base".to_string();
        h.session.config = run_config("make");

        assert!(h.session.probe_cache().await.unwrap());
        assert_eq!(h.session.image_id(), "newest");
    }

    #[tokio::test]
    async fn failed_candidate_aborts_lookup() {
        let mut h = harness();
        h.engine.add_image(image("good", "base", 1, run_config("make")));
        h.engine.add_image(image("bad", "base", 2, run_config("make")));
        h.engine.fail_inspect("bad", "layer data missing");
        h.engine.delay_inspect("good", Duration::from_millis(300));
        h.session.image_id = "base".to_string();
        h.session.config = run_config("make");

        let err = h.session.probe_cache().await.unwrap_err();
        assert!(matches!(err, CairnError::CacheCandidate { ref image, .. } if image == "bad"));
        assert_eq!(h.session.image_id(), "base");
        assert!(!h.session.is_cache_busted());

        // the slow sibling is cancelled, not left running
        tokio::time::sleep(Duration::from_millis(500)).await;
        assert_eq!(h.engine.completed_inspects(), vec!["bad".to_string()]);
    }

    #[tokio::test]
    async fn slow_inspections_time_out() {
        let mut h = harness_with(|o| o.probe_timeout = Duration::from_millis(50));
        h.engine.add_image(image("slow", "base", 1, run_config("make")));
        h.engine.delay_inspects(Duration::from_millis(200));
        h.session.image_id = "base".to_string();
        h.session.config = run_config("make");

        let err = h.session.probe_cache().await.unwrap_err();
        assert!(matches!(err, CairnError::CacheProbeTimeout { millis: 50 }));
        assert_eq!(err.to_string(), "Timeout while fetching cached images after 50ms");

        tokio::time::sleep(Duration::from_millis(400)).await;
        assert!(h.engine.completed_inspects().is_empty());
        assert!(!h.session.is_cache_busted());
    }
}
