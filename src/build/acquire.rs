//! Pull-if-absent, tagging and publishing

use super::BuildSession;
use crate::engine::{ImageName, ImageRecord, PullOptions, PushOptions};
use crate::error::{CairnError, CairnResult};
use crate::ui::stream_with_progress;
use std::sync::Arc;
use tracing::info;

impl BuildSession {
    /// Return the named image, pulling it first if the engine lacks it.
    ///
    /// `purpose` only shows up in the pull notice.
    pub async fn ensure_image(&mut self, name: &str, purpose: &str) -> CairnResult<ImageRecord> {
        if let Some(image) = self.engine.inspect_image(name).await? {
            return Ok(image);
        }

        let image = name.parse::<ImageName>()?;
        self.sink
            .notice(format!("Pulling image: {} for {}", image, purpose));

        let opts = PullOptions {
            image: image.clone(),
            auth: self.options.auth.clone(),
        };
        let engine = Arc::clone(&self.engine);
        let context = format!("pull {}", image);

        let (display, call) = stream_with_progress(&mut self.sink, &context, |mut writer| async move {
            engine.pull(&opts, &mut writer).await
        })
        .await;
        let pull_error = |e: CairnError| CairnError::ImagePull {
            image: image.to_string(),
            reason: e.to_string(),
        };
        display.map_err(pull_error)?;
        call.map_err(pull_error)?;

        info!("Pulled {}", image);
        self.engine
            .inspect_image(name)
            .await?
            .ok_or_else(|| CairnError::ImageNotFound(name.to_string()))
    }

    /// Push a tagged image to its registry
    pub async fn push_image(&mut self, image: &ImageName) -> CairnResult<()> {
        let opts = PushOptions {
            image: image.clone(),
            auth: self.options.auth.clone(),
        };
        let engine = Arc::clone(&self.engine);
        let context = format!("push {}", image);

        let (display, call) = stream_with_progress(&mut self.sink, &context, |mut writer| async move {
            engine.push(&opts, &mut writer).await
        })
        .await;
        let push_error = |e: CairnError| CairnError::ImagePush {
            image: image.to_string(),
            reason: e.to_string(),
        };
        display.map_err(push_error)?;
        call.map_err(push_error)?;

        info!("Pushed {}", image);
        Ok(())
    }

    /// Point every name at the current image
    pub async fn tag_image(&mut self, names: &[ImageName]) -> CairnResult<()> {
        if self.image_id.is_empty() {
            return Err(CairnError::MissingBaseImage);
        }
        for name in names {
            self.engine.tag_image(&self.image_id, name).await?;
            self.sink.notice(format!("Tag {} -> {}", self.image_id, name));
        }
        Ok(())
    }
}
