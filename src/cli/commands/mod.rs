//! CLI command implementations

pub mod build;
pub mod config;
pub mod pull;
pub mod push;

pub use build::execute as build;
pub use config::execute as config;
pub use pull::execute as pull;
pub use push::execute as push;

use crate::build::{BuildSession, SessionOptions};
use crate::config::Config;
use crate::engine::{CliEngine, Engine};
use crate::error::{CairnError, CairnResult};
use crate::ui::{ProgressSink, UiContext};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::debug;

/// Start a session on the configured engine
pub(crate) async fn open_session(
    config: &Config,
    context_dir: PathBuf,
    build_file: PathBuf,
    tweak: impl FnOnce(&mut SessionOptions),
) -> CairnResult<BuildSession> {
    let engine = CliEngine::new(config.engine.binary.clone());
    engine.ensure_available().await?;
    debug!("Using engine: {}", engine.engine_name());

    let mut options = SessionOptions::from_config(config, context_dir, build_file);
    tweak(&mut options);

    let sink = ProgressSink::stdout(&UiContext::detect());
    Ok(BuildSession::new(Arc::new(engine), options, sink))
}

/// Session for commands that only pull or push
pub(crate) async fn open_image_session(config: &Config) -> CairnResult<BuildSession> {
    let cwd = std::env::current_dir().map_err(|e| CairnError::io("getting current directory", e))?;
    let build_file = cwd.join(crate::cli::args::DEFAULT_BUILD_FILE);
    open_session(config, cwd, build_file, |_| {}).await
}
