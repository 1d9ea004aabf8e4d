//! Container engine interface
//!
//! The build core talks to the engine only through the [`Engine`] trait:
//! - `CliEngine`: drives the docker or podman CLI
//! - `FakeEngine` (tests only): in-memory engine recording calls

mod cli;
#[cfg(test)]
pub(crate) mod fake;
pub mod image_name;
pub mod message;
pub mod types;

pub use cli::CliEngine;
pub use image_name::ImageName;
pub use message::JsonMessage;
pub use types::{
    compare_configs, ContainerRecord, Empty, ImageConfig, ImageRecord, ImageSummary, RegistryAuth,
};

use crate::error::CairnResult;
use async_trait::async_trait;
use std::path::PathBuf;
use tokio::io::{AsyncBufReadExt, AsyncWrite, BufReader};
use tracing::debug;

/// Options for a build request
#[derive(Debug, Clone)]
pub struct BuildOptions {
    /// Build context directory
    pub context_dir: PathBuf,
    /// Build file name, relative to the context directory
    pub dockerfile: String,
    /// Disable the engine's own layer cache
    pub no_cache: bool,
    pub auth: RegistryAuth,
}

/// Options for a pull request
#[derive(Debug, Clone)]
pub struct PullOptions {
    pub image: ImageName,
    pub auth: RegistryAuth,
}

/// Options for a push request
#[derive(Debug, Clone)]
pub struct PushOptions {
    pub image: ImageName,
    pub auth: RegistryAuth,
}

/// Abstract container engine interface
///
/// Streaming operations write newline-delimited [`JsonMessage`]s into `out`
/// and return once the engine is done; the caller reads the other end of
/// the pipe concurrently.
#[async_trait]
pub trait Engine: Send + Sync {
    /// List all images, including intermediate layers
    async fn list_images(&self) -> CairnResult<Vec<ImageSummary>>;

    /// Inspect an image; `None` when the engine has no such image
    async fn inspect_image(&self, id: &str) -> CairnResult<Option<ImageRecord>>;

    /// Build an image from a context directory
    async fn build(
        &self,
        opts: &BuildOptions,
        out: &mut (dyn AsyncWrite + Send + Unpin),
    ) -> CairnResult<()>;

    /// Pull an image from its registry
    async fn pull(
        &self,
        opts: &PullOptions,
        out: &mut (dyn AsyncWrite + Send + Unpin),
    ) -> CairnResult<()>;

    /// Push an image to its registry
    async fn push(
        &self,
        opts: &PushOptions,
        out: &mut (dyn AsyncWrite + Send + Unpin),
    ) -> CairnResult<()>;

    /// Point a repository tag at an image
    async fn tag_image(&self, image_id: &str, name: &ImageName) -> CairnResult<()>;

    /// Inspect a container by name or id; `None` when it does not exist
    async fn inspect_container(&self, name: &str) -> CairnResult<Option<ContainerRecord>>;

    /// Create (but do not start) a named container, returning its id
    async fn create_container(&self, name: &str, config: &ImageConfig) -> CairnResult<String>;

    /// Human-readable engine name for display
    fn engine_name(&self) -> &str;
}

/// Max number of output lines to include in engine error messages.
const ERROR_TAIL_LINES: usize = 50;

/// Keep the useful tail of command output for error diagnostics.
pub(crate) fn error_tail(lines: &[String]) -> String {
    let start = lines.len().saturating_sub(ERROR_TAIL_LINES);
    lines[start..].join("\n")
}

/// Forward stdout+stderr of a child process into a progress pipe.
///
/// Each line is converted with `to_message` and written as JSON. Returns
/// every collected line for error reporting. Once the pipe stops accepting
/// writes the child is still drained so it never blocks on a full pipe.
pub(crate) async fn pipe_child_output(
    child: &mut tokio::process::Child,
    out: &mut (dyn AsyncWrite + Send + Unpin),
    to_message: fn(&str) -> JsonMessage,
) -> Vec<String> {
    let (Some(stdout), Some(stderr)) = (child.stdout.take(), child.stderr.take()) else {
        return Vec::new();
    };

    let mut stdout_reader = BufReader::new(stdout).lines();
    let mut stderr_reader = BufReader::new(stderr).lines();

    let mut all_output = Vec::new();
    let mut stdout_done = false;
    let mut stderr_done = false;
    let mut pipe_open = true;

    while !stdout_done || !stderr_done {
        let line = tokio::select! {
            line = stdout_reader.next_line(), if !stdout_done => match line {
                Ok(Some(line)) => line,
                _ => {
                    stdout_done = true;
                    continue;
                }
            },
            line = stderr_reader.next_line(), if !stderr_done => match line {
                Ok(Some(line)) => line,
                _ => {
                    stderr_done = true;
                    continue;
                }
            },
        };

        if pipe_open {
            if let Err(e) = message::write_message(out, &to_message(&line)).await {
                debug!("Progress pipe closed: {}", e);
                pipe_open = false;
            }
        }
        all_output.push(line);
    }

    all_output
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_tail_keeps_last_lines() {
        let lines: Vec<String> = (0..80).map(|i| format!("line {}", i)).collect();
        let tail = error_tail(&lines);
        assert!(tail.starts_with("line 30"));
        assert!(tail.ends_with("line 79"));
    }

    #[test]
    fn error_tail_short_output() {
        let lines = vec!["only".to_string()];
        assert_eq!(error_tail(&lines), "only");
    }
}
