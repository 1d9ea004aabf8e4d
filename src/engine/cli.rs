//! Engine backed by the docker or podman command line
//!
//! Every call shells out to the configured binary. Streaming commands have
//! their output re-encoded as JSON progress messages so callers see the same
//! stream shape regardless of engine.

use crate::engine::message::{self, JsonMessage};
use crate::engine::types::{ContainerRecord, ImageConfig, ImageRecord, ImageSummary, RegistryAuth};
use crate::engine::{
    error_tail, pipe_child_output, BuildOptions, Engine, ImageName, PullOptions, PushOptions,
};
use crate::error::{CairnError, CairnResult};
use async_trait::async_trait;
use base64::Engine as _;
use std::collections::HashSet;
use std::process::Stdio;
use tempfile::TempDir;
use tokio::io::AsyncWrite;
use tokio::process::Command;
use tracing::{debug, info};

const DEFAULT_AUTH_SERVER: &str = "https://index.docker.io/v1/";

/// Container engine using the docker/podman CLI
pub struct CliEngine {
    binary: String,
}

impl CliEngine {
    /// Create an engine driving the given binary
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    /// Check if the engine binary is installed
    pub async fn is_available(&self) -> bool {
        Command::new(&self.binary)
            .arg("--version")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await
            .map(|s| s.success())
            .unwrap_or(false)
    }

    /// Fail early with a helpful error when the binary is missing
    pub async fn ensure_available(&self) -> CairnResult<()> {
        if self.is_available().await {
            Ok(())
        } else {
            Err(CairnError::EngineNotFound(self.binary.clone()))
        }
    }

    fn command(&self, auth_dir: Option<&TempDir>) -> Command {
        let mut cmd = Command::new(&self.binary);
        // a cancelled call must not leave the engine command running
        cmd.kill_on_drop(true);
        if let Some(dir) = auth_dir {
            // docker reads $DOCKER_CONFIG/config.json, podman REGISTRY_AUTH_FILE
            cmd.env("DOCKER_CONFIG", dir.path());
            cmd.env("REGISTRY_AUTH_FILE", dir.path().join("config.json"));
        }
        cmd
    }

    /// Execute a command and return the output
    async fn exec(&self, args: &[&str]) -> CairnResult<std::process::Output> {
        debug!("Executing: {} {:?}", self.binary, args);

        self.command(None)
            .args(args)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| CairnError::command_failed(format!("{} {:?}", self.binary, args), e))
    }

    /// Run a long command, forwarding its output into the progress pipe
    async fn exec_streaming(
        &self,
        operation: &str,
        args: &[String],
        auth: &RegistryAuth,
        out: &mut (dyn AsyncWrite + Send + Unpin),
        to_message: fn(&str) -> JsonMessage,
    ) -> CairnResult<()> {
        debug!("Streaming: {} {:?}", self.binary, args);

        let auth_dir = write_auth_dir(auth).await?;
        let mut cmd = self.command(auth_dir.as_ref());
        if operation == "build" {
            // lineage-based cache probing needs the classic builder
            cmd.env("DOCKER_BUILDKIT", "0");
        }

        let mut child = cmd
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| CairnError::command_failed(format!("{} {}", self.binary, operation), e))?;

        let all_output = pipe_child_output(&mut child, out, to_message).await;

        let status = child
            .wait()
            .await
            .map_err(|e| CairnError::command_failed(format!("{} {}", self.binary, operation), e))?;

        if status.success() {
            Ok(())
        } else {
            Err(CairnError::engine(operation, error_tail(&all_output)))
        }
    }

    async fn inspect<T: serde::de::DeserializeOwned>(
        &self,
        kind: &str,
        name: &str,
        not_found: &[&str],
    ) -> CairnResult<Option<T>> {
        let output = self.exec(&[kind, "inspect", name]).await?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let lowered = stderr.to_lowercase();
            if not_found.iter().any(|needle| lowered.contains(needle)) {
                return Ok(None);
            }
            return Err(CairnError::engine(format!("{} inspect", kind), stderr));
        }

        // inspect returns an array even for a single object
        let mut records: Vec<T> = serde_json::from_slice(&output.stdout)?;
        if records.is_empty() {
            return Ok(None);
        }
        Ok(Some(records.swap_remove(0)))
    }
}

/// Write a private client config carrying the registry credentials.
///
/// The directory is removed when the returned guard drops.
async fn write_auth_dir(auth: &RegistryAuth) -> CairnResult<Option<TempDir>> {
    if auth.is_empty() {
        return Ok(None);
    }

    let server = if auth.server_address.is_empty() {
        DEFAULT_AUTH_SERVER
    } else {
        auth.server_address.as_str()
    };
    let encoded = base64::engine::general_purpose::STANDARD
        .encode(format!("{}:{}", auth.username, auth.password));
    let config = serde_json::json!({ "auths": { server: { "auth": encoded } } });

    let dir = tempfile::Builder::new()
        .prefix("cairn-auth-")
        .tempdir()
        .map_err(|e| CairnError::io("creating registry auth directory", e))?;
    tokio::fs::write(dir.path().join("config.json"), serde_json::to_vec(&config)?)
        .await
        .map_err(|e| CairnError::io("writing registry auth config", e))?;

    Ok(Some(dir))
}

fn build_line(line: &str) -> JsonMessage {
    JsonMessage::stream(format!("{}\n", line))
}

fn status_line(line: &str) -> JsonMessage {
    JsonMessage::from_status_line(line)
}

#[async_trait]
impl Engine for CliEngine {
    async fn list_images(&self) -> CairnResult<Vec<ImageSummary>> {
        let output = self.exec(&["images", "-a", "-q", "--no-trunc"]).await?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(CairnError::engine("images", stderr));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let mut seen = HashSet::new();
        let ids: Vec<&str> = stdout
            .lines()
            .map(str::trim)
            .filter(|id| !id.is_empty() && seen.insert(*id))
            .collect();

        if ids.is_empty() {
            return Ok(Vec::new());
        }

        // listing has no parent column, one batched inspect fills it in
        let mut args = vec!["image", "inspect"];
        args.extend(ids.iter().copied());
        let output = self.exec(&args).await?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(CairnError::engine("image inspect", stderr));
        }

        let records: Vec<ImageRecord> = serde_json::from_slice(&output.stdout)?;
        Ok(records.iter().map(ImageSummary::from).collect())
    }

    async fn inspect_image(&self, id: &str) -> CairnResult<Option<ImageRecord>> {
        self.inspect("image", id, &["no such image", "image not known"])
            .await
    }

    async fn build(
        &self,
        opts: &BuildOptions,
        out: &mut (dyn AsyncWrite + Send + Unpin),
    ) -> CairnResult<()> {
        let iid_dir = tempfile::Builder::new()
            .prefix("cairn-iid-")
            .tempdir()
            .map_err(|e| CairnError::io("creating image id directory", e))?;
        let iid_file = iid_dir.path().join("iid");

        let mut args = vec![
            "build".to_string(),
            "-f".to_string(),
            opts.context_dir.join(&opts.dockerfile).display().to_string(),
            "--iidfile".to_string(),
            iid_file.display().to_string(),
        ];
        if opts.no_cache {
            args.push("--no-cache".to_string());
        }
        args.push(opts.context_dir.display().to_string());

        self.exec_streaming("build", &args, &opts.auth, out, build_line)
            .await?;

        match tokio::fs::read_to_string(&iid_file).await {
            Ok(id) if !id.trim().is_empty() => {
                message::write_message(out, &JsonMessage::aux_id(id.trim())).await?;
            }
            _ => debug!("Engine wrote no image id file, relying on build output"),
        }

        Ok(())
    }

    async fn pull(
        &self,
        opts: &PullOptions,
        out: &mut (dyn AsyncWrite + Send + Unpin),
    ) -> CairnResult<()> {
        info!("Pulling image: {}", opts.image);
        let args = vec!["pull".to_string(), opts.image.reference()];
        self.exec_streaming("pull", &args, &opts.auth, out, status_line)
            .await
    }

    async fn push(
        &self,
        opts: &PushOptions,
        out: &mut (dyn AsyncWrite + Send + Unpin),
    ) -> CairnResult<()> {
        info!("Pushing image: {}", opts.image);
        let args = vec!["push".to_string(), opts.image.reference()];
        self.exec_streaming("push", &args, &opts.auth, out, status_line)
            .await
    }

    async fn tag_image(&self, image_id: &str, name: &ImageName) -> CairnResult<()> {
        let reference = name.reference();
        let output = self.exec(&["tag", image_id, &reference]).await?;

        if output.status.success() {
            debug!("Tagged {} as {}", image_id, reference);
            Ok(())
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr);
            Err(CairnError::engine("tag", stderr))
        }
    }

    async fn inspect_container(&self, name: &str) -> CairnResult<Option<ContainerRecord>> {
        self.inspect("container", name, &["no such container", "no such object"])
            .await
    }

    async fn create_container(&self, name: &str, config: &ImageConfig) -> CairnResult<String> {
        let mut args = vec!["create".to_string(), "--name".to_string(), name.to_string()];

        for volume in config.volumes.iter().flat_map(|v| v.keys()) {
            args.push("-v".to_string());
            args.push(volume.clone());
        }
        for (k, v) in config.labels.iter().flatten() {
            args.push("--label".to_string());
            args.push(format!("{}={}", k, v));
        }
        for env in config.env.iter().flatten() {
            args.push("-e".to_string());
            args.push(env.clone());
        }

        args.push(config.image.clone());
        args.extend(config.cmd.iter().flatten().cloned());

        debug!("Creating container: {} {:?}", self.binary, args);

        let args_refs: Vec<&str> = args.iter().map(String::as_str).collect();
        let output = self.exec(&args_refs).await?;

        if output.status.success() {
            let container_id = String::from_utf8_lossy(&output.stdout).trim().to_string();
            debug!(
                "Container created: {}",
                &container_id[..12.min(container_id.len())]
            );
            Ok(container_id)
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr);
            Err(CairnError::engine("create", stderr))
        }
    }

    fn engine_name(&self) -> &str {
        &self.binary
    }
}
