//! Build orchestration core
//!
//! A [`BuildSession`] owns all state of one build: the current image, the
//! configuration draft, pending instructions, cache flags and mounts. Its
//! methods are split by concern:
//! - `overlay`: scoped, reversible edits of the configuration draft
//! - `cache`: lineage-based cache probing
//! - `driver`: materializing pending instructions into an image
//! - `acquire`: pull-if-absent, tag and push
//! - `mounts`: auxiliary containers, binds and mount bookkeeping

mod acquire;
mod cache;
mod driver;
mod mounts;
mod overlay;

pub use mounts::Mount;
pub use overlay::{TemporaryCmd, TemporaryConfig};

use crate::config::schema::ExportsConfig;
use crate::config::Config;
use crate::engine::{Engine, ImageConfig, ImageRecord, RegistryAuth};
use crate::instructions::Instruction;
use crate::ui::ProgressSink;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

/// Label added to otherwise empty `FROM scratch` builds
pub const SCRATCH_LABEL: &str = "ROCKER_SCRATCH";

/// Static settings of a build session
#[derive(Debug, Clone)]
pub struct SessionOptions {
    /// Build context directory handed to the engine
    pub context_dir: PathBuf,
    /// Source build file; names the session's export container
    pub build_file: PathBuf,
    pub utilize_cache: bool,
    pub probe_timeout: Duration,
    pub tmp_prefix: String,
    pub exports: ExportsConfig,
    pub auth: RegistryAuth,
}

impl SessionOptions {
    pub fn from_config(config: &Config, context_dir: PathBuf, build_file: PathBuf) -> Self {
        Self {
            context_dir,
            build_file,
            utilize_cache: config.build.utilize_cache,
            probe_timeout: config.build.probe_timeout(),
            tmp_prefix: config.build.tmp_prefix.clone(),
            exports: config.exports.clone(),
            auth: RegistryAuth::from(&config.registry),
        }
    }
}

/// State of one build, mutated only through its own methods
pub struct BuildSession {
    engine: Arc<dyn Engine>,
    id: Uuid,
    options: SessionOptions,
    sink: ProgressSink,

    image_id: String,
    config: ImageConfig,
    pending: Vec<Instruction>,
    cache_busted: bool,

    mounts: Vec<Mount>,
    all_mounts: Vec<Mount>,
    exports_container_id: Option<String>,
    git_ignored: bool,
}

impl BuildSession {
    pub fn new(engine: Arc<dyn Engine>, options: SessionOptions, sink: ProgressSink) -> Self {
        Self {
            engine,
            id: Uuid::new_v4(),
            options,
            sink,
            image_id: String::new(),
            config: ImageConfig::default(),
            pending: Vec::new(),
            cache_busted: false,
            mounts: Vec::new(),
            all_mounts: Vec::new(),
            exports_container_id: None,
            git_ignored: false,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn options(&self) -> &SessionOptions {
        &self.options
    }

    /// Current image identity; empty until the first image exists
    pub fn image_id(&self) -> &str {
        &self.image_id
    }

    pub fn config(&self) -> &ImageConfig {
        &self.config
    }

    pub fn config_mut(&mut self) -> &mut ImageConfig {
        &mut self.config
    }

    /// Adopt an existing image as the current state
    pub fn set_image(&mut self, image: &ImageRecord) {
        self.image_id = image.id.clone();
        self.config = image.config.clone();
    }

    pub fn push_instruction(&mut self, instruction: Instruction) {
        self.pending.push(instruction);
    }

    pub fn pending(&self) -> &[Instruction] {
        &self.pending
    }

    pub fn is_cache_busted(&self) -> bool {
        self.cache_busted
    }

    /// Whether the context ignore file already excludes `.git`
    pub fn git_ignored(&self) -> bool {
        self.git_ignored
    }

    pub fn sink(&mut self) -> &mut ProgressSink {
        &mut self.sink
    }

    /// Private build-file name written into the context for each build
    fn dockerfile_name(&self) -> String {
        format!("{}_dockerfile_{}", self.options.tmp_prefix, self.id.simple())
    }

    /// Build file path relative to the context, as it appears in the ignore file
    fn build_file_relative(&self) -> String {
        let file = &self.options.build_file;
        file.strip_prefix(&self.options.context_dir)
            .ok()
            .or_else(|| file.file_name().map(Path::new))
            .unwrap_or(file.as_path())
            .display()
            .to_string()
    }

    /// Deterministic export container name: the same build file always
    /// maps to the same container, across runs
    fn exports_container_name(&self) -> String {
        let hash = hex::encode(Sha256::digest(
            self.options.build_file.display().to_string().as_bytes(),
        ));
        format!("cairn_exports_{}", &hash[..12])
    }
}
