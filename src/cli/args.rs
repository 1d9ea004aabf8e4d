//! CLI argument definitions using clap derive

use clap::{ArgAction, Parser, Subcommand};
use std::path::PathBuf;

/// Build file name used when `--file` is not given
pub const DEFAULT_BUILD_FILE: &str = "Rockerfile";

/// Cairn - layered container image builds
///
/// Builds images step by step on a docker or podman engine, reusing
/// cached layers and tagging the result under any number of names.
#[derive(Parser, Debug)]
#[command(name = "cairn")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Increase verbosity (-v info, -vv debug)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub verbose: u8,

    /// Configuration file path
    #[arg(short, long, global = true, env = "CAIRN_CONFIG")]
    pub config: Option<PathBuf>,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Build an image from a sequence of instructions
    Build(BuildArgs),

    /// Pull an image unless the engine already has it
    Pull(ImageArgs),

    /// Push an image to its registry
    Push(ImageArgs),

    /// Show configuration
    Config(ConfigArgs),
}

/// Arguments for the build command
#[derive(Parser, Debug)]
pub struct BuildArgs {
    /// Build context directory
    #[arg(long, default_value = ".")]
    pub context: PathBuf,

    /// Build file name, relative to the context; also keys the export container
    #[arg(short, long, default_value = DEFAULT_BUILD_FILE)]
    pub file: PathBuf,

    /// Base image, as if the first instruction were FROM IMAGE
    #[arg(long)]
    pub from: Option<String>,

    /// Instruction in one-line form, e.g. -i "RUN make" (repeatable)
    #[arg(short, long = "instruction", value_name = "INSTRUCTION")]
    pub instructions: Vec<String>,

    /// Neither reuse cached layers nor let the engine use its own cache
    #[arg(long)]
    pub no_cache: bool,

    /// Name to tag the result with (repeatable)
    #[arg(short, long = "tag", value_name = "NAME")]
    pub tags: Vec<String>,

    /// Push every tag after building
    #[arg(long, requires = "tags")]
    pub push: bool,
}

/// Arguments naming a single image
#[derive(Parser, Debug)]
pub struct ImageArgs {
    /// Image reference, e.g. registry.example.com/team/app:1.0
    pub image: String,
}

/// Arguments for the config command
#[derive(Parser, Debug)]
pub struct ConfigArgs {
    /// Subcommand for config
    #[command(subcommand)]
    pub action: Option<ConfigAction>,
}

/// Config subcommands
#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Show current configuration
    Show,

    /// Show configuration file path
    Path,

    /// Initialize default configuration
    Init {
        /// Overwrite existing configuration
        #[arg(short, long)]
        force: bool,
    },

    /// Set a configuration value
    Set {
        /// Configuration key (e.g., build.utilize_cache)
        key: String,
        /// Value to set
        value: String,
    },
}
