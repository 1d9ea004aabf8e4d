//! Cairn - layered container image builds
//!
//! Drives a container engine to turn build instructions into images,
//! reusing cached layers and publishing the result under several tags.

pub mod build;
pub mod cli;
pub mod config;
pub mod engine;
pub mod error;
pub mod instructions;
pub mod ui;

pub use error::{CairnError, CairnResult};
