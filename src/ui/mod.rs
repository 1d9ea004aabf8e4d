//! Terminal detection and progress output
//!
//! Progress degrades to plain lines when stdout is not an interactive
//! terminal (CI, pipes).

pub mod context;
pub mod progress;

pub use context::UiContext;
pub use progress::{display_json_stream, stream_with_progress, ProgressSink, StreamOutcome};
