//! Progress stream rendering
//!
//! Engines write JSON progress messages into one end of an in-memory pipe
//! while [`display_json_stream`] renders them from the other end. In a
//! terminal each layer id gets its own spinner line; otherwise every
//! message becomes a plain text line.

use super::context::UiContext;
use crate::engine::JsonMessage;
use crate::error::{CairnError, CairnResult};
use indicatif::{MultiProgress, ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::collections::HashMap;
use std::future::Future;
use std::io::Write;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader, DuplexStream};
use tracing::debug;

/// Buffer size of the progress pipe
const PIPE_CAPACITY: usize = 64 * 1024;

/// Where human-readable progress goes
pub struct ProgressSink {
    out: Box<dyn Write + Send>,
    is_terminal: bool,
}

impl ProgressSink {
    pub fn new(out: Box<dyn Write + Send>, is_terminal: bool) -> Self {
        Self { out, is_terminal }
    }

    /// Progress on stdout, with bars when stdout is an interactive terminal
    pub fn stdout(ctx: &UiContext) -> Self {
        Self::new(Box::new(std::io::stdout()), ctx.use_fancy_output())
    }

    pub fn is_terminal(&self) -> bool {
        self.is_terminal
    }

    /// Print a one-line builder notice
    pub fn notice(&mut self, message: impl std::fmt::Display) {
        self.write_raw(&format!("[cairn] {}\n", message));
    }

    fn write_raw(&mut self, text: &str) {
        if let Err(e) = self.out.write_all(text.as_bytes()).and_then(|_| self.out.flush()) {
            debug!("Failed to write progress output: {}", e);
        }
    }
}

/// What a finished progress stream left behind
#[derive(Debug, Default)]
pub struct StreamOutcome {
    /// All text the engine streamed
    pub captured: String,
    /// Structured image id reported by the engine, if any
    pub aux_id: Option<String>,
}

struct Renderer<'a> {
    sink: &'a mut ProgressSink,
    multi: Option<MultiProgress>,
    layers: HashMap<String, ProgressBar>,
}

impl<'a> Renderer<'a> {
    fn new(sink: &'a mut ProgressSink) -> Self {
        let multi = sink
            .is_terminal()
            .then(|| MultiProgress::with_draw_target(ProgressDrawTarget::stdout()));
        Self {
            sink,
            multi,
            layers: HashMap::new(),
        }
    }

    fn write_text(&mut self, text: &str) {
        let Renderer { sink, multi, .. } = self;
        match multi {
            Some(multi) => multi.suspend(|| sink.write_raw(text)),
            None => sink.write_raw(text),
        }
    }

    fn render(&mut self, msg: &JsonMessage) {
        if let Some(stream) = &msg.stream {
            self.write_text(stream);
        }

        let Some(status) = &msg.status else { return };
        let text = match &msg.progress {
            Some(progress) if !progress.is_empty() => format!("{} {}", status, progress),
            _ => status.clone(),
        };

        let Some(id) = msg.id.clone() else {
            self.write_text(&format!("{}\n", text));
            return;
        };
        let Some(multi) = self.multi.clone() else {
            self.write_text(&format!("{}: {}\n", id, text));
            return;
        };

        let bar = self.layers.entry(id.clone()).or_insert_with(|| {
            let bar = multi.add(ProgressBar::new_spinner());
            bar.set_style(
                ProgressStyle::with_template("  {spinner:.cyan} {prefix:.dim} {msg}")
                    .unwrap_or_else(|_| ProgressStyle::default_spinner()),
            );
            bar.set_prefix(id);
            bar
        });
        bar.set_message(text);
        bar.tick();
    }

    fn finish(self) {
        for bar in self.layers.values() {
            bar.finish();
        }
    }
}

/// Decode and render a JSON progress stream until EOF.
///
/// An engine-reported error or an undecodable line fails the stream; the
/// rest of the input is still consumed so the writing side never stalls.
pub async fn display_json_stream<R>(
    reader: R,
    sink: &mut ProgressSink,
    context: &str,
) -> CairnResult<StreamOutcome>
where
    R: AsyncRead + Unpin,
{
    let stream_error = |reason: String| CairnError::ProgressStream {
        context: context.to_string(),
        reason,
    };

    let mut lines = BufReader::new(reader).lines();
    let mut renderer = Renderer::new(sink);
    let mut outcome = StreamOutcome::default();
    let mut failure = None;

    while let Some(line) = lines
        .next_line()
        .await
        .map_err(|e| stream_error(e.to_string()))?
    {
        if failure.is_some() || line.trim().is_empty() {
            continue;
        }

        let msg: JsonMessage = match serde_json::from_str(&line) {
            Ok(msg) => msg,
            Err(e) => {
                failure = Some(stream_error(format!("invalid message {:?}: {}", line, e)));
                continue;
            }
        };

        if let Some(error) = msg.error_message() {
            failure = Some(stream_error(error.to_string()));
            continue;
        }

        if let Some(aux) = &msg.aux {
            outcome.aux_id = Some(aux.id.clone());
        }
        if let Some(stream) = &msg.stream {
            outcome.captured.push_str(stream);
        }
        if let Some(status) = &msg.status {
            outcome.captured.push_str(status);
            outcome.captured.push('\n');
        }

        renderer.render(&msg);
    }

    renderer.finish();

    match failure {
        Some(err) => Err(err),
        None => Ok(outcome),
    }
}

/// Run a streaming engine call while rendering its progress.
///
/// `call` receives the write end of the pipe and must drop it when done,
/// which ends the display. Both sides run concurrently on the current task;
/// the display result comes first, then the call result.
pub async fn stream_with_progress<F, Fut>(
    sink: &mut ProgressSink,
    context: &str,
    call: F,
) -> (CairnResult<StreamOutcome>, CairnResult<()>)
where
    F: FnOnce(DuplexStream) -> Fut,
    Fut: Future<Output = CairnResult<()>>,
{
    let (writer, reader) = tokio::io::duplex(PIPE_CAPACITY);

    let (call_result, display_result) =
        tokio::join!(call(writer), display_json_stream(reader, sink, context));

    (display_result, call_result)
}

/// Cloneable in-memory writer for capturing progress output
#[cfg(test)]
#[derive(Clone, Default)]
pub(crate) struct CaptureBuffer(std::sync::Arc<std::sync::Mutex<Vec<u8>>>);

#[cfg(test)]
impl CaptureBuffer {
    pub fn sink(&self) -> ProgressSink {
        ProgressSink::new(Box::new(self.clone()), false)
    }

    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).to_string()
    }
}

#[cfg(test)]
impl Write for CaptureBuffer {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}
