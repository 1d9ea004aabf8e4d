//! Newline-delimited JSON progress messages
//!
//! Engines write one message per line into the progress pipe; the display
//! side decodes them back (see `ui::progress`).

use crate::error::{CairnError, CairnResult};
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncWrite, AsyncWriteExt};

/// A single progress message
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct JsonMessage {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stream: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub progress: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    #[serde(rename = "errorDetail", skip_serializing_if = "Option::is_none")]
    pub error_detail: Option<ErrorDetail>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub aux: Option<Aux>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ErrorDetail {
    pub message: String,
}

/// Structured side-channel data; builds report the resulting image here
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Aux {
    #[serde(rename = "ID")]
    pub id: String,
}

impl JsonMessage {
    /// Raw build output text
    pub fn stream(text: impl Into<String>) -> Self {
        Self {
            stream: Some(text.into()),
            ..Default::default()
        }
    }

    /// Status line, optionally scoped to a layer id
    pub fn status(id: Option<String>, status: impl Into<String>) -> Self {
        Self {
            id,
            status: Some(status.into()),
            ..Default::default()
        }
    }

    /// Identity of the image a build produced
    pub fn aux_id(id: impl Into<String>) -> Self {
        Self {
            aux: Some(Aux { id: id.into() }),
            ..Default::default()
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        let message = message.into();
        Self {
            error: Some(message.clone()),
            error_detail: Some(ErrorDetail { message }),
            ..Default::default()
        }
    }

    /// Parse a pull/push output line such as `a1b2c3d4e5f6: Pull complete`.
    ///
    /// The prefix is treated as a layer id only when it is a single
    /// hex-looking token; anything else is a plain status.
    pub fn from_status_line(line: &str) -> Self {
        if let Some((prefix, rest)) = line.split_once(": ") {
            let is_layer = prefix.len() >= 12 && prefix.chars().all(|c| c.is_ascii_hexdigit());
            if is_layer {
                return Self::status(Some(prefix.to_string()), rest.trim());
            }
        }
        Self::status(None, line.trim())
    }

    /// Error text reported by the engine inside the stream, if any
    pub fn error_message(&self) -> Option<&str> {
        self.error_detail
            .as_ref()
            .map(|d| d.message.as_str())
            .filter(|m| !m.is_empty())
            .or(self.error.as_deref())
    }
}

/// Write one message as a JSON line
pub async fn write_message(
    out: &mut (dyn AsyncWrite + Send + Unpin),
    message: &JsonMessage,
) -> CairnResult<()> {
    let mut line = serde_json::to_vec(message)?;
    line.push(b'\n');
    out.write_all(&line)
        .await
        .map_err(|e| CairnError::io("writing progress message", e))
}
