//! Build instructions
//!
//! The build core treats instructions as opaque except for the keyword: it
//! only inserts a base-image or label instruction and renders the sequence
//! as build-file text for the engine.

use crate::error::{CairnError, CairnResult};

/// A single build-file instruction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Instruction {
    /// Lower-cased keyword (`from`, `run`, `label`, ...)
    pub keyword: String,
    /// Argument chain
    pub args: Vec<String>,
    /// Render arguments in exec (JSON array) form
    pub json: bool,
}

impl Instruction {
    pub fn new(keyword: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            keyword: keyword.into().to_lowercase(),
            args,
            json: false,
        }
    }

    /// `FROM <image>`
    pub fn from_image(image: impl Into<String>) -> Self {
        Self::new("from", vec![image.into()])
    }

    /// `LABEL <key>=<value>`
    pub fn label(key: &str, value: &str) -> Self {
        Self::new("label", vec![format!("{}={}", key, value)])
    }

    /// Parse the one-line form `KEYWORD args...`.
    ///
    /// Arguments that are a JSON array of strings select exec form; anything
    /// else is kept as a single shell-form argument string.
    pub fn parse(line: &str) -> CairnResult<Self> {
        let line = line.trim();
        let (keyword, rest) = line
            .split_once(char::is_whitespace)
            .map(|(k, r)| (k, r.trim()))
            .unwrap_or((line, ""));

        if keyword.is_empty() || !keyword.chars().all(|c| c.is_ascii_alphabetic()) {
            return Err(CairnError::InvalidInstruction(line.to_string()));
        }
        if rest.is_empty() {
            return Err(CairnError::InvalidInstruction(format!(
                "{} requires arguments",
                keyword.to_uppercase()
            )));
        }

        if rest.starts_with('[') {
            if let Ok(args) = serde_json::from_str::<Vec<String>>(rest) {
                return Ok(Self {
                    json: true,
                    ..Self::new(keyword, args)
                });
            }
        }

        Ok(Self::new(keyword, vec![rest.to_string()]))
    }

    pub fn is_from(&self) -> bool {
        self.keyword == "from"
    }

    /// Render as one build-file line
    pub fn to_line(&self) -> CairnResult<String> {
        let args = if self.json {
            serde_json::to_string(&self.args)?
        } else {
            self.args.join(" ")
        };
        Ok(format!("{} {}", self.keyword.to_uppercase(), args))
    }
}

/// Render an instruction sequence as build-file text
pub fn serialize_instructions(instructions: &[Instruction]) -> CairnResult<String> {
    let mut out = String::new();
    for instruction in instructions {
        out.push_str(&instruction.to_line()?);
        out.push('\n');
    }
    Ok(out)
}
