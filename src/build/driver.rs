//! Materializing pending instructions into an image

use super::{BuildSession, SCRATCH_LABEL};
use crate::engine::BuildOptions;
use crate::error::{CairnError, CairnResult};
use crate::instructions::{serialize_instructions, Instruction};
use crate::ui::stream_with_progress;
use once_cell::sync::Lazy;
use regex::Regex;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

const IGNORE_FILE: &str = ".dockerignore";
const IGNORE_HEADER: &str = "# This file is automatically generated by cairn, please keep it";

/// Image id line printed by the classic builder
static BUILT_ID_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"Successfully built ([a-z0-9]{12})").expect("Invalid built image id regex")
});

/// Build file written into the context; removed when dropped
struct ScopedBuildFile {
    path: PathBuf,
}

impl ScopedBuildFile {
    async fn write(path: PathBuf, content: &str) -> CairnResult<Self> {
        fs::write(&path, content)
            .await
            .map_err(|e| CairnError::io(format!("writing {}", path.display()), e))?;
        Ok(Self { path })
    }
}

impl Drop for ScopedBuildFile {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.path) {
            warn!("Failed to remove {}: {}", self.path.display(), e);
        }
    }
}

/// Pull the short image id out of classic builder output
fn parse_built_id(output: &str) -> Option<String> {
    BUILT_ID_REGEX
        .captures_iter(output)
        .last()
        .map(|caps| caps[1].to_string())
}

impl BuildSession {
    /// Build the pending instructions on top of the current image.
    ///
    /// On success the session moves to the new image and the pending list is
    /// cleared. On failure the session state is left untouched.
    pub async fn materialize(&mut self) -> CairnResult<()> {
        if self.pending.is_empty() {
            return Ok(());
        }

        let mut instructions = self.pending.clone();
        if instructions.len() == 1
            && instructions[0].is_from()
            && instructions[0].args.first().map(String::as_str) == Some("scratch")
        {
            // an empty scratch layer has no inspectable image id
            instructions.push(Instruction::label(SCRATCH_LABEL, "1"));
        }
        if !instructions[0].is_from() {
            if self.image_id.is_empty() {
                return Err(CairnError::MissingBaseImage);
            }
            instructions.insert(0, Instruction::from_image(self.image_id.clone()));
        }

        let content = serialize_instructions(&instructions)?;
        debug!("Build file for session {}:\n{}", self.id, content);

        let dockerfile = self.dockerfile_name();
        let _build_file =
            ScopedBuildFile::write(self.options.context_dir.join(&dockerfile), &content).await?;

        let opts = BuildOptions {
            context_dir: self.options.context_dir.clone(),
            dockerfile,
            no_cache: !self.options.utilize_cache,
            auth: self.options.auth.clone(),
        };
        let engine = Arc::clone(&self.engine);

        let (display, call) = stream_with_progress(&mut self.sink, "build", |mut writer| async move {
            engine.build(&opts, &mut writer).await
        })
        .await;
        let outcome = display?;
        call.map_err(|e| CairnError::ImageBuild(e.to_string()))?;

        let image_id = match outcome.aux_id {
            Some(id) => id,
            None => parse_built_id(&outcome.captured).ok_or(CairnError::ImageIdNotFound)?,
        };

        let image = self
            .engine
            .inspect_image(&image_id)
            .await?
            .ok_or_else(|| CairnError::ImageNotFound(image_id.clone()))?;

        info!("Built image {}", image.id);
        self.set_image(&image);
        self.pending.clear();
        Ok(())
    }

    /// Make sure the context ignore file excludes the build's private files.
    ///
    /// Creates the file when absent, otherwise appends only the missing
    /// entries. Also records whether `.git` is already ignored.
    pub async fn check_ignore_file(&mut self) -> CairnResult<()> {
        let path = self.options.context_dir.join(IGNORE_FILE);
        let required = [
            IGNORE_FILE.to_string(),
            format!("{}*", self.options.tmp_prefix),
            self.build_file_relative(),
        ];

        let existing = match fs::read_to_string(&path).await {
            Ok(content) => Some(content),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
            Err(e) => return Err(CairnError::io(format!("reading {}", path.display()), e)),
        };

        let Some(existing) = existing else {
            let mut content = format!("{}\n", IGNORE_HEADER);
            for line in &required {
                content.push_str(line);
                content.push('\n');
            }
            fs::write(&path, content)
                .await
                .map_err(|e| CairnError::io(format!("writing {}", path.display()), e))?;
            self.sink
                .notice(format!("Create {} in context directory", IGNORE_FILE));
            return Ok(());
        };

        let present: Vec<&str> = existing.lines().map(str::trim).collect();
        self.git_ignored = present.contains(&".git");

        let missing: Vec<&String> = required
            .iter()
            .filter(|line| !present.contains(&line.as_str()))
            .collect();
        if missing.is_empty() {
            return Ok(());
        }

        let mut addition = String::new();
        if !existing.is_empty() && !existing.ends_with('\n') {
            addition.push('\n');
        }
        for line in &missing {
            addition.push_str(line);
            addition.push('\n');
        }

        let append_error = |e: std::io::Error| CairnError::io(format!("appending to {}", path.display()), e);
        let mut file = OpenOptions::new()
            .append(true)
            .open(&path)
            .await
            .map_err(append_error)?;
        file.write_all(addition.as_bytes())
            .await
            .map_err(append_error)?;
        file.flush().await.map_err(append_error)?;
        self.sink
            .notice(format!("Add {} lines to {}", missing.len(), IGNORE_FILE));
        Ok(())
    }
}
