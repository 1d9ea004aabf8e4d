//! In-memory engine for unit tests

use crate::engine::message::{write_message, JsonMessage};
use crate::engine::types::{ContainerRecord, ImageConfig, ImageRecord, ImageSummary};
use crate::engine::{BuildOptions, Engine, ImageName, PullOptions, PushOptions};
use crate::error::{CairnError, CairnResult};
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;
use tokio::io::AsyncWrite;

/// Engine call, as recorded by [`FakeEngine`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    ListImages,
    InspectImage(String),
    Build { dockerfile: String, no_cache: bool },
    Pull(String),
    Push(String),
    Tag(String, String),
    InspectContainer(String),
    CreateContainer(String),
}

#[derive(Default)]
struct State {
    images: HashMap<String, ImageRecord>,
    containers: HashMap<String, ContainerRecord>,
    calls: Vec<Call>,
    build_output: Vec<JsonMessage>,
    build_result: Option<ImageRecord>,
    build_failure: Option<String>,
    built_files: Vec<String>,
    pull_result: Option<ImageRecord>,
    push_failure: Option<String>,
    failing_inspects: HashMap<String, String>,
    inspect_delay: Option<Duration>,
    inspect_delays: HashMap<String, Duration>,
    completed_inspects: Vec<String>,
}

#[derive(Default)]
pub struct FakeEngine {
    state: Mutex<State>,
}

pub fn timestamp(secs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
}

pub fn image(id: &str, parent: &str, created: i64, container_config: ImageConfig) -> ImageRecord {
    ImageRecord {
        id: id.to_string(),
        parent: parent.to_string(),
        created: timestamp(created),
        config: container_config.clone(),
        container_config,
    }
}

impl FakeEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_image(&self, record: ImageRecord) {
        let mut state = self.state.lock().unwrap();
        state.images.insert(record.id.clone(), record);
    }

    pub fn add_container(&self, name: &str, id: &str) {
        let mut state = self.state.lock().unwrap();
        state.containers.insert(
            name.to_string(),
            ContainerRecord {
                id: id.to_string(),
                name: name.to_string(),
                config: ImageConfig::default(),
            },
        );
    }

    /// Messages the next build writes, and the image it leaves behind
    pub fn script_build(&self, output: Vec<JsonMessage>, result: Option<ImageRecord>) {
        let mut state = self.state.lock().unwrap();
        state.build_output = output;
        state.build_result = result;
    }

    pub fn fail_build(&self, reason: &str) {
        self.state.lock().unwrap().build_failure = Some(reason.to_string());
    }

    /// Image registered once a pull completes; `None` leaves it missing
    pub fn script_pull(&self, result: Option<ImageRecord>) {
        self.state.lock().unwrap().pull_result = result;
    }

    pub fn fail_push(&self, reason: &str) {
        self.state.lock().unwrap().push_failure = Some(reason.to_string());
    }

    pub fn fail_inspect(&self, id: &str, reason: &str) {
        let mut state = self.state.lock().unwrap();
        state
            .failing_inspects
            .insert(id.to_string(), reason.to_string());
    }

    pub fn delay_inspects(&self, delay: Duration) {
        self.state.lock().unwrap().inspect_delay = Some(delay);
    }

    /// Delay inspections of one image only; overrides `delay_inspects`
    pub fn delay_inspect(&self, id: &str, delay: Duration) {
        let mut state = self.state.lock().unwrap();
        state.inspect_delays.insert(id.to_string(), delay);
    }

    /// Ids whose inspection ran past its delay instead of being cancelled
    pub fn completed_inspects(&self) -> Vec<String> {
        self.state.lock().unwrap().completed_inspects.clone()
    }

    pub fn calls(&self) -> Vec<Call> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn count(&self, pred: impl Fn(&Call) -> bool) -> usize {
        self.calls().iter().filter(|c| pred(c)).count()
    }

    /// Build file contents seen by each build call
    pub fn built_files(&self) -> Vec<String> {
        self.state.lock().unwrap().built_files.clone()
    }

    fn record(&self, call: Call) {
        self.state.lock().unwrap().calls.push(call);
    }
}

#[async_trait]
impl Engine for FakeEngine {
    async fn list_images(&self) -> CairnResult<Vec<ImageSummary>> {
        self.record(Call::ListImages);
        let state = self.state.lock().unwrap();
        Ok(state.images.values().map(ImageSummary::from).collect())
    }

    async fn inspect_image(&self, id: &str) -> CairnResult<Option<ImageRecord>> {
        self.record(Call::InspectImage(id.to_string()));
        let delay = {
            let state = self.state.lock().unwrap();
            state.inspect_delays.get(id).copied().or(state.inspect_delay)
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let mut state = self.state.lock().unwrap();
        state.completed_inspects.push(id.to_string());
        if let Some(reason) = state.failing_inspects.get(id) {
            return Err(CairnError::engine("image inspect", reason.clone()));
        }
        let found = state
            .images
            .values()
            .find(|img| img.id == id || img.id.starts_with(id))
            .cloned();
        Ok(found)
    }

    async fn build(
        &self,
        opts: &BuildOptions,
        out: &mut (dyn AsyncWrite + Send + Unpin),
    ) -> CairnResult<()> {
        self.record(Call::Build {
            dockerfile: opts.dockerfile.clone(),
            no_cache: opts.no_cache,
        });

        let content = std::fs::read_to_string(opts.context_dir.join(&opts.dockerfile))
            .map_err(|e| CairnError::io("reading build file", e))?;

        let (output, result, failure) = {
            let mut state = self.state.lock().unwrap();
            state.built_files.push(content);
            (
                state.build_output.clone(),
                state.build_result.clone(),
                state.build_failure.clone(),
            )
        };

        for msg in &output {
            write_message(out, msg).await?;
        }
        if let Some(reason) = failure {
            return Err(CairnError::engine("build", reason));
        }
        if let Some(record) = result {
            self.add_image(record);
        }
        Ok(())
    }

    async fn pull(
        &self,
        opts: &PullOptions,
        out: &mut (dyn AsyncWrite + Send + Unpin),
    ) -> CairnResult<()> {
        self.record(Call::Pull(opts.image.reference()));
        write_message(
            out,
            &JsonMessage::status(Some("a1b2c3d4e5f6".to_string()), "Pull complete"),
        )
        .await?;
        let result = self.state.lock().unwrap().pull_result.clone();
        if let Some(record) = result {
            self.add_image(record);
        }
        Ok(())
    }

    async fn push(
        &self,
        opts: &PushOptions,
        out: &mut (dyn AsyncWrite + Send + Unpin),
    ) -> CairnResult<()> {
        self.record(Call::Push(opts.image.reference()));
        write_message(out, &JsonMessage::status(None, "Pushed")).await?;
        let failure = self.state.lock().unwrap().push_failure.clone();
        match failure {
            Some(reason) => Err(CairnError::engine("push", reason)),
            None => Ok(()),
        }
    }

    async fn tag_image(&self, image_id: &str, name: &ImageName) -> CairnResult<()> {
        self.record(Call::Tag(image_id.to_string(), name.reference()));
        Ok(())
    }

    async fn inspect_container(&self, name: &str) -> CairnResult<Option<ContainerRecord>> {
        self.record(Call::InspectContainer(name.to_string()));
        Ok(self.state.lock().unwrap().containers.get(name).cloned())
    }

    async fn create_container(&self, name: &str, config: &ImageConfig) -> CairnResult<String> {
        self.record(Call::CreateContainer(name.to_string()));
        let id = format!("container-{}", name);
        let mut state = self.state.lock().unwrap();
        state.containers.insert(
            name.to_string(),
            ContainerRecord {
                id: id.clone(),
                name: name.to_string(),
                config: config.clone(),
            },
        );
        Ok(id)
    }

    fn engine_name(&self) -> &str {
        "fake"
    }
}
