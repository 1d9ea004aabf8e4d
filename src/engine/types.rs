//! Engine data types
//!
//! Wire shapes follow the engine's inspect JSON (PascalCase keys). Fields the
//! engine reports as `null` decode to their empty value.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;

use crate::config::schema::RegistryConfig;

/// Decode `null` as `T::default()`
fn null_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Option::unwrap_or_default)
}

/// The engine's `{}` placeholder value in volume and port sets
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Empty {}

/// Container configuration, both the in-progress draft and the
/// configuration an image was committed from
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct ImageConfig {
    /// Random per-container value the engine fills in; never compared
    #[serde(deserialize_with = "null_default")]
    pub hostname: String,

    #[serde(deserialize_with = "null_default")]
    pub user: String,

    pub exposed_ports: Option<BTreeMap<String, Empty>>,

    pub env: Option<Vec<String>>,

    pub cmd: Option<Vec<String>>,

    pub entrypoint: Option<Vec<String>>,

    /// Image reference the container is created from
    #[serde(deserialize_with = "null_default")]
    pub image: String,

    pub volumes: Option<BTreeMap<String, Empty>>,

    #[serde(deserialize_with = "null_default")]
    pub working_dir: String,

    pub labels: Option<BTreeMap<String, String>>,

    pub on_build: Option<Vec<String>>,

    #[serde(deserialize_with = "null_default")]
    pub stop_signal: String,
}

fn seq(value: &Option<Vec<String>>) -> &[String] {
    value.as_deref().unwrap_or(&[])
}

fn map<V: PartialEq>(value: &Option<BTreeMap<String, V>>) -> Option<&BTreeMap<String, V>> {
    value.as_ref().filter(|m| !m.is_empty())
}

/// Structural comparison used for cache matching.
///
/// Sequences compare in order, mappings compare as sets of entries, and an
/// absent field equals an empty one. `image` is not compared: the cache
/// lookup already restricts candidates to children of the same parent.
/// `hostname` is not compared either: the engine generates one per
/// container, so it never matches a draft.
pub fn compare_configs(a: &ImageConfig, b: &ImageConfig) -> bool {
    a.user == b.user
        && a.working_dir == b.working_dir
        && a.stop_signal == b.stop_signal
        && seq(&a.cmd) == seq(&b.cmd)
        && seq(&a.entrypoint) == seq(&b.entrypoint)
        && seq(&a.env) == seq(&b.env)
        && seq(&a.on_build) == seq(&b.on_build)
        && map(&a.labels) == map(&b.labels)
        && map(&a.volumes) == map(&b.volumes)
        && map(&a.exposed_ports) == map(&b.exposed_ports)
}

/// Full image record as returned by inspect
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ImageRecord {
    pub id: String,

    #[serde(default, deserialize_with = "null_default")]
    pub parent: String,

    pub created: DateTime<Utc>,

    /// Configuration of the container this image was committed from
    #[serde(default, deserialize_with = "null_default")]
    pub container_config: ImageConfig,

    #[serde(default, deserialize_with = "null_default")]
    pub config: ImageConfig,
}

/// Lineage entry as returned by listing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageSummary {
    pub id: String,
    pub parent_id: String,
}

impl From<&ImageRecord> for ImageSummary {
    fn from(record: &ImageRecord) -> Self {
        Self {
            id: record.id.clone(),
            parent_id: record.parent.clone(),
        }
    }
}

/// Container record as returned by inspect
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ContainerRecord {
    pub id: String,

    #[serde(default, deserialize_with = "null_default")]
    pub name: String,

    #[serde(default, deserialize_with = "null_default")]
    pub config: ImageConfig,
}

/// Registry credentials passed along with build, pull and push
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RegistryAuth {
    pub username: String,
    pub password: String,
    pub server_address: String,
}

impl RegistryAuth {
    pub fn is_empty(&self) -> bool {
        self.username.is_empty() && self.password.is_empty()
    }
}

impl From<&RegistryConfig> for RegistryAuth {
    fn from(config: &RegistryConfig) -> Self {
        Self {
            username: config.username.clone().unwrap_or_default(),
            password: config.password.clone().unwrap_or_default(),
            server_address: config.server_address.clone().unwrap_or_default(),
        }
    }
}
