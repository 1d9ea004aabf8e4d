//! Image reference parsing
//!
//! Splits `[registry/]repository[:tag][@digest]` into the parts the engine's
//! pull, push and tag operations take separately.

use crate::error::{CairnError, CairnResult};
use std::fmt;
use std::str::FromStr;

pub const DEFAULT_TAG: &str = "latest";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageName {
    registry: Option<String>,
    repository: String,
    tag: Option<String>,
    digest: Option<String>,
}

impl ImageName {
    /// Registry host, when the reference names one
    pub fn registry(&self) -> Option<&str> {
        self.registry.as_deref()
    }

    /// Repository path without the registry
    pub fn repository(&self) -> &str {
        &self.repository
    }

    /// Tag, defaulting to `latest`
    pub fn tag(&self) -> &str {
        self.tag.as_deref().unwrap_or(DEFAULT_TAG)
    }

    pub fn digest(&self) -> Option<&str> {
        self.digest.as_deref()
    }

    /// `registry/repository`, or just the repository
    pub fn name_with_registry(&self) -> String {
        match &self.registry {
            Some(registry) => format!("{}/{}", registry, self.repository),
            None => self.repository.clone(),
        }
    }

    /// Reference suitable for pull: digest wins over tag
    pub fn reference(&self) -> String {
        match &self.digest {
            Some(digest) => format!("{}@{}", self.name_with_registry(), digest),
            None => format!("{}:{}", self.name_with_registry(), self.tag()),
        }
    }
}

fn is_registry(component: &str) -> bool {
    component.contains('.') || component.contains(':') || component == "localhost"
}

impl FromStr for ImageName {
    type Err = CairnError;

    fn from_str(s: &str) -> CairnResult<Self> {
        let s = s.trim();
        if s.is_empty() || s.chars().any(char::is_whitespace) {
            return Err(CairnError::ImageNameInvalid(s.to_string()));
        }

        let (rest, digest) = match s.split_once('@') {
            Some((rest, digest)) => (rest, Some(digest.to_string())),
            None => (s, None),
        };

        let (registry, path) = match rest.split_once('/') {
            Some((first, path)) if is_registry(first) => (Some(first.to_string()), path),
            _ => (None, rest),
        };

        // a colon after the last slash separates the tag
        let last_slash = path.rfind('/').map_or(0, |i| i + 1);
        let (repository, tag) = match path[last_slash..].rfind(':') {
            Some(i) => (
                &path[..last_slash + i],
                Some(path[last_slash + i + 1..].to_string()),
            ),
            None => (path, None),
        };

        if repository.is_empty() || tag.as_deref() == Some("") {
            return Err(CairnError::ImageNameInvalid(s.to_string()));
        }

        Ok(Self {
            registry,
            repository: repository.to_string(),
            tag,
            digest,
        })
    }
}

impl fmt::Display for ImageName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.reference())
    }
}
