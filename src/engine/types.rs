use indexmap::IndexMap;
use serde::Deserialize;
use std::fmt;

/// A named workload declared in a compose file, as resolved at plan time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Service {
    pub name: String,
    pub image: String,
}

/// The engine's content-addressed identifier for an image reference at a point
/// in time. Two identities are equal iff byte-identical.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct ImageId(pub String);

impl ImageId {
    pub fn empty() -> Self {
        Self(String::new())
    }

    pub fn is_empty(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl fmt::Display for ImageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A deterministic, ASCII tag pointing at a pre-update image id so a failed
/// verification can retag a service back to its prior content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupTag(pub String);

impl BackupTag {
    /// `<image>__backup__<run_timestamp>`, where `run_timestamp` is `YYYYMMDDThhmmss`.
    pub fn new(image: &str, run_timestamp: &str) -> Self {
        Self(format!("{image}__backup__{run_timestamp}"))
    }
}

impl fmt::Display for BackupTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The engine's view of one container: running state, health (if any
/// healthcheck is configured), and restart count.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerState {
    pub runtime_status: String,
    pub health_status: Option<String>,
    pub restart_count: u32,
}

impl ContainerState {
    pub fn is_running(&self) -> bool {
        self.runtime_status == "running"
    }
}

/// The subset of `docker compose config --format json` this service reads:
/// each service's resolved image reference. `services` is an `IndexMap` so
/// the declared order of the JSON object survives deserialization instead of
/// being scattered by a hash.
#[derive(Debug, Clone, Deserialize)]
pub struct ComposeConfig {
    #[serde(default)]
    pub services: IndexMap<String, ComposeServiceConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ComposeServiceConfig {
    pub image: Option<String>,
}

/// `docker inspect <id>` returns a JSON array; this is the slice of the first
/// element's `State` this service needs. Unknown fields are ignored, missing
/// ones default (`RestartCount` absent -> 0, no `Health` -> no healthcheck).
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct InspectEntry {
    #[serde(rename = "State", default)]
    pub state: InspectState,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub(crate) struct InspectState {
    #[serde(rename = "Status", default)]
    pub status: String,
    #[serde(rename = "Health", default)]
    pub health: Option<InspectHealth>,
    #[serde(rename = "RestartCount", default)]
    pub restart_count: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct InspectHealth {
    #[serde(rename = "Status", default)]
    pub status: String,
}
