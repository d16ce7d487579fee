use std::collections::HashMap;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Kind {
    Robot,
    Mission,
}

impl Kind {
    pub fn as_str(self) -> &'static str {
        match self {
            Kind::Robot => "robot",
            Kind::Mission => "mission",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Lifecycle {
    Created,
    Running,
    Completed,
    PendingDelete,
}

/// The shared envelope every persisted entity carries (spec §3): identity,
/// labels, lifecycle and version are common; `spec`/`status` are kept as
/// raw JSON here because the store is untyped at this layer — callers
/// (dispatch-core) know whether the payload is a Robot or Mission.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObjectEnvelope {
    pub name: String,
    #[serde(default)]
    pub labels: HashMap<String, String>,
    pub lifecycle: Lifecycle,
    pub version: u64,
    pub spec: serde_json::Value,
    pub status: serde_json::Value,
}

/// Query filter for `list`. Keys mirror the REST query parameters in
/// spec §6 (`min_battery`, `max_battery`, `state`, `online`, `names[]`);
/// kept as a loose string map since filterable fields differ by kind.
#[derive(Debug, Clone, Default)]
pub struct Filter {
    pub params: Vec<(String, String)>,
}

impl Filter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.push((key.into(), value.into()));
        self
    }

    pub fn to_query_string(&self) -> String {
        self.params
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join("&")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchEventKind {
    Add,
    Update,
    Delete,
}

#[derive(Debug, Clone)]
pub struct WatchEvent {
    pub event: WatchEventKind,
    pub object: ObjectEnvelope,
    pub cursor: String,
}
