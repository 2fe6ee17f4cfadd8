use serde::{Deserialize, Serialize};
use crate::core::error::{QueueError, QueueResult};

/// What happens to items produced after `finish()`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PostFinishPolicy {
    /// Enqueue and count them as usual.
    #[default]
    Accept,
    /// Drop them without touching the buffer or counters.
    Discard,
}

/// Per-queue settings
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    pub name: String,              // shows up in tracing events and journal entries
    pub record_operations: bool,   // keep an operation journal
    pub post_finish: PostFinishPolicy,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            name: "handoff".to_string(),
            record_operations: false,
            post_finish: PostFinishPolicy::Accept,
        }
    }
}

impl QueueConfig {
    /// Parse a config from JSON. Missing fields fall back to the defaults.
    pub fn from_json_str(raw: &str) -> QueueResult<Self> {
        serde_json::from_str(raw).map_err(|e| QueueError::ConfigError(e.to_string()))
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn recording(mut self, record_operations: bool) -> Self {
        self.record_operations = record_operations;
        self
    }

    pub fn post_finish(mut self, policy: PostFinishPolicy) -> Self {
        self.post_finish = policy;
        self
    }
}
