use serde::{Deserialize, Serialize};

use crate::error::QueueError;

/// What to do when a project already has a pending item on the queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(try_from = "String", into = "String")]
pub enum HandlingMode {
    /// Keep the pending item, drop the new request.
    #[default]
    UseFirst,
    /// A more insistent request removes the pending one and is re-added by priority.
    ApplyForceBuildsReAdd,
    /// A more insistent request removes the pending one and goes straight to position 1.
    ApplyForceBuildsReAddTop,
    /// A more insistent request takes the pending item's place.
    ApplyForceBuildsReplace,
}

impl std::fmt::Display for HandlingMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HandlingMode::UseFirst => write!(f, "UseFirst"),
            HandlingMode::ApplyForceBuildsReAdd => write!(f, "ApplyForceBuildsReAdd"),
            HandlingMode::ApplyForceBuildsReAddTop => write!(f, "ApplyForceBuildsReAddTop"),
            HandlingMode::ApplyForceBuildsReplace => write!(f, "ApplyForceBuildsReplace"),
        }
    }
}

impl std::str::FromStr for HandlingMode {
    type Err = QueueError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "usefirst" => Ok(HandlingMode::UseFirst),
            "applyforcebuildsreadd" => Ok(HandlingMode::ApplyForceBuildsReAdd),
            "applyforcebuildsreaddtop" => Ok(HandlingMode::ApplyForceBuildsReAddTop),
            "applyforcebuildsreplace" => Ok(HandlingMode::ApplyForceBuildsReplace),
            _ => Err(QueueError::configuration(format!(
                "Unknown queue duplicate handling mode: {}",
                s
            ))),
        }
    }
}

impl TryFrom<String> for HandlingMode {
    type Error = QueueError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<HandlingMode> for String {
    fn from(mode: HandlingMode) -> Self {
        mode.to_string()
    }
}

/// Per-queue settings, read-only once the queue is built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QueueConfiguration {
    pub name: String,
    pub handling_mode: HandlingMode,
    /// Queues that must be blocked before this queue may integrate, in
    /// acquisition order.
    pub lock_queue_names: Vec<String>,
}

impl QueueConfiguration {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            handling_mode: HandlingMode::default(),
            lock_queue_names: Vec::new(),
        }
    }

    pub fn with_handling_mode(mut self, handling_mode: HandlingMode) -> Self {
        self.handling_mode = handling_mode;
        self
    }

    /// Accepts the comma-separated form used in configuration files.
    pub fn with_lock_queues(mut self, lock_queue_names: &str) -> Self {
        self.lock_queue_names = parse_lock_queue_names(lock_queue_names);
        self
    }
}

pub fn parse_lock_queue_names(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(str::to_string)
        .collect()
}
