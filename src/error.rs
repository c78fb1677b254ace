use thiserror::Error;

/// Errors raised by the queue and trigger core.
///
/// Configuration-shaped errors abort loading a single project or trigger; they
/// are collected and reported next to other projects' errors instead of
/// stopping the server. Lock contention is never an error.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum QueueError {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error(
        "schedule trigger '{trigger}': minute {minutes} plus a random offset of {offset} minutes passes the hour"
    )]
    ScheduleOverflow {
        trigger: String,
        minutes: u32,
        offset: u32,
    },

    #[error("invalid time of day '{0}' (expected HH:MM or HH:MM:SS)")]
    InvalidTime(String),

    #[error("no such project: {0}")]
    NoSuchProject(String),

    #[error("project '{0}' is not running")]
    ProjectNotRunning(String),
}

impl QueueError {
    pub fn configuration(message: impl Into<String>) -> Self {
        QueueError::Configuration(message.into())
    }

    /// True for errors that came from configuration rather than a lookup.
    pub fn is_configuration(&self) -> bool {
        !matches!(self, QueueError::NoSuchProject(_) | QueueError::ProjectNotRunning(_))
    }
}

pub type QueueResult<T> = Result<T, QueueError>;
