use serde::{Deserialize, Serialize};
use crate::models::{IntegrationStatus, IntegratorState};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Event {
    #[serde(rename = "queue_entered")]
    QueueEntered {
        project: String,
        queue: String,
        timestamp: String,
    },

    #[serde(rename = "queue_exited")]
    QueueExited {
        project: String,
        queue: String,
        cancelled: bool,
        timestamp: String,
    },

    #[serde(rename = "build_status")]
    BuildStatus {
        project: String,
        status: IntegrationStatus,
        timestamp: String,
    },

    #[serde(rename = "log")]
    Log {
        project: String,
        line: String,
        line_number: usize,
        timestamp: String,
    },

    #[serde(rename = "integrator_state")]
    IntegratorState {
        project: String,
        state: IntegratorState,
        timestamp: String,
    },

    #[serde(rename = "error")]
    Error {
        project: Option<String>,
        message: String,
        timestamp: String,
    },
}

impl Event {
    pub fn now() -> String {
        chrono::Local::now().to_rfc3339()
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Event::QueueEntered { .. } => "QueueEntered",
            Event::QueueExited { .. } => "QueueExited",
            Event::BuildStatus { .. } => "BuildStatus",
            Event::Log { .. } => "Log",
            Event::IntegratorState { .. } => "IntegratorState",
            Event::Error { .. } => "Error",
        }
    }

    pub fn project(&self) -> Option<&str> {
        match self {
            Event::QueueEntered { project, .. }
            | Event::QueueExited { project, .. }
            | Event::BuildStatus { project, .. }
            | Event::Log { project, .. }
            | Event::IntegratorState { project, .. } => Some(project),
            Event::Error { project, .. } => project.as_deref(),
        }
    }

    pub fn queue_entered(project: &str, queue: &str) -> Self {
        Event::QueueEntered {
            project: project.to_string(),
            queue: queue.to_string(),
            timestamp: Self::now(),
        }
    }

    pub fn queue_exited(project: &str, queue: &str, cancelled: bool) -> Self {
        Event::QueueExited {
            project: project.to_string(),
            queue: queue.to_string(),
            cancelled,
            timestamp: Self::now(),
        }
    }

    pub fn build_status(project: &str, status: IntegrationStatus) -> Self {
        Event::BuildStatus {
            project: project.to_string(),
            status,
            timestamp: Self::now(),
        }
    }

    pub fn log(project: &str, line: String, line_number: usize) -> Self {
        Event::Log {
            project: project.to_string(),
            line,
            line_number,
            timestamp: Self::now(),
        }
    }

    pub fn integrator_state(project: &str, state: IntegratorState) -> Self {
        Event::IntegratorState {
            project: project.to_string(),
            state,
            timestamp: Self::now(),
        }
    }

    pub fn error(project: Option<&str>, message: String) -> Self {
        Event::Error {
            project: project.map(str::to_string),
            message,
            timestamp: Self::now(),
        }
    }
}
