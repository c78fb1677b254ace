use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// A configured project as the queue core sees it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Project {
    pub name: String,
    pub queue_name: String,
    /// 0 means "always append to the end of the queue".
    pub queue_priority: u32,
    pub command: Option<String>,
    pub working_directory: Option<PathBuf>,
}

impl Project {
    pub fn new(name: impl Into<String>, queue_name: impl Into<String>, queue_priority: u32) -> Self {
        Self {
            name: name.into(),
            queue_name: queue_name.into(),
            queue_priority,
            command: None,
            working_directory: None,
        }
    }

    pub fn with_command(mut self, command: impl Into<String>) -> Self {
        self.command = Some(command.into());
        self
    }

    pub fn is_same_project(&self, other: &Project) -> bool {
        self.name == other.name
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ProjectActivity {
    Sleeping,
    Pending,
    Building,
}

impl std::fmt::Display for ProjectActivity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProjectActivity::Sleeping => write!(f, "Sleeping"),
            ProjectActivity::Pending => write!(f, "Pending"),
            ProjectActivity::Building => write!(f, "Building"),
        }
    }
}

/// Lifecycle of a project's integrator worker.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum IntegratorState {
    Running,
    Stopping,
    Stopped,
}

impl std::fmt::Display for IntegratorState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IntegratorState::Running => write!(f, "Running"),
            IntegratorState::Stopping => write!(f, "Stopping"),
            IntegratorState::Stopped => write!(f, "Stopped"),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum IntegrationStatus {
    Building,
    Success,
    Failure,
    Exception,
    Cancelled,
}

impl std::fmt::Display for IntegrationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IntegrationStatus::Building => write!(f, "Building"),
            IntegrationStatus::Success => write!(f, "Success"),
            IntegrationStatus::Failure => write!(f, "Failure"),
            IntegrationStatus::Exception => write!(f, "Exception"),
            IntegrationStatus::Cancelled => write!(f, "Cancelled"),
        }
    }
}

/// Outcome of the most recent integration.
#[derive(Debug, Clone, Serialize)]
pub struct BuildSummary {
    pub status: IntegrationStatus,
    pub build_condition: String,
    pub source: String,
    pub user_name: Option<String>,
    pub finished_at: String,
    pub duration_ms: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProjectStatus {
    pub name: String,
    pub queue: String,
    pub queue_priority: u32,
    pub state: IntegratorState,
    pub activity: ProjectActivity,
    pub last_build: Option<BuildSummary>,
    pub next_build_time: Option<String>,
}
