use anyhow::Result;
use async_trait::async_trait;

use crate::models::{IntegrationStatus, Project};
use crate::queue::IntegrationRequest;

/// Output from one integration run
#[derive(Debug, Clone)]
pub struct BuildOutput {
    pub status: IntegrationStatus,
    pub logs: Vec<String>,
    pub exit_code: Option<i32>,
}

impl BuildOutput {
    pub fn success() -> Self {
        Self {
            status: IntegrationStatus::Success,
            logs: Vec::new(),
            exit_code: Some(0),
        }
    }
}

/// Trait for whatever actually performs a build.
///
/// The queue core only decides when a project may start; implementations
/// run outside every queue lock. Dropping the returned future must stop the
/// build, which is how aborts are delivered.
#[async_trait]
pub trait BuildRunner: Send + Sync {
    async fn run(&self, trace_id: &str, project: &Project, request: &IntegrationRequest) -> Result<BuildOutput>;
}
