use anyhow::{Context, Result};
use async_trait::async_trait;
use std::process::Stdio;
use tokio::process::Command;
use tracing::{info, warn};

use crate::application::ports::{BuildOutput, BuildRunner};
use crate::models::{IntegrationStatus, Project};
use crate::queue::IntegrationRequest;

/// Runs a project's `command` through `sh -c`.
///
/// The request is exposed to the command as `CI_*` environment variables;
/// force-build parameters become `CI_PARAM_<NAME>`.
#[derive(Debug, Clone, Default)]
pub struct ShellBuildRunner;

impl ShellBuildRunner {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl BuildRunner for ShellBuildRunner {
    async fn run(&self, trace_id: &str, project: &Project, request: &IntegrationRequest) -> Result<BuildOutput> {
        let Some(command_line) = project.command.as_deref() else {
            info!("[{}] Project '{}' has no build command, nothing to run", trace_id, project.name);
            return Ok(BuildOutput::success());
        };

        info!("[{}] Running build command for project '{}': {}", trace_id, project.name, command_line);

        let mut command = Command::new("sh");
        command
            .arg("-c")
            .arg(command_line)
            .env("CI_PROJECT", &project.name)
            .env("CI_QUEUE", &project.queue_name)
            .env("CI_BUILD_CONDITION", request.build_condition().to_string())
            .env("CI_REQUEST_SOURCE", request.source())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        if let Some(user) = request.user_name() {
            command.env("CI_REQUESTED_BY", user);
        }
        for (name, value) in request.parameters() {
            command.env(format!("CI_PARAM_{}", name.to_ascii_uppercase()), value);
        }
        if let Some(dir) = &project.working_directory {
            command.current_dir(dir);
        }

        let output = command
            .output()
            .await
            .context(format!("Failed to spawn build command for project {}", project.name))?;

        let logs: Vec<String> = String::from_utf8_lossy(&output.stdout)
            .lines()
            .chain(String::from_utf8_lossy(&output.stderr).lines())
            .map(|line| line.to_string())
            .collect();

        let status = if output.status.success() {
            IntegrationStatus::Success
        } else {
            warn!(
                "[{}] Build command for project '{}' exited with {:?}",
                trace_id,
                project.name,
                output.status.code()
            );
            IntegrationStatus::Failure
        };

        Ok(BuildOutput {
            status,
            logs,
            exit_code: output.status.code(),
        })
    }
}
