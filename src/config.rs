use anyhow::{Context, Result};
use chrono::Weekday;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::env;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

use crate::clock::Clock;
use crate::error::{QueueError, QueueResult};
use crate::models::Project;
use crate::queue::{parse_lock_queue_names, BuildCondition, HandlingMode, QueueConfiguration};
use crate::triggers::{
    parse_time_of_day, FilterTrigger, IntervalTrigger, MultipleOperator, MultipleTrigger, ScheduleTrigger,
    Trigger,
};

const DEFAULT_CONFIG_PATH: &str = "integration-agent.yaml";
const DEFAULT_BIND_ADDR: &str = "0.0.0.0:3000";

/// Process settings read from the environment.
#[derive(Debug, Clone)]
pub struct AgentSettings {
    pub config_path: PathBuf,
    pub bind_addr: String,
}

impl AgentSettings {
    pub fn from_env() -> Self {
        let config_path = env::var("INTEGRATION_AGENT_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_PATH));
        let bind_addr = env::var("INTEGRATION_AGENT_BIND").unwrap_or_else(|_| DEFAULT_BIND_ADDR.to_string());

        Self { config_path, bind_addr }
    }
}

/// Whole-server configuration file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    #[serde(default)]
    pub queues: Vec<QueueConfig>,
    #[serde(default)]
    pub projects: Vec<ProjectConfig>,
}

fn default_poll_interval_ms() -> u64 {
    1000
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueConfig {
    pub name: String,
    #[serde(default)]
    pub duplicates: HandlingMode,
    /// Comma separated queue names, e.g. `"deploy, release"`.
    #[serde(default)]
    pub lock_queues: String,
}

impl QueueConfig {
    pub fn to_configuration(&self) -> QueueConfiguration {
        QueueConfiguration::new(self.name.clone())
            .with_handling_mode(self.duplicates)
            .with_lock_queues(&self.lock_queues)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectConfig {
    pub name: String,
    #[serde(default)]
    pub queue: Option<String>,
    #[serde(default)]
    pub queue_priority: u32,
    #[serde(default)]
    pub command: Option<String>,
    #[serde(default)]
    pub working_directory: Option<PathBuf>,
    #[serde(default)]
    pub triggers: Vec<TriggerConfig>,
}

impl ProjectConfig {
    /// Projects without an explicit queue get a queue of their own.
    pub fn queue_name(&self) -> &str {
        self.queue.as_deref().unwrap_or(&self.name)
    }

    pub fn to_project(&self) -> Project {
        Project {
            name: self.name.clone(),
            queue_name: self.queue_name().to_string(),
            queue_priority: self.queue_priority,
            command: self.command.clone(),
            working_directory: self.working_directory.clone(),
        }
    }

    /// Build the project's trigger, combining several with `Or`.
    ///
    /// Construction errors and the trigger's own validation are both
    /// reported, so a bad schedule is caught at load time.
    pub fn build_trigger(&self, clock: &Arc<dyn Clock>) -> QueueResult<Box<dyn Trigger>> {
        let trigger: Box<dyn Trigger> = match self.triggers.as_slice() {
            [] => Box::new(IntervalTrigger::new(Arc::clone(clock))),
            [single] => single.build(clock)?,
            many => {
                let triggers = many
                    .iter()
                    .map(|t| t.build(clock))
                    .collect::<QueueResult<Vec<_>>>()?;
                Box::new(MultipleTrigger::new(MultipleOperator::Or, triggers))
            }
        };

        if let Some(error) = trigger.validate().into_iter().next() {
            return Err(error);
        }
        Ok(trigger)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum TriggerConfig {
    Interval {
        #[serde(default)]
        name: Option<String>,
        #[serde(default = "default_interval_seconds")]
        seconds: u64,
        #[serde(default)]
        initial_seconds: Option<u64>,
        #[serde(default)]
        build_condition: BuildCondition,
    },
    Schedule {
        #[serde(default)]
        name: Option<String>,
        time: String,
        #[serde(default)]
        week_days: Vec<Weekday>,
        #[serde(default)]
        random_offset_minutes: u32,
        #[serde(default)]
        build_condition: BuildCondition,
    },
    Filter {
        #[serde(default)]
        name: Option<String>,
        #[serde(default = "default_filter_start")]
        start_time: String,
        #[serde(default = "default_filter_end")]
        end_time: String,
        #[serde(default)]
        week_days: Vec<Weekday>,
        #[serde(default = "default_filter_condition")]
        build_condition: BuildCondition,
        trigger: Box<TriggerConfig>,
    },
    Multiple {
        #[serde(default)]
        name: Option<String>,
        #[serde(default)]
        operator: MultipleOperator,
        triggers: Vec<TriggerConfig>,
    },
}

fn default_interval_seconds() -> u64 {
    crate::triggers::interval::DEFAULT_INTERVAL_SECONDS
}

fn default_filter_start() -> String {
    "00:00".to_string()
}

fn default_filter_end() -> String {
    "23:59:59".to_string()
}

fn default_filter_condition() -> BuildCondition {
    BuildCondition::NoBuild
}

impl TriggerConfig {
    pub fn build(&self, clock: &Arc<dyn Clock>) -> QueueResult<Box<dyn Trigger>> {
        match self {
            TriggerConfig::Interval {
                name,
                seconds,
                initial_seconds,
                build_condition,
            } => {
                let mut trigger = IntervalTrigger::new(Arc::clone(clock))
                    .with_build_condition(*build_condition)
                    .with_interval(*seconds)
                    .with_initial_interval(*initial_seconds);
                if let Some(name) = name {
                    trigger = trigger.with_name(name.clone());
                }
                Ok(Box::new(trigger))
            }
            TriggerConfig::Schedule {
                name,
                time,
                week_days,
                random_offset_minutes,
                build_condition,
            } => {
                let mut trigger = ScheduleTrigger::new(parse_time_of_day(time)?, Arc::clone(clock))
                    .with_build_condition(*build_condition)
                    .with_week_days(week_days.clone())
                    .with_random_offset(*random_offset_minutes);
                if let Some(name) = name {
                    trigger = trigger.with_name(name.clone());
                }
                Ok(Box::new(trigger))
            }
            TriggerConfig::Filter {
                name,
                start_time,
                end_time,
                week_days,
                build_condition,
                trigger,
            } => {
                let inner = trigger.build(clock)?;
                let mut filter = FilterTrigger::new(inner, Arc::clone(clock))
                    .with_window(parse_time_of_day(start_time)?, parse_time_of_day(end_time)?)
                    .with_week_days(week_days.clone())
                    .with_build_condition(*build_condition);
                if let Some(name) = name {
                    filter = filter.with_name(name.clone());
                }
                Ok(Box::new(filter))
            }
            TriggerConfig::Multiple {
                name,
                operator,
                triggers,
            } => {
                let triggers = triggers
                    .iter()
                    .map(|t| t.build(clock))
                    .collect::<QueueResult<Vec<_>>>()?;
                let mut multiple = MultipleTrigger::new(*operator, triggers);
                if let Some(name) = name {
                    multiple = multiple.with_name(name.clone());
                }
                Ok(Box::new(multiple))
            }
        }
    }
}

impl ServerConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        Self::from_yaml(&content).with_context(|| format!("Invalid config file {}", path.display()))
    }

    pub fn from_yaml(content: &str) -> Result<Self> {
        let config: ServerConfig = serde_yaml::from_str(content).context("Failed to parse YAML")?;
        Ok(config)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }

    /// Queue configurations in declaration order, followed by defaults for
    /// queues that projects reference but `queues` does not declare.
    pub fn queue_configurations(&self) -> Vec<QueueConfiguration> {
        let mut configurations: Vec<QueueConfiguration> =
            self.queues.iter().map(QueueConfig::to_configuration).collect();
        for project in &self.projects {
            let queue_name = project.queue_name();
            if !configurations.iter().any(|c| c.name == queue_name) {
                configurations.push(QueueConfiguration::new(queue_name));
            }
        }
        configurations
    }

    /// Problems that drop a project rather than the whole file.
    ///
    /// Unknown lock queue names are only warned about; they are skipped when
    /// locking.
    pub fn validate(&self, clock: &Arc<dyn Clock>) -> Vec<QueueError> {
        let mut errors = Vec::new();

        let mut seen = BTreeSet::new();
        for project in &self.projects {
            if !seen.insert(project.name.as_str()) {
                errors.push(QueueError::configuration(format!(
                    "Duplicate project name: {}",
                    project.name
                )));
            }
            if let Err(e) = project.build_trigger(clock) {
                errors.push(e);
            }
        }

        let known: BTreeSet<String> = self.queue_configurations().into_iter().map(|c| c.name).collect();
        for queue in &self.queues {
            for lock_name in parse_lock_queue_names(&queue.lock_queues) {
                if !known.contains(&lock_name) {
                    warn!("Queue '{}' locks unknown queue '{}'", queue.name, lock_name);
                }
            }
        }

        errors
    }
}
