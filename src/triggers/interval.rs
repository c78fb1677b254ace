use chrono::{Duration, NaiveDateTime};
use std::sync::Arc;

use super::Trigger;
use crate::clock::Clock;
use crate::error::QueueResult;
use crate::queue::{BuildCondition, IntegrationRequest};

pub const DEFAULT_INTERVAL_SECONDS: u64 = 60;

/// Fires once a fixed delay has passed since the last integration.
///
/// The first delay after start-up may differ (`initial_interval_seconds`),
/// falling back to the regular interval when unset.
#[derive(Debug)]
pub struct IntervalTrigger {
    name: String,
    build_condition: BuildCondition,
    interval_seconds: u64,
    initial_interval_seconds: Option<u64>,
    is_initial_interval: bool,
    next_build_time: NaiveDateTime,
    clock: Arc<dyn Clock>,
}

impl IntervalTrigger {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        let next_build_time = clock.now() + Duration::seconds(DEFAULT_INTERVAL_SECONDS as i64);
        Self {
            name: "IntervalTrigger".to_string(),
            build_condition: BuildCondition::IfModificationExists,
            interval_seconds: DEFAULT_INTERVAL_SECONDS,
            initial_interval_seconds: None,
            is_initial_interval: true,
            next_build_time,
            clock,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_build_condition(mut self, build_condition: BuildCondition) -> Self {
        self.build_condition = build_condition;
        self
    }

    pub fn with_interval(mut self, seconds: u64) -> Self {
        self.set_interval_seconds(seconds);
        self
    }

    pub fn with_initial_interval(mut self, seconds: Option<u64>) -> Self {
        self.set_initial_interval_seconds(seconds);
        self
    }

    pub fn initial_interval_seconds(&self) -> u64 {
        self.initial_interval_seconds.unwrap_or(self.interval_seconds)
    }

    pub fn set_interval_seconds(&mut self, seconds: u64) {
        self.interval_seconds = seconds;
        self.increment_next_build_time();
    }

    pub fn set_initial_interval_seconds(&mut self, seconds: Option<u64>) {
        self.initial_interval_seconds = seconds;
        self.increment_next_build_time();
    }

    fn increment_next_build_time(&mut self) {
        let delay = if self.is_initial_interval {
            self.initial_interval_seconds()
        } else {
            self.interval_seconds
        };
        self.next_build_time = self.clock.now() + Duration::seconds(delay as i64);
    }
}

impl Trigger for IntervalTrigger {
    fn name(&self) -> &str {
        &self.name
    }

    fn next_build(&mut self) -> QueueResult<NaiveDateTime> {
        Ok(self.next_build_time)
    }

    fn fire(&mut self) -> QueueResult<Option<IntegrationRequest>> {
        let now = self.clock.now();
        if now < self.next_build_time {
            return Ok(None);
        }
        Ok(Some(IntegrationRequest::new(self.build_condition, self.name.clone(), None, now)))
    }

    fn integration_completed(&mut self) -> QueueResult<()> {
        self.is_initial_interval = false;
        self.increment_next_build_time();
        Ok(())
    }
}
