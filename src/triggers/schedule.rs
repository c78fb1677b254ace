use chrono::{Datelike, Duration, NaiveDateTime, NaiveTime, Timelike, Weekday};
use rand::Rng;
use std::sync::Arc;
use tracing::debug;

use super::{week_days_or_all, Trigger, ALL_WEEK_DAYS};
use crate::clock::Clock;
use crate::error::{QueueError, QueueResult};
use crate::queue::{BuildCondition, IntegrationRequest};

/// Fires once per valid week day at a fixed time of day, optionally shifted
/// by a random number of minutes so that many projects don't start together.
#[derive(Debug)]
pub struct ScheduleTrigger {
    name: String,
    build_condition: BuildCondition,
    integration_time: NaiveTime,
    week_days: Vec<Weekday>,
    random_offset_minutes: u32,
    next_build: Option<NaiveDateTime>,
    triggered: bool,
    clock: Arc<dyn Clock>,
}

impl ScheduleTrigger {
    pub fn new(integration_time: NaiveTime, clock: Arc<dyn Clock>) -> Self {
        Self {
            name: "ScheduleTrigger".to_string(),
            build_condition: BuildCondition::IfModificationExists,
            integration_time,
            week_days: ALL_WEEK_DAYS.to_vec(),
            random_offset_minutes: 0,
            next_build: None,
            triggered: false,
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

    pub fn with_week_days(mut self, week_days: Vec<Weekday>) -> Self {
        self.week_days = week_days_or_all(week_days);
        self.next_build = None;
        self
    }

    pub fn with_random_offset(mut self, minutes: u32) -> Self {
        self.random_offset_minutes = minutes;
        self.next_build = None;
        self
    }

    fn is_valid_week_day(&self, day: Weekday) -> bool {
        self.week_days.contains(&day)
    }

    fn check_offset(&self) -> QueueResult<()> {
        if self.integration_time.minute() + self.random_offset_minutes >= 60 {
            return Err(QueueError::ScheduleOverflow {
                trigger: self.name.clone(),
                minutes: self.integration_time.minute(),
                offset: self.random_offset_minutes,
            });
        }
        Ok(())
    }

    fn calculate_next_build(&self) -> QueueResult<NaiveDateTime> {
        self.check_offset()?;

        let now = self.clock.now();
        let offset = if self.random_offset_minutes > 0 {
            rand::thread_rng().gen_range(0..self.random_offset_minutes)
        } else {
            0
        };

        let mut next = now.date().and_time(self.integration_time) + Duration::minutes(i64::from(offset));
        if now >= next {
            next += Duration::days(1);
        }
        for _ in 0..ALL_WEEK_DAYS.len() {
            if self.is_valid_week_day(next.weekday()) {
                break;
            }
            next += Duration::days(1);
        }

        debug!(trigger = %self.name, next_build = %next, "Next scheduled build at {}", next);
        Ok(next)
    }
}

impl Trigger for ScheduleTrigger {
    fn name(&self) -> &str {
        &self.name
    }

    fn next_build(&mut self) -> QueueResult<NaiveDateTime> {
        match self.next_build {
            Some(next) => Ok(next),
            None => {
                let next = self.calculate_next_build()?;
                self.next_build = Some(next);
                Ok(next)
            }
        }
    }

    fn fire(&mut self) -> QueueResult<Option<IntegrationRequest>> {
        let now = self.clock.now();
        let next = self.next_build()?;
        if now > next && self.is_valid_week_day(now.weekday()) {
            self.triggered = true;
            return Ok(Some(IntegrationRequest::new(self.build_condition, self.name.clone(), None, now)));
        }
        Ok(None)
    }

    fn integration_completed(&mut self) -> QueueResult<()> {
        let result = if self.triggered {
            self.calculate_next_build().map(|next| {
                self.next_build = Some(next);
            })
        } else {
            Ok(())
        };
        self.triggered = false;
        result
    }

    fn validate(&self) -> Vec<QueueError> {
        self.check_offset().err().into_iter().collect()
    }
}
