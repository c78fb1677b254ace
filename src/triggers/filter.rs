use chrono::{Datelike, Duration, NaiveDateTime, NaiveTime, Weekday};
use std::sync::Arc;

use super::{week_days_or_all, Trigger, ALL_WEEK_DAYS};
use crate::clock::Clock;
use crate::error::{QueueError, QueueResult};
use crate::queue::{BuildCondition, IntegrationRequest};

/// Wraps another trigger and keeps it quiet during a blackout window.
///
/// A window whose start is after its end wraps midnight, so 23:00-03:00
/// covers late evening and early morning. Equal start and end times make a
/// window one instant long.
#[derive(Debug)]
pub struct FilterTrigger {
    name: String,
    inner: Box<dyn Trigger>,
    start_time: NaiveTime,
    end_time: NaiveTime,
    week_days: Vec<Weekday>,
    build_condition: BuildCondition,
    clock: Arc<dyn Clock>,
}

impl FilterTrigger {
    pub fn new(inner: Box<dyn Trigger>, clock: Arc<dyn Clock>) -> Self {
        Self {
            name: inner.name().to_string(),
            inner,
            start_time: NaiveTime::MIN,
            end_time: NaiveTime::from_hms_opt(23, 59, 59).unwrap_or(NaiveTime::MIN),
            week_days: ALL_WEEK_DAYS.to_vec(),
            build_condition: BuildCondition::NoBuild,
            clock,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_window(mut self, start_time: NaiveTime, end_time: NaiveTime) -> Self {
        self.start_time = start_time;
        self.end_time = end_time;
        self
    }

    pub fn with_week_days(mut self, week_days: Vec<Weekday>) -> Self {
        self.week_days = week_days_or_all(week_days);
        self
    }

    /// Condition reported while filtered; `NoBuild` means no request at all.
    pub fn with_build_condition(mut self, build_condition: BuildCondition) -> Self {
        self.build_condition = build_condition;
        self
    }

    pub fn is_in_filter_range(&self, at: NaiveDateTime) -> bool {
        self.week_days.contains(&at.weekday()) && self.is_in_filter_time(at.time())
    }

    fn is_in_filter_time(&self, time: NaiveTime) -> bool {
        if self.start_time <= self.end_time {
            time >= self.start_time && time <= self.end_time
        } else {
            time >= self.start_time || time <= self.end_time
        }
    }

    /// First moment at or after `at` at which the window closes.
    ///
    /// Rolls over to the next day when `at` is already past today's end
    /// time, which is the evening half of a wrapping window.
    fn filter_end(&self, at: NaiveDateTime) -> NaiveDateTime {
        let end = at.date().and_time(self.end_time);
        if end < at {
            end + Duration::days(1)
        } else {
            end
        }
    }
}

impl Trigger for FilterTrigger {
    fn name(&self) -> &str {
        &self.name
    }

    fn next_build(&mut self) -> QueueResult<NaiveDateTime> {
        let next = self.inner.next_build()?;
        if self.is_in_filter_range(next) {
            return Ok(self.filter_end(next));
        }
        Ok(next)
    }

    fn fire(&mut self) -> QueueResult<Option<IntegrationRequest>> {
        let now = self.clock.now();
        if self.is_in_filter_range(now) {
            if self.build_condition == BuildCondition::NoBuild {
                return Ok(None);
            }
            return Ok(Some(IntegrationRequest::new(self.build_condition, self.name.clone(), None, now)));
        }
        self.inner.fire()
    }

    fn integration_completed(&mut self) -> QueueResult<()> {
        self.inner.integration_completed()
    }

    fn validate(&self) -> Vec<QueueError> {
        self.inner.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::triggers::IntervalTrigger;
    use chrono::NaiveDate;

    fn time(hour: u32, minute: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(hour, minute, 0).unwrap()
    }

    fn date_time(day: u32, hour: u32, minute: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 1, day)
            .unwrap()
            .and_hms_opt(hour, minute, 0)
            .unwrap()
    }

    /// Night-time blackout around an interval trigger that is always due.
    fn night_filter(clock: &Arc<ManualClock>) -> FilterTrigger {
        let inner = IntervalTrigger::new(clock.clone()).with_interval(0);
        FilterTrigger::new(Box::new(inner), clock.clone()).with_window(time(23, 0), time(3, 0))
    }

    #[test]
    fn test_wrapping_window_suppresses_after_midnight() {
        let clock = Arc::new(ManualClock::at(2024, 1, 3, 0, 30));
        let mut filter = night_filter(&clock);

        assert!(filter.fire().unwrap().is_none());

        clock.set(date_time(3, 23, 15));
        assert!(filter.fire().unwrap().is_none());
    }

    #[test]
    fn test_outside_window_delegates_to_inner() {
        let clock = Arc::new(ManualClock::at(2024, 1, 3, 12, 0));
        let mut filter = night_filter(&clock);

        let request = filter.fire().unwrap().unwrap();
        assert_eq!(request.source(), "IntervalTrigger");
        assert_eq!(request.build_condition(), BuildCondition::IfModificationExists);
    }

    #[test]
    fn test_equal_start_and_end_filters_one_instant() {
        let clock = Arc::new(ManualClock::at(2024, 1, 3, 12, 0));
        let inner = IntervalTrigger::new(clock.clone()).with_interval(0);
        let mut filter = FilterTrigger::new(Box::new(inner), clock.clone()).with_window(time(12, 0), time(12, 0));

        assert!(filter.is_in_filter_range(date_time(3, 12, 0)));
        assert!(!filter.is_in_filter_range(date_time(3, 11, 59)));
        assert!(!filter.is_in_filter_range(date_time(3, 12, 1)));
        assert!(filter.fire().unwrap().is_none());

        clock.set(date_time(3, 12, 1));
        assert!(filter.fire().unwrap().is_some());
    }

    #[test]
    fn test_daytime_window() {
        let clock = Arc::new(ManualClock::at(2024, 1, 3, 10, 0));
        let inner = IntervalTrigger::new(clock.clone()).with_interval(0);
        let mut filter = FilterTrigger::new(Box::new(inner), clock.clone()).with_window(time(9, 0), time(17, 0));

        assert!(filter.fire().unwrap().is_none());
        clock.set(date_time(3, 18, 0));
        assert!(filter.fire().unwrap().is_some());
    }

    #[test]
    fn test_window_only_applies_on_listed_days() {
        // 2024-01-06 is a Saturday
        let clock = Arc::new(ManualClock::at(2024, 1, 6, 0, 30));
        let mut filter = night_filter(&clock).with_week_days(vec![Weekday::Mon, Weekday::Tue]);

        assert!(filter.fire().unwrap().is_some());

        clock.set(date_time(8, 0, 30));
        assert!(filter.fire().unwrap().is_none());
    }

    #[test]
    fn test_next_build_inside_window_reports_window_end() {
        let clock = Arc::new(ManualClock::at(2024, 1, 3, 0, 0));
        let inner = IntervalTrigger::new(clock.clone()).with_interval(30 * 60);
        let mut filter = FilterTrigger::new(Box::new(inner), clock.clone()).with_window(time(23, 0), time(3, 0));

        assert_eq!(filter.next_build().unwrap(), date_time(3, 3, 0));
    }

    #[test]
    fn test_next_build_before_midnight_reports_next_morning() {
        let clock = Arc::new(ManualClock::at(2024, 1, 3, 23, 0));
        let inner = IntervalTrigger::new(clock.clone()).with_interval(30 * 60);
        let mut filter = FilterTrigger::new(Box::new(inner), clock.clone()).with_window(time(23, 0), time(3, 0));

        assert_eq!(filter.next_build().unwrap(), date_time(4, 3, 0));
    }

    #[test]
    fn test_next_build_outside_window_passes_through() {
        let clock = Arc::new(ManualClock::at(2024, 1, 3, 12, 0));
        let inner = IntervalTrigger::new(clock.clone()).with_interval(60);
        let mut filter = FilterTrigger::new(Box::new(inner), clock.clone()).with_window(time(23, 0), time(3, 0));

        assert_eq!(filter.next_build().unwrap(), date_time(3, 12, 1));
    }

    #[test]
    fn test_suppression_condition_is_reported() {
        let clock = Arc::new(ManualClock::at(2024, 1, 3, 1, 0));
        let mut filter = night_filter(&clock)
            .with_name("nightly-guard")
            .with_build_condition(BuildCondition::IfModificationExists);

        let request = filter.fire().unwrap().unwrap();
        assert_eq!(request.source(), "nightly-guard");
        assert_eq!(request.build_condition(), BuildCondition::IfModificationExists);
    }

    #[test]
    fn test_completion_always_reaches_inner() {
        let clock = Arc::new(ManualClock::at(2024, 1, 3, 1, 0));
        let inner = IntervalTrigger::new(clock.clone()).with_interval(600);
        let mut filter = FilterTrigger::new(Box::new(inner), clock.clone()).with_window(time(23, 0), time(3, 0));

        clock.advance(Duration::minutes(5));
        filter.integration_completed().unwrap();
        // inner rescheduled to 01:15, still inside the window
        assert_eq!(filter.next_build().unwrap(), date_time(3, 3, 0));

        clock.set(date_time(3, 12, 0));
        filter.integration_completed().unwrap();
        assert_eq!(filter.next_build().unwrap(), date_time(3, 12, 10));
    }
}
