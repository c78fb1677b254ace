pub mod filter;
pub mod interval;
pub mod multiple;
pub mod schedule;

pub use filter::FilterTrigger;
pub use interval::IntervalTrigger;
pub use multiple::{MultipleOperator, MultipleTrigger};
pub use schedule::ScheduleTrigger;

use chrono::{NaiveDateTime, NaiveTime, Weekday};

use crate::error::{QueueError, QueueResult};
use crate::queue::IntegrationRequest;

/// Decides, on each poll, whether a project should build.
///
/// Each instance belongs to one project integrator and is only mutated from
/// that integrator's worker.
pub trait Trigger: Send {
    fn name(&self) -> &str;

    /// When the trigger next expects to fire.
    fn next_build(&mut self) -> QueueResult<NaiveDateTime>;

    fn fire(&mut self) -> QueueResult<Option<IntegrationRequest>>;

    /// Advance internal state after an integration finished.
    fn integration_completed(&mut self) -> QueueResult<()>;

    /// Configuration problems, reported at load time instead of failing later.
    fn validate(&self) -> Vec<QueueError> {
        Vec::new()
    }
}

impl std::fmt::Debug for dyn Trigger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Trigger({})", self.name())
    }
}

pub const ALL_WEEK_DAYS: [Weekday; 7] = [
    Weekday::Mon,
    Weekday::Tue,
    Weekday::Wed,
    Weekday::Thu,
    Weekday::Fri,
    Weekday::Sat,
    Weekday::Sun,
];

/// Empty lists mean "every day".
pub(crate) fn week_days_or_all(days: Vec<Weekday>) -> Vec<Weekday> {
    if days.is_empty() {
        ALL_WEEK_DAYS.to_vec()
    } else {
        days
    }
}

/// Parse `HH:MM` or `HH:MM:SS`.
pub fn parse_time_of_day(value: &str) -> QueueResult<NaiveTime> {
    let value = value.trim();
    NaiveTime::parse_from_str(value, "%H:%M:%S")
        .or_else(|_| NaiveTime::parse_from_str(value, "%H:%M"))
        .map_err(|_| QueueError::InvalidTime(value.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_time_of_day_formats() {
        assert_eq!(parse_time_of_day("09:30").unwrap(), NaiveTime::from_hms_opt(9, 30, 0).unwrap());
        assert_eq!(parse_time_of_day("23:59:59").unwrap(), NaiveTime::from_hms_opt(23, 59, 59).unwrap());
        assert!(matches!(parse_time_of_day("25:00"), Err(QueueError::InvalidTime(_))));
        assert!(parse_time_of_day("noon").is_err());
    }

    #[test]
    fn test_empty_week_days_mean_all() {
        assert_eq!(week_days_or_all(Vec::new()).len(), 7);
        assert_eq!(week_days_or_all(vec![Weekday::Mon]), vec![Weekday::Mon]);
    }
}
