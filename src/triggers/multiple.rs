use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use super::Trigger;
use crate::error::{QueueError, QueueResult};
use crate::queue::IntegrationRequest;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum MultipleOperator {
    #[default]
    Or,
    And,
}

/// Combines several triggers. `Or` fires when any of them fires, `And` only
/// when all of them do; the most insistent request wins either way.
#[derive(Debug)]
pub struct MultipleTrigger {
    name: String,
    operator: MultipleOperator,
    triggers: Vec<Box<dyn Trigger>>,
}

impl MultipleTrigger {
    pub fn new(operator: MultipleOperator, triggers: Vec<Box<dyn Trigger>>) -> Self {
        Self {
            name: "MultipleTrigger".to_string(),
            operator,
            triggers,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    fn no_triggers(&self) -> QueueError {
        QueueError::configuration(format!("trigger '{}' has no sub-triggers", self.name))
    }
}

impl Trigger for MultipleTrigger {
    fn name(&self) -> &str {
        &self.name
    }

    fn next_build(&mut self) -> QueueResult<NaiveDateTime> {
        let mut times = Vec::with_capacity(self.triggers.len());
        for trigger in &mut self.triggers {
            times.push(trigger.next_build()?);
        }
        let next = match self.operator {
            MultipleOperator::Or => times.into_iter().min(),
            MultipleOperator::And => times.into_iter().max(),
        };
        next.ok_or_else(|| self.no_triggers())
    }

    fn fire(&mut self) -> QueueResult<Option<IntegrationRequest>> {
        let mut fired = Vec::with_capacity(self.triggers.len());
        let mut all_fired = true;
        for trigger in &mut self.triggers {
            match trigger.fire()? {
                Some(request) => fired.push(request),
                None => all_fired = false,
            }
        }

        if self.operator == MultipleOperator::And && !all_fired {
            return Ok(None);
        }

        // first request with the highest condition
        let mut best: Option<IntegrationRequest> = None;
        for request in fired {
            let better = match &best {
                Some(current) => request.is_more_insistent_than(current),
                None => true,
            };
            if better {
                best = Some(request);
            }
        }
        Ok(best)
    }

    fn integration_completed(&mut self) -> QueueResult<()> {
        let mut first_error = None;
        for trigger in &mut self.triggers {
            if let Err(e) = trigger.integration_completed() {
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    fn validate(&self) -> Vec<QueueError> {
        if self.triggers.is_empty() {
            return vec![self.no_triggers()];
        }
        self.triggers.iter().flat_map(|trigger| trigger.validate()).collect()
    }
}
