use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::QueueError;

/// Why a build is requested, ordered by increasing insistence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
pub enum BuildCondition {
    NoBuild,
    #[default]
    IfModificationExists,
    ForceBuild,
}

impl std::fmt::Display for BuildCondition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BuildCondition::NoBuild => write!(f, "NoBuild"),
            BuildCondition::IfModificationExists => write!(f, "IfModificationExists"),
            BuildCondition::ForceBuild => write!(f, "ForceBuild"),
        }
    }
}

impl std::str::FromStr for BuildCondition {
    type Err = QueueError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "nobuild" => Ok(BuildCondition::NoBuild),
            "ifmodificationexists" => Ok(BuildCondition::IfModificationExists),
            "forcebuild" => Ok(BuildCondition::ForceBuild),
            _ => Err(QueueError::configuration(format!("Invalid build condition: {}", s))),
        }
    }
}

/// Immutable description of why a build was requested and by whom.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IntegrationRequest {
    build_condition: BuildCondition,
    source: String,
    user_name: Option<String>,
    request_time: NaiveDateTime,
    parameters: BTreeMap<String, String>,
}

impl IntegrationRequest {
    pub fn new(
        build_condition: BuildCondition,
        source: impl Into<String>,
        user_name: Option<String>,
        request_time: NaiveDateTime,
    ) -> Self {
        Self {
            build_condition,
            source: source.into(),
            user_name,
            request_time,
            parameters: BTreeMap::new(),
        }
    }

    /// Attach build parameters. Only usable while the request is still owned
    /// by its creator, before it is handed to a queue.
    pub fn with_parameters(mut self, parameters: BTreeMap<String, String>) -> Self {
        self.parameters = parameters;
        self
    }

    pub fn build_condition(&self) -> BuildCondition {
        self.build_condition
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn user_name(&self) -> Option<&str> {
        self.user_name.as_deref()
    }

    pub fn request_time(&self) -> NaiveDateTime {
        self.request_time
    }

    pub fn parameters(&self) -> &BTreeMap<String, String> {
        &self.parameters
    }

    /// True when `self` should displace a pending `other` request.
    pub fn is_more_insistent_than(&self, other: &IntegrationRequest) -> bool {
        self.build_condition > other.build_condition
    }
}

impl std::fmt::Display for IntegrationRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.user_name {
            Some(user) => write!(f, "{} triggered a build ({}) from {}", user, self.build_condition, self.source),
            None => write!(f, "{} triggered a build ({})", self.source, self.build_condition),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn at_noon() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, 4).unwrap().and_hms_opt(12, 0, 0).unwrap()
    }

    #[test]
    fn test_conditions_ordered_by_insistence() {
        assert!(BuildCondition::NoBuild < BuildCondition::IfModificationExists);
        assert!(BuildCondition::IfModificationExists < BuildCondition::ForceBuild);
    }

    #[test]
    fn test_force_is_more_insistent_than_modification_check() {
        let force = IntegrationRequest::new(BuildCondition::ForceBuild, "alice", None, at_noon());
        let check = IntegrationRequest::new(BuildCondition::IfModificationExists, "IntervalTrigger", None, at_noon());

        assert!(force.is_more_insistent_than(&check));
        assert!(!check.is_more_insistent_than(&force));
        assert!(!force.is_more_insistent_than(&force.clone()));
    }

    #[test]
    fn test_parse_build_condition() {
        assert_eq!("ForceBuild".parse::<BuildCondition>().unwrap(), BuildCondition::ForceBuild);
        assert_eq!("nobuild".parse::<BuildCondition>().unwrap(), BuildCondition::NoBuild);
        assert!("sometimes".parse::<BuildCondition>().is_err());
    }

    #[test]
    fn test_display_mentions_user() {
        let request = IntegrationRequest::new(BuildCondition::ForceBuild, "api", Some("bob".to_string()), at_noon());
        assert_eq!(request.to_string(), "bob triggered a build (ForceBuild) from api");
    }
}
