//! Pipeline errors and their handling class

use thiserror::Error;

use crate::condition::ConditionError;
use crate::forecast::ForecastError;
use crate::storage::StorageError;

/// How a failure is handled by the batch runner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorClass {
    /// Too few observations: the part or key is skipped this run
    DataInsufficiency,
    /// No model could be fitted: existing forecasts are left in place
    FitFailure,
    /// Missing profile or feature history: only this part's classification fails
    ClassificationPrecondition,
    /// Configuration refers to something that does not exist
    Configuration,
    /// Backend failure
    Storage,
}

impl std::fmt::Display for ErrorClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorClass::DataInsufficiency => write!(f, "data insufficiency"),
            ErrorClass::FitFailure => write!(f, "fit failure"),
            ErrorClass::ClassificationPrecondition => write!(f, "classification precondition"),
            ErrorClass::Configuration => write!(f, "configuration"),
            ErrorClass::Storage => write!(f, "storage"),
        }
    }
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("part {part_id}: signal has {got} readings after resampling, need at least {needed}")]
    InsufficientSignal {
        part_id: String,
        needed: usize,
        got: usize,
    },

    #[error("part {part_id}, feature {feature_kind}: {source}")]
    Forecast {
        part_id: String,
        feature_kind: String,
        #[source]
        source: ForecastError,
    },

    #[error("part {part_id}: {source}")]
    Condition {
        part_id: String,
        #[source]
        source: ConditionError,
    },

    #[error("feature kind {0} is not configured")]
    UnknownFeatureKind(String),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl PipelineError {
    pub fn class(&self) -> ErrorClass {
        match self {
            PipelineError::InsufficientSignal { .. } => ErrorClass::DataInsufficiency,
            PipelineError::Forecast { source, .. } => match source {
                ForecastError::InsufficientData { .. } => ErrorClass::DataInsufficiency,
                ForecastError::Search(_)
                | ForecastError::NoViableOrder { .. }
                | ForecastError::Fit(_) => ErrorClass::FitFailure,
                ForecastError::HorizonOutOfRange { .. } => ErrorClass::Configuration,
            },
            PipelineError::Condition { source, .. } => match source {
                ConditionError::Storage(_) => ErrorClass::Storage,
                ConditionError::MissingProfile(_)
                | ConditionError::MissingFeatureHistory { .. }
                | ConditionError::DegenerateProfile(_) => ErrorClass::ClassificationPrecondition,
            },
            PipelineError::UnknownFeatureKind(_) => ErrorClass::Configuration,
            PipelineError::Storage(_) => ErrorClass::Storage,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::forecast::{ArimaOrder, FitError};

    #[test]
    fn test_classes() {
        let fit = PipelineError::Forecast {
            part_id: "P".into(),
            feature_kind: "k".into(),
            source: ForecastError::Fit(FitError::NonFiniteScore(ArimaOrder::new(1, 0, 0))),
        };
        assert_eq!(fit.class(), ErrorClass::FitFailure);

        let short = PipelineError::Forecast {
            part_id: "P".into(),
            feature_kind: "k".into(),
            source: ForecastError::InsufficientData { needed: 10, got: 2 },
        };
        assert_eq!(short.class(), ErrorClass::DataInsufficiency);

        let missing = PipelineError::Condition {
            part_id: "P".into(),
            source: ConditionError::MissingProfile("P".into()),
        };
        assert_eq!(missing.class(), ErrorClass::ClassificationPrecondition);
        assert!(missing.to_string().contains("no threshold profile"));
    }
}
