use core_types::CoreError;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PlanError {
    #[error("At least one {0} is required to build a batch")]
    EmptyAxis(&'static str),

    #[error("Universe label '{0}' is used more than once")]
    DuplicateUniverse(String),

    #[error("Metric name '{0}' is used more than once")]
    DuplicateMetric(String),

    #[error("Time offset tag '{0}' is used more than once")]
    DuplicateOffset(String),

    #[error("'{label}' is not a bucket of classification '{classification}'")]
    UnknownBucket {
        classification: String,
        label: String,
    },

    #[error("A drilldown must return at least one bond")]
    ZeroLimit,

    #[error("Metric '{0}' does not use {{offset}} and cannot be requested at several offsets")]
    OffsetInsensitive(String),

    #[error("Invalid metric '{name}': {source}")]
    InvalidMetric {
        name: String,
        #[source]
        source: CoreError,
    },
}
