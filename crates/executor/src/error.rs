use api_client::error::ApiError;
use std::time::Duration;
use thiserror::Error;

/// Why a single request of a batch produced no table.
///
/// Failures are data: they are recorded in the batch report and never abort the batch.
#[derive(Error, Debug)]
pub enum RequestFailure {
    #[error("Data service error: {0}")]
    Service(#[from] ApiError),

    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    #[error("Request task did not complete: {0}")]
    Aborted(String),
}
