use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Failed to send the HTTP request: {0}")]
    Request(#[from] reqwest::Error),

    #[error("The data service rejected the query ({status}): {message}")]
    Service { status: u16, message: String },

    #[error("The data service session is no longer valid: {0}")]
    SessionInvalidated(String),

    #[error("The request did not complete within {0:?}")]
    Timeout(Duration),

    #[error("Failed to deserialize the service response: {0}")]
    Deserialization(String),

    #[error("Invalid client configuration: {0}")]
    InvalidConfig(String),
}
