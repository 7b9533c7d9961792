use core_types::RequestDescriptor;
use serde::{Deserialize, Serialize};

/// The body of `POST {base_url}/query`.
#[derive(Debug, Clone, Serialize)]
pub struct QueryRequest {
    pub expression: String,
    pub universe: String,
}

impl From<&RequestDescriptor> for QueryRequest {
    fn from(descriptor: &RequestDescriptor) -> Self {
        Self {
            expression: descriptor.query(),
            universe: descriptor.universe().to_string(),
        }
    }
}

/// The error body returned alongside a non-success status.
#[derive(Debug, Clone, Deserialize)]
pub struct ErrorResponse {
    #[serde(default)]
    pub code: Option<String>,
    pub message: String,
}
