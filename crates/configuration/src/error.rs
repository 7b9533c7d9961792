use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to load configuration from file: {0}")]
    LoadError(#[from] config::ConfigError),

    #[error("Configuration validation error: {0}")]
    ValidationError(String),

    #[error("Failed to read table '{path}': {source}")]
    Table {
        path: String,
        #[source]
        source: csv::Error,
    },

    #[error("Table '{path}' is invalid: {reason}")]
    TableSchema { path: String, reason: String },

    #[error("Failed to initialise logging: {0}")]
    Logging(String),
}
