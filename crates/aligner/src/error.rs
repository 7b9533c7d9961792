use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AlignError {
    #[error("Label '{0}' appears more than once in the canonical order")]
    DuplicateLabel(String),

    #[error("Grid row key and column key are both '{0}'")]
    SameKey(String),
}
