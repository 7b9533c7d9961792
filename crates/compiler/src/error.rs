use core_types::CoreError;
use rust_decimal::Decimal;
use thiserror::Error;

/// Configuration errors found while compiling. All are fatal and raised before any request
/// is built.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CompileError {
    #[error("Invalid classification rule '{label}': {reason}")]
    InvalidRule { label: String, reason: String },

    #[error("Classification '{0}' needs a non-empty fallback label")]
    EmptyFallback(String),

    #[error("Field '{field}' references score group '{group}', which is not declared")]
    UndeclaredGroup { field: String, group: String },

    #[error("Change field '{0}' does not belong to a score group")]
    MissingGroup(String),

    #[error("Score group '{0}' is declared more than once")]
    DuplicateScore(String),

    #[error("Score group '{0}' has a total weight of zero")]
    ZeroWeightGroup(String),

    #[error("Field '{field}' has a negative weight ({weight})")]
    NegativeWeight { field: String, weight: Decimal },

    #[error("Field '{0}' has no formula")]
    MissingFormula(String),

    #[error("Fragment '{0}' is defined twice with different formulas")]
    ConflictingFragment(String),

    #[error(transparent)]
    Template(#[from] CoreError),
}
