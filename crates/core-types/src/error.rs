use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CoreError {
    #[error("Malformed formula template '{template}': {reason}")]
    InvalidTemplate { template: String, reason: String },

    #[error("Formula template '{template}' uses unknown placeholder '{{{placeholder}}}'")]
    UnknownPlaceholder { template: String, placeholder: String },
}

/// Errors raised while evaluating an `Expression` locally.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EvalError {
    #[error("Reference '{0}' is not bound in the evaluation environment")]
    Unbound(String),

    #[error("Expression '{0}' is only meaningful to the data service and cannot be evaluated locally")]
    Opaque(String),

    #[error("Operator '{op}' cannot be applied to {lhs} and {rhs}")]
    TypeMismatch {
        op: &'static str,
        lhs: &'static str,
        rhs: &'static str,
    },
}
