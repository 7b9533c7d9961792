//! # Peerscope Core Types
//!
//! Layer 0 of the workspace: the vocabulary every other crate speaks.
//!
//! - `Expression`: a typed, deterministic rendering of a data-service query expression,
//!   locally evaluable where it does not depend on the service.
//! - `FormulaTemplate`: service formula text with named placeholders.
//! - `FieldSpec` / `FieldTable`: the scoring configuration.
//! - `RequestDescriptor` / `Provenance`: one fanned-out sub-query and where it came from.
//! - `ResultTable`: what the service sends back.

pub mod enums;
pub mod error;
pub mod expression;
pub mod fields;
pub mod request;
pub mod table;
pub mod template;

// Re-export the core types to provide a clean public API.
pub use enums::{Aggregation, FieldKind, Periodicity, Side};
pub use error::{CoreError, EvalError};
pub use expression::{BinaryOp, Environment, Expression, Value};
pub use fields::{FieldSpec, FieldTable};
pub use request::{Provenance, RequestDescriptor, Selection, ALL_LABEL};
pub use table::{ResultRow, ResultTable};
pub use template::{FormulaTemplate, TemplateParams};
