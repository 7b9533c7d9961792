//! # Peerscope Query Compiler
//!
//! Turns static configuration into query expressions for the data service.
//!
//! - **Classification:** an ordered rule table (maturity ranges, rating memberships)
//!   becomes one nested conditional whose first matching rule wins.
//! - **Scoring:** a `FieldTable` becomes current, change and normalized score fragments
//!   plus a filter that keeps entities scoring positively in every group.
//! - **Screening:** compiled fragments are assembled into a complete query over a
//!   screening universe.
//! - **Heatmap:** the average spread of the screening members grouped by rating and
//!   duration bucket.
//!
//! This is a pure logic crate. It performs no I/O and is handed its configuration.

pub mod classification;
pub mod error;
pub mod heatmap;
pub mod scoring;
pub mod screening;

pub use classification::{
    Classification, ClassificationExpressionBuilder, ClassificationRule, Predicate,
    membership_rules, range_rules,
};
pub use error::CompileError;
pub use heatmap::{heatmap_request, heatmap_universe};
pub use scoring::{
    CompiledScoring, Fragment, FragmentSet, ScoreDefinition, ScoringParams, ScoringQueryCompiler,
};
pub use screening::{ScreeningQuery, filter, members, screening_universe};
