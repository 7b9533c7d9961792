//! # Peerscope Request Planner
//!
//! Fans a peer comparison out into independent requests. Each `RequestDescriptor` covers
//! one classification selection, one comparison universe, one metric and one time offset,
//! and carries `Provenance` naming exactly that combination so results can be routed back.
//!
//! A drilldown lists the individual bonds behind one bucket and universe instead.

pub mod batch;
pub mod drilldown;
pub mod error;
pub mod universe;

pub use batch::{ComparisonUniverse, MetricDefinition, RequestBatchBuilder, TimeOffset};
pub use drilldown::DrilldownQuery;
pub use error::PlanError;
pub use universe::{base_universe, comparison_set, issuer_label, starting_universe};
