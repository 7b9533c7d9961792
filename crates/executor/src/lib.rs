//! # Peerscope Executor Crate
//!
//! Runs a batch of independent `RequestDescriptor`s concurrently against a shared
//! `QueryService` and collects one `BatchOutcome` per request.
//!
//! ## Architectural Principles
//!
//! - **Failure Isolation:** A failed, timed-out or aborted request becomes a `Failure`
//!   outcome. The rest of the batch is unaffected; there are no retries.
//! - **Order Preservation:** Outcomes come back in submission order, whatever order the
//!   service answers in.
//! - **Service Abstraction:** The executor only knows the `QueryService` trait, so tests
//!   drive it with scripted in-memory services.
//!
//! ## Public API
//!
//! - `BatchExecutor`: Submits a batch and awaits every outcome.
//! - `ConcurrencyPolicy`: Bounded or unbounded in-flight requests.
//! - `BatchOutcome` / `BatchReport`: Per-request results and batch totals.
//! - `RequestFailure`: Why a request produced no table.

pub mod batch;
pub mod error;

pub use batch::{BatchExecutor, BatchOutcome, BatchReport, ConcurrencyPolicy};
pub use error::RequestFailure;
