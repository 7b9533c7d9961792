use crate::error::RequestFailure;
use api_client::QueryService;
use configuration::BatchConfig;
use core_types::{RequestDescriptor, ResultTable};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tracing::{info, warn};
use uuid::Uuid;

/// How many requests of a batch may be in flight at once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConcurrencyPolicy {
    #[default]
    Unbounded,
    /// At most this many requests in flight. Zero is treated as one.
    Bounded(usize),
}

impl ConcurrencyPolicy {
    pub fn from_config(config: &BatchConfig) -> Self {
        match config.max_concurrency {
            Some(limit) => ConcurrencyPolicy::Bounded(limit),
            None => ConcurrencyPolicy::Unbounded,
        }
    }

    fn semaphore(self) -> Option<Arc<Semaphore>> {
        match self {
            ConcurrencyPolicy::Unbounded => None,
            ConcurrencyPolicy::Bounded(limit) => Some(Arc::new(Semaphore::new(limit.max(1)))),
        }
    }
}

/// The result of one request, paired with the request itself.
#[derive(Debug)]
pub enum BatchOutcome {
    Success {
        descriptor: RequestDescriptor,
        table: ResultTable,
    },
    Failure {
        descriptor: RequestDescriptor,
        cause: RequestFailure,
    },
}

impl BatchOutcome {
    pub fn descriptor(&self) -> &RequestDescriptor {
        match self {
            BatchOutcome::Success { descriptor, .. } | BatchOutcome::Failure { descriptor, .. } => {
                descriptor
            }
        }
    }

    pub fn table(&self) -> Option<&ResultTable> {
        match self {
            BatchOutcome::Success { table, .. } => Some(table),
            BatchOutcome::Failure { .. } => None,
        }
    }

    pub fn cause(&self) -> Option<&RequestFailure> {
        match self {
            BatchOutcome::Success { .. } => None,
            BatchOutcome::Failure { cause, .. } => Some(cause),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, BatchOutcome::Success { .. })
    }
}

/// Every outcome of a batch, in submission order.
#[derive(Debug)]
pub struct BatchReport {
    pub batch_id: Uuid,
    outcomes: Vec<BatchOutcome>,
}

impl BatchReport {
    /// Wraps outcomes gathered elsewhere under a fresh batch id.
    pub fn from_outcomes(outcomes: Vec<BatchOutcome>) -> Self {
        Self {
            batch_id: Uuid::new_v4(),
            outcomes,
        }
    }

    pub fn outcomes(&self) -> &[BatchOutcome] {
        &self.outcomes
    }

    pub fn into_outcomes(self) -> Vec<BatchOutcome> {
        self.outcomes
    }

    pub fn submitted(&self) -> usize {
        self.outcomes.len()
    }

    pub fn succeeded(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_success()).count()
    }

    pub fn failed(&self) -> usize {
        self.submitted() - self.succeeded()
    }

    pub fn failures(&self) -> impl Iterator<Item = (&RequestDescriptor, &RequestFailure)> + '_ {
        self.outcomes.iter().filter_map(|o| match o {
            BatchOutcome::Failure { descriptor, cause } => Some((descriptor, cause)),
            BatchOutcome::Success { .. } => None,
        })
    }
}

/// Runs batches of independent requests against one shared `QueryService`.
///
/// All requests are started before any is awaited. Results are collected in submission
/// order regardless of completion order. A failing request becomes a `Failure` outcome;
/// nothing is retried and nothing else is cancelled.
#[derive(Clone)]
pub struct BatchExecutor {
    service: Arc<dyn QueryService>,
    timeout: Option<Duration>,
}

impl BatchExecutor {
    pub fn new(service: Arc<dyn QueryService>) -> Self {
        Self {
            service,
            timeout: None,
        }
    }

    /// Fails any single request that runs longer than `timeout`.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub async fn execute(
        &self,
        descriptors: Vec<RequestDescriptor>,
        policy: ConcurrencyPolicy,
    ) -> BatchReport {
        let batch_id = Uuid::new_v4();
        let semaphore = policy.semaphore();

        let handles: Vec<JoinHandle<Result<ResultTable, RequestFailure>>> = descriptors
            .iter()
            .map(|descriptor| {
                let service = Arc::clone(&self.service);
                let semaphore = semaphore.clone();
                let descriptor = descriptor.clone();
                let timeout = self.timeout;
                tokio::spawn(async move {
                    let _permit = match semaphore {
                        Some(semaphore) => Some(
                            semaphore
                                .acquire_owned()
                                .await
                                .map_err(|e| RequestFailure::Aborted(e.to_string()))?,
                        ),
                        None => None,
                    };
                    match timeout {
                        Some(limit) => tokio::time::timeout(limit, service.execute(&descriptor))
                            .await
                            .map_err(|_| RequestFailure::Timeout(limit))?
                            .map_err(RequestFailure::from),
                        None => service.execute(&descriptor).await.map_err(RequestFailure::from),
                    }
                })
            })
            .collect();

        let mut outcomes = Vec::with_capacity(descriptors.len());
        for (descriptor, handle) in descriptors.into_iter().zip(handles) {
            let outcome = match handle.await {
                Ok(Ok(table)) => BatchOutcome::Success { descriptor, table },
                Ok(Err(cause)) => BatchOutcome::Failure { descriptor, cause },
                Err(join_error) => BatchOutcome::Failure {
                    descriptor,
                    cause: RequestFailure::Aborted(join_error.to_string()),
                },
            };
            if let BatchOutcome::Failure { descriptor, cause } = &outcome {
                let provenance = descriptor.provenance();
                warn!(
                    %batch_id,
                    index = provenance.index,
                    classification = %provenance.classification,
                    bucket = %provenance.selection,
                    universe = %provenance.universe_label,
                    metrics = %provenance.metrics.join(","),
                    offset = %provenance.offset,
                    error = %cause,
                    "Request failed"
                );
            }
            outcomes.push(outcome);
        }

        let report = BatchReport { batch_id, outcomes };
        info!(
            %batch_id,
            "Batch complete: submitted {}, succeeded {}, failed {}",
            report.submitted(),
            report.succeeded(),
            report.failed()
        );
        report
    }
}
