use std::sync::Arc;

use futures::future::join_all;
use tracing::instrument;

use super::cache::FetchOutcome;
use super::planner::{BatchMode, CallBatch};
use super::signature::CallSignature;
use crate::repository::{ChainCall, ChainRepository, RepositoryError};

/// Result of executing one batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchOutcome {
    /// Per-call outcomes, in batch order.
    Completed(Vec<(CallSignature, FetchOutcome)>),
    /// The aggregated read failed as a whole.
    Failed(String),
}

/// Executes planned batches against the chain.
#[derive(Clone)]
pub struct CallFetcher {
    repository: Arc<dyn ChainRepository>,
}

impl CallFetcher {
    pub fn new(repository: Arc<dyn ChainRepository>) -> Self {
        Self { repository }
    }

    #[instrument(skip(self, batch), fields(block = batch.block, calls = batch.calls.len(), mode = ?batch.mode))]
    pub async fn fetch(&self, batch: &CallBatch) -> BatchOutcome {
        match batch.mode {
            BatchMode::Aggregated => self.fetch_aggregated(batch).await,
            BatchMode::Independent => self.fetch_independent(batch).await,
        }
    }

    async fn fetch_aggregated(&self, batch: &CallBatch) -> BatchOutcome {
        let calls: Vec<ChainCall> = batch.calls.iter().map(|s| s.to_chain_call()).collect();

        match self.repository.aggregate(batch.block, &calls).await {
            Ok(result) => {
                let outcomes = batch
                    .calls
                    .iter()
                    .cloned()
                    .zip(result.returns)
                    .map(|(signature, ret)| {
                        let outcome = FetchOutcome {
                            block: result.block,
                            result: if ret.success {
                                Ok(ret.data)
                            } else {
                                Err(format!("{} reverted", signature.method()))
                            },
                        };
                        (signature, outcome)
                    })
                    .collect();
                BatchOutcome::Completed(outcomes)
            }
            Err(e) => {
                tracing::warn!(
                    "Aggregated read of {} calls at block {} failed: {}",
                    batch.calls.len(),
                    batch.block,
                    e
                );
                BatchOutcome::Failed(e.to_string())
            }
        }
    }

    async fn fetch_independent(&self, batch: &CallBatch) -> BatchOutcome {
        let reads = batch.calls.iter().map(|signature| async move {
            let result = self
                .repository
                .call(batch.block, &signature.to_chain_call())
                .await
                .map_err(|e: RepositoryError| e.to_string());
            (
                signature.clone(),
                FetchOutcome {
                    block: batch.block,
                    result,
                },
            )
        });

        BatchOutcome::Completed(join_all(reads).await)
    }
}
