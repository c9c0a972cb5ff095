pub mod driver;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use alloy::primitives::{Address, TxHash};
use chrono::Utc;
use futures::future::join_all;
use tokio::sync::Mutex;
use tracing::instrument;

pub use driver::SessionDriver;

use crate::multicall::{
    BatchOutcome, CacheEntry, CallBatch, CallCache, CallFetcher, CallResult, CallSignature,
    EntrySnapshot, Subscription, SubscriptionId,
};
use crate::repository::{ChainRepository, ReceiptInfo};
use crate::transactions::{
    Confirmation, NewTransaction, PendingCheck, RegistryError, TransactionRecord,
    TransactionRegistry,
};

/// Identity of the connected wallet. Cached reads and transactions are only
/// meaningful for one key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionKey {
    pub account: Option<Address>,
    pub chain_id: u64,
}

#[derive(Debug, Clone, Copy)]
pub struct SessionSettings {
    pub blocks_per_fetch: u64,
    pub max_calls_per_batch: usize,
    pub recent_window: chrono::Duration,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            blocks_per_fetch: 1,
            max_calls_per_batch: 500,
            recent_window: chrono::Duration::minutes(30),
        }
    }
}

struct SessionState {
    key: SessionKey,
    cache: CallCache,
    registry: TransactionRegistry,
    /// Interest kept alive on behalf of one-shot readers.
    watched: HashMap<CallSignature, Subscription>,
}

/// Process-wide state of the connected wallet: the call cache and the
/// transaction registry, reset together whenever the account or chain changes.
pub struct Session {
    repository: Arc<dyn ChainRepository>,
    fetcher: CallFetcher,
    settings: SessionSettings,
    state: Mutex<SessionState>,
}

fn is_settled(entry: &CacheEntry) -> bool {
    !entry.fetching
        && !entry.invalidated
        && matches!(
            entry.result,
            CallResult::Success { .. } | CallResult::Error { .. }
        )
}

impl Session {
    pub fn new(
        repository: Arc<dyn ChainRepository>,
        key: SessionKey,
        settings: SessionSettings,
    ) -> Self {
        let cache = CallCache::new(
            settings.max_calls_per_batch,
            repository.supports_aggregation(),
        );
        Self {
            fetcher: CallFetcher::new(repository.clone()),
            repository,
            settings,
            state: Mutex::new(SessionState {
                key,
                cache,
                registry: TransactionRegistry::new(settings.recent_window),
                watched: HashMap::new(),
            }),
        }
    }

    pub async fn key(&self) -> SessionKey {
        self.state.lock().await.key
    }

    pub async fn epoch(&self) -> u64 {
        self.state.lock().await.cache.epoch()
    }

    pub async fn current_block(&self) -> Option<u64> {
        self.state.lock().await.cache.latest_block()
    }

    /// Drops all cached reads and tracked transactions and starts a new epoch.
    /// Fetches and receipt checks still in flight for the old key are discarded
    /// when they complete.
    pub async fn reset(&self, key: SessionKey) -> u64 {
        let mut state = self.state.lock().await;
        state.watched.clear();
        state.registry.reset();
        let epoch = state.cache.reset();
        state.key = key;
        tracing::info!(
            "Session reset for account {:?} on chain {} (epoch {})",
            key.account,
            key.chain_id,
            epoch
        );
        epoch
    }

    /// Resets the session when `account` differs from the current one.
    pub async fn switch_account(&self, account: Option<Address>) -> bool {
        let key = self.key().await;
        if key.account == account {
            return false;
        }
        self.reset(SessionKey { account, ..key }).await;
        true
    }

    pub async fn subscribe(
        &self,
        signature: CallSignature,
        blocks_per_fetch: Option<u64>,
    ) -> Subscription {
        let blocks_per_fetch = blocks_per_fetch.unwrap_or(self.settings.blocks_per_fetch);
        self.state
            .lock()
            .await
            .cache
            .subscribe(signature, blocks_per_fetch)
    }

    pub async fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.state.lock().await.cache.unsubscribe(id)
    }

    pub async fn entry(&self, signature: &CallSignature) -> Option<CacheEntry> {
        self.state.lock().await.cache.entry(signature)
    }

    pub async fn is_fresh(&self, signature: &CallSignature) -> bool {
        self.state.lock().await.cache.is_fresh(signature)
    }

    pub async fn snapshot(&self) -> Vec<EntrySnapshot> {
        self.state.lock().await.cache.snapshot()
    }

    /// Returns the entry for `signature`, waiting up to `wait` for a settled
    /// value. Interest in the signature is kept, so later reads are served
    /// from the cache and stay refreshed every block.
    pub async fn read(&self, signature: CallSignature, wait: Duration) -> CacheEntry {
        let (mut subscription, epoch, mut must_change) = {
            let mut state = self.state.lock().await;
            let subscription = state
                .cache
                .subscribe(signature.clone(), self.settings.blocks_per_fetch);
            let stale = subscription.current().result.is_success()
                && !state.cache.is_fresh(&signature);
            (subscription, state.cache.epoch(), stale)
        };

        let wait_for_value = async {
            loop {
                if is_settled(&subscription.current()) && !must_change {
                    break;
                }
                if !subscription.changed().await {
                    break;
                }
                must_change = false;
            }
        };
        if tokio::time::timeout(wait, wait_for_value).await.is_err() {
            tracing::debug!("No settled value for {signature} within {wait:?}");
        }
        let entry = subscription.current();

        let mut state = self.state.lock().await;
        if state.cache.epoch() != epoch || state.watched.contains_key(&signature) {
            state.cache.unsubscribe(subscription.id());
        } else {
            state.watched.insert(signature, subscription);
        }
        entry
    }

    /// Advances the cache to `block` and returns the reads to perform.
    pub async fn on_block(&self, block: u64) -> Vec<CallBatch> {
        self.state.lock().await.cache.tick(block)
    }

    /// Merges the outcome of a batch. Returns the number of entries updated.
    pub async fn apply_fetch(&self, batch: &CallBatch, outcome: BatchOutcome) -> usize {
        let mut state = self.state.lock().await;
        match outcome {
            BatchOutcome::Completed(results) => {
                let mut applied = 0;
                for (signature, outcome) in results {
                    if state.cache.complete(batch.epoch, &signature, outcome) {
                        applied += 1;
                    }
                }
                applied
            }
            BatchOutcome::Failed(reason) => state.cache.fail_batch(batch, &reason),
        }
    }

    /// Executes one batch and merges its outcome.
    pub async fn fetch_batch(&self, batch: CallBatch) -> usize {
        let outcome = self.fetcher.fetch(&batch).await;
        self.apply_fetch(&batch, outcome).await
    }

    /// Ticks to `block` and performs every due read before returning.
    pub async fn refresh(&self, block: u64) -> usize {
        let batches = self.on_block(block).await;
        join_all(batches.into_iter().map(|batch| self.fetch_batch(batch)))
            .await
            .into_iter()
            .sum()
    }

    pub async fn record_transaction(&self, tx: NewTransaction) -> Result<(), RegistryError> {
        let mut state = self.state.lock().await;
        if tx.chain_id != state.key.chain_id {
            return Err(RegistryError::WrongChain {
                hash: tx.hash,
                expected: state.key.chain_id,
                actual: tx.chain_id,
            });
        }
        if state.key.account != Some(tx.account) {
            return Err(RegistryError::WrongAccount {
                hash: tx.hash,
                expected: state.key.account,
                actual: tx.account,
            });
        }
        state.registry.add(tx, Utc::now())
    }

    /// Applies a receipt lookup made during `epoch`. A confirmation
    /// invalidates every cached read against the transaction's targets.
    pub async fn apply_receipt(
        &self,
        epoch: u64,
        check: PendingCheck,
        block: u64,
        receipt: Option<ReceiptInfo>,
    ) -> Option<Confirmation> {
        let mut state = self.state.lock().await;
        if state.cache.epoch() != epoch {
            return None;
        }

        let Some(receipt) = receipt else {
            state.registry.mark_checked(check, block);
            return None;
        };
        let confirmation = state.registry.confirm(check, receipt, Utc::now())?;
        for target in &confirmation.targets {
            state.cache.invalidate_address(*target, confirmation.block);
        }
        Some(confirmation)
    }

    /// Looks up receipts of every pending transaction not yet checked at the
    /// latest block.
    #[instrument(skip(self))]
    pub async fn poll_receipts(&self) -> Vec<Confirmation> {
        let (checks, epoch, block) = {
            let state = self.state.lock().await;
            let Some(block) = state.cache.latest_block() else {
                return Vec::new();
            };
            (
                state.registry.due_for_check(block),
                state.cache.epoch(),
                block,
            )
        };

        let lookups = checks.into_iter().map(|check| async move {
            match self.repository.transaction_receipt(check.hash).await {
                Ok(receipt) => self.apply_receipt(epoch, check, block, receipt).await,
                Err(e) => {
                    tracing::warn!("Receipt lookup for {} failed: {}", check.hash, e);
                    None
                }
            }
        });
        join_all(lookups).await.into_iter().flatten().collect()
    }

    pub async fn transaction(&self, hash: TxHash) -> Option<TransactionRecord> {
        let state = self.state.lock().await;
        let account = state.key.account?;
        state.registry.get(account, hash).cloned()
    }

    /// Recent transactions, newest first.
    pub async fn recent_transactions(&self) -> Vec<TransactionRecord> {
        let state = self.state.lock().await;
        state
            .registry
            .recent(Utc::now())
            .into_iter()
            .cloned()
            .collect()
    }

    pub async fn recent_confirmed_hashes(&self) -> Vec<TxHash> {
        self.state
            .lock()
            .await
            .registry
            .recent_confirmed_hashes(Utc::now())
    }

    pub async fn has_pending_approval(&self, token: Address, spender: Address) -> bool {
        self.state
            .lock()
            .await
            .registry
            .has_pending_approval(token, spender, Utc::now())
    }
}
