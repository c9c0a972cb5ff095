//! Registry of transactions submitted during the current session.

use std::collections::HashMap;

use alloy::primitives::{Address, TxHash};
use chrono::{DateTime, Duration, Utc};
use thiserror::Error;

use crate::repository::ReceiptInfo;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("Transaction {hash} is already tracked for {account}")]
    DuplicateTransaction { hash: TxHash, account: Address },

    #[error("Transaction {hash} belongs to chain {actual}, session is on chain {expected}")]
    WrongChain {
        hash: TxHash,
        expected: u64,
        actual: u64,
    },

    #[error("Transaction {hash} was sent by {actual}, session follows {expected:?}")]
    WrongAccount {
        hash: TxHash,
        expected: Option<Address>,
        actual: Address,
    },
}

/// Extra metadata some flows attach to their transactions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransactionKind {
    Approval { token: Address, spender: Address },
    Claim { recipient: Address },
    Stake,
    Other,
}

/// A transaction that was accepted by the network and produced a hash.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewTransaction {
    pub hash: TxHash,
    pub account: Address,
    pub chain_id: u64,
    pub summary: String,
    pub kind: TransactionKind,
    /// Contracts whose cached reads may change once this is mined.
    pub targets: Vec<Address>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConfirmedReceipt {
    pub success: bool,
    pub block_number: u64,
    pub confirmed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionRecord {
    pub hash: TxHash,
    pub account: Address,
    pub chain_id: u64,
    pub summary: String,
    pub kind: TransactionKind,
    pub targets: Vec<Address>,
    pub added_at: DateTime<Utc>,
    pub last_checked_block: Option<u64>,
    pub checks: u32,
    pub receipt: Option<ConfirmedReceipt>,
}

impl TransactionRecord {
    pub fn is_pending(&self) -> bool {
        self.receipt.is_none()
    }

    pub fn status(&self) -> TransactionStatus {
        match self.receipt {
            None => TransactionStatus::Pending,
            Some(receipt) if receipt.success => TransactionStatus::Confirmed,
            Some(_) => TransactionStatus::Failed,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionStatus {
    Pending,
    Confirmed,
    Failed,
}

impl TransactionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionStatus::Pending => "pending",
            TransactionStatus::Confirmed => "confirmed",
            TransactionStatus::Failed => "failed",
        }
    }
}

/// A receipt lookup the poller should perform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PendingCheck {
    pub account: Address,
    pub hash: TxHash,
}

/// Emitted once per transaction when its receipt arrives.
///
/// Reverted transactions are reported too: gas was spent and state may have
/// moved, so dependent reads are invalidated either way.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Confirmation {
    pub hash: TxHash,
    pub success: bool,
    pub block: u64,
    pub targets: Vec<Address>,
}

pub struct TransactionRegistry {
    records: HashMap<PendingCheck, TransactionRecord>,
    recent_window: Duration,
}

impl TransactionRegistry {
    pub fn new(recent_window: Duration) -> Self {
        Self {
            records: HashMap::new(),
            recent_window,
        }
    }

    pub fn add(&mut self, tx: NewTransaction, now: DateTime<Utc>) -> Result<(), RegistryError> {
        let key = PendingCheck {
            account: tx.account,
            hash: tx.hash,
        };
        if self.records.contains_key(&key) {
            return Err(RegistryError::DuplicateTransaction {
                hash: tx.hash,
                account: tx.account,
            });
        }

        tracing::info!("Tracking transaction {} ({})", tx.hash, tx.summary);
        self.records.insert(
            key,
            TransactionRecord {
                hash: tx.hash,
                account: tx.account,
                chain_id: tx.chain_id,
                summary: tx.summary,
                kind: tx.kind,
                targets: tx.targets,
                added_at: now,
                last_checked_block: None,
                checks: 0,
                receipt: None,
            },
        );
        Ok(())
    }

    pub fn get(&self, account: Address, hash: TxHash) -> Option<&TransactionRecord> {
        self.records.get(&PendingCheck { account, hash })
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Pending transactions not yet checked at `block`.
    pub fn due_for_check(&self, block: u64) -> Vec<PendingCheck> {
        self.records
            .iter()
            .filter(|(_, record)| record.is_pending())
            .filter(|(_, record)| record.last_checked_block.is_none_or(|checked| checked < block))
            .map(|(key, _)| *key)
            .collect()
    }

    /// Records a lookup that found no receipt yet.
    pub fn mark_checked(&mut self, check: PendingCheck, block: u64) {
        if let Some(record) = self.records.get_mut(&check) {
            record.last_checked_block = Some(block);
            record.checks += 1;
        }
    }

    /// Attaches a receipt. Only the first receipt for a transaction counts.
    pub fn confirm(
        &mut self,
        check: PendingCheck,
        receipt: ReceiptInfo,
        now: DateTime<Utc>,
    ) -> Option<Confirmation> {
        let record = self.records.get_mut(&check)?;
        if record.receipt.is_some() {
            return None;
        }

        record.checks += 1;
        record.last_checked_block = Some(receipt.block_number);
        record.receipt = Some(ConfirmedReceipt {
            success: receipt.success,
            block_number: receipt.block_number,
            confirmed_at: now,
        });

        if receipt.success {
            tracing::info!(
                "Transaction {} confirmed in block {}: {}",
                record.hash,
                receipt.block_number,
                record.summary
            );
        } else {
            tracing::warn!(
                "Transaction {} reverted in block {}: {}",
                record.hash,
                receipt.block_number,
                record.summary
            );
        }

        Some(Confirmation {
            hash: record.hash,
            success: receipt.success,
            block: receipt.block_number,
            targets: record.targets.clone(),
        })
    }

    pub fn is_recent(&self, record: &TransactionRecord, now: DateTime<Utc>) -> bool {
        now - record.added_at < self.recent_window
    }

    /// Recent transactions, newest first.
    pub fn recent(&self, now: DateTime<Utc>) -> Vec<&TransactionRecord> {
        let mut recent: Vec<&TransactionRecord> = self
            .records
            .values()
            .filter(|record| self.is_recent(record, now))
            .collect();
        recent.sort_by(|a, b| b.added_at.cmp(&a.added_at));
        recent
    }

    /// Hashes of recent transactions that already have a receipt.
    pub fn recent_confirmed_hashes(&self, now: DateTime<Utc>) -> Vec<TxHash> {
        self.recent(now)
            .into_iter()
            .filter(|record| !record.is_pending())
            .map(|record| record.hash)
            .collect()
    }

    pub fn has_pending_approval(&self, token: Address, spender: Address, now: DateTime<Utc>) -> bool {
        self.records.values().any(|record| {
            record.is_pending()
                && self.is_recent(record, now)
                && record.kind
                    == TransactionKind::Approval {
                        token,
                        spender,
                    }
        })
    }

    pub fn reset(&mut self) {
        self.records.clear();
    }
}
