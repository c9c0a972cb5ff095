pub mod alloy;
pub mod binding;
pub mod contract;
pub mod error;
#[cfg(test)]
pub(crate) mod mock;

use ::alloy::primitives::{Address, Bytes, TxHash};
pub use alloy::AlloyChainRepository;
use async_trait::async_trait;
pub use binding::{ContractHandle, Interface};
pub use error::RepositoryError;

pub(crate) type RepoResult<T> = std::result::Result<T, RepositoryError>;

/// One read-only call: target contract plus ABI-encoded calldata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainCall {
    pub target: Address,
    pub data: Bytes,
}

/// Outcome of a single call inside an aggregated read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallReturn {
    pub success: bool,
    pub data: Bytes,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AggregateResult {
    /// Block the aggregated read executed at.
    pub block: u64,
    /// One entry per input call, in input order.
    pub returns: Vec<CallReturn>,
}

/// The parts of a mined transaction's receipt the client cares about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReceiptInfo {
    pub success: bool,
    pub block_number: u64,
}

/// A state-changing call to be signed by the configured wallet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteRequest {
    pub from: Address,
    pub to: Address,
    pub data: Bytes,
    pub gas_limit: Option<u64>,
    pub gas_price: Option<u128>,
}

/// Chain boundary of the client.
///
/// Everything the session needs from the network goes through this trait: the
/// block height stream that drives cache ticks, read calls (aggregated or
/// independent), receipts for submitted transactions, and signed writes.
/// Implementations handle RPC communication and error conversion.
#[async_trait]
pub trait ChainRepository: Send + Sync {
    /// Returns the chain identifier reported by the node.
    async fn chain_id(&self) -> RepoResult<u64>;

    /// Returns the latest block height.
    async fn block_number(&self) -> RepoResult<u64>;

    /// Whether `aggregate` can be used on this chain.
    fn supports_aggregation(&self) -> bool;

    /// Executes all `calls` in one aggregated read pinned to `block`.
    ///
    /// # Returns
    ///
    /// * `Ok(AggregateResult)` - The executed block and one `CallReturn` per call.
    ///   A reverted call is reported with `success = false` and does not fail the batch.
    /// * `Err(RepositoryError)` - The aggregated read itself failed (RPC error,
    ///   aggregator reverted) or aggregation is unavailable.
    async fn aggregate(&self, block: u64, calls: &[ChainCall]) -> RepoResult<AggregateResult>;

    /// Executes a single read-only call pinned to `block` and returns the raw return data.
    async fn call(&self, block: u64, call: &ChainCall) -> RepoResult<Bytes>;

    /// Looks up the receipt of a submitted transaction.
    ///
    /// # Returns
    ///
    /// * `Ok(Some(ReceiptInfo))` - The transaction is mined (successfully or reverted)
    /// * `Ok(None)` - The transaction is still pending
    /// * `Err(RepositoryError)` - If the RPC call fails
    async fn transaction_receipt(&self, hash: TxHash) -> RepoResult<Option<ReceiptInfo>>;

    /// Estimates gas for a write. A revert during estimation surfaces as `ContractError`.
    async fn estimate_gas(&self, request: &WriteRequest) -> RepoResult<u64>;

    /// Signs and broadcasts a write, returning its hash.
    ///
    /// Returns `RepositoryError::NoSigner` when no wallet is configured.
    async fn send_transaction(&self, request: WriteRequest) -> RepoResult<TxHash>;

    /// Address of the configured wallet, if any.
    fn signer_address(&self) -> Option<Address>;
}
