use rmcp::schemars::{self, JsonSchema};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::repository::RepositoryError;
use crate::transactions::RegistryError;

#[derive(Debug, Clone, Error, JsonSchema, Serialize, Deserialize)]
#[serde(tag = "type", content = "message")]
pub enum ServiceError {
    // Business validation errors
    /// The provided wallet address is invalid or malformed.
    #[error("Invalid wallet address: {0}")]
    InvalidWalletAddress(String),

    /// The token was not found or is not supported by the service.
    #[error("Token not found or not supported: {0}")]
    TokenNotFound(String),

    /// The requested amount is invalid (e.g., negative, zero, or malformed).
    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    /// The wallet has insufficient balance for the requested operation.
    #[error("Insufficient balance: required {required}, available {available}")]
    InsufficientBalance { required: String, available: String },

    /// The contract is not deployed on the configured chain.
    #[error("Contract not configured: {0}")]
    ContractUnavailable(String),

    /// No account is connected, or the operation needs a signing wallet.
    #[error("No wallet connected: {0}")]
    NoWallet(String),

    /// The airdrop is closed or the account has nothing to claim.
    #[error("Nothing to claim: {0}")]
    NothingToClaim(String),

    /// An approval for the same token and spender is still pending.
    #[error("Approval of {token} for {spender} is already pending")]
    ApprovalPending { token: String, spender: String },

    /// The spender is not allowed to move the token yet.
    #[error("Token {token} is not approved for {spender}")]
    NotApproved { token: String, spender: String },

    /// A required on-chain value has not been loaded yet.
    #[error("Data not available yet: {0}")]
    DataUnavailable(String),

    /// Gas estimation or submission failed; nothing was recorded.
    #[error("Transaction rejected: {0}")]
    TransactionRejected(String),

    /// The transaction could not be tracked.
    #[error("Transaction tracking error: {0}")]
    TrackingError(String),

    // Infrastructure errors (abstracted from repository layer)
    /// An error occurred while communicating with the blockchain.
    #[error("Blockchain connection error: {0}")]
    BlockchainError(String),

    /// An unexpected internal error occurred.
    #[error("Internal error: {0}")]
    InternalError(String),
}

impl From<RepositoryError> for ServiceError {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::RpcError(msg) | RepositoryError::NetworkError(msg) => {
                ServiceError::BlockchainError(format!("Failed to interact with blockchain: {msg}"))
            }
            RepositoryError::ContractError(msg) => ServiceError::TransactionRejected(msg),
            RepositoryError::ParseError(msg) => ServiceError::InvalidWalletAddress(msg),
            RepositoryError::NoSigner(msg) => ServiceError::NoWallet(msg),
            RepositoryError::AggregationUnavailable => {
                ServiceError::InternalError(RepositoryError::AggregationUnavailable.to_string())
            }
            RepositoryError::Other(msg) => ServiceError::InternalError(msg),
        }
    }
}

impl From<RegistryError> for ServiceError {
    fn from(err: RegistryError) -> Self {
        ServiceError::TrackingError(err.to_string())
    }
}
