use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum RepositoryError {
    #[error("RPC error: {0}")]
    RpcError(String),

    #[error("Contract call error: {0}")]
    ContractError(String),

    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("Parse error: {0}")]
    ParseError(String),

    /// A write was requested but no wallet is configured.
    #[error("No signer available for {0}")]
    NoSigner(String),

    /// Multicall aggregation was requested but no Multicall3 address is configured.
    #[error("Call aggregation is not available on this chain")]
    AggregationUnavailable,

    #[error("{0}")]
    Other(String),
}
