use std::str::FromStr;
use std::sync::Arc;

use alloy::network::{EthereumWallet, ReceiptResponse, TransactionBuilder};
use alloy::primitives::{Address, Bytes, TxHash};
use alloy::providers::Provider;
use alloy::rpc::types::{BlockId, TransactionRequest};
use alloy::signers::local::PrivateKeySigner;
use async_trait::async_trait;
use tracing::instrument;

use super::error::RepositoryError;
use crate::repository::contract::IMulticall3;
use crate::repository::{
    AggregateResult, CallReturn, ChainCall, ChainRepository, ReceiptInfo, RepoResult,
    WriteRequest,
};

pub struct AlloyChainRepository<P> {
    provider: Arc<P>,
    wallet: Option<EthereumWallet>,
    multicall: Option<Address>,
}

impl<P: Provider + Clone + 'static> AlloyChainRepository<P> {
    pub fn new(provider: Arc<P>, multicall: Option<Address>) -> Self {
        Self {
            provider,
            wallet: None,
            multicall,
        }
    }

    pub fn new_with_wallet(
        provider: Arc<P>,
        multicall: Option<Address>,
        private_key: &str,
    ) -> Result<Self, RepositoryError> {
        let signer = PrivateKeySigner::from_str(private_key)
            .map_err(|e| RepositoryError::ParseError(format!("Invalid private key: {e}")))?;

        let wallet = EthereumWallet::from(signer);

        Ok(Self {
            provider,
            wallet: Some(wallet),
            multicall,
        })
    }

    pub fn wallet_address(&self) -> Option<Address> {
        self.wallet.as_ref().map(|w| w.default_signer().address())
    }
}

fn rpc_error(context: &str, e: impl std::fmt::Display) -> RepositoryError {
    let message = e.to_string();
    if message.contains("429") {
        tracing::warn!("Rate limited while trying to {context}");
    }
    RepositoryError::RpcError(format!("Failed to {context}: {message}"))
}

#[async_trait]
impl<P: Provider + Clone + Send + Sync + 'static> ChainRepository for AlloyChainRepository<P> {
    #[instrument(skip(self), err)]
    async fn chain_id(&self) -> RepoResult<u64> {
        self.provider
            .get_chain_id()
            .await
            .map_err(|e| rpc_error("get chain id", e))
    }

    #[instrument(skip(self), err)]
    async fn block_number(&self) -> RepoResult<u64> {
        self.provider
            .get_block_number()
            .await
            .map_err(|e| rpc_error("get block number", e))
    }

    fn supports_aggregation(&self) -> bool {
        self.multicall.is_some()
    }

    #[instrument(skip(self, calls), fields(calls = calls.len()), err)]
    async fn aggregate(&self, block: u64, calls: &[ChainCall]) -> RepoResult<AggregateResult> {
        let multicall_address = self
            .multicall
            .ok_or(RepositoryError::AggregationUnavailable)?;
        let multicall = IMulticall3::new(multicall_address, self.provider.clone());

        let encoded: Vec<IMulticall3::Call> = calls
            .iter()
            .map(|call| IMulticall3::Call {
                target: call.target,
                callData: call.data.clone(),
            })
            .collect();

        let result = multicall
            .tryBlockAndAggregate(false, encoded)
            .block(BlockId::number(block))
            .call()
            .await
            .map_err(|e| {
                tracing::error!("Aggregated read of {} calls failed: {}", calls.len(), e);
                RepositoryError::ContractError(format!("Multicall failed: {e}"))
            })?;

        if result.returnData.len() != calls.len() {
            return Err(RepositoryError::ContractError(format!(
                "Multicall returned {} results for {} calls",
                result.returnData.len(),
                calls.len()
            )));
        }

        let returns = result
            .returnData
            .into_iter()
            .map(|r| CallReturn {
                success: r.success,
                data: r.returnData,
            })
            .collect();

        Ok(AggregateResult {
            block: result.blockNumber.to::<u64>(),
            returns,
        })
    }

    #[instrument(skip(self, call), fields(target = %call.target), err)]
    async fn call(&self, block: u64, call: &ChainCall) -> RepoResult<Bytes> {
        let tx = TransactionRequest::default()
            .with_to(call.target)
            .with_input(call.data.clone());

        self.provider
            .call(tx)
            .block(BlockId::number(block))
            .await
            .map_err(|e| RepositoryError::ContractError(e.to_string()))
    }

    #[instrument(skip(self), err)]
    async fn transaction_receipt(&self, hash: TxHash) -> RepoResult<Option<ReceiptInfo>> {
        let receipt = self
            .provider
            .get_transaction_receipt(hash)
            .await
            .map_err(|e| rpc_error("get transaction receipt", e))?;

        Ok(receipt.and_then(|receipt| {
            // A receipt without a block number belongs to a pending block.
            receipt.block_number().map(|block_number| ReceiptInfo {
                success: receipt.status(),
                block_number,
            })
        }))
    }

    #[instrument(skip(self), err)]
    async fn estimate_gas(&self, request: &WriteRequest) -> RepoResult<u64> {
        let tx = TransactionRequest::default()
            .with_from(request.from)
            .with_to(request.to)
            .with_input(request.data.clone());

        self.provider.estimate_gas(tx).await.map_err(|e| {
            RepositoryError::ContractError(format!("Failed to estimate gas: {e}"))
        })
    }

    #[instrument(skip(self), err)]
    async fn send_transaction(&self, request: WriteRequest) -> RepoResult<TxHash> {
        let wallet = self
            .wallet
            .as_ref()
            .ok_or_else(|| RepositoryError::NoSigner(request.to.to_string()))?;

        let signer = wallet.default_signer().address();
        if signer != request.from {
            return Err(RepositoryError::NoSigner(format!(
                "{} (wallet signs as {signer})",
                request.from
            )));
        }

        let chain_id = self.chain_id().await?;
        let nonce = self
            .provider
            .get_transaction_count(request.from)
            .pending()
            .await
            .map_err(|e| rpc_error("get nonce", e))?;

        let gas_limit = match request.gas_limit {
            Some(limit) => limit,
            None => self.estimate_gas(&request).await?,
        };
        let gas_price = match request.gas_price {
            Some(price) => price,
            None => self
                .provider
                .get_gas_price()
                .await
                .map_err(|e| rpc_error("get gas price", e))?,
        };

        let tx = TransactionRequest::default()
            .with_from(request.from)
            .with_to(request.to)
            .with_input(request.data)
            .with_chain_id(chain_id)
            .with_nonce(nonce)
            .with_gas_limit(gas_limit)
            .with_gas_price(gas_price);

        let envelope = tx
            .build(wallet)
            .await
            .map_err(|e| RepositoryError::Other(format!("Failed to sign transaction: {e}")))?;

        let pending = self
            .provider
            .send_tx_envelope(envelope)
            .await
            .map_err(|e| rpc_error("broadcast transaction", e))?;

        let hash = *pending.tx_hash();
        tracing::info!("Submitted transaction {hash} to {}", request.to);
        Ok(hash)
    }

    fn signer_address(&self) -> Option<Address> {
        self.wallet_address()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::providers::ProviderBuilder;

    const RPC_URL: &str = "http://127.0.0.1:8545";

    // Well-known development key; never holds funds.
    const TEST_PRIVATE_KEY: &str =
        "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";

    fn provider() -> Arc<impl Provider + Clone> {
        Arc::new(ProviderBuilder::new().connect_http(RPC_URL.parse().expect("Invalid RPC URL")))
    }

    #[test]
    fn test_wallet_initialization_with_valid_key() {
        let repo = AlloyChainRepository::new_with_wallet(provider(), None, TEST_PRIVATE_KEY)
            .expect("Failed to create repository with wallet");

        let expected = Address::from_str("0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266").unwrap();
        assert_eq!(repo.signer_address(), Some(expected));
    }

    #[test]
    fn test_wallet_initialization_with_invalid_key() {
        let result =
            AlloyChainRepository::new_with_wallet(provider(), None, "not_a_valid_private_key");

        match result {
            Err(RepositoryError::ParseError(msg)) => {
                assert!(msg.contains("Invalid private key"));
            }
            Err(e) => panic!("Expected ParseError, got: {e:?}"),
            Ok(_) => panic!("Should fail with invalid private key"),
        }
    }

    #[test]
    fn test_repository_without_wallet_is_read_only() {
        let repo = AlloyChainRepository::new(provider(), None);
        assert!(repo.signer_address().is_none());
        assert!(!repo.supports_aggregation());
    }

    #[test]
    fn test_repository_with_multicall_supports_aggregation() {
        let multicall = Address::from_str("0xcA11bde05977b3631167028862bE2a173976CA11").unwrap();
        let repo = AlloyChainRepository::new(provider(), Some(multicall));
        assert!(repo.supports_aggregation());
    }

    #[tokio::test]
    async fn test_aggregate_without_multicall_is_unavailable() {
        let repo = AlloyChainRepository::new(provider(), None);
        let result = repo.aggregate(1, &[]).await;
        assert!(matches!(result, Err(RepositoryError::AggregationUnavailable)));
    }

    #[tokio::test]
    async fn test_send_without_wallet_returns_no_signer() {
        let repo = AlloyChainRepository::new(provider(), None);
        let request = WriteRequest {
            from: Address::ZERO,
            to: Address::ZERO,
            data: Bytes::new(),
            gas_limit: Some(21_000),
            gas_price: Some(1),
        };

        let result = repo.send_transaction(request).await;
        assert!(matches!(result, Err(RepositoryError::NoSigner(_))));
    }
}
