use std::sync::Arc;
use std::time::Duration;

use alloy::primitives::{Address, TxHash};
use alloy::sol_types::SolCall;
use tracing::instrument;

use super::utils::{calculate_gas_margin, gwei_to_wei};
use super::{ServiceError, ServiceResult};
use crate::config::{Config, parse_optional_address};
use crate::multicall::{CacheEntry, CallResult, CallSignature};
use crate::repository::{ChainRepository, ContractHandle, Interface, WriteRequest};
use crate::session::Session;
use crate::transactions::{NewTransaction, TransactionKind};

/// How long a tool waits for a value that is not cached yet.
const DEFAULT_READ_WAIT: Duration = Duration::from_secs(10);

/// DEX contract deployments on the configured chain.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DexContracts {
    pub multicall: Option<Address>,
    pub airdrop: Option<Address>,
    pub jacuzzi: Option<Address>,
    pub party: Option<Address>,
    pub yay: Option<Address>,
    pub wavax: Option<Address>,
    pub yay_pair: Option<Address>,
}

impl DexContracts {
    pub fn from_config(config: &Config) -> Self {
        let contracts = &config.contracts;
        Self {
            multicall: parse_optional_address("multicall.address", config.multicall.address.as_deref()),
            airdrop: parse_optional_address("contracts.airdrop", contracts.airdrop.as_deref()),
            jacuzzi: parse_optional_address("contracts.jacuzzi", contracts.jacuzzi.as_deref()),
            party: parse_optional_address("contracts.party", contracts.party.as_deref()),
            yay: parse_optional_address("contracts.yay", contracts.yay.as_deref()),
            wavax: parse_optional_address("contracts.wavax", contracts.wavax.as_deref()),
            yay_pair: parse_optional_address(
                "contracts.yay_avax_pair",
                contracts.yay_avax_pair.as_deref(),
            ),
        }
    }

    /// Token deposited into the Jacuzzi.
    pub fn staking_token(&self) -> Option<Address> {
        self.yay.or(self.party)
    }
}

/// Everything the DEX flows share: the session, the chain and the
/// write settings.
pub struct DexContext {
    session: Arc<Session>,
    repository: Arc<dyn ChainRepository>,
    contracts: DexContracts,
    gas_margin_bps: u64,
    gas_price: Option<u128>,
    read_wait: Duration,
}

impl DexContext {
    pub fn new(
        session: Arc<Session>,
        repository: Arc<dyn ChainRepository>,
        contracts: DexContracts,
        gas_margin_bps: u64,
        gas_price_gwei: Option<u64>,
    ) -> Self {
        Self {
            session,
            repository,
            contracts,
            gas_margin_bps,
            gas_price: gas_price_gwei.map(gwei_to_wei),
            read_wait: DEFAULT_READ_WAIT,
        }
    }

    pub fn from_config(
        config: &Config,
        session: Arc<Session>,
        repository: Arc<dyn ChainRepository>,
    ) -> Self {
        Self::new(
            session,
            repository,
            DexContracts::from_config(config),
            config.transactions.gas_margin_bps,
            config.transactions.gas_price_gwei,
        )
    }

    pub fn with_read_wait(mut self, read_wait: Duration) -> Self {
        self.read_wait = read_wait;
        self
    }

    pub fn session(&self) -> &Arc<Session> {
        &self.session
    }

    pub fn contracts(&self) -> &DexContracts {
        &self.contracts
    }

    /// Whether writes for `account` can be signed by the configured wallet.
    pub fn can_sign(&self, account: Option<Address>) -> bool {
        account.is_some() && self.repository.signer_address() == account
    }

    /// The connected account.
    pub async fn account(&self) -> ServiceResult<Address> {
        self.session
            .key()
            .await
            .account
            .ok_or_else(|| ServiceError::NoWallet("no account connected".to_string()))
    }

    /// `requested` when given, the connected account otherwise.
    pub async fn resolve_account(&self, requested: Option<Address>) -> ServiceResult<Address> {
        match requested {
            Some(account) => Ok(account),
            None => self.account().await,
        }
    }

    /// Binds a read-only handle, failing when the contract is not deployed.
    pub fn reader(
        &self,
        address: Option<Address>,
        interface: Interface,
        name: &str,
    ) -> ServiceResult<ContractHandle> {
        ContractHandle::bind(address, interface, None, false)
            .ok_or_else(|| ServiceError::ContractUnavailable(name.to_string()))
    }

    /// Binds a handle signing as the connected account.
    pub async fn writer(
        &self,
        address: Option<Address>,
        interface: Interface,
        name: &str,
    ) -> ServiceResult<ContractHandle> {
        let account = self.account().await?;
        ContractHandle::bind(address, interface, Some(account), true)
            .ok_or_else(|| ServiceError::ContractUnavailable(name.to_string()))
    }

    /// Cache entry of a read, waiting for a first value if needed.
    pub async fn read_entry<C: SolCall>(&self, handle: &ContractHandle, call: &C) -> CacheEntry {
        self.session.read(handle.read(call), self.read_wait).await
    }

    /// Decoded value of a successful read, `None` while loading or after an error.
    pub async fn read_if_loaded<C: SolCall>(
        &self,
        handle: &ContractHandle,
        call: &C,
    ) -> Option<C::Return> {
        self.read_entry(handle, call).await.decode::<C>()
    }

    /// Decoded value of a read. Loading and failed reads are errors.
    pub async fn read<C: SolCall>(&self, handle: &ContractHandle, call: &C) -> ServiceResult<C::Return> {
        self.read_at_block(handle, call).await.map(|(value, _)| value)
    }

    /// Like `read`, also returning the block the value was fetched at.
    pub async fn read_at_block<C: SolCall>(
        &self,
        handle: &ContractHandle,
        call: &C,
    ) -> ServiceResult<(C::Return, Option<u64>)> {
        let signature = handle.read(call);
        let entry = self.session.read(signature.clone(), self.read_wait).await;
        let value = Self::decode_entry::<C>(&signature, &entry)?;
        Ok((value, entry.fetched_block))
    }

    fn decode_entry<C: SolCall>(
        signature: &CallSignature,
        entry: &CacheEntry,
    ) -> ServiceResult<C::Return> {
        match &entry.result {
            CallResult::Success { .. } => entry.decode::<C>().ok_or_else(|| {
                ServiceError::InternalError(format!("Failed to decode result of {signature}"))
            }),
            CallResult::Error { reason, .. } => Err(ServiceError::BlockchainError(format!(
                "{signature} failed: {reason}"
            ))),
            CallResult::Unstarted | CallResult::Loading => {
                Err(ServiceError::DataUnavailable(signature.to_string()))
            }
        }
    }

    /// Estimates gas, adds the configured margin, sends the write and tracks
    /// the resulting transaction. Nothing is tracked when any step fails.
    #[instrument(skip(self, request, kind, targets), fields(to = %request.to), err)]
    pub async fn submit(
        &self,
        request: WriteRequest,
        summary: String,
        kind: TransactionKind,
        targets: Vec<Address>,
    ) -> ServiceResult<TxHash> {
        let key = self.session.key().await;

        let estimated = self.repository.estimate_gas(&request).await?;
        let gas_limit = calculate_gas_margin(estimated, self.gas_margin_bps);
        tracing::debug!("Estimated {estimated} gas, sending with limit {gas_limit}");

        let from = request.from;
        let request = WriteRequest {
            gas_limit: Some(gas_limit),
            gas_price: self.gas_price,
            ..request
        };
        let hash = self.repository.send_transaction(request).await?;
        tracing::info!("Submitted {hash}: {summary}");

        self.session
            .record_transaction(NewTransaction {
                hash,
                account: from,
                chain_id: key.chain_id,
                summary,
                kind,
                targets,
            })
            .await?;

        Ok(hash)
    }
}
