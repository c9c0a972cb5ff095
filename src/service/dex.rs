use std::str::FromStr;
use std::sync::Arc;

use alloy::primitives::{Address, U256};
use rmcp::handler::server::tool::ToolRouter;
use rmcp::handler::server::wrapper::Parameters;
use rmcp::model::{ServerCapabilities, ServerInfo};
use rmcp::{Json, ServerHandler, tool, tool_handler, tool_router};
use tracing::instrument;

use crate::multicall::CallResult;
use crate::repository::Interface;
use crate::repository::contract::{IERC20, IMulticall3};
use crate::service::airdrop::AirdropService;
use crate::service::context::DexContext;
use crate::service::jacuzzi::{ApprovalState, JacuzziService};
use crate::service::tokens::{Currency, Logo, Token, TokenRegistry};
use crate::service::yay::YayService;
use crate::service::types::{
    AccountRequest, AirdropStatusResponse, AirdropStatusResult, AmountRequest, CallStatus,
    GetCallStatusRequest, GetCallStatusResponse, GetCallStatusResult, JacuzziStatsResponse,
    JacuzziStatsResult, JacuzziUserPosition, RecentTransactionsResponse,
    RecentTransactionsResult, SubmittedTransaction, SwitchAccountRequest, SwitchAccountResponse,
    SwitchAccountResult, TokenBalanceRequest, TokenBalanceResponse, TokenBalanceResult,
    TransactionInfo, TransactionResult, YayOverviewResponse, YayOverviewResult,
};
use crate::service::utils::{format_balance, parse_amount};
use crate::service::{ServiceError, ServiceResult};

const SHARE_DECIMALS: u8 = 18;

fn parse_address(value: &str) -> ServiceResult<Address> {
    Address::from_str(value.trim()).map_err(|e| ServiceError::InvalidWalletAddress(e.to_string()))
}

fn parse_optional(value: Option<&str>) -> ServiceResult<Option<Address>> {
    value.map(parse_address).transpose()
}

/// MCP surface of the DEX client.
///
/// One instance is created per connection; all instances share the same
/// session, so cached reads and tracked transactions are common to every
/// client.
pub struct DexService {
    tool_router: ToolRouter<Self>,
    context: Arc<DexContext>,
    token_registry: TokenRegistry,
    airdrop: AirdropService,
    jacuzzi: JacuzziService,
    yay: YayService,
}

// MCP Tool Layer
#[tool_router]
impl DexService {
    pub fn new(context: Arc<DexContext>, token_registry: TokenRegistry) -> Self {
        Self {
            tool_router: Self::tool_router(),
            airdrop: AirdropService::new(context.clone()),
            jacuzzi: JacuzziService::new(context.clone()),
            yay: YayService::new(context.clone()),
            context,
            token_registry,
        }
    }

    #[instrument(skip(self))]
    #[tool(description = "Inspect the block-driven read cache: status, freshness and subscribers of every cached contract call")]
    pub async fn get_call_status(
        &self,
        Parameters(req): Parameters<GetCallStatusRequest>,
    ) -> Json<GetCallStatusResult> {
        match self.get_call_status_impl(req).await {
            Ok(response) => Json(GetCallStatusResult::Success(response)),
            Err(e) => {
                tracing::error!("Failed to get call status: {e}");
                Json(GetCallStatusResult::Error { error: e })
            }
        }
    }

    #[instrument(skip(self))]
    #[tool(description = "Query AVAX and ERC20 token balances with token display metadata")]
    pub async fn token_balance(
        &self,
        Parameters(req): Parameters<TokenBalanceRequest>,
    ) -> Json<TokenBalanceResult> {
        match self.token_balance_impl(req).await {
            Ok(response) => Json(TokenBalanceResult::Success(response)),
            Err(e) => {
                tracing::error!("Failed to get token balance: {e}");
                Json(TokenBalanceResult::Error { error: e })
            }
        }
    }

    #[instrument(skip(self))]
    #[tool(description = "Check whether the PARTY airdrop is open and how much an account can claim")]
    pub async fn airdrop_status(
        &self,
        Parameters(req): Parameters<AccountRequest>,
    ) -> Json<AirdropStatusResult> {
        match self.airdrop_status_impl(req).await {
            Ok(response) => Json(AirdropStatusResult::Success(response)),
            Err(e) => {
                tracing::error!("Failed to get airdrop status: {e}");
                Json(AirdropStatusResult::Error { error: e })
            }
        }
    }

    #[instrument(skip(self))]
    #[tool(description = "Claim the connected account's PARTY airdrop")]
    pub async fn claim_airdrop(&self) -> Json<TransactionResult> {
        match self.claim_airdrop_impl().await {
            Ok(response) => Json(TransactionResult::Success(response)),
            Err(e) => {
                tracing::error!("Failed to claim airdrop: {e}");
                Json(TransactionResult::Error { error: e })
            }
        }
    }

    #[instrument(skip(self))]
    #[tool(description = "Jacuzzi staking pool statistics: share ratio, leave penalty, unlock date and the account's position")]
    pub async fn jacuzzi_stats(
        &self,
        Parameters(req): Parameters<AccountRequest>,
    ) -> Json<JacuzziStatsResult> {
        match self.jacuzzi_stats_impl(req).await {
            Ok(response) => Json(JacuzziStatsResult::Success(response)),
            Err(e) => {
                tracing::error!("Failed to get jacuzzi stats: {e}");
                Json(JacuzziStatsResult::Error { error: e })
            }
        }
    }

    #[instrument(skip(self))]
    #[tool(description = "YAY held by an account, the YAY price in AVAX from the WAVAX/YAY pair and the wallet's AVAX value")]
    pub async fn yay_overview(
        &self,
        Parameters(req): Parameters<AccountRequest>,
    ) -> Json<YayOverviewResult> {
        match self.yay_overview_impl(req).await {
            Ok(response) => Json(YayOverviewResult::Success(response)),
            Err(e) => {
                tracing::error!("Failed to get YAY overview: {e}");
                Json(YayOverviewResult::Error { error: e })
            }
        }
    }

    #[instrument(skip(self))]
    #[tool(description = "Stake PARTY into the Jacuzzi. Requires a prior approval")]
    pub async fn stake_jacuzzi(
        &self,
        Parameters(req): Parameters<AmountRequest>,
    ) -> Json<TransactionResult> {
        match self.stake_jacuzzi_impl(req).await {
            Ok(response) => Json(TransactionResult::Success(response)),
            Err(e) => {
                tracing::error!("Failed to stake: {e}");
                Json(TransactionResult::Error { error: e })
            }
        }
    }

    #[instrument(skip(self))]
    #[tool(description = "Leave the Jacuzzi by burning xYAY shares")]
    pub async fn leave_jacuzzi(
        &self,
        Parameters(req): Parameters<AmountRequest>,
    ) -> Json<TransactionResult> {
        match self.leave_jacuzzi_impl(req).await {
            Ok(response) => Json(TransactionResult::Success(response)),
            Err(e) => {
                tracing::error!("Failed to leave: {e}");
                Json(TransactionResult::Error { error: e })
            }
        }
    }

    #[instrument(skip(self))]
    #[tool(description = "Approve the Jacuzzi to spend the connected account's PARTY")]
    pub async fn approve_jacuzzi(&self) -> Json<TransactionResult> {
        match self.approve_jacuzzi_impl().await {
            Ok(response) => Json(TransactionResult::Success(response)),
            Err(e) => {
                tracing::error!("Failed to approve: {e}");
                Json(TransactionResult::Error { error: e })
            }
        }
    }

    #[instrument(skip(self))]
    #[tool(description = "Transactions submitted in the last 30 minutes, newest first")]
    pub async fn recent_transactions(&self) -> Json<RecentTransactionsResult> {
        match self.recent_transactions_impl().await {
            Ok(response) => Json(RecentTransactionsResult::Success(response)),
            Err(e) => {
                tracing::error!("Failed to list transactions: {e}");
                Json(RecentTransactionsResult::Error { error: e })
            }
        }
    }

    #[instrument(skip(self))]
    #[tool(description = "Switch the followed account. Cached reads and tracked transactions are reset")]
    pub async fn switch_account(
        &self,
        Parameters(req): Parameters<SwitchAccountRequest>,
    ) -> Json<SwitchAccountResult> {
        match self.switch_account_impl(req).await {
            Ok(response) => Json(SwitchAccountResult::Success(response)),
            Err(e) => {
                tracing::error!("Failed to switch account: {e}");
                Json(SwitchAccountResult::Error { error: e })
            }
        }
    }
}

// Business Logic - Core implementation
impl DexService {
    #[instrument(skip(self), err)]
    pub(crate) async fn get_call_status_impl(
        &self,
        req: GetCallStatusRequest,
    ) -> ServiceResult<GetCallStatusResponse> {
        let filter = parse_optional(req.contract_address.as_deref())?;
        let session = self.context.session();

        let calls = session
            .snapshot()
            .await
            .into_iter()
            .filter(|s| filter.is_none_or(|address| s.signature.address() == address))
            .map(|s| {
                let (status, error) = match &s.entry.result {
                    CallResult::Unstarted => ("unstarted", None),
                    CallResult::Loading => ("loading", None),
                    CallResult::Success { .. } => ("success", None),
                    CallResult::Error { reason, .. } => ("error", Some(reason.clone())),
                };
                CallStatus {
                    signature: s.signature.to_string(),
                    contract_address: s.signature.address().to_string(),
                    method: s.signature.method().to_string(),
                    status: status.to_string(),
                    fetched_block: s.entry.fetched_block,
                    error,
                    fresh: s.fresh,
                    fetching: s.entry.fetching,
                    invalidated: s.entry.invalidated,
                    subscribers: s.listeners,
                }
            })
            .collect();

        Ok(GetCallStatusResponse {
            current_block: session.current_block().await,
            epoch: session.epoch().await,
            calls,
        })
    }

    /// Resolves a symbol or contract address into a currency.
    async fn resolve_currency(&self, token: &str) -> ServiceResult<Currency> {
        if !token.trim().starts_with("0x") {
            return self
                .token_registry
                .lookup(token)
                .cloned()
                .ok_or_else(|| ServiceError::TokenNotFound(token.to_string()));
        }

        let address = parse_address(token)?;
        if let Some(currency) = self.token_registry.find_by_address(address) {
            return Ok(currency.clone());
        }

        let erc20 = self.context.reader(Some(address), Interface::Erc20, token)?;
        let (decimals, symbol, name) = tokio::try_join!(
            self.context.read(&erc20, &IERC20::decimalsCall {}),
            self.context.read(&erc20, &IERC20::symbolCall {}),
            self.context.read(&erc20, &IERC20::nameCall {}),
        )
        .map_err(|e| ServiceError::TokenNotFound(format!("{token}: {e}")))?;

        Ok(Currency::Contract(Token {
            address,
            decimals,
            symbol,
            name,
        }))
    }

    #[instrument(skip(self), err)]
    pub(crate) async fn token_balance_impl(
        &self,
        req: TokenBalanceRequest,
    ) -> ServiceResult<TokenBalanceResponse> {
        let account = self
            .context
            .resolve_account(parse_optional(req.account.as_deref())?)
            .await?;
        let currency = self.resolve_currency(&req.token).await?;

        tracing::info!("Querying {} balance for address: {}", currency.symbol(), account);

        let (balance, block) = match currency.address() {
            Some(token) => {
                let erc20 = self.context.reader(Some(token), Interface::Erc20, &req.token)?;
                self.context
                    .read_at_block(&erc20, &IERC20::balanceOfCall { account })
                    .await?
            }
            None => {
                let multicall = self.context.reader(
                    self.context.contracts().multicall,
                    Interface::Multicall,
                    "multicall",
                )?;
                self.context
                    .read_at_block(&multicall, &IMulticall3::getEthBalanceCall { addr: account })
                    .await?
            }
        };

        let info = currency.info();
        let (logo_asset, logo_urls) = match info.logo {
            Logo::Bundled(asset) => (Some(asset.to_string()), Vec::new()),
            Logo::Remote(urls) => (None, urls),
        };

        Ok(TokenBalanceResponse {
            formatted_balance: format_balance(balance, info.decimals),
            balance: balance.to_string(),
            symbol: info.symbol,
            name: info.name,
            decimals: info.decimals,
            address: info.address.map(|address| address.to_string()),
            logo_asset,
            logo_urls,
            block,
        })
    }

    #[instrument(skip(self), err)]
    pub(crate) async fn airdrop_status_impl(
        &self,
        req: AccountRequest,
    ) -> ServiceResult<AirdropStatusResponse> {
        if self.context.contracts().airdrop.is_none() {
            return Err(ServiceError::ContractUnavailable("airdrop".to_string()));
        }
        let account = self
            .context
            .resolve_account(parse_optional(req.account.as_deref())?)
            .await?;

        let (claiming_allowed, has_available_claim, unclaimed) = tokio::join!(
            self.airdrop.is_claiming_allowed(),
            self.airdrop.user_has_available_claim(account),
            self.airdrop.user_unclaimed_amount(account),
        );

        Ok(AirdropStatusResponse {
            account: account.to_string(),
            claiming_allowed,
            has_available_claim,
            unclaimed_amount: unclaimed.map(|amount| amount.to_exact()),
            unclaimed_amount_raw: unclaimed.map(|amount| amount.raw.to_string()),
        })
    }

    #[instrument(skip(self), err)]
    pub(crate) async fn claim_airdrop_impl(&self) -> ServiceResult<SubmittedTransaction> {
        let account = self.context.account().await?;
        if !self.airdrop.user_has_available_claim(account).await {
            return Err(ServiceError::NothingToClaim(account.to_string()));
        }

        let hash = self.airdrop.claim().await?;
        Ok(SubmittedTransaction {
            hash: hash.to_string(),
            summary: "Claimed PARTY".to_string(),
        })
    }

    #[instrument(skip(self), err)]
    pub(crate) async fn yay_overview_impl(
        &self,
        req: AccountRequest,
    ) -> ServiceResult<YayOverviewResponse> {
        let account = self
            .context
            .resolve_account(parse_optional(req.account.as_deref())?)
            .await?;

        let overview = self.yay.overview(account).await?;

        Ok(YayOverviewResponse {
            account: account.to_string(),
            yay_balance: overview.balance.to_fixed(4)?,
            yay_balance_raw: overview.balance.raw.to_string(),
            yay_price: overview.price.to_exact(),
            avax_in_wallet: format!("{:.3}", overview.avax_in_wallet),
        })
    }

    #[instrument(skip(self), err)]
    pub(crate) async fn jacuzzi_stats_impl(
        &self,
        req: AccountRequest,
    ) -> ServiceResult<JacuzziStatsResponse> {
        let account = match parse_optional(req.account.as_deref())? {
            Some(account) => Some(account),
            None => self.context.session().key().await.account,
        };

        let stats = self.jacuzzi.stats(account).await?;

        let user = match (
            account,
            stats.user_shares,
            stats.user_staked,
            stats.user_token_balance,
        ) {
            (Some(account), Some(shares), Some(staked), Some(balance)) => {
                let approval = if self.context.session().key().await.account == Some(account) {
                    self.jacuzzi.approval_state(balance.raw).await?
                } else {
                    ApprovalState::Unknown
                };
                Some(JacuzziUserPosition {
                    account: account.to_string(),
                    shares: shares.to_fixed(2)?,
                    staked: staked.to_fixed(2)?,
                    token_balance: balance.to_fixed(2)?,
                    approval: approval.as_str().to_string(),
                })
            }
            _ => None,
        };

        Ok(JacuzziStatsResponse {
            ratio: stats.ratio.to_string(),
            early_leave_penalty: stats.early_leave_penalty.to_string(),
            penalty_after_unlock: stats.penalty_after_unlock.to_string(),
            unlock_date: stats.unlock_date.map(|date| date.to_rfc3339()),
            total_shares: stats.pool_shares.to_fixed(2)?,
            total_staked: stats.pool_tokens.to_fixed(2)?,
            user,
        })
    }

    fn parse_token_amount(amount: &str) -> ServiceResult<U256> {
        parse_amount(amount, SHARE_DECIMALS)
    }

    #[instrument(skip(self), err)]
    pub(crate) async fn stake_jacuzzi_impl(
        &self,
        req: AmountRequest,
    ) -> ServiceResult<SubmittedTransaction> {
        let amount = Self::parse_token_amount(&req.amount)?;
        let hash = self.jacuzzi.stake(amount).await?;
        Ok(SubmittedTransaction {
            hash: hash.to_string(),
            summary: format!(
                "Stake {} PARTY to Jacuzzi",
                format_balance(amount, SHARE_DECIMALS)
            ),
        })
    }

    #[instrument(skip(self), err)]
    pub(crate) async fn leave_jacuzzi_impl(
        &self,
        req: AmountRequest,
    ) -> ServiceResult<SubmittedTransaction> {
        let share = Self::parse_token_amount(&req.amount)?;
        let hash = self.jacuzzi.leave(share).await?;
        Ok(SubmittedTransaction {
            hash: hash.to_string(),
            summary: format!(
                "Leave {} xYAY from Jacuzzi",
                format_balance(share, SHARE_DECIMALS)
            ),
        })
    }

    #[instrument(skip(self), err)]
    pub(crate) async fn approve_jacuzzi_impl(&self) -> ServiceResult<SubmittedTransaction> {
        let hash = self.jacuzzi.approve().await?;
        Ok(SubmittedTransaction {
            hash: hash.to_string(),
            summary: "Approve PARTY".to_string(),
        })
    }

    #[instrument(skip(self), err)]
    pub(crate) async fn recent_transactions_impl(
        &self,
    ) -> ServiceResult<RecentTransactionsResponse> {
        let session = self.context.session();
        let transactions = session
            .recent_transactions()
            .await
            .into_iter()
            .map(|record| TransactionInfo {
                hash: record.hash.to_string(),
                summary: record.summary.clone(),
                status: record.status().as_str().to_string(),
                added_at: record.added_at.to_rfc3339(),
                confirmed_block: record.receipt.as_ref().map(|receipt| receipt.block_number),
            })
            .collect();
        let confirmed = session
            .recent_confirmed_hashes()
            .await
            .into_iter()
            .map(|hash| hash.to_string())
            .collect();

        Ok(RecentTransactionsResponse {
            transactions,
            confirmed,
        })
    }

    #[instrument(skip(self), err)]
    pub(crate) async fn switch_account_impl(
        &self,
        req: SwitchAccountRequest,
    ) -> ServiceResult<SwitchAccountResponse> {
        let account = parse_optional(req.account.as_deref())?;
        let session = self.context.session();

        let reset = session.switch_account(account).await;
        let key = session.key().await;

        Ok(SwitchAccountResponse {
            account: key.account.map(|account| account.to_string()),
            chain_id: key.chain_id,
            epoch: session.epoch().await,
            reset,
            can_sign: self.context.can_sign(key.account),
        })
    }
}

#[tool_handler]
impl ServerHandler for DexService {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            instructions: Some(
                "PartySwap DEX client: token balances, YAY valued in AVAX, the PARTY airdrop and the Jacuzzi staking pool. \
                 Reads are served from a block-driven cache; writes are signed by the configured wallet \
                 and tracked until mined."
                    .into(),
            ),
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            ..Default::default()
        }
    }
}
