use rmcp::schemars::{self, JsonSchema};
use serde::{Deserialize, Serialize};

use crate::service::ServiceError;

// Response types that include error handling
#[derive(Debug, JsonSchema, Serialize)]
#[serde(untagged)]
pub enum GetCallStatusResult {
    Success(GetCallStatusResponse),
    Error { error: ServiceError },
}

#[derive(Debug, JsonSchema, Serialize)]
#[serde(untagged)]
pub enum TokenBalanceResult {
    Success(TokenBalanceResponse),
    Error { error: ServiceError },
}

#[derive(Debug, JsonSchema, Serialize)]
#[serde(untagged)]
pub enum AirdropStatusResult {
    Success(AirdropStatusResponse),
    Error { error: ServiceError },
}

#[derive(Debug, JsonSchema, Serialize)]
#[serde(untagged)]
pub enum JacuzziStatsResult {
    Success(JacuzziStatsResponse),
    Error { error: ServiceError },
}

#[derive(Debug, JsonSchema, Serialize)]
#[serde(untagged)]
pub enum YayOverviewResult {
    Success(YayOverviewResponse),
    Error { error: ServiceError },
}

#[derive(Debug, JsonSchema, Serialize)]
#[serde(untagged)]
pub enum TransactionResult {
    Success(SubmittedTransaction),
    Error { error: ServiceError },
}

#[derive(Debug, JsonSchema, Serialize)]
#[serde(untagged)]
pub enum RecentTransactionsResult {
    Success(RecentTransactionsResponse),
    Error { error: ServiceError },
}

#[derive(Debug, JsonSchema, Serialize)]
#[serde(untagged)]
pub enum SwitchAccountResult {
    Success(SwitchAccountResponse),
    Error { error: ServiceError },
}

#[derive(Debug, Default, JsonSchema, Serialize, Deserialize)]
pub struct GetCallStatusRequest {
    /// Optional contract address to filter cached calls by
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contract_address: Option<String>,
}

#[derive(Debug, JsonSchema, Serialize)]
pub struct CallStatus {
    /// interface@address.method(argument types)
    pub signature: String,
    pub contract_address: String,
    /// Method name without argument types
    pub method: String,
    /// unstarted, loading, success or error
    pub status: String,
    /// Block of the latest successful fetch
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fetched_block: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Within blocks-per-fetch of the latest block and not invalidated
    pub fresh: bool,
    /// A fetch is in flight
    pub fetching: bool,
    /// A confirmed transaction touched the contract since the last fetch
    pub invalidated: bool,
    pub subscribers: usize,
}

#[derive(Debug, JsonSchema, Serialize)]
pub struct GetCallStatusResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_block: Option<u64>,
    /// Session epoch, bumped on every account switch
    pub epoch: u64,
    pub calls: Vec<CallStatus>,
}

#[derive(Debug, JsonSchema, Serialize, Deserialize)]
pub struct TokenBalanceRequest {
    /// Token symbol (e.g., "AVAX", "PARTY") or ERC20 contract address
    pub token: String,
    /// Account to query. Defaults to the connected account
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub account: Option<String>,
}

#[derive(Debug, JsonSchema, Serialize)]
pub struct TokenBalanceResponse {
    pub symbol: String,
    pub name: String,
    pub decimals: u8,
    /// Contract address, absent for the native currency
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    /// Raw balance value
    pub balance: String,
    /// Balance formatted with proper decimals
    pub formatted_balance: String,
    /// Bundled logo asset for the native currency
    #[serde(skip_serializing_if = "Option::is_none")]
    pub logo_asset: Option<String>,
    /// Remote logo locations, first working one wins
    pub logo_urls: Vec<String>,
    /// Block the balance was read at
    #[serde(skip_serializing_if = "Option::is_none")]
    pub block: Option<u64>,
}

#[derive(Debug, Default, JsonSchema, Serialize, Deserialize)]
pub struct AccountRequest {
    /// Account to query. Defaults to the connected account
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub account: Option<String>,
}

#[derive(Debug, JsonSchema, Serialize)]
pub struct AirdropStatusResponse {
    pub account: String,
    pub claiming_allowed: bool,
    pub has_available_claim: bool,
    /// Unclaimed PARTY, absent when PARTY is not deployed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unclaimed_amount: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unclaimed_amount_raw: Option<String>,
}

#[derive(Debug, JsonSchema, Serialize)]
pub struct JacuzziUserPosition {
    pub account: String,
    /// xYAY shares held
    pub shares: String,
    /// Staking tokens the shares are worth
    pub staked: String,
    /// Staking tokens in the wallet
    pub token_balance: String,
    /// Approval state for staking the whole wallet balance
    pub approval: String,
}

#[derive(Debug, JsonSchema, Serialize)]
pub struct JacuzziStatsResponse {
    /// Staking tokens per xYAY share
    pub ratio: String,
    /// Percent charged for leaving now
    pub early_leave_penalty: String,
    /// Percent still charged once the unlock date passed
    pub penalty_after_unlock: String,
    /// RFC 3339 unlock date
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unlock_date: Option<String>,
    pub total_shares: String,
    pub total_staked: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<JacuzziUserPosition>,
}

#[derive(Debug, JsonSchema, Serialize)]
pub struct YayOverviewResponse {
    pub account: String,
    /// YAY in the wallet, four decimals
    pub yay_balance: String,
    pub yay_balance_raw: String,
    /// AVAX per YAY from the WAVAX/YAY pair reserves
    pub yay_price: String,
    /// Wallet YAY valued in AVAX, three decimals
    pub avax_in_wallet: String,
}

#[derive(Debug, JsonSchema, Serialize, Deserialize)]
pub struct AmountRequest {
    /// Amount in human-readable format (e.g., "1.5")
    pub amount: String,
}

#[derive(Debug, JsonSchema, Serialize)]
pub struct SubmittedTransaction {
    pub hash: String,
    pub summary: String,
}

#[derive(Debug, JsonSchema, Serialize)]
pub struct TransactionInfo {
    pub hash: String,
    pub summary: String,
    /// pending, confirmed or failed
    pub status: String,
    /// RFC 3339 submission time
    pub added_at: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confirmed_block: Option<u64>,
}

#[derive(Debug, JsonSchema, Serialize)]
pub struct RecentTransactionsResponse {
    /// Newest first
    pub transactions: Vec<TransactionInfo>,
    /// Hashes of recent transactions that already have a receipt
    pub confirmed: Vec<String>,
}

#[derive(Debug, Default, JsonSchema, Serialize, Deserialize)]
pub struct SwitchAccountRequest {
    /// Account to follow. Omit to disconnect
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub account: Option<String>,
}

#[derive(Debug, JsonSchema, Serialize)]
pub struct SwitchAccountResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub account: Option<String>,
    pub chain_id: u64,
    pub epoch: u64,
    /// Whether the session was reset
    pub reset: bool,
    /// Whether writes can be signed for this account
    pub can_sign: bool,
}
