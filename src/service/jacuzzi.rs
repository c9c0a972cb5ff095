use std::sync::Arc;

use alloy::primitives::{Address, TxHash, U256};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use tracing::instrument;

use super::context::DexContext;
use super::tokens::TokenAmount;
use super::utils::{format_balance, u256_to_decimal};
use super::{ServiceError, ServiceResult};
use crate::repository::contract::{IERC20, IJacuzzi};
use crate::repository::{ContractHandle, Interface};
use crate::transactions::TransactionKind;

const TOKEN_DECIMALS: u8 = 18;

/// Whether the Jacuzzi may move the staking token on the account's behalf.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApprovalState {
    Unknown,
    NotApproved,
    Pending,
    Approved,
}

impl ApprovalState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ApprovalState::Unknown => "unknown",
            ApprovalState::NotApproved => "not_approved",
            ApprovalState::Pending => "pending",
            ApprovalState::Approved => "approved",
        }
    }
}

/// Approval state for spending `amount`, given the loaded allowance.
pub fn approval_state(allowance: Option<U256>, amount: U256, pending: bool) -> ApprovalState {
    match allowance {
        None => ApprovalState::Unknown,
        Some(allowance) if allowance < amount => {
            if pending {
                ApprovalState::Pending
            } else {
                ApprovalState::NotApproved
            }
        }
        Some(_) => ApprovalState::Approved,
    }
}

/// Raw on-chain values behind the Jacuzzi page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JacuzziSnapshot {
    /// Staking token held by the Jacuzzi.
    pub pool_balance: U256,
    /// Outstanding xYAY shares.
    pub total_supply: U256,
    /// Unix seconds.
    pub unlock_date: U256,
    pub early_withdrawal_fee: U256,
    pub max_early_withdraw_fee: U256,
    pub user: Option<UserPosition>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UserPosition {
    pub token_balance: U256,
    pub share_balance: U256,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JacuzziStats {
    /// Staking tokens per share, three decimals.
    pub ratio: Decimal,
    /// Penalty percent for leaving now.
    pub early_leave_penalty: Decimal,
    /// Penalty percent still charged after the unlock date.
    pub penalty_after_unlock: Decimal,
    pub unlock_date: Option<DateTime<Utc>>,
    pub pool_shares: TokenAmount,
    pub pool_tokens: TokenAmount,
    pub user_shares: Option<TokenAmount>,
    pub user_staked: Option<TokenAmount>,
    pub user_token_balance: Option<TokenAmount>,
}

fn to_decimal(value: U256) -> ServiceResult<Decimal> {
    u256_to_decimal(value, 0)
}

/// Tokens per share rounded half up to three places, computed in integer
/// space so pool sizes beyond the decimal range still work.
fn share_ratio(pool: U256, supply: U256) -> ServiceResult<Decimal> {
    let overflow = || ServiceError::InternalError("Share ratio overflows 256 bits".to_string());
    let numerator = pool
        .checked_mul(U256::from(2_000))
        .and_then(|n| n.checked_add(supply))
        .ok_or_else(overflow)?;
    let denominator = supply.checked_mul(U256::from(2)).ok_or_else(overflow)?;
    u256_to_decimal(numerator / denominator, 3)
}

/// Derives the page statistics from a snapshot taken at `now`.
pub fn compute_stats(snapshot: &JacuzziSnapshot, now: DateTime<Utc>) -> ServiceResult<JacuzziStats> {
    let ratio = if snapshot.total_supply.is_zero() {
        Decimal::ZERO
    } else {
        share_ratio(snapshot.pool_balance, snapshot.total_supply)?
    };

    let fee_percent = if snapshot.max_early_withdraw_fee.is_zero() {
        Decimal::ZERO
    } else {
        Decimal::ONE_HUNDRED * to_decimal(snapshot.early_withdrawal_fee)?
            / to_decimal(snapshot.max_early_withdraw_fee)?
    };

    let unlock_secs = i64::try_from(snapshot.unlock_date).unwrap_or(i64::MAX);
    let (early_leave_penalty, penalty_after_unlock) = if unlock_secs < now.timestamp() {
        (Decimal::ZERO, fee_percent)
    } else {
        (fee_percent, Decimal::ZERO)
    };

    let user_staked = snapshot
        .user
        .map(|user| {
            let staked = if snapshot.pool_balance.is_zero() || snapshot.total_supply.is_zero() {
                U256::ZERO
            } else {
                user.share_balance
                    .checked_mul(snapshot.pool_balance)
                    .ok_or_else(|| {
                        ServiceError::InternalError(
                            "Staked amount overflows 256 bits".to_string(),
                        )
                    })?
                    / snapshot.total_supply
            };
            Ok::<_, ServiceError>(TokenAmount::new(staked, TOKEN_DECIMALS))
        })
        .transpose()?;

    Ok(JacuzziStats {
        ratio,
        early_leave_penalty: early_leave_penalty.normalize(),
        penalty_after_unlock: penalty_after_unlock.normalize(),
        unlock_date: DateTime::from_timestamp(unlock_secs, 0),
        pool_shares: TokenAmount::new(snapshot.total_supply, TOKEN_DECIMALS),
        pool_tokens: TokenAmount::new(snapshot.pool_balance, TOKEN_DECIMALS),
        user_shares: snapshot
            .user
            .map(|user| TokenAmount::new(user.share_balance, TOKEN_DECIMALS)),
        user_staked,
        user_token_balance: snapshot
            .user
            .map(|user| TokenAmount::new(user.token_balance, TOKEN_DECIMALS)),
    })
}

/// Jacuzzi staking pool: stats, approval, stake and leave.
#[derive(Clone)]
pub struct JacuzziService {
    context: Arc<DexContext>,
}

impl JacuzziService {
    pub fn new(context: Arc<DexContext>) -> Self {
        Self { context }
    }

    fn jacuzzi(&self) -> ServiceResult<ContractHandle> {
        self.context
            .reader(self.context.contracts().jacuzzi, Interface::Jacuzzi, "jacuzzi")
    }

    fn staking_token(&self) -> ServiceResult<ContractHandle> {
        self.context.reader(
            self.context.contracts().staking_token(),
            Interface::Erc20,
            "staking token",
        )
    }

    #[instrument(skip(self), err)]
    pub async fn snapshot(&self, account: Option<Address>) -> ServiceResult<JacuzziSnapshot> {
        let jacuzzi = self.jacuzzi()?;
        let token = self.staking_token()?;
        let ctx = &self.context;
        let pool_balance_call = IERC20::balanceOfCall {
            account: jacuzzi.address(),
        };

        let (
            pool_balance,
            total_supply,
            unlock_date,
            early_withdrawal_fee,
            max_early_withdraw_fee,
        ) = tokio::try_join!(
            ctx.read(&token, &pool_balance_call),
            ctx.read(&jacuzzi, &IJacuzzi::totalSupplyCall {}),
            ctx.read(&jacuzzi, &IJacuzzi::unlockDateCall {}),
            ctx.read(&jacuzzi, &IJacuzzi::earlyWithdrawalFeeCall {}),
            ctx.read(&jacuzzi, &IJacuzzi::MAX_EARLY_WITHDRAW_FEECall {}),
        )?;

        let user = match account {
            Some(account) => {
                let token_balance_call = IERC20::balanceOfCall { account };
                let share_balance_call = IJacuzzi::balanceOfCall { account };
                let (token_balance, share_balance) = tokio::try_join!(
                    ctx.read(&token, &token_balance_call),
                    ctx.read(&jacuzzi, &share_balance_call),
                )?;
                Some(UserPosition {
                    token_balance,
                    share_balance,
                })
            }
            None => None,
        };

        Ok(JacuzziSnapshot {
            pool_balance,
            total_supply,
            unlock_date,
            early_withdrawal_fee,
            max_early_withdraw_fee,
            user,
        })
    }

    pub async fn stats(&self, account: Option<Address>) -> ServiceResult<JacuzziStats> {
        let snapshot = self.snapshot(account).await?;
        compute_stats(&snapshot, Utc::now())
    }

    /// Approval state of the connected account for spending `amount`.
    pub async fn approval_state(&self, amount: U256) -> ServiceResult<ApprovalState> {
        let account = self.context.account().await?;
        let token = self.staking_token()?;
        let spender = self.jacuzzi()?.address();

        let allowance = self
            .context
            .read_if_loaded(&token, &IERC20::allowanceCall { owner: account, spender })
            .await;
        let pending = self
            .context
            .session()
            .has_pending_approval(token.address(), spender)
            .await;
        Ok(approval_state(allowance, amount, pending))
    }

    /// Approves the Jacuzzi to spend the staking token without limit.
    #[instrument(skip(self), err)]
    pub async fn approve(&self) -> ServiceResult<TxHash> {
        let spender = self.jacuzzi()?.address();
        let token = self
            .context
            .writer(self.context.contracts().staking_token(), Interface::Erc20, "staking token")
            .await?;

        if self
            .context
            .session()
            .has_pending_approval(token.address(), spender)
            .await
        {
            return Err(ServiceError::ApprovalPending {
                token: token.address().to_string(),
                spender: spender.to_string(),
            });
        }

        let request = token.write(&IERC20::approveCall {
            spender,
            amount: U256::MAX,
        })?;
        self.context
            .submit(
                request,
                "Approve PARTY".to_string(),
                TransactionKind::Approval {
                    token: token.address(),
                    spender,
                },
                vec![token.address()],
            )
            .await
    }

    /// Deposits `amount` of the staking token.
    #[instrument(skip(self), err)]
    pub async fn stake(&self, amount: U256) -> ServiceResult<TxHash> {
        if amount.is_zero() {
            return Err(ServiceError::InvalidAmount(
                "Stake amount must be greater than zero".to_string(),
            ));
        }
        let account = self.context.account().await?;
        let token = self.staking_token()?;

        let balance = self
            .context
            .read(&token, &IERC20::balanceOfCall { account })
            .await?;
        if balance < amount {
            return Err(ServiceError::InsufficientBalance {
                required: format_balance(amount, TOKEN_DECIMALS),
                available: format_balance(balance, TOKEN_DECIMALS),
            });
        }

        match self.approval_state(amount).await? {
            ApprovalState::Approved => {}
            ApprovalState::Pending => {
                return Err(ServiceError::ApprovalPending {
                    token: token.address().to_string(),
                    spender: self.jacuzzi()?.address().to_string(),
                });
            }
            ApprovalState::NotApproved | ApprovalState::Unknown => {
                return Err(ServiceError::NotApproved {
                    token: token.address().to_string(),
                    spender: self.jacuzzi()?.address().to_string(),
                });
            }
        }

        let jacuzzi = self
            .context
            .writer(self.context.contracts().jacuzzi, Interface::Jacuzzi, "jacuzzi")
            .await?;
        let request = jacuzzi.write(&IJacuzzi::enterCall { amount })?;
        self.context
            .submit(
                request,
                format!(
                    "Stake {} PARTY to Jacuzzi",
                    format_balance(amount, TOKEN_DECIMALS)
                ),
                TransactionKind::Stake,
                vec![jacuzzi.address(), token.address()],
            )
            .await
    }

    /// Burns `share` xYAY for the underlying tokens.
    #[instrument(skip(self), err)]
    pub async fn leave(&self, share: U256) -> ServiceResult<TxHash> {
        if share.is_zero() {
            return Err(ServiceError::InvalidAmount(
                "Share amount must be greater than zero".to_string(),
            ));
        }
        let account = self.context.account().await?;
        let jacuzzi = self
            .context
            .writer(self.context.contracts().jacuzzi, Interface::Jacuzzi, "jacuzzi")
            .await?;

        let shares = self
            .context
            .read(&self.jacuzzi()?, &IJacuzzi::balanceOfCall { account })
            .await?;
        if shares < share {
            return Err(ServiceError::InsufficientBalance {
                required: format_balance(share, TOKEN_DECIMALS),
                available: format_balance(shares, TOKEN_DECIMALS),
            });
        }

        let request = jacuzzi.write(&IJacuzzi::leaveCall { share })?;
        let targets = [Some(jacuzzi.address()), self.context.contracts().staking_token()]
            .into_iter()
            .flatten()
            .collect();
        self.context
            .submit(
                request,
                format!(
                    "Leave {} xYAY from Jacuzzi",
                    format_balance(share, TOKEN_DECIMALS)
                ),
                TransactionKind::Other,
                targets,
            )
            .await
    }
}
