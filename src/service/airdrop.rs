use std::sync::Arc;

use alloy::primitives::{Address, TxHash, U256};
use tracing::instrument;

use super::context::DexContext;
use super::tokens::TokenAmount;
use super::{ServiceError, ServiceResult};
use crate::repository::Interface;
use crate::repository::contract::IAirdrop;
use crate::transactions::TransactionKind;

const PARTY_DECIMALS: u8 = 18;

/// PARTY airdrop: claim status of an account and the claim itself.
#[derive(Clone)]
pub struct AirdropService {
    context: Arc<DexContext>,
}

impl AirdropService {
    pub fn new(context: Arc<DexContext>) -> Self {
        Self { context }
    }

    /// True only once `claimingAllowed()` has loaded and returned true.
    pub async fn is_claiming_allowed(&self) -> bool {
        let Ok(airdrop) =
            self.context
                .reader(self.context.contracts().airdrop, Interface::Airdrop, "airdrop")
        else {
            return false;
        };
        self.context
            .read_if_loaded(&airdrop, &IAirdrop::claimingAllowedCall {})
            .await
            .unwrap_or(false)
    }

    async fn withdraw_amount(&self, account: Address) -> Option<U256> {
        let airdrop = self
            .context
            .reader(self.context.contracts().airdrop, Interface::Airdrop, "airdrop")
            .ok()?;
        self.context
            .read_if_loaded(&airdrop, &IAirdrop::withdrawAmountCall { account })
            .await
            .map(U256::from)
    }

    /// True once `withdrawAmount(account)` has loaded and is non-zero.
    pub async fn user_has_available_claim(&self, account: Address) -> bool {
        self.withdraw_amount(account)
            .await
            .is_some_and(|amount| !amount.is_zero())
    }

    /// PARTY still claimable by `account`. Zero when there is no claim,
    /// `None` when PARTY is not deployed on this chain.
    pub async fn user_unclaimed_amount(&self, account: Address) -> Option<TokenAmount> {
        self.context.contracts().party?;

        let amount = match self.withdraw_amount(account).await {
            Some(amount) if !amount.is_zero() => amount,
            _ => U256::ZERO,
        };
        Some(TokenAmount::new(amount, PARTY_DECIMALS))
    }

    /// Claims the connected account's airdrop.
    #[instrument(skip(self), err)]
    pub async fn claim(&self) -> ServiceResult<TxHash> {
        let contracts = *self.context.contracts();
        let airdrop = self
            .context
            .writer(contracts.airdrop, Interface::Airdrop, "airdrop")
            .await?;
        let recipient = airdrop
            .signer()
            .ok_or_else(|| ServiceError::NoWallet("airdrop".to_string()))?;

        let request = airdrop.write(&IAirdrop::claimCall {})?;
        let targets = [Some(airdrop.address()), contracts.party]
            .into_iter()
            .flatten()
            .collect();

        self.context
            .submit(
                request,
                "Claimed PARTY".to_string(),
                TransactionKind::Claim { recipient },
                targets,
            )
            .await
    }
}
