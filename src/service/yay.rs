use std::sync::Arc;

use alloy::primitives::{Address, U256};
use rust_decimal::{Decimal, RoundingStrategy};
use tracing::instrument;

use super::context::DexContext;
use super::tokens::TokenAmount;
use super::{ServiceError, ServiceResult};
use crate::repository::Interface;
use crate::repository::contract::{IERC20, IPair};

const YAY_DECIMALS: u8 = 18;

/// 10^18, one whole YAY.
const ONE_TOKEN: U256 = U256::from_limbs([1_000_000_000_000_000_000, 0, 0, 0]);

/// AVAX per YAY in 18-decimal units from the pair reserves.
///
/// `token0` of the pair is the lower address. An empty YAY reserve counts as
/// one unit so a fresh pair still yields a price.
pub fn price_from_reserves(
    yay: Address,
    wavax: Address,
    reserve0: U256,
    reserve1: U256,
) -> ServiceResult<U256> {
    let (reserve_yay, reserve_wavax) = if yay < wavax {
        (reserve0, reserve1)
    } else {
        (reserve1, reserve0)
    };
    let reserve_yay = if reserve_yay.is_zero() {
        U256::from(1)
    } else {
        reserve_yay
    };
    let scaled = ONE_TOKEN
        .checked_mul(reserve_wavax)
        .ok_or_else(|| ServiceError::InternalError("YAY price overflows 256 bits".to_string()))?;
    Ok(scaled / reserve_yay)
}

/// AVAX worth of `balance` at `price`, with the balance rounded to one
/// place first and the result to three.
pub fn avax_value(balance: &TokenAmount, price: &TokenAmount) -> ServiceResult<Decimal> {
    let balance = balance
        .to_decimal()?
        .round_dp_with_strategy(1, RoundingStrategy::MidpointAwayFromZero);
    let value = balance
        .checked_mul(price.to_decimal()?)
        .ok_or_else(|| ServiceError::InternalError("AVAX value out of range".to_string()))?;
    Ok(value.round_dp_with_strategy(3, RoundingStrategy::MidpointAwayFromZero))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct YayOverview {
    pub balance: TokenAmount,
    /// AVAX per YAY.
    pub price: TokenAmount,
    pub avax_in_wallet: Decimal,
}

/// YAY holdings of an account valued in AVAX.
#[derive(Clone)]
pub struct YayService {
    context: Arc<DexContext>,
}

impl YayService {
    pub fn new(context: Arc<DexContext>) -> Self {
        Self { context }
    }

    #[instrument(skip(self), err)]
    pub async fn price(&self) -> ServiceResult<TokenAmount> {
        let contracts = *self.context.contracts();
        let (Some(yay), Some(wavax)) = (contracts.yay, contracts.wavax) else {
            return Err(ServiceError::ContractUnavailable("yay".to_string()));
        };
        let pair = self
            .context
            .reader(contracts.yay_pair, Interface::Pair, "yay_avax_pair")?;

        let reserves = self.context.read(&pair, &IPair::getReservesCall {}).await?;
        let price = price_from_reserves(
            yay,
            wavax,
            U256::from(reserves.reserve0),
            U256::from(reserves.reserve1),
        )?;
        tracing::debug!("YAY price {price} wei per token");

        Ok(TokenAmount::new(price, YAY_DECIMALS))
    }

    #[instrument(skip(self), err)]
    pub async fn overview(&self, account: Address) -> ServiceResult<YayOverview> {
        let yay = self
            .context
            .reader(self.context.contracts().yay, Interface::Erc20, "yay")?;
        let balance_call = IERC20::balanceOfCall { account };

        let (balance, price) =
            tokio::try_join!(self.context.read(&yay, &balance_call), self.price())?;
        let balance = TokenAmount::new(balance, YAY_DECIMALS);

        Ok(YayOverview {
            avax_in_wallet: avax_value(&balance, &price)?,
            balance,
            price,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LOW: Address = Address::repeat_byte(0x10);
    const HIGH: Address = Address::repeat_byte(0xf0);

    fn ether(n: u64) -> U256 {
        U256::from(n) * ONE_TOKEN
    }

    #[test]
    fn test_price_follows_pair_token_order() {
        // YAY sorts first: reserve0 is YAY.
        let price = price_from_reserves(LOW, HIGH, ether(1_000), ether(25)).unwrap();
        assert_eq!(price, ONE_TOKEN * U256::from(25) / U256::from(1_000));

        // YAY sorts last: reserve1 is YAY.
        let price = price_from_reserves(HIGH, LOW, ether(25), ether(1_000)).unwrap();
        assert_eq!(price, ONE_TOKEN * U256::from(25) / U256::from(1_000));
    }

    #[test]
    fn test_empty_yay_reserve_divides_by_one() {
        let price = price_from_reserves(LOW, HIGH, U256::ZERO, U256::from(3)).unwrap();
        assert_eq!(price, ONE_TOKEN * U256::from(3));

        let price = price_from_reserves(LOW, HIGH, U256::ZERO, U256::ZERO).unwrap();
        assert!(price.is_zero());
    }

    #[test]
    fn test_avax_value_rounds_balance_first() {
        // 1234.56 YAY counts as 1234.6 at 0.025 AVAX each.
        let balance = TokenAmount::new(ether(123_456) / U256::from(100), YAY_DECIMALS);
        let price = TokenAmount::new(ONE_TOKEN / U256::from(40), YAY_DECIMALS);

        let value = avax_value(&balance, &price).unwrap();
        assert_eq!(value, Decimal::new(30_865, 3));
    }

    #[test]
    fn test_avax_value_of_empty_wallet() {
        let price = TokenAmount::new(ONE_TOKEN, YAY_DECIMALS);
        let value = avax_value(&TokenAmount::zero(YAY_DECIMALS), &price).unwrap();
        assert_eq!(value, Decimal::ZERO);
    }
}
