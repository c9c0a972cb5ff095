//! Utilities for precise decimal arithmetic with U256 values
//!
//! This module provides conversion between U256 (blockchain integers) and Decimal
//! for accurate financial calculations without floating-point precision loss,
//! plus the small helpers the write flows share.

use alloy::primitives::U256;
use rust_decimal::Decimal;
use std::str::FromStr;

use super::ServiceResult;
use super::error::ServiceError;

/// Basis points in 100%.
const BPS_DENOMINATOR: u64 = 10_000;

/// Wei per gwei.
const GWEI: u128 = 1_000_000_000;

/// Convert U256 to Decimal with proper decimal scaling
///
/// # Arguments
/// * `value` - The U256 value to convert
/// * `decimals` - Number of decimal places (e.g., 18 for AVAX, 6 for USDC)
///
/// # Returns
/// A Decimal representing the actual value (e.g., 1.5 AVAX instead of 1500000000000000000 wei)
pub fn u256_to_decimal(value: U256, decimals: u8) -> ServiceResult<Decimal> {
    let value_str = value.to_string();

    let mut decimal = Decimal::from_str(&value_str).map_err(|e| {
        ServiceError::InvalidAmount(format!("Failed to parse U256 to Decimal: {}", e))
    })?;

    for _ in 0..decimals {
        decimal /= Decimal::TEN;
    }

    // Normalize to remove trailing zeros
    Ok(decimal.normalize())
}

/// Convert Decimal to U256 with proper decimal scaling
///
/// # Arguments
/// * `value` - The Decimal value to convert
/// * `decimals` - Number of decimal places to scale to
///
/// # Returns
/// A U256 representing the raw blockchain value (e.g., wei instead of AVAX).
/// Digits below the smallest unit are truncated.
pub fn decimal_to_u256(value: Decimal, decimals: u8) -> ServiceResult<U256> {
    if value.is_sign_negative() && !value.is_zero() {
        return Err(ServiceError::InvalidAmount(format!(
            "Amount must not be negative: {value}"
        )));
    }

    let mut scaled = value;
    for _ in 0..decimals {
        scaled = scaled
            .checked_mul(Decimal::TEN)
            .ok_or_else(|| ServiceError::InvalidAmount(format!("Amount too large: {value}")))?;
    }

    U256::from_str(&scaled.trunc().abs().to_string())
        .map_err(|e| ServiceError::InvalidAmount(format!("Failed to parse Decimal to U256: {}", e)))
}

/// Parse human-readable amount (e.g., "1.5") to smallest unit based on decimals
///
/// # Examples
/// - "1" with 18 decimals -> 1000000000000000000
/// - "100" with 6 decimals -> 100000000
pub fn parse_amount(amount: &str, decimals: u8) -> ServiceResult<U256> {
    let amount = amount.trim();
    match Decimal::from_str(amount) {
        Ok(decimal_amount) => decimal_to_u256(decimal_amount, decimals),
        // Not a decimal: assume already in smallest unit
        Err(_) => U256::from_str(amount)
            .map_err(|e| ServiceError::InvalidAmount(format!("Invalid amount format: {}", e))),
    }
}

/// Format balance from smallest unit to human-readable format
///
/// Trailing zeros are removed.
pub fn format_balance(balance: U256, decimals: u8) -> String {
    let divisor = U256::from(10u64).pow(U256::from(decimals));
    let whole = balance / divisor;
    let remainder = balance % divisor;

    if remainder.is_zero() {
        whole.to_string()
    } else {
        let decimal_part = remainder.to_string();
        let padded = format!("{:0>width$}", decimal_part, width = decimals as usize);
        let trimmed = padded.trim_end_matches('0');
        if trimmed.is_empty() {
            whole.to_string()
        } else {
            format!("{whole}.{trimmed}")
        }
    }
}

/// Adds a safety margin of `margin_bps` basis points to a gas estimate.
pub fn calculate_gas_margin(estimate: u64, margin_bps: u64) -> u64 {
    let padded = estimate as u128 * (BPS_DENOMINATOR + margin_bps) as u128 / BPS_DENOMINATOR as u128;
    u64::try_from(padded).unwrap_or(u64::MAX)
}

pub fn gwei_to_wei(gwei: u64) -> u128 {
    gwei as u128 * GWEI
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_u256_to_decimal_avax_should_work() {
        let wei = U256::from_str("1500000000000000000").unwrap();
        let avax = u256_to_decimal(wei, 18).unwrap();
        assert_eq!(avax.to_string(), "1.5");
    }

    #[test]
    fn test_u256_to_decimal_usdc_should_work() {
        let raw = U256::from(1000500000u64);
        let usdc = u256_to_decimal(raw, 6).unwrap();
        assert_eq!(usdc.to_string(), "1000.5");
    }

    #[test]
    fn test_decimal_to_u256_should_work() {
        let party = Decimal::from_str("1.5").unwrap();
        let raw = decimal_to_u256(party, 18).unwrap();
        assert_eq!(raw, U256::from_str("1500000000000000000").unwrap());
    }

    #[test]
    fn test_parse_amount_should_work() {
        let amount = parse_amount("1.5", 18).unwrap();
        assert_eq!(amount, U256::from_str("1500000000000000000").unwrap());

        let amount = parse_amount("100.5", 6).unwrap();
        assert_eq!(amount, U256::from(100500000u64));
    }

    #[test]
    fn test_parse_amount_rejects_negative_and_garbage() {
        assert!(matches!(parse_amount("-1", 18), Err(ServiceError::InvalidAmount(_))));
        assert!(matches!(parse_amount("abc", 18), Err(ServiceError::InvalidAmount(_))));
    }

    #[test]
    fn test_parse_amount_truncates_below_smallest_unit() {
        assert_eq!(parse_amount("1.0000005", 6).unwrap(), U256::from(1_000_000u64));
        assert_eq!(parse_amount("0", 18).unwrap(), U256::ZERO);
    }

    #[test]
    fn test_decimal_to_u256_rejects_overflow() {
        let huge = Decimal::from_str("79228162514264337593543950335").unwrap();
        assert!(matches!(decimal_to_u256(huge, 18), Err(ServiceError::InvalidAmount(_))));
    }

    #[test]
    fn test_u256_to_decimal_with_many_decimals() {
        let raw = U256::from(15u64);
        let value = u256_to_decimal(raw, 20).unwrap();
        assert_eq!(value, Decimal::from_str("0.00000000000000000015").unwrap());
    }

    #[test]
    fn test_format_balance_should_work() {
        let wei = U256::from_str("1500000000000000000").unwrap();
        assert_eq!(format_balance(wei, 18), "1.5");

        let amount = U256::from(100500000u64);
        assert_eq!(format_balance(amount, 6), "100.5");

        let wei = U256::from_str("1000000000000000000").unwrap();
        assert_eq!(format_balance(wei, 18), "1");
    }

    #[test]
    fn test_calculate_gas_margin_should_work() {
        assert_eq!(calculate_gas_margin(100_000, 1_000), 110_000);
        assert_eq!(calculate_gas_margin(21_000, 0), 21_000);
        assert_eq!(calculate_gas_margin(u64::MAX, 1_000), u64::MAX);
    }

    #[test]
    fn test_gwei_to_wei() {
        assert_eq!(gwei_to_wei(225), 225_000_000_000);
    }
}
