//! Unit Conversions
//!
//! All on-chain quantities stay in 256-bit integers. Conversion to `f64`
//! happens only for display figures, after truncating at a fixed number of
//! decimal digits.

use alloy::primitives::U256;
use thiserror::Error;

/// Decimals of ETH, SD and ETHx
pub const TOKEN_DECIMALS: u32 = 18;

/// 10^18
pub const WEI_PER_ETH: u128 = 1_000_000_000_000_000_000;

/// Errors parsing a decimal wei amount
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AmountParseError {
    #[error("Empty amount")]
    Empty,

    #[error("Amount {0:?} is not a non-negative decimal integer")]
    NotDecimal(String),

    #[error("Amount {0:?} overflows 256 bits")]
    Overflow(String),
}

/// Parse a base-10 integer string of minor units
///
/// # Errors
/// Returns an error on empty input, any non-digit character (signs included),
/// or values that do not fit in 256 bits
pub fn parse_wei(amount: &str) -> Result<U256, AmountParseError> {
    let amount = amount.trim();
    if amount.is_empty() {
        return Err(AmountParseError::Empty);
    }
    if !amount.bytes().all(|b| b.is_ascii_digit()) {
        return Err(AmountParseError::NotDecimal(amount.to_string()));
    }
    U256::from_str_radix(amount, 10).map_err(|_| AmountParseError::Overflow(amount.to_string()))
}

fn pow10(exponent: u32) -> U256 {
    U256::from(10u64).pow(U256::from(exponent))
}

/// Decimal token string truncated toward zero at `digits` fractional digits
#[must_use]
pub fn format_wei(wei: U256, digits: u32) -> String {
    let digits = digits.min(TOKEN_DECIMALS);
    let scale = U256::from(WEI_PER_ETH);
    let whole = wei / scale;
    if digits == 0 {
        return whole.to_string();
    }
    let fraction = (wei % scale) / pow10(TOKEN_DECIMALS - digits);
    format!(
        "{whole}.{:0>width$}",
        fraction.to_string(),
        width = digits as usize
    )
}

/// Display value of a wei amount, truncated toward zero at `digits` places
#[must_use]
pub fn round_down_wei(wei: U256, digits: u32) -> f64 {
    // A digits-and-dot string always parses.
    format_wei(wei, digits).parse().unwrap_or(0.0)
}
