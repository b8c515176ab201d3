use ethers::types::{Address, I256, U256};
use std::str::FromStr;

/// Scale a raw on-chain integer by `10^decimals` into an `f64`.
///
/// Goes through the decimal string so values above `u128::MAX` keep their magnitude.
pub fn u256_to_f64(value: U256, decimals: u8) -> f64 {
    let digits = value.to_string();
    let decimals = decimals as usize;
    let scaled = if decimals == 0 {
        digits
    } else if digits.len() > decimals {
        let (int_part, frac_part) = digits.split_at(digits.len() - decimals);
        format!("{}.{}", int_part, frac_part)
    } else {
        format!("0.{}{}", "0".repeat(decimals - digits.len()), digits)
    };
    scaled.parse::<f64>().unwrap_or(0.0)
}

/// Chainlink answers are `int256`. Only strictly positive answers are usable prices.
pub fn positive_i256_to_f64(value: I256, decimals: u8) -> Result<f64, ConversionError> {
    if value <= I256::zero() {
        return Err(ConversionError::NonPositive(value.to_string()));
    }
    Ok(u256_to_f64(value.into_raw(), decimals))
}

/// Lowercase `0x`-prefixed hex, used for cache keys and logs.
pub fn address_to_string(addr: Address) -> String {
    format!("{:?}", addr).to_lowercase()
}

pub fn string_to_address(s: &str) -> Result<Address, ConversionError> {
    Address::from_str(s.trim()).map_err(|e| ConversionError::InvalidAddress(format!("{}: {}", s, e)))
}

#[derive(Debug, thiserror::Error)]
pub enum ConversionError {
    #[error("Non-positive value: {0}")]
    NonPositive(String),
    #[error("Invalid address: {0}")]
    InvalidAddress(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scales_18_decimals() {
        let value = U256::from(1_500u64) * U256::exp10(15);
        assert!((u256_to_f64(value, 18) - 1.5).abs() < 1e-12);
    }

    #[test]
    fn scales_values_smaller_than_one_unit() {
        assert!((u256_to_f64(U256::from(25u64), 4) - 0.0025).abs() < 1e-12);
        assert_eq!(u256_to_f64(U256::zero(), 6), 0.0);
    }

    #[test]
    fn chainlink_answer_must_be_positive() {
        let answer = I256::from(3_000i64) * I256::from(100_000_000i64);
        let price = positive_i256_to_f64(answer, 8).unwrap();
        assert!((price - 3_000.0).abs() < 1e-9);
        assert!(positive_i256_to_f64(I256::zero(), 8).is_err());
        assert!(positive_i256_to_f64(I256::from(-5i64), 8).is_err());
    }

    #[test]
    fn rejects_malformed_addresses() {
        assert!(string_to_address("0xnot-an-address").is_err());
        assert!(string_to_address(" 0x6810e776880C02933D47DB1b9fc05908e5386b96 ").is_ok());
    }
}
