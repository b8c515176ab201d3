use chrono::{DateTime, Utc};
use ethers::types::Address;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::types::conversions::address_to_string;

/// What an adapter is asked to price.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PriceAsset {
    /// The network's native coin (ETH, xDAI, MATIC...).
    NativeCoin,
    /// An ERC20-like token.
    Token(Address),
    /// A liquidity pool share token, priced from the pool itself.
    PoolToken(Address),
}

impl PriceAsset {
    pub fn category(&self) -> PriceCategory {
        match self {
            PriceAsset::NativeCoin => PriceCategory::NativeCoin,
            PriceAsset::Token(_) => PriceCategory::Token,
            PriceAsset::PoolToken(_) => PriceCategory::PoolToken,
        }
    }

    pub fn address(&self) -> Option<Address> {
        match self {
            PriceAsset::NativeCoin => None,
            PriceAsset::Token(address) | PriceAsset::PoolToken(address) => Some(*address),
        }
    }

    /// Zero is a valid token price ("exists but worthless"), never a valid native coin price.
    pub fn allows_zero_price(&self) -> bool {
        !matches!(self, PriceAsset::NativeCoin)
    }
}

impl fmt::Display for PriceAsset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PriceAsset::NativeCoin => write!(f, "native-coin"),
            PriceAsset::Token(address) => write!(f, "token:{}", address_to_string(*address)),
            PriceAsset::PoolToken(address) => {
                write!(f, "pool-token:{}", address_to_string(*address))
            }
        }
    }
}

/// Target denomination of a price.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Currency {
    Usd,
    /// The network's native coin. Named after mainnet, where it is ETH.
    Eth,
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Currency::Usd => write!(f, "usd"),
            Currency::Eth => write!(f, "eth"),
        }
    }
}

/// A single price request. Built per call and used as the cache key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PriceQuery {
    pub asset: PriceAsset,
    pub currency: Currency,
}

impl PriceQuery {
    pub fn new(asset: PriceAsset, currency: Currency) -> Self {
        Self { asset, currency }
    }

    pub fn native_coin_usd() -> Self {
        Self::new(PriceAsset::NativeCoin, Currency::Usd)
    }

    pub fn token_eth(address: Address) -> Self {
        Self::new(PriceAsset::Token(address), Currency::Eth)
    }

    pub fn token_usd(address: Address) -> Self {
        Self::new(PriceAsset::Token(address), Currency::Usd)
    }

    pub fn pool_token_eth(address: Address) -> Self {
        Self::new(PriceAsset::PoolToken(address), Currency::Eth)
    }

    /// Stable key, e.g. `token:0xc02a...6cc2:eth`.
    pub fn cache_key(&self) -> String {
        format!("{}:{}", self.asset, self.currency)
    }
}

impl fmt::Display for PriceQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.cache_key())
    }
}

/// Category of an adapter chain. Used for chain selection, errors, logs and metrics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PriceCategory {
    NativeCoin,
    Token,
    PoolToken,
    Composed,
}

impl PriceCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            PriceCategory::NativeCoin => "native_coin",
            PriceCategory::Token => "token",
            PriceCategory::PoolToken => "pool_token",
            PriceCategory::Composed => "composed",
        }
    }
}

impl fmt::Display for PriceCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One constituent of a composed token.
///
/// `weight` is the quantity of `address` backing one unit of the composed token.
/// Weights of a basket are relative contributions and do not need to sum to 1.0.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct UnderlyingToken {
    pub address: Address,
    pub weight: f64,
}

impl UnderlyingToken {
    pub fn new(address: Address, weight: f64) -> Self {
        Self { address, weight }
    }
}

/// How a price was served.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PriceState {
    /// Computed by this request.
    Fresh,
    /// Served from an unexpired cache entry.
    Cached,
    /// Served from an expired cache entry because live resolution failed.
    Stale,
    /// Computed from a basket cut short by the depth bound or a cycle. Never cached.
    Partial,
    /// The 0.0 stored when no source could price the asset.
    Unpriced,
}

/// A token's native coin value together with the time it was computed.
///
/// `timestamp` is the computation time, not the time of the call, so a persistence
/// step can tell a new value from a replayed cached one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EthValueWithTimestamp {
    pub address: Address,
    pub eth_value: f64,
    pub timestamp: DateTime<Utc>,
    pub state: PriceState,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn cache_key_is_lowercase_and_includes_currency() {
        let weth = Address::from_str("0xC02aaA39b223FE8D0A0e5C4F27eAD9083C756Cc2").unwrap();
        assert_eq!(
            PriceQuery::token_eth(weth).cache_key(),
            "token:0xc02aaa39b223fe8d0a0e5c4f27ead9083c756cc2:eth"
        );
        assert_eq!(PriceQuery::native_coin_usd().cache_key(), "native-coin:usd");
        assert_ne!(
            PriceQuery::token_eth(weth).cache_key(),
            PriceQuery::pool_token_eth(weth).cache_key()
        );
    }

    #[test]
    fn only_native_coin_rejects_zero() {
        assert!(!PriceAsset::NativeCoin.allows_zero_price());
        assert!(PriceAsset::Token(Address::zero()).allows_zero_price());
        assert!(PriceAsset::PoolToken(Address::zero()).allows_zero_price());
    }
}
