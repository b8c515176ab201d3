//! # Price Adapter Traits
//!
//! This module defines the two seams every price source plugs into:
//!
//! - [`PriceAdapter`]: "give me the price of this asset". Exchange tickers, aggregator
//!   APIs, on-chain pools and on-chain feeds all implement it.
//! - [`UnderlyingTokenSource`]: "what basket of tokens backs this composed token".
//!   LP tokens and configured baskets implement it.
//!
//! Adapters perform at most one upstream request per call and never retry. Ordering,
//! fallback, timeouts and caching belong to [`crate::oracle_chain::OracleChain`],
//! [`crate::composed_oracle::ComposedResolver`] and [`crate::cache::PriceCache`].
//!
//! ## Adding a New Source
//!
//! 1. Implement `PriceAdapter` (and/or `UnderlyingTokenSource`) for your client
//! 2. Add an [`crate::oracle_registry::AdapterKind`] variant
//! 3. Wire it in `OracleRegistry::build_adapter`
//!
//! ## Example
//!
//! ```rust,no_run
//! use price_oracle_sdk::price_adapter::PriceAdapter;
//! use price_oracle_sdk::errors::AdapterError;
//! use price_oracle_sdk::types::PriceAsset;
//! use async_trait::async_trait;
//!
//! struct FixedPrice(f64);
//!
//! #[async_trait]
//! impl PriceAdapter for FixedPrice {
//!     fn name(&self) -> &str {
//!         "Fixed"
//!     }
//!
//!     async fn fetch_price(&self, _asset: &PriceAsset) -> Result<f64, AdapterError> {
//!         Ok(self.0)
//!     }
//! }
//! ```

use async_trait::async_trait;
use ethers::types::Address;
use std::time::Duration;

use crate::errors::AdapterError;
use crate::types::{PriceAsset, UnderlyingToken};

/// Default per-request timeout for a single adapter call.
pub const DEFAULT_ADAPTER_TIMEOUT: Duration = Duration::from_secs(2);

/// A single external price source.
#[async_trait]
pub trait PriceAdapter: Send + Sync {
    /// Human readable source name used in logs, errors and metrics.
    fn name(&self) -> &str;

    /// Upper bound for one `fetch_price` call. Enforced by the oracle chain.
    fn timeout(&self) -> Duration {
        DEFAULT_ADAPTER_TIMEOUT
    }

    /// Price of `asset`: USD for the native coin, native coin units for tokens.
    async fn fetch_price(&self, asset: &PriceAsset) -> Result<f64, AdapterError>;
}

/// Supplies the weighted basket behind a composed token.
#[async_trait]
pub trait UnderlyingTokenSource: Send + Sync {
    fn name(&self) -> &str;

    /// Underlyings of `token`. Fails with `NoPrice` when this source does not know it.
    async fn get_underlying_tokens(
        &self,
        token: Address,
    ) -> Result<Vec<UnderlyingToken>, AdapterError>;
}

/// Shared price sanity rule.
///
/// Non-finite and negative prices are always invalid; zero is valid for tokens
/// (worthless or untradeable) and invalid for the native coin.
pub fn validate_price(adapter: &str, asset: &PriceAsset, price: f64) -> Result<f64, AdapterError> {
    if !price.is_finite() || price < 0.0 {
        return Err(AdapterError::no_price(
            adapter,
            format!("invalid price {} for {}", price, asset),
        ));
    }
    if price == 0.0 && !asset.allows_zero_price() {
        return Err(AdapterError::no_price(
            adapter,
            format!("price for {} is 0", asset),
        ));
    }
    Ok(price)
}

/// Convenience for adapters handed an asset kind they do not serve.
pub fn unsupported(adapter: &str, asset: &PriceAsset) -> AdapterError {
    AdapterError::no_price(adapter, format!("{} is not supported", asset))
}
