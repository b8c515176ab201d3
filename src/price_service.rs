//! # Price Service
//!
//! Public entry point. Wires the oracle chains and the composed resolver of one network
//! to TTL caches and applies the caller-facing fallback policy.
//!
//! ## Resolution order for a token's native coin value
//!
//! 1. Fresh cache entry
//! 2. Token oracle chain
//! 3. Pool-token oracle chain (the token may be an LP share)
//! 4. Composed resolution from the token's underlying basket
//! 5. Last cached value, however old
//! 6. [`UnpricedTokenPolicy`]: store and return 0.0, or fail with `Unresolvable`
//!
//! The native coin USD price follows 1, 2 (native coin chain) and 5, then fails.
//!
//! ## Example
//!
//! ```rust,no_run
//! use price_oracle_sdk::cache_backend::InMemoryBackend;
//! use price_oracle_sdk::networks::Network;
//! use price_oracle_sdk::oracle_registry::OracleRegistry;
//! use price_oracle_sdk::price_service::{PriceService, PriceServiceConfig};
//! use price_oracle_sdk::settings::Settings;
//! use std::collections::HashMap;
//! use std::sync::Arc;
//!
//! # async fn run() -> anyhow::Result<()> {
//! let settings = Settings::new()?;
//! let registry = OracleRegistry::from_settings(&settings, &HashMap::new())?;
//! let service = PriceService::new(
//!     Network::Mainnet,
//!     &registry,
//!     Arc::new(InMemoryBackend::default()),
//!     PriceServiceConfig::from(&settings),
//! );
//! let eth_usd = service.get_native_coin_usd_price().await?;
//! # Ok(())
//! # }
//! ```

use ethers::types::Address;
use futures::future::{join_all, BoxFuture, FutureExt};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

use crate::cache::{Computed, PriceCache, Resolved};
use crate::cache_backend::CacheBackend;
use crate::composed_oracle::{ComposedResolver, Valuation, DEFAULT_MAX_DEPTH};
use crate::errors::{PriceServiceError, ResolverError, SourceFailure};
use crate::metrics;
use crate::networks::Network;
use crate::oracle_chain::OracleChain;
use crate::oracle_registry::{NetworkOracles, OracleRegistry};
use crate::price_adapter::UnderlyingTokenSource;
use crate::settings::Settings;
use crate::types::conversions::address_to_string;
use crate::types::{
    Currency, EthValueWithTimestamp, PriceAsset, PriceCategory, PriceQuery, PriceState,
    UnderlyingToken,
};

pub const NATIVE_COIN_USD_NAMESPACE: &str = "price-service:native-coin-usd";
pub const TOKEN_ETH_VALUE_NAMESPACE: &str = "price-service:token-eth-value";
pub const POOL_TOKEN_ETH_VALUE_NAMESPACE: &str = "price-service:pool-token-eth-value";
pub const UNDERLYING_TOKENS_NAMESPACE: &str = "price-service:underlying-tokens";

/// What to do with a token no source can price and no cache remembers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnpricedTokenPolicy {
    /// Store and return 0.0 so downstream persistence is never blocked.
    Zero,
    /// Surface `Unresolvable` to the caller.
    Fail,
}

impl Default for UnpricedTokenPolicy {
    fn default() -> Self {
        UnpricedTokenPolicy::Zero
    }
}

#[derive(Debug, Clone)]
pub struct PriceServiceConfig {
    pub native_coin_ttl: Duration,
    pub token_eth_value_ttl: Duration,
    pub pool_token_ttl: Duration,
    pub underlying_tokens_ttl: Duration,
    /// Backend retention for stale fallback. `None` keeps values until overwritten.
    pub stale_retention: Option<Duration>,
    pub max_depth: usize,
    pub unpriced_token_policy: UnpricedTokenPolicy,
}

impl Default for PriceServiceConfig {
    fn default() -> Self {
        Self {
            native_coin_ttl: Duration::from_secs(30),
            token_eth_value_ttl: Duration::from_secs(30 * 60),
            pool_token_ttl: Duration::from_secs(30 * 60),
            underlying_tokens_ttl: Duration::from_secs(6 * 60 * 60),
            stale_retention: None,
            max_depth: DEFAULT_MAX_DEPTH,
            unpriced_token_policy: UnpricedTokenPolicy::default(),
        }
    }
}

impl From<&Settings> for PriceServiceConfig {
    fn from(settings: &Settings) -> Self {
        let cache = &settings.cache;
        Self {
            native_coin_ttl: Duration::from_secs(cache.native_coin_ttl_seconds),
            token_eth_value_ttl: Duration::from_secs(cache.token_eth_value_ttl_seconds),
            pool_token_ttl: Duration::from_secs(cache.pool_token_ttl_seconds),
            underlying_tokens_ttl: Duration::from_secs(cache.underlying_tokens_ttl_seconds),
            stale_retention: cache.stale_retention_seconds.map(Duration::from_secs),
            max_depth: settings.composed.max_depth,
            unpriced_token_policy: settings.unpriced_token_policy,
        }
    }
}

/// Price resolution for one network.
///
/// Cheap to share behind an `Arc`; all methods take `&self` and the only mutable state
/// lives in the cache backend.
pub struct PriceService {
    network: Network,
    oracles: Arc<NetworkOracles>,
    composed: ComposedResolver,
    native_coin_cache: PriceCache<f64>,
    token_cache: PriceCache<f64>,
    pool_token_cache: PriceCache<f64>,
    underlying_cache: PriceCache<Vec<UnderlyingToken>>,
    policy: UnpricedTokenPolicy,
}

impl std::fmt::Debug for PriceService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PriceService")
            .field("network", &self.network)
            .field("oracles", &self.oracles)
            .field("composed", &self.composed)
            .field("policy", &self.policy)
            .finish()
    }
}

fn deadline_after(budget: Duration) -> Option<Instant> {
    Some(Instant::now() + budget)
}

impl PriceService {
    pub fn new(
        network: Network,
        registry: &OracleRegistry,
        backend: Arc<dyn CacheBackend>,
        config: PriceServiceConfig,
    ) -> Self {
        let oracles = registry.get(network).unwrap_or_else(|| {
            warn!("No oracles registered for {}, every chain is empty", network);
            Arc::new(NetworkOracles::empty())
        });
        let composed = ComposedResolver::new(oracles.composed.clone(), config.max_depth);
        let namespace = |base: &str| format!("{}:{}", base, network);

        let native_coin_cache = PriceCache::new(
            "native_coin_usd",
            namespace(NATIVE_COIN_USD_NAMESPACE),
            Arc::clone(&backend),
            config.native_coin_ttl,
        );
        let token_cache = PriceCache::new(
            "token_eth_value",
            namespace(TOKEN_ETH_VALUE_NAMESPACE),
            Arc::clone(&backend),
            config.token_eth_value_ttl,
        );
        let pool_token_cache = PriceCache::new(
            "pool_token_eth_value",
            namespace(POOL_TOKEN_ETH_VALUE_NAMESPACE),
            Arc::clone(&backend),
            config.pool_token_ttl,
        );
        let underlying_cache = PriceCache::new(
            "underlying_tokens",
            namespace(UNDERLYING_TOKENS_NAMESPACE),
            backend,
            config.underlying_tokens_ttl,
        );

        info!(
            "Price service for {}: native coin {:?}, token {:?}, pool token {:?}, composed {:?}",
            network,
            oracles.native_coin.names(),
            oracles.token.names(),
            oracles.pool_token.names(),
            composed.names()
        );

        Self {
            network,
            oracles,
            composed,
            native_coin_cache: native_coin_cache.with_retention(config.stale_retention),
            token_cache: token_cache.with_retention(config.stale_retention),
            pool_token_cache: pool_token_cache.with_retention(config.stale_retention),
            underlying_cache: underlying_cache.with_retention(config.stale_retention),
            policy: config.unpriced_token_policy,
        }
    }

    pub fn network(&self) -> Network {
        self.network
    }

    pub fn unpriced_token_policy(&self) -> UnpricedTokenPolicy {
        self.policy
    }

    pub fn enabled_native_coin_oracles(&self) -> &OracleChain {
        &self.oracles.native_coin
    }

    pub fn enabled_price_oracles(&self) -> &OracleChain {
        &self.oracles.token
    }

    pub fn enabled_price_pool_oracles(&self) -> &OracleChain {
        &self.oracles.pool_token
    }

    pub fn enabled_composed_price_oracles(&self) -> &[Arc<dyn UnderlyingTokenSource>] {
        self.composed.sources()
    }

    // ==================== NATIVE COIN ====================

    /// USD price of the network's native coin.
    pub async fn get_native_coin_usd_price(&self) -> Result<f64, PriceServiceError> {
        self.native_coin_usd(None).await.map(|r| r.value)
    }

    pub async fn get_native_coin_usd_price_within(
        &self,
        budget: Duration,
    ) -> Result<f64, PriceServiceError> {
        self.native_coin_usd(deadline_after(budget)).await.map(|r| r.value)
    }

    async fn native_coin_usd(
        &self,
        deadline: Option<Instant>,
    ) -> Result<Resolved<f64>, PriceServiceError> {
        let query = PriceQuery::native_coin_usd();
        self.native_coin_cache
            .get_or_compute(&query.cache_key(), || {
                self.oracles.native_coin.resolve(&PriceAsset::NativeCoin, deadline)
            })
            .await
            .map_err(|source| {
                warn!("{}: {}", self.network, source);
                metrics::increment_unresolvable(PriceCategory::NativeCoin.as_str());
                PriceServiceError::Unresolvable { query, source }
            })
    }

    // ==================== TOKENS ====================

    /// Value of one unit of `token` in the native coin.
    pub async fn get_token_eth_value(&self, token: Address) -> Result<f64, PriceServiceError> {
        self.token_eth_value(token, None).await.map(|r| r.value)
    }

    pub async fn get_token_eth_value_within(
        &self,
        token: Address,
        budget: Duration,
    ) -> Result<f64, PriceServiceError> {
        self.token_eth_value(token, deadline_after(budget))
            .await
            .map(|r| r.value)
    }

    /// Native coin value of `token` with the time it was computed.
    pub async fn get_token_eth_value_with_timestamp(
        &self,
        token: Address,
    ) -> Result<EthValueWithTimestamp, PriceServiceError> {
        self.token_eth_value(token, None)
            .await
            .map(|r| with_timestamp(token, r))
    }

    /// Timestamped values for `tokens`, resolved concurrently, in input order.
    ///
    /// Tokens that fail under [`UnpricedTokenPolicy::Fail`] are left out.
    pub async fn get_cached_token_eth_values(&self, tokens: &[Address]) -> Vec<EthValueWithTimestamp> {
        let results = join_all(tokens.iter().map(|token| self.token_eth_value(*token, None))).await;
        tokens
            .iter()
            .zip(results)
            .filter_map(|(token, result)| match result {
                Ok(resolved) => Some(with_timestamp(*token, resolved)),
                Err(err) => {
                    debug!("Leaving {:?} out of cached values: {}", token, err);
                    None
                }
            })
            .collect()
    }

    /// USD price of `token`: its native coin value times the native coin USD price.
    pub async fn get_token_usd_price(&self, token: Address) -> Result<f64, PriceServiceError> {
        self.token_usd_price(token, None).await
    }

    pub async fn get_token_usd_price_within(
        &self,
        token: Address,
        budget: Duration,
    ) -> Result<f64, PriceServiceError> {
        self.token_usd_price(token, deadline_after(budget)).await
    }

    async fn token_usd_price(
        &self,
        token: Address,
        deadline: Option<Instant>,
    ) -> Result<f64, PriceServiceError> {
        let (eth_value, native_usd) = tokio::try_join!(
            self.token_eth_value(token, deadline),
            self.native_coin_usd(deadline)
        )?;
        Ok(eth_value.value * native_usd.value)
    }

    async fn token_eth_value(
        &self,
        token: Address,
        deadline: Option<Instant>,
    ) -> Result<Resolved<f64>, PriceServiceError> {
        let query = PriceQuery::token_eth(token);
        match self.cached_token_eth_value(token, Vec::new(), deadline).await {
            Ok(resolved) => Ok(resolved),
            Err(source) => self.unpriced(&self.token_cache, query, source).await,
        }
    }

    /// Cached token lookup used at every level of composed recursion.
    ///
    /// Boxed because composed resolution re-enters it for each underlying token.
    fn cached_token_eth_value<'a>(
        &'a self,
        token: Address,
        path: Vec<Address>,
        deadline: Option<Instant>,
    ) -> BoxFuture<'a, Result<Resolved<f64>, ResolverError>> {
        async move {
            let key = PriceQuery::token_eth(token).cache_key();
            self.token_cache
                .get_or_compute_with(&key, || self.compute_token_eth_value(token, path, deadline))
                .await
        }
        .boxed()
    }

    /// Direct chain, then pool chain, then the basket. Only a basket valuation cut short
    /// by the path is partial.
    async fn compute_token_eth_value(
        &self,
        token: Address,
        path: Vec<Address>,
        deadline: Option<Instant>,
    ) -> Result<Computed<f64>, ResolverError> {
        let direct = match self
            .oracles
            .token
            .resolve(&PriceAsset::Token(token), deadline)
            .await
        {
            Ok(price) => return Ok(Computed::Complete(price)),
            Err(err) => err,
        };
        let pools = match self
            .oracles
            .pool_token
            .resolve(&PriceAsset::PoolToken(token), deadline)
            .await
        {
            Ok(price) => return Ok(Computed::Complete(price)),
            Err(err) => err,
        };
        match self.composed_eth_value(token, &path, deadline).await {
            Ok(valuation) if valuation.partial => Ok(Computed::Partial(valuation.value)),
            Ok(valuation) => Ok(Computed::Complete(valuation.value)),
            Err(composed) => Err(direct.merge(pools).merge(composed)),
        }
    }

    // ==================== POOL TOKENS ====================

    /// Native coin value of one LP share of `pool`.
    pub async fn get_pool_token_eth_value(&self, pool: Address) -> Result<f64, PriceServiceError> {
        self.pool_token_eth_value(pool, None).await.map(|r| r.value)
    }

    pub async fn get_pool_token_eth_value_within(
        &self,
        pool: Address,
        budget: Duration,
    ) -> Result<f64, PriceServiceError> {
        self.pool_token_eth_value(pool, deadline_after(budget))
            .await
            .map(|r| r.value)
    }

    async fn pool_token_eth_value(
        &self,
        pool: Address,
        deadline: Option<Instant>,
    ) -> Result<Resolved<f64>, PriceServiceError> {
        let query = PriceQuery::pool_token_eth(pool);
        let asset = PriceAsset::PoolToken(pool);
        let result = self
            .pool_token_cache
            .get_or_compute(&query.cache_key(), || {
                self.oracles.pool_token.resolve(&asset, deadline)
            })
            .await;
        match result {
            Ok(resolved) => Ok(resolved),
            Err(source) => self.unpriced(&self.pool_token_cache, query, source).await,
        }
    }

    // ==================== COMPOSED ====================

    /// Weighted value of `token`'s underlying basket. Never fails: an unknown basket,
    /// an exceeded depth or unpriced constituents all degrade toward 0.0.
    pub async fn get_token_eth_price_from_composed_oracles(&self, token: Address) -> f64 {
        match self.composed_eth_value(token, &[], None).await {
            Ok(valuation) => valuation.value,
            Err(err) => {
                debug!("No composed price for {:?}: {}", token, err);
                0.0
            }
        }
    }

    /// Cached basket behind `token`.
    pub async fn get_underlying_tokens(
        &self,
        token: Address,
    ) -> Result<Vec<UnderlyingToken>, PriceServiceError> {
        self.cached_underlyings(token)
            .await
            .map(|r| r.value)
            .map_err(|source| PriceServiceError::Unresolvable {
                query: PriceQuery::token_eth(token),
                source,
            })
    }

    async fn cached_underlyings(
        &self,
        token: Address,
    ) -> Result<Resolved<Vec<UnderlyingToken>>, ResolverError> {
        self.underlying_cache
            .get_or_compute(&address_to_string(token), || self.composed.lookup_underlyings(token))
            .await
    }

    /// A token nested below the depth bound values at a partial 0.0. Only a top-level
    /// query with no depth allowed at all is an error.
    async fn composed_eth_value(
        &self,
        token: Address,
        path: &[Address],
        deadline: Option<Instant>,
    ) -> Result<Valuation, ResolverError> {
        if self.composed.is_empty() {
            return Err(ResolverError::exhausted(PriceCategory::Composed, Vec::new()));
        }
        if !self.composed.can_descend(path) {
            if !path.is_empty() {
                debug!(
                    "Not decomposing {:?}: maximum depth {} reached",
                    token,
                    self.composed.max_depth()
                );
                return Ok(Valuation::partial(0.0));
            }
            warn!("Composed pricing of {:?} is disabled (maximum depth 0)", token);
            return Err(ResolverError::exhausted(
                PriceCategory::Composed,
                vec![SourceFailure {
                    adapter: "composed".to_string(),
                    reason: format!("maximum depth {} reached", self.composed.max_depth()),
                }],
            ));
        }

        let underlyings = self.cached_underlyings(token).await?;
        let valuation = self
            .composed
            .combine(token, &underlyings.value, path, |underlying, child_path| {
                self.cached_token_eth_value(underlying, child_path, deadline)
                    .map(|result| {
                        result.map(|resolved| Valuation {
                            value: resolved.value,
                            partial: resolved.state == PriceState::Partial,
                        })
                    })
                    .boxed()
            })
            .await;
        Ok(valuation)
    }

    // ==================== ANY QUERY ====================

    pub async fn get_price(&self, query: PriceQuery) -> Result<f64, PriceServiceError> {
        self.price(query, None).await
    }

    pub async fn get_price_within(
        &self,
        query: PriceQuery,
        budget: Duration,
    ) -> Result<f64, PriceServiceError> {
        self.price(query, deadline_after(budget)).await
    }

    async fn price(
        &self,
        query: PriceQuery,
        deadline: Option<Instant>,
    ) -> Result<f64, PriceServiceError> {
        match (query.asset, query.currency) {
            (PriceAsset::NativeCoin, Currency::Eth) => Ok(1.0),
            (PriceAsset::NativeCoin, Currency::Usd) => {
                self.native_coin_usd(deadline).await.map(|r| r.value)
            }
            (PriceAsset::Token(token), Currency::Eth) => {
                self.token_eth_value(token, deadline).await.map(|r| r.value)
            }
            (PriceAsset::Token(token), Currency::Usd) => self.token_usd_price(token, deadline).await,
            (PriceAsset::PoolToken(pool), Currency::Eth) => {
                self.pool_token_eth_value(pool, deadline).await.map(|r| r.value)
            }
            (PriceAsset::PoolToken(pool), Currency::Usd) => {
                let (share, native_usd) = tokio::try_join!(
                    self.pool_token_eth_value(pool, deadline),
                    self.native_coin_usd(deadline)
                )?;
                Ok(share.value * native_usd.value)
            }
        }
    }

    // ==================== CACHE ADMIN ====================

    pub async fn clear_native_coin_usd_price_cache(&self) {
        self.native_coin_cache.clear(None).await;
    }

    /// Invalidate one token, or every token when `token` is `None`.
    pub async fn clear_token_eth_value_cache(&self, token: Option<Address>) {
        let key = token.map(|t| PriceQuery::token_eth(t).cache_key());
        self.token_cache.clear(key.as_deref()).await;
    }

    pub async fn clear_pool_token_eth_value_cache(&self, pool: Option<Address>) {
        let key = pool.map(|p| PriceQuery::pool_token_eth(p).cache_key());
        self.pool_token_cache.clear(key.as_deref()).await;
    }

    pub async fn clear_underlying_tokens_cache(&self, token: Option<Address>) {
        let key = token.map(address_to_string);
        self.underlying_cache.clear(key.as_deref()).await;
    }

    pub async fn clear_all_caches(&self) {
        tokio::join!(
            self.native_coin_cache.clear(None),
            self.token_cache.clear(None),
            self.pool_token_cache.clear(None),
            self.underlying_cache.clear(None),
        );
    }

    /// Live resolution and stale fallback both failed.
    async fn unpriced(
        &self,
        cache: &PriceCache<f64>,
        query: PriceQuery,
        source: ResolverError,
    ) -> Result<Resolved<f64>, PriceServiceError> {
        metrics::increment_unresolvable(query.asset.category().as_str());
        match self.policy {
            UnpricedTokenPolicy::Zero => {
                warn!("{}: cannot price {}, storing 0.0: {}", self.network, query, source);
                let entry = cache.insert_placeholder(&query.cache_key(), 0.0).await;
                Ok(Resolved {
                    value: entry.value,
                    computed_at: entry.inserted_at,
                    state: PriceState::Unpriced,
                })
            }
            UnpricedTokenPolicy::Fail => {
                warn!("{}: cannot price {}: {}", self.network, query, source);
                Err(PriceServiceError::Unresolvable { query, source })
            }
        }
    }
}

fn with_timestamp(address: Address, resolved: Resolved<f64>) -> EthValueWithTimestamp {
    EthValueWithTimestamp {
        address,
        eth_value: resolved.value,
        timestamp: resolved.computed_at,
        state: resolved.state,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_from_settings() {
        let mut settings = Settings::default();
        settings.cache.native_coin_ttl_seconds = 5;
        settings.cache.stale_retention_seconds = Some(3_600);
        settings.composed.max_depth = 1;
        settings.unpriced_token_policy = UnpricedTokenPolicy::Fail;

        let config = PriceServiceConfig::from(&settings);
        assert_eq!(config.native_coin_ttl, Duration::from_secs(5));
        assert_eq!(config.token_eth_value_ttl, Duration::from_secs(1_800));
        assert_eq!(config.stale_retention, Some(Duration::from_secs(3_600)));
        assert_eq!(config.max_depth, 1);
        assert_eq!(config.unpriced_token_policy, UnpricedTokenPolicy::Fail);
    }

    #[tokio::test]
    async fn unregistered_network_has_empty_chains() {
        let service = PriceService::new(
            Network::Sepolia,
            &OracleRegistry::default(),
            Arc::new(crate::cache_backend::InMemoryBackend::default()),
            PriceServiceConfig::default(),
        );
        assert!(service.enabled_native_coin_oracles().is_empty());
        assert!(service.enabled_price_oracles().is_empty());
        assert!(service.enabled_composed_price_oracles().is_empty());
        assert!(service.get_native_coin_usd_price().await.is_err());
        let native_in_eth = PriceQuery::new(PriceAsset::NativeCoin, Currency::Eth);
        assert_eq!(service.get_price(native_in_eth).await.unwrap(), 1.0);
    }
}
