use config::{Config, ConfigError, File, FileFormat};
use ethers::types::Address;
use serde::Deserialize;
use std::collections::HashMap;
use std::env;
use std::path::Path;
use std::time::Duration;

use crate::errors::SetupError;
use crate::networks::{Network, OracleSelection};
use crate::oracle_registry::AdapterKind;
use crate::price_service::UnpricedTokenPolicy;
use crate::types::conversions::string_to_address;
use crate::types::UnderlyingToken;

fn default_network() -> String {
    "mainnet".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct Http {
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
    #[serde(default)]
    pub kraken_url: Option<String>,
    #[serde(default)]
    pub kucoin_url: Option<String>,
    #[serde(default)]
    pub binance_url: Option<String>,
    #[serde(default)]
    pub coingecko_url: Option<String>,
    #[serde(default)]
    pub coingecko_api_key: Option<String>,
}

fn default_request_timeout_ms() -> u64 {
    2_000
}

impl Default for Http {
    fn default() -> Self {
        Self {
            request_timeout_ms: default_request_timeout_ms(),
            kraken_url: None,
            kucoin_url: None,
            binance_url: None,
            coingecko_url: None,
            coingecko_api_key: None,
        }
    }
}

impl Http {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms.max(1))
    }
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CacheBackendKind {
    Memory,
    Redis,
}

impl Default for CacheBackendKind {
    fn default() -> Self {
        CacheBackendKind::Memory
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct Cache {
    #[serde(default)]
    pub backend: CacheBackendKind,
    #[serde(default = "default_redis_url")]
    pub redis_url: String,
    #[serde(default = "default_native_coin_ttl_seconds")]
    pub native_coin_ttl_seconds: u64,
    #[serde(default = "default_token_eth_value_ttl_seconds")]
    pub token_eth_value_ttl_seconds: u64,
    #[serde(default = "default_token_eth_value_ttl_seconds")]
    pub pool_token_ttl_seconds: u64,
    #[serde(default = "default_underlying_tokens_ttl_seconds")]
    pub underlying_tokens_ttl_seconds: u64,
    /// How long values are retained for stale fallback. Unset keeps them indefinitely.
    #[serde(default)]
    pub stale_retention_seconds: Option<u64>,
    #[serde(default = "default_max_entries")]
    pub max_entries: usize,
}

fn default_redis_url() -> String {
    "redis://localhost:6379".to_string()
}
fn default_native_coin_ttl_seconds() -> u64 {
    30
}
fn default_token_eth_value_ttl_seconds() -> u64 {
    30 * 60
}
fn default_underlying_tokens_ttl_seconds() -> u64 {
    6 * 60 * 60
}
fn default_max_entries() -> usize {
    4_096
}

impl Default for Cache {
    fn default() -> Self {
        Self {
            backend: CacheBackendKind::default(),
            redis_url: default_redis_url(),
            native_coin_ttl_seconds: default_native_coin_ttl_seconds(),
            token_eth_value_ttl_seconds: default_token_eth_value_ttl_seconds(),
            pool_token_ttl_seconds: default_token_eth_value_ttl_seconds(),
            underlying_tokens_ttl_seconds: default_underlying_tokens_ttl_seconds(),
            stale_retention_seconds: None,
            max_entries: default_max_entries(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct Composed {
    #[serde(default = "default_max_depth")]
    pub max_depth: usize,
}

fn default_max_depth() -> usize {
    crate::composed_oracle::DEFAULT_MAX_DEPTH
}

impl Default for Composed {
    fn default() -> Self {
        Self {
            max_depth: default_max_depth(),
        }
    }
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Chain {
    #[serde(default)]
    pub rpc_url: Option<String>,
}

/// Per-network override of the default adapter selection. Omitted categories keep
/// their defaults; an empty list disables the category.
#[derive(Debug, Deserialize, Clone, Default)]
pub struct OracleOverrides {
    #[serde(default)]
    pub native_coin: Option<Vec<String>>,
    #[serde(default)]
    pub token: Option<Vec<String>>,
    #[serde(default)]
    pub pool_token: Option<Vec<String>>,
    #[serde(default)]
    pub composed: Option<Vec<String>>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct BasketEntry {
    pub address: String,
    pub weight: f64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct Settings {
    #[serde(default = "default_network")]
    pub network: String,
    #[serde(default)]
    pub unpriced_token_policy: UnpricedTokenPolicy,
    #[serde(default)]
    pub http: Http,
    #[serde(default)]
    pub cache: Cache,
    #[serde(default)]
    pub composed: Composed,
    #[serde(default)]
    pub chain: Chain,
    /// network -> token -> TOKEN/ETH aggregator
    #[serde(default)]
    pub chainlink_aggregators: HashMap<String, HashMap<String, String>>,
    /// network -> composed token -> basket
    #[serde(default)]
    pub baskets: HashMap<String, HashMap<String, Vec<BasketEntry>>>,
    #[serde(default)]
    pub oracles: HashMap<String, OracleOverrides>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            network: default_network(),
            unpriced_token_policy: UnpricedTokenPolicy::default(),
            http: Http::default(),
            cache: Cache::default(),
            composed: Composed::default(),
            chain: Chain::default(),
            chainlink_aggregators: HashMap::new(),
            baskets: HashMap::new(),
            oracles: HashMap::new(),
        }
    }
}

impl Settings {
    /// `Config.toml` in the working directory (optional) plus env overrides.
    pub fn new() -> Result<Self, ConfigError> {
        let s = Config::builder()
            .add_source(File::with_name("Config.toml").required(false))
            .build()?;

        let mut settings: Self = s.try_deserialize()?;
        settings.apply_overrides(|key| env::var(key).ok());
        Ok(settings)
    }

    /// A specific settings file (must exist) plus env overrides.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let s = Config::builder()
            .add_source(File::from(path.as_ref()))
            .build()?;

        let mut settings: Self = s.try_deserialize()?;
        settings.apply_overrides(|key| env::var(key).ok());
        Ok(settings)
    }

    /// Inline TOML, without env overrides.
    pub fn from_toml_str(toml: &str) -> Result<Self, ConfigError> {
        Config::builder()
            .add_source(File::from_str(toml, FileFormat::Toml))
            .build()?
            .try_deserialize()
    }

    /// Apply `PRICE_SDK_*` overrides read through `lookup`. Blank values are ignored.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        if let Some(network) = get("PRICE_SDK_NETWORK") {
            self.network = network;
        }
        if let Some(rpc_url) = get("PRICE_SDK_RPC_URL") {
            self.chain.rpc_url = Some(rpc_url);
        }
        if let Some(redis_url) = get("PRICE_SDK_REDIS_URL") {
            self.cache.redis_url = redis_url;
            self.cache.backend = CacheBackendKind::Redis;
        }
        if let Some(api_key) = get("PRICE_SDK_COINGECKO_API_KEY") {
            self.http.coingecko_api_key = Some(api_key);
        }
    }

    pub fn network(&self) -> Result<Network, SetupError> {
        self.network.parse()
    }

    /// Adapter selection for `network`: defaults with per-category overrides.
    pub fn oracle_selection(&self, network: Network) -> Result<OracleSelection, SetupError> {
        let mut selection = network.default_oracle_selection();
        let Some(overrides) = self.section_for(&self.oracles, network)? else {
            return Ok(selection);
        };

        let parse = |kinds: &Vec<String>| -> Result<Vec<AdapterKind>, SetupError> {
            kinds.iter().map(|kind| kind.parse()).collect()
        };
        if let Some(kinds) = &overrides.native_coin {
            selection.native_coin = parse(kinds)?;
        }
        if let Some(kinds) = &overrides.token {
            selection.token = parse(kinds)?;
        }
        if let Some(kinds) = &overrides.pool_token {
            selection.pool_token = parse(kinds)?;
        }
        if let Some(kinds) = &overrides.composed {
            selection.composed = parse(kinds)?;
        }
        Ok(selection)
    }

    pub fn chainlink_aggregators_for(
        &self,
        network: Network,
    ) -> Result<HashMap<Address, Address>, SetupError> {
        let Some(feeds) = self.section_for(&self.chainlink_aggregators, network)? else {
            return Ok(HashMap::new());
        };
        feeds
            .iter()
            .map(|(token, aggregator)| -> Result<(Address, Address), SetupError> {
                Ok((string_to_address(token)?, string_to_address(aggregator)?))
            })
            .collect()
    }

    pub fn baskets_for(
        &self,
        network: Network,
    ) -> Result<HashMap<Address, Vec<UnderlyingToken>>, SetupError> {
        let Some(baskets) = self.section_for(&self.baskets, network)? else {
            return Ok(HashMap::new());
        };
        baskets
            .iter()
            .map(|(token, entries)| -> Result<(Address, Vec<UnderlyingToken>), SetupError> {
                let underlyings = entries
                    .iter()
                    .map(|entry| -> Result<UnderlyingToken, SetupError> {
                        Ok(UnderlyingToken::new(
                            string_to_address(&entry.address)?,
                            entry.weight,
                        ))
                    })
                    .collect::<Result<Vec<_>, SetupError>>()?;
                Ok((string_to_address(token)?, underlyings))
            })
            .collect()
    }

    /// Entry of a network-keyed table. Keys may be any accepted network spelling.
    fn section_for<'a, T>(
        &self,
        table: &'a HashMap<String, T>,
        network: Network,
    ) -> Result<Option<&'a T>, SetupError> {
        for (key, value) in table {
            if key.parse::<Network>()? == network {
                return Ok(Some(value));
            }
        }
        Ok(None)
    }
}
