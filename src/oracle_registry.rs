//! Immutable `network -> {category -> ordered adapters}` table.
//!
//! Built once at startup, either by hand (tests, embedders with their own adapters)
//! or from [`Settings`] via [`OracleRegistry::from_settings`]. A
//! [`crate::price_service::PriceService`] takes the entry for its network and never
//! mutates it.

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use crate::adapters::binance::BINANCE_BASE_URL;
use crate::adapters::coingecko::COINGECKO_BASE_URL;
use crate::adapters::http::build_client;
use crate::adapters::kraken::KRAKEN_BASE_URL;
use crate::adapters::kucoin::KUCOIN_BASE_URL;
use crate::adapters::{
    BinanceAdapter, ChainlinkAdapter, CoinGeckoAdapter, HttpSource, KrakenAdapter, KucoinAdapter,
    StaticBasketSource, UniswapV2Adapter,
};
use crate::chain_state::ChainState;
use crate::errors::SetupError;
use crate::networks::{Network, ALL_NETWORKS};
use crate::oracle_chain::OracleChain;
use crate::price_adapter::{PriceAdapter, UnderlyingTokenSource};
use crate::settings::Settings;
use crate::types::conversions::string_to_address;
use crate::types::PriceCategory;

/// Every adapter implementation that can be named in configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdapterKind {
    Kraken,
    Kucoin,
    Binance,
    Coingecko,
    UniswapV2,
    Sushiswap,
    Honeyswap,
    Quickswap,
    Chainlink,
    StaticBasket,
}

impl AdapterKind {
    pub fn name(&self) -> &'static str {
        match self {
            AdapterKind::Kraken => KrakenAdapter::NAME,
            AdapterKind::Kucoin => KucoinAdapter::NAME,
            AdapterKind::Binance => BinanceAdapter::NAME,
            AdapterKind::Coingecko => CoinGeckoAdapter::NAME,
            AdapterKind::UniswapV2 => "UniswapV2",
            AdapterKind::Sushiswap => "Sushiswap",
            AdapterKind::Honeyswap => "Honeyswap",
            AdapterKind::Quickswap => "Quickswap",
            AdapterKind::Chainlink => ChainlinkAdapter::NAME,
            AdapterKind::StaticBasket => StaticBasketSource::NAME,
        }
    }

    pub fn is_amm(&self) -> bool {
        matches!(
            self,
            AdapterKind::UniswapV2
                | AdapterKind::Sushiswap
                | AdapterKind::Honeyswap
                | AdapterKind::Quickswap
        )
    }

    /// Whether this kind can appear in a chain of `category`.
    pub fn serves(&self, category: PriceCategory) -> bool {
        use AdapterKind::*;
        match category {
            PriceCategory::NativeCoin => matches!(self, Kraken | Kucoin | Binance | Coingecko),
            PriceCategory::Token => self.is_amm() || matches!(self, Coingecko | Chainlink),
            PriceCategory::PoolToken => self.is_amm(),
            PriceCategory::Composed => self.is_amm() || matches!(self, StaticBasket),
        }
    }
}

impl fmt::Display for AdapterKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for AdapterKind {
    type Err = SetupError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized: String = s
            .trim()
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .collect::<String>()
            .to_lowercase();
        match normalized.as_str() {
            "kraken" => Ok(AdapterKind::Kraken),
            "kucoin" => Ok(AdapterKind::Kucoin),
            "binance" => Ok(AdapterKind::Binance),
            "coingecko" => Ok(AdapterKind::Coingecko),
            "uniswapv2" | "uniswap" => Ok(AdapterKind::UniswapV2),
            "sushiswap" | "sushi" => Ok(AdapterKind::Sushiswap),
            "honeyswap" => Ok(AdapterKind::Honeyswap),
            "quickswap" => Ok(AdapterKind::Quickswap),
            "chainlink" => Ok(AdapterKind::Chainlink),
            "staticbasket" | "basket" => Ok(AdapterKind::StaticBasket),
            _ => Err(SetupError::UnknownAdapter(s.to_string())),
        }
    }
}

/// The four adapter lists of one network.
#[derive(Clone)]
pub struct NetworkOracles {
    pub native_coin: OracleChain,
    pub token: OracleChain,
    pub pool_token: OracleChain,
    pub composed: Vec<Arc<dyn UnderlyingTokenSource>>,
}

impl fmt::Debug for NetworkOracles {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NetworkOracles")
            .field("native_coin", &self.native_coin.names())
            .field("token", &self.token.names())
            .field("pool_token", &self.pool_token.names())
            .field(
                "composed",
                &self.composed.iter().map(|s| s.name()).collect::<Vec<_>>(),
            )
            .finish()
    }
}

impl Default for NetworkOracles {
    fn default() -> Self {
        Self::empty()
    }
}

impl NetworkOracles {
    pub fn empty() -> Self {
        Self {
            native_coin: OracleChain::empty(PriceCategory::NativeCoin),
            token: OracleChain::empty(PriceCategory::Token),
            pool_token: OracleChain::empty(PriceCategory::PoolToken),
            composed: Vec::new(),
        }
    }

    pub fn with_native_coin(mut self, adapters: Vec<Arc<dyn PriceAdapter>>) -> Self {
        self.native_coin = OracleChain::new(PriceCategory::NativeCoin, adapters);
        self
    }

    pub fn with_token(mut self, adapters: Vec<Arc<dyn PriceAdapter>>) -> Self {
        self.token = OracleChain::new(PriceCategory::Token, adapters);
        self
    }

    pub fn with_pool_token(mut self, adapters: Vec<Arc<dyn PriceAdapter>>) -> Self {
        self.pool_token = OracleChain::new(PriceCategory::PoolToken, adapters);
        self
    }

    pub fn with_composed(mut self, sources: Vec<Arc<dyn UnderlyingTokenSource>>) -> Self {
        self.composed = sources;
        self
    }
}

#[derive(Debug, Clone, Default)]
pub struct OracleRegistry {
    networks: HashMap<Network, Arc<NetworkOracles>>,
}

#[derive(Debug, Default)]
pub struct OracleRegistryBuilder {
    networks: HashMap<Network, Arc<NetworkOracles>>,
}

impl OracleRegistryBuilder {
    pub fn network(mut self, network: Network, oracles: NetworkOracles) -> Self {
        self.networks.insert(network, Arc::new(oracles));
        self
    }

    pub fn build(self) -> OracleRegistry {
        OracleRegistry {
            networks: self.networks,
        }
    }
}

impl OracleRegistry {
    pub fn builder() -> OracleRegistryBuilder {
        OracleRegistryBuilder::default()
    }

    pub fn get(&self, network: Network) -> Option<Arc<NetworkOracles>> {
        self.networks.get(&network).cloned()
    }

    pub fn networks(&self) -> impl Iterator<Item = Network> + '_ {
        self.networks.keys().copied()
    }

    /// Registry for every known network.
    ///
    /// On-chain adapters (AMMs, Chainlink) are attached only for networks present in
    /// `chain_states`; elsewhere they are skipped. HTTP adapters share one client.
    pub fn from_settings(
        settings: &Settings,
        chain_states: &HashMap<Network, Arc<dyn ChainState>>,
    ) -> Result<Self, SetupError> {
        let timeout = settings.http.request_timeout();
        let client = build_client(timeout)?;
        let mut builder = Self::builder();

        for network in ALL_NETWORKS {
            let factory = AdapterFactory {
                network,
                settings,
                client: client.clone(),
                chain: chain_states.get(&network).cloned(),
                timeout,
            };
            let oracles = factory.network_oracles()?;
            debug!("{} oracles: {:?}", network, oracles);
            builder = builder.network(network, oracles);
        }

        let registry = builder.build();
        info!("Oracle registry built for {} networks", registry.networks.len());
        Ok(registry)
    }
}

struct AdapterFactory<'a> {
    network: Network,
    settings: &'a Settings,
    client: reqwest::Client,
    chain: Option<Arc<dyn ChainState>>,
    timeout: Duration,
}

impl AdapterFactory<'_> {
    fn network_oracles(&self) -> Result<NetworkOracles, SetupError> {
        let selection = self.settings.oracle_selection(self.network)?;
        Ok(NetworkOracles::empty()
            .with_native_coin(self.chain_of(PriceCategory::NativeCoin, &selection.native_coin)?)
            .with_token(self.chain_of(PriceCategory::Token, &selection.token)?)
            .with_pool_token(self.chain_of(PriceCategory::PoolToken, &selection.pool_token)?)
            .with_composed(self.sources_of(&selection.composed)?))
    }

    fn chain_of(
        &self,
        category: PriceCategory,
        kinds: &[AdapterKind],
    ) -> Result<Vec<Arc<dyn PriceAdapter>>, SetupError> {
        let mut adapters = Vec::with_capacity(kinds.len());
        for kind in kinds {
            if !kind.serves(category) {
                warn!("{}: {} cannot serve {} prices, skipping", self.network, kind, category);
                continue;
            }
            if let Some(adapter) = self.build_adapter(*kind, category)? {
                adapters.push(adapter);
            }
        }
        Ok(adapters)
    }

    fn sources_of(
        &self,
        kinds: &[AdapterKind],
    ) -> Result<Vec<Arc<dyn UnderlyingTokenSource>>, SetupError> {
        let mut sources: Vec<Arc<dyn UnderlyingTokenSource>> = Vec::with_capacity(kinds.len());
        for kind in kinds {
            if !kind.serves(PriceCategory::Composed) {
                warn!("{}: {} cannot supply baskets, skipping", self.network, kind);
                continue;
            }
            if *kind == AdapterKind::StaticBasket {
                let baskets = self.settings.baskets_for(self.network)?;
                if baskets.is_empty() {
                    debug!("{}: no baskets configured", self.network);
                    continue;
                }
                sources.push(Arc::new(StaticBasketSource::new(baskets)));
            } else if let Some(amm) = self.amm(*kind)? {
                sources.push(Arc::new(amm));
            }
        }
        Ok(sources)
    }

    fn http(&self, base_url: &str, configured: &Option<String>) -> Result<HttpSource, SetupError> {
        HttpSource::new(self.client.clone(), configured.as_deref().unwrap_or(base_url))
    }

    fn amm(&self, kind: AdapterKind) -> Result<Option<UniswapV2Adapter>, SetupError> {
        let Some(chain) = &self.chain else {
            debug!("{}: no chain state, skipping {}", self.network, kind);
            return Ok(None);
        };
        let (Some(factory), Some(wrapped)) =
            (self.network.amm_factory(kind), self.network.wrapped_native_address()?)
        else {
            debug!("{}: {} is not deployed, skipping", self.network, kind);
            return Ok(None);
        };
        Ok(Some(
            UniswapV2Adapter::new(kind.name(), string_to_address(factory)?, wrapped, Arc::clone(chain))
                .with_timeout(self.timeout),
        ))
    }

    fn build_adapter(
        &self,
        kind: AdapterKind,
        category: PriceCategory,
    ) -> Result<Option<Arc<dyn PriceAdapter>>, SetupError> {
        let http = &self.settings.http;
        let adapter: Arc<dyn PriceAdapter> = match kind {
            AdapterKind::Kraken => {
                let Some(pair) = self.network.kraken_pair() else {
                    debug!("{}: Kraken does not list the native coin", self.network);
                    return Ok(None);
                };
                Arc::new(KrakenAdapter::new(
                    self.http(KRAKEN_BASE_URL, &http.kraken_url)?,
                    pair,
                    self.timeout,
                ))
            }
            AdapterKind::Kucoin => Arc::new(KucoinAdapter::new(
                self.http(KUCOIN_BASE_URL, &http.kucoin_url)?,
                self.network.kucoin_symbol(),
                self.timeout,
            )),
            AdapterKind::Binance => Arc::new(BinanceAdapter::new(
                self.http(BINANCE_BASE_URL, &http.binance_url)?,
                self.network.binance_symbol(),
                self.timeout,
            )),
            AdapterKind::Coingecko => {
                let mut adapter = CoinGeckoAdapter::new(
                    self.http(COINGECKO_BASE_URL, &http.coingecko_url)?,
                    self.network.coingecko_coin_id(),
                    self.timeout,
                )
                .with_api_key(http.coingecko_api_key.clone());
                if category == PriceCategory::Token {
                    let (Some(platform), Some(vs_currency)) =
                        (self.network.coingecko_platform(), self.network.coingecko_vs_currency())
                    else {
                        debug!("{}: CoinGecko cannot quote tokens in the native coin", self.network);
                        return Ok(None);
                    };
                    adapter = adapter.with_token_pricing(platform, vs_currency);
                }
                Arc::new(adapter)
            }
            AdapterKind::Chainlink => {
                let Some(chain) = &self.chain else {
                    debug!("{}: no chain state, skipping Chainlink", self.network);
                    return Ok(None);
                };
                let aggregators = self.settings.chainlink_aggregators_for(self.network)?;
                if aggregators.is_empty() {
                    debug!("{}: no Chainlink aggregators configured", self.network);
                    return Ok(None);
                }
                Arc::new(
                    ChainlinkAdapter::new(aggregators, Arc::clone(chain)).with_timeout(self.timeout),
                )
            }
            AdapterKind::UniswapV2
            | AdapterKind::Sushiswap
            | AdapterKind::Honeyswap
            | AdapterKind::Quickswap => match self.amm(kind)? {
                Some(amm) => Arc::new(amm),
                None => return Ok(None),
            },
            AdapterKind::StaticBasket => return Ok(None),
        };
        Ok(Some(adapter))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn adapter_kinds_parse_loosely() {
        assert_eq!("uniswap_v2".parse::<AdapterKind>().unwrap(), AdapterKind::UniswapV2);
        assert_eq!("UniswapV2".parse::<AdapterKind>().unwrap(), AdapterKind::UniswapV2);
        assert_eq!("CoinGecko".parse::<AdapterKind>().unwrap(), AdapterKind::Coingecko);
        assert_eq!("static-basket".parse::<AdapterKind>().unwrap(), AdapterKind::StaticBasket);
        assert!("bitstamp".parse::<AdapterKind>().is_err());
    }

    #[test]
    fn categories_served() {
        assert!(AdapterKind::Kraken.serves(PriceCategory::NativeCoin));
        assert!(!AdapterKind::Kraken.serves(PriceCategory::Token));
        assert!(AdapterKind::Sushiswap.serves(PriceCategory::PoolToken));
        assert!(AdapterKind::StaticBasket.serves(PriceCategory::Composed));
        assert!(!AdapterKind::Chainlink.serves(PriceCategory::PoolToken));
    }

    #[test]
    fn default_settings_without_chain_state_only_build_http_adapters() {
        let settings = Settings::default();
        let registry = OracleRegistry::from_settings(&settings, &HashMap::new()).unwrap();

        let mainnet = registry.get(Network::Mainnet).unwrap();
        assert_eq!(mainnet.native_coin.names(), vec!["Kraken", "Kucoin"]);
        assert_eq!(mainnet.token.names(), vec!["CoinGecko"]);
        assert!(mainnet.pool_token.is_empty());
        assert!(mainnet.composed.is_empty());

        let localnet = registry.get(Network::Localnet).unwrap();
        assert_eq!(localnet.native_coin.names(), vec!["Kraken", "Kucoin"]);
        assert!(localnet.token.is_empty());

        // Kraken does not list BNB.
        let bsc = registry.get(Network::Bsc).unwrap();
        assert_eq!(bsc.native_coin.names(), vec!["Binance", "Kucoin", "CoinGecko"]);
    }
}
