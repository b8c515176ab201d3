//! Static per-network constants.
//!
//! Exchange symbols for the native coin, wrapped native tokens, AMM factories and the
//! default adapter selection per category. Settings may override the selection; the
//! constants themselves are fixed.

use ethers::types::Address;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::errors::SetupError;
use crate::oracle_registry::AdapterKind;
use crate::types::conversions::string_to_address;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Network {
    Mainnet,
    Sepolia,
    Gnosis,
    Polygon,
    Bsc,
    Avalanche,
    Arbitrum,
    Optimism,
    Base,
    /// Local development chain (Ganache, Anvil, Hardhat).
    Localnet,
}

pub const ALL_NETWORKS: [Network; 10] = [
    Network::Mainnet,
    Network::Sepolia,
    Network::Gnosis,
    Network::Polygon,
    Network::Bsc,
    Network::Avalanche,
    Network::Arbitrum,
    Network::Optimism,
    Network::Base,
    Network::Localnet,
];

const SUSHISWAP_MULTICHAIN_FACTORY: &str = "0xc35DADB65012eC5796536bD9864eD8773aBc74C4";

impl Network {
    pub fn as_str(&self) -> &'static str {
        match self {
            Network::Mainnet => "mainnet",
            Network::Sepolia => "sepolia",
            Network::Gnosis => "gnosis",
            Network::Polygon => "polygon",
            Network::Bsc => "bsc",
            Network::Avalanche => "avalanche",
            Network::Arbitrum => "arbitrum",
            Network::Optimism => "optimism",
            Network::Base => "base",
            Network::Localnet => "localnet",
        }
    }

    pub fn chain_id(&self) -> u64 {
        match self {
            Network::Mainnet => 1,
            Network::Sepolia => 11_155_111,
            Network::Gnosis => 100,
            Network::Polygon => 137,
            Network::Bsc => 56,
            Network::Avalanche => 43_114,
            Network::Arbitrum => 42_161,
            Network::Optimism => 10,
            Network::Base => 8_453,
            Network::Localnet => 1_337,
        }
    }

    pub fn from_chain_id(chain_id: u64) -> Option<Self> {
        ALL_NETWORKS.into_iter().find(|n| n.chain_id() == chain_id)
    }

    /// Kraken ticker pair for the native coin.
    pub fn kraken_pair(&self) -> Option<&'static str> {
        match self {
            Network::Gnosis => Some("DAIUSD"),
            Network::Polygon => Some("MATICUSD"),
            Network::Avalanche => Some("AVAXUSD"),
            Network::Bsc => None,
            _ => Some("ETHUSD"),
        }
    }

    /// Kucoin symbol for the native coin.
    pub fn kucoin_symbol(&self) -> &'static str {
        match self {
            Network::Gnosis => "DAI-USDT",
            Network::Polygon => "MATIC-USDT",
            Network::Bsc => "BNB-USDT",
            Network::Avalanche => "AVAX-USDT",
            _ => "ETH-USDT",
        }
    }

    /// Binance symbol for the native coin.
    pub fn binance_symbol(&self) -> &'static str {
        match self {
            Network::Gnosis => "DAIUSDT",
            Network::Polygon => "MATICUSDT",
            Network::Bsc => "BNBUSDT",
            Network::Avalanche => "AVAXUSDT",
            _ => "ETHUSDT",
        }
    }

    /// CoinGecko coin id of the native coin.
    pub fn coingecko_coin_id(&self) -> &'static str {
        match self {
            Network::Gnosis => "xdai",
            Network::Polygon => "matic-network",
            Network::Bsc => "binancecoin",
            Network::Avalanche => "avalanche-2",
            _ => "ethereum",
        }
    }

    /// CoinGecko asset platform for ERC20 lookups. Testnets have none.
    pub fn coingecko_platform(&self) -> Option<&'static str> {
        match self {
            Network::Mainnet => Some("ethereum"),
            Network::Gnosis => Some("xdai"),
            Network::Polygon => Some("polygon-pos"),
            Network::Bsc => Some("binance-smart-chain"),
            Network::Avalanche => Some("avalanche"),
            Network::Arbitrum => Some("arbitrum-one"),
            Network::Optimism => Some("optimistic-ethereum"),
            Network::Base => Some("base"),
            Network::Sepolia | Network::Localnet => None,
        }
    }

    /// CoinGecko `vs_currencies` value matching the native coin, where CoinGecko quotes it.
    pub fn coingecko_vs_currency(&self) -> Option<&'static str> {
        match self {
            Network::Mainnet | Network::Arbitrum | Network::Optimism | Network::Base => Some("eth"),
            Network::Bsc => Some("bnb"),
            _ => None,
        }
    }

    /// Wrapped native token that AMM prices are quoted against.
    pub fn wrapped_native_token(&self) -> Option<&'static str> {
        match self {
            Network::Mainnet => Some("0xC02aaA39b223FE8D0A0e5C4F27eAD9083C756Cc2"),
            Network::Gnosis => Some("0xe91D153E0b41518A2Ce8Dd3D7944Fa863463a97d"),
            Network::Polygon => Some("0x0d500B1d8E8eF31E21C99d1Db9A6444d3ADf1270"),
            Network::Bsc => Some("0xbb4CdB9CBd36B01bD1cBaEBF2De08d9173bc095c"),
            Network::Avalanche => Some("0xB31f66AA3C1e785363F0875A1B74E27b85FD66c7"),
            Network::Arbitrum => Some("0x82aF49447D8a07e3bd95BD0d56f35241523fBab1"),
            Network::Optimism | Network::Base => Some("0x4200000000000000000000000000000000000006"),
            Network::Sepolia | Network::Localnet => None,
        }
    }

    pub fn wrapped_native_address(&self) -> Result<Option<Address>, SetupError> {
        self.wrapped_native_token()
            .map(string_to_address)
            .transpose()
            .map_err(SetupError::from)
    }

    /// UniswapV2-style factory for `kind` on this network.
    pub fn amm_factory(&self, kind: AdapterKind) -> Option<&'static str> {
        match (kind, self) {
            (AdapterKind::UniswapV2, Network::Mainnet) => {
                Some("0x5C69bEe701ef814a2B6a3EDD4B1652CB9cc5aA6f")
            }
            (AdapterKind::Sushiswap, Network::Mainnet) => {
                Some("0xC0AEe478e3658e2610c5F7A4A2E1777cE9e4f2Ac")
            }
            (
                AdapterKind::Sushiswap,
                Network::Gnosis | Network::Polygon | Network::Arbitrum | Network::Avalanche,
            ) => Some(SUSHISWAP_MULTICHAIN_FACTORY),
            (AdapterKind::Honeyswap, Network::Gnosis) => {
                Some("0xA818b4F111Ccac7AA31D0BCc0806d64F2E0737D7")
            }
            (AdapterKind::Quickswap, Network::Polygon) => {
                Some("0x5757371414417b8C6CAad45bAeF941aBc7d3Ab32")
            }
            _ => None,
        }
    }

    /// Default ordered adapter selection, most trusted first.
    pub fn default_oracle_selection(&self) -> OracleSelection {
        use AdapterKind::*;

        let native_coin = match self {
            Network::Gnosis => vec![Kraken, Kucoin, Coingecko],
            Network::Polygon | Network::Avalanche => vec![Kraken, Binance, Kucoin, Coingecko],
            Network::Bsc => vec![Binance, Kucoin, Coingecko],
            _ => vec![Kraken, Kucoin],
        };

        let (token, pool_token, composed) = match self {
            Network::Mainnet => (
                vec![Chainlink, UniswapV2, Sushiswap, Coingecko],
                vec![UniswapV2, Sushiswap],
                vec![UniswapV2, Sushiswap, StaticBasket],
            ),
            Network::Gnosis => (
                vec![Honeyswap, Sushiswap],
                vec![Honeyswap, Sushiswap],
                vec![Honeyswap, Sushiswap, StaticBasket],
            ),
            Network::Polygon => (
                vec![Quickswap, Sushiswap],
                vec![Quickswap, Sushiswap],
                vec![Quickswap, Sushiswap, StaticBasket],
            ),
            Network::Arbitrum => (
                vec![Sushiswap, Coingecko],
                vec![Sushiswap],
                vec![Sushiswap, StaticBasket],
            ),
            Network::Avalanche => (vec![Sushiswap], vec![Sushiswap], vec![Sushiswap, StaticBasket]),
            Network::Bsc | Network::Optimism | Network::Base => {
                (vec![Coingecko], vec![], vec![StaticBasket])
            }
            Network::Sepolia | Network::Localnet => (vec![], vec![], vec![]),
        };

        OracleSelection {
            native_coin,
            token,
            pool_token,
            composed,
        }
    }
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Network {
    type Err = SetupError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_lowercase();
        if let Ok(chain_id) = normalized.parse::<u64>() {
            return Network::from_chain_id(chain_id)
                .ok_or_else(|| SetupError::UnknownNetwork(s.to_string()));
        }
        match normalized.as_str() {
            "ethereum" => Ok(Network::Mainnet),
            "xdai" => Ok(Network::Gnosis),
            "ganache" | "anvil" | "hardhat" => Ok(Network::Localnet),
            other => ALL_NETWORKS
                .into_iter()
                .find(|n| n.as_str() == other)
                .ok_or_else(|| SetupError::UnknownNetwork(s.to_string())),
        }
    }
}

/// Ordered adapter kinds per category for one network.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OracleSelection {
    pub native_coin: Vec<AdapterKind>,
    pub token: Vec<AdapterKind>,
    pub pool_token: Vec<AdapterKind>,
    pub composed: Vec<AdapterKind>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_names_aliases_and_chain_ids() {
        assert_eq!("Mainnet".parse::<Network>().unwrap(), Network::Mainnet);
        assert_eq!("xdai".parse::<Network>().unwrap(), Network::Gnosis);
        assert_eq!("ganache".parse::<Network>().unwrap(), Network::Localnet);
        assert_eq!("137".parse::<Network>().unwrap(), Network::Polygon);
        assert!("moonbeam".parse::<Network>().is_err());
    }

    #[test]
    fn localnet_only_prices_the_native_coin() {
        let selection = Network::Localnet.default_oracle_selection();
        assert_eq!(selection.native_coin, vec![AdapterKind::Kraken, AdapterKind::Kucoin]);
        assert!(selection.token.is_empty());
        assert!(selection.pool_token.is_empty());
        assert!(selection.composed.is_empty());
    }

    #[test]
    fn every_network_has_a_native_coin_chain() {
        for network in ALL_NETWORKS {
            assert!(!network.default_oracle_selection().native_coin.is_empty(), "{}", network);
        }
    }

    #[test]
    fn constants_are_valid_addresses() {
        for network in ALL_NETWORKS {
            assert!(network.wrapped_native_address().is_ok());
            for kind in [
                AdapterKind::UniswapV2,
                AdapterKind::Sushiswap,
                AdapterKind::Honeyswap,
                AdapterKind::Quickswap,
            ] {
                if let Some(factory) = network.amm_factory(kind) {
                    assert!(string_to_address(factory).is_ok());
                }
            }
        }
    }
}
