// Price Source Adapters
// Exchange tickers and aggregator APIs over HTTP, on-chain pools and feeds over ChainState

pub mod binance;
pub mod chainlink;
pub mod coingecko;
pub mod http;
pub mod kraken;
pub mod kucoin;
pub mod static_basket;
pub mod uniswap_v2;

pub use binance::BinanceAdapter;
pub use chainlink::ChainlinkAdapter;
pub use coingecko::CoinGeckoAdapter;
pub use http::HttpSource;
pub use kraken::KrakenAdapter;
pub use kucoin::KucoinAdapter;
pub use static_basket::StaticBasketSource;
pub use uniswap_v2::UniswapV2Adapter;

// Re-export the traits
pub use crate::price_adapter::{PriceAdapter, UnderlyingTokenSource};
