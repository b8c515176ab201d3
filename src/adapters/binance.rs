use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;

use crate::adapters::http::{malformed, parse_price_str, HttpSource};
use crate::errors::AdapterError;
use crate::price_adapter::{unsupported, PriceAdapter};
use crate::types::PriceAsset;

pub const BINANCE_BASE_URL: &str = "https://api.binance.com";

#[derive(Debug, Deserialize)]
struct TickerPrice {
    price: String,
}

/// Native coin USDT price from the Binance spot ticker.
#[derive(Debug, Clone)]
pub struct BinanceAdapter {
    http: HttpSource,
    symbol: String,
    timeout: Duration,
}

impl BinanceAdapter {
    pub const NAME: &'static str = "Binance";

    pub fn new(http: HttpSource, symbol: impl Into<String>, timeout: Duration) -> Self {
        Self {
            http,
            symbol: symbol.into(),
            timeout,
        }
    }
}

pub fn parse_ticker_price(body: &str) -> Result<f64, AdapterError> {
    let name = BinanceAdapter::NAME;
    let ticker: TickerPrice = serde_json::from_str(body).map_err(|e| malformed(name, e))?;
    parse_price_str(name, &ticker.price)
}

#[async_trait]
impl PriceAdapter for BinanceAdapter {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn timeout(&self) -> Duration {
        self.timeout
    }

    async fn fetch_price(&self, asset: &PriceAsset) -> Result<f64, AdapterError> {
        if !matches!(asset, PriceAsset::NativeCoin) {
            return Err(unsupported(Self::NAME, asset));
        }
        let url = self.http.endpoint(
            Self::NAME,
            "/api/v3/ticker/price",
            &[("symbol", self.symbol.as_str())],
        )?;
        let body = self.http.get_body(Self::NAME, url, None).await?;
        parse_ticker_price(&body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_price_field() {
        assert_eq!(
            parse_ticker_price(r#"{"symbol":"BNBUSDT","price":"301.20000000"}"#).unwrap(),
            301.2
        );
        assert!(parse_ticker_price(r#"{"code":-1121,"msg":"Invalid symbol."}"#).is_err());
    }
}
