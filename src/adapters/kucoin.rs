use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;

use crate::adapters::http::{malformed, parse_price_str, HttpSource};
use crate::errors::AdapterError;
use crate::price_adapter::{unsupported, PriceAdapter};
use crate::types::PriceAsset;

pub const KUCOIN_BASE_URL: &str = "https://api.kucoin.com";

#[derive(Debug, Deserialize)]
struct Level1Response {
    data: Option<Level1>,
}

#[derive(Debug, Deserialize)]
struct Level1 {
    price: Option<String>,
}

/// Native coin USD(T) price from the Kucoin level 1 order book.
#[derive(Debug, Clone)]
pub struct KucoinAdapter {
    http: HttpSource,
    symbol: String,
    timeout: Duration,
}

impl KucoinAdapter {
    pub const NAME: &'static str = "Kucoin";

    pub fn new(http: HttpSource, symbol: impl Into<String>, timeout: Duration) -> Self {
        Self {
            http,
            symbol: symbol.into(),
            timeout,
        }
    }
}

pub fn parse_level1(body: &str) -> Result<f64, AdapterError> {
    let name = KucoinAdapter::NAME;
    let response: Level1Response = serde_json::from_str(body).map_err(|e| malformed(name, e))?;
    let price = response
        .data
        .and_then(|data| data.price)
        .ok_or_else(|| AdapterError::no_price(name, "response has no data.price"))?;
    parse_price_str(name, &price)
}

#[async_trait]
impl PriceAdapter for KucoinAdapter {
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
            "/api/v1/market/orderbook/level1",
            &[("symbol", self.symbol.as_str())],
        )?;
        let body = self.http.get_body(Self::NAME, url, None).await?;
        parse_level1(&body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_data_price() {
        let body = r#"{"code":"200000","data":{"time":1700000000000,"sequence":"1","price":"1599.87","size":"0.1"}}"#;
        assert_eq!(parse_level1(body).unwrap(), 1_599.87);
    }

    #[test]
    fn unknown_symbol_has_null_data() {
        assert!(parse_level1(r#"{"code":"200000","data":null}"#).is_err());
        assert!(parse_level1(r#"{"code":"400100","msg":"bad"}"#).is_err());
    }
}
