use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;

use crate::adapters::http::{malformed, parse_price_str, HttpSource};
use crate::errors::AdapterError;
use crate::price_adapter::{unsupported, PriceAdapter};
use crate::types::PriceAsset;

pub const KRAKEN_BASE_URL: &str = "https://api.kraken.com";

#[derive(Debug, Deserialize)]
struct TickerResponse {
    #[serde(default)]
    error: Vec<String>,
    #[serde(default)]
    result: HashMap<String, TickerInfo>,
}

#[derive(Debug, Deserialize)]
struct TickerInfo {
    /// Last trade closed: `[price, lot volume]`.
    c: Vec<String>,
}

/// Native coin USD price from the Kraken public ticker.
#[derive(Debug, Clone)]
pub struct KrakenAdapter {
    http: HttpSource,
    pair: String,
    timeout: Duration,
}

impl KrakenAdapter {
    pub const NAME: &'static str = "Kraken";

    pub fn new(http: HttpSource, pair: impl Into<String>, timeout: Duration) -> Self {
        Self {
            http,
            pair: pair.into(),
            timeout,
        }
    }

    pub fn pair(&self) -> &str {
        &self.pair
    }
}

/// Last trade price of the first pair in a ticker response.
pub fn parse_ticker(body: &str) -> Result<f64, AdapterError> {
    let name = KrakenAdapter::NAME;
    let response: TickerResponse = serde_json::from_str(body).map_err(|e| malformed(name, e))?;
    if !response.error.is_empty() {
        return Err(AdapterError::no_price(name, response.error.join(", ")));
    }
    let ticker = response
        .result
        .values()
        .next()
        .ok_or_else(|| AdapterError::no_price(name, "empty ticker result"))?;
    let last = ticker
        .c
        .first()
        .ok_or_else(|| AdapterError::no_price(name, "ticker has no last trade"))?;
    let price = parse_price_str(name, last)?;
    if price == 0.0 {
        return Err(AdapterError::no_price(name, "price is 0"));
    }
    Ok(price)
}

#[async_trait]
impl PriceAdapter for KrakenAdapter {
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
        let url = self
            .http
            .endpoint(Self::NAME, "/0/public/Ticker", &[("pair", self.pair.as_str())])?;
        let body = self.http.get_body(Self::NAME, url, None).await?;
        parse_ticker(&body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_last_trade_price() {
        let body = r#"{"error":[],"result":{"XETHZUSD":{"a":["1601.1","1","1.000"],"c":["1600.50","0.1"]}}}"#;
        assert_eq!(parse_ticker(body).unwrap(), 1_600.5);
    }

    #[test]
    fn error_array_is_no_price() {
        let body = r#"{"error":["EQuery:Unknown asset pair"]}"#;
        let err = parse_ticker(body).unwrap_err();
        assert_eq!(err.reason(), "EQuery:Unknown asset pair");
    }

    #[test]
    fn zero_and_garbage_are_no_price() {
        assert!(parse_ticker(r#"{"error":[],"result":{"XETHZUSD":{"c":["0.0","1"]}}}"#).is_err());
        assert!(parse_ticker(r#"{"error":[],"result":{}}"#).is_err());
        assert!(parse_ticker("<html>").is_err());
    }
}
