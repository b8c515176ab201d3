use async_trait::async_trait;
use ethers::types::Address;
use std::collections::HashMap;
use std::time::Duration;

use crate::adapters::http::{malformed, HttpSource};
use crate::errors::AdapterError;
use crate::price_adapter::{unsupported, PriceAdapter};
use crate::types::conversions::address_to_string;
use crate::types::PriceAsset;

pub const COINGECKO_BASE_URL: &str = "https://api.coingecko.com";
const API_KEY_HEADER: &str = "x-cg-pro-api-key";

// Both endpoints answer `{ "<id or address>": { "<vs currency>": price } }`.
type SimplePriceResponse = HashMap<String, HashMap<String, f64>>;

/// CoinGecko simple price API.
///
/// Prices the native coin in USD by coin id. Tokens are priced by contract address
/// against the native coin, but only where CoinGecko offers the native coin as a quote
/// currency (`vs_currency`); elsewhere tokens are unsupported.
#[derive(Debug, Clone)]
pub struct CoinGeckoAdapter {
    http: HttpSource,
    coin_id: String,
    platform: Option<String>,
    vs_currency: Option<String>,
    api_key: Option<String>,
    timeout: Duration,
}

impl CoinGeckoAdapter {
    pub const NAME: &'static str = "CoinGecko";

    pub fn new(http: HttpSource, coin_id: impl Into<String>, timeout: Duration) -> Self {
        Self {
            http,
            coin_id: coin_id.into(),
            platform: None,
            vs_currency: None,
            api_key: None,
            timeout,
        }
    }

    /// Enable token lookups on `platform`, quoted in `vs_currency`.
    pub fn with_token_pricing(
        mut self,
        platform: impl Into<String>,
        vs_currency: impl Into<String>,
    ) -> Self {
        self.platform = Some(platform.into());
        self.vs_currency = Some(vs_currency.into());
        self
    }

    pub fn with_api_key(mut self, api_key: Option<String>) -> Self {
        self.api_key = api_key.filter(|key| !key.trim().is_empty());
        self
    }

    fn header(&self) -> Option<(&str, &str)> {
        self.api_key.as_deref().map(|key| (API_KEY_HEADER, key))
    }

    async fn native_coin_usd(&self) -> Result<f64, AdapterError> {
        let url = self.http.endpoint(
            Self::NAME,
            "/api/v3/simple/price",
            &[("ids", self.coin_id.as_str()), ("vs_currencies", "usd")],
        )?;
        let body = self.http.get_body(Self::NAME, url, self.header()).await?;
        parse_simple_price(&body, &self.coin_id, "usd")
    }

    async fn token_price(&self, token: Address) -> Result<f64, AdapterError> {
        let (Some(platform), Some(vs_currency)) = (&self.platform, &self.vs_currency) else {
            return Err(unsupported(Self::NAME, &PriceAsset::Token(token)));
        };
        let address = address_to_string(token);
        let url = self.http.endpoint(
            Self::NAME,
            &format!("/api/v3/simple/token_price/{}", platform),
            &[
                ("contract_addresses", address.as_str()),
                ("vs_currencies", vs_currency.as_str()),
            ],
        )?;
        let body = self.http.get_body(Self::NAME, url, self.header()).await?;
        parse_simple_price(&body, &address, vs_currency)
    }
}

/// Price of `id` in `vs_currency`. Token addresses come back lowercase.
pub fn parse_simple_price(body: &str, id: &str, vs_currency: &str) -> Result<f64, AdapterError> {
    let name = CoinGeckoAdapter::NAME;
    let response: SimplePriceResponse =
        serde_json::from_str(body).map_err(|e| malformed(name, e))?;
    response
        .get(&id.to_lowercase())
        .and_then(|quotes| quotes.get(vs_currency))
        .copied()
        .ok_or_else(|| AdapterError::no_price(name, format!("no {} price for {}", vs_currency, id)))
}

#[async_trait]
impl PriceAdapter for CoinGeckoAdapter {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn timeout(&self) -> Duration {
        self.timeout
    }

    async fn fetch_price(&self, asset: &PriceAsset) -> Result<f64, AdapterError> {
        match asset {
            PriceAsset::NativeCoin => self.native_coin_usd().await,
            PriceAsset::Token(token) => self.token_price(*token).await,
            PriceAsset::PoolToken(_) => Err(unsupported(Self::NAME, asset)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::Client;

    #[test]
    fn parses_coin_and_token_quotes() {
        assert_eq!(
            parse_simple_price(r#"{"ethereum":{"usd":1600.3}}"#, "ethereum", "usd").unwrap(),
            1_600.3
        );
        let body = r#"{"0x6b175474e89094c44da98b954eedeac495271d0f":{"eth":0.000625}}"#;
        assert_eq!(
            parse_simple_price(body, "0x6B175474E89094C44Da98b954EedeAC495271d0F", "eth").unwrap(),
            0.000625
        );
    }

    #[test]
    fn unknown_token_is_no_price() {
        assert!(parse_simple_price("{}", "0xdead", "eth").is_err());
        assert!(parse_simple_price(r#"{"ethereum":{"eur":1.0}}"#, "ethereum", "usd").is_err());
    }

    #[tokio::test]
    async fn tokens_unsupported_without_platform() {
        let http = HttpSource::new(Client::new(), COINGECKO_BASE_URL).unwrap();
        let adapter = CoinGeckoAdapter::new(http, "xdai", Duration::from_secs(1));
        let err = adapter
            .fetch_price(&PriceAsset::Token(Address::zero()))
            .await
            .unwrap_err();
        assert!(err.reason().contains("not supported"));
    }

    #[test]
    fn blank_api_key_is_ignored() {
        let http = HttpSource::new(Client::new(), COINGECKO_BASE_URL).unwrap();
        let adapter = CoinGeckoAdapter::new(http, "ethereum", Duration::from_secs(1))
            .with_api_key(Some("  ".into()));
        assert!(adapter.header().is_none());
    }
}
