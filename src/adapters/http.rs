use log::debug;
use reqwest::Client;
use std::time::Duration;
use url::Url;

use crate::errors::{AdapterError, SetupError};

const MAX_ERROR_BODY: usize = 200;

/// Shared client for every HTTP adapter. The timeout bounds a whole request.
pub fn build_client(timeout: Duration) -> Result<Client, SetupError> {
    Ok(Client::builder()
        .timeout(timeout)
        .user_agent(concat!("price-oracle-sdk/", env!("CARGO_PKG_VERSION")))
        .build()?)
}

/// One upstream HTTP API: a shared client plus the API's base URL.
#[derive(Debug, Clone)]
pub struct HttpSource {
    client: Client,
    base_url: Url,
}

impl HttpSource {
    pub fn new(client: Client, base_url: &str) -> Result<Self, SetupError> {
        let base_url = Url::parse(base_url).map_err(|e| SetupError::InvalidUrl {
            url: base_url.to_string(),
            reason: e.to_string(),
        })?;
        Ok(Self { client, base_url })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub fn endpoint(
        &self,
        adapter: &str,
        path: &str,
        query: &[(&str, &str)],
    ) -> Result<Url, AdapterError> {
        let mut url = self
            .base_url
            .join(path)
            .map_err(|e| AdapterError::no_price(adapter, format!("invalid path {}: {}", path, e)))?;
        if !query.is_empty() {
            url.query_pairs_mut().extend_pairs(query);
        }
        Ok(url)
    }

    /// GET `url` and return the body of a successful response.
    pub async fn get_body(
        &self,
        adapter: &str,
        url: Url,
        header: Option<(&str, &str)>,
    ) -> Result<String, AdapterError> {
        debug!("{}: GET {}", adapter, url);
        let mut request = self.client.get(url.clone());
        if let Some((name, value)) = header {
            request = request.header(name, value);
        }

        let response = request
            .send()
            .await
            .map_err(|e| AdapterError::no_price(adapter, format!("request to {} failed: {}", url, e)))?;
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| AdapterError::no_price(adapter, format!("reading body failed: {}", e)))?;

        if !status.is_success() {
            return Err(AdapterError::no_price(
                adapter,
                format!("HTTP {} from {}: {}", status, url, truncate(&body)),
            ));
        }
        Ok(body)
    }
}

fn truncate(body: &str) -> &str {
    match body.char_indices().nth(MAX_ERROR_BODY) {
        Some((idx, _)) => &body[..idx],
        None => body,
    }
}

/// Parse a decimal price string as returned by most exchange APIs.
pub fn parse_price_str(adapter: &str, raw: &str) -> Result<f64, AdapterError> {
    raw.trim()
        .parse::<f64>()
        .map_err(|e| AdapterError::no_price(adapter, format!("invalid price {:?}: {}", raw, e)))
}

pub fn malformed(adapter: &str, err: impl std::fmt::Display) -> AdapterError {
    AdapterError::no_price(adapter, format!("malformed response: {}", err))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_joins_path_and_encodes_query() {
        let source = HttpSource::new(Client::new(), "https://api.kraken.com").unwrap();
        let url = source
            .endpoint("Kraken", "/0/public/Ticker", &[("pair", "ETHUSD")])
            .unwrap();
        assert_eq!(url.as_str(), "https://api.kraken.com/0/public/Ticker?pair=ETHUSD");
    }

    #[test]
    fn rejects_invalid_base_url() {
        assert!(matches!(
            HttpSource::new(Client::new(), "not a url"),
            Err(SetupError::InvalidUrl { .. })
        ));
    }

    #[test]
    fn price_strings() {
        assert_eq!(parse_price_str("x", " 1600.25 ").unwrap(), 1_600.25);
        assert!(parse_price_str("x", "n/a").is_err());
    }

    #[test]
    fn truncates_long_bodies() {
        let body = "e".repeat(1_000);
        assert_eq!(truncate(&body).len(), MAX_ERROR_BODY);
        assert_eq!(truncate("short"), "short");
    }
}
