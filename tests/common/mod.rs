//! Shared mocks for the integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use ethers::types::Address;
use price_oracle_sdk::cache_backend::InMemoryBackend;
use price_oracle_sdk::errors::AdapterError;
use price_oracle_sdk::networks::Network;
use price_oracle_sdk::oracle_registry::{NetworkOracles, OracleRegistry};
use price_oracle_sdk::price_adapter::{PriceAdapter, UnderlyingTokenSource};
use price_oracle_sdk::price_service::{PriceService, PriceServiceConfig};
use price_oracle_sdk::types::{PriceAsset, UnderlyingToken};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub fn addr(n: u64) -> Address {
    Address::from_low_u64_be(n)
}

/// Adapter answering every asset with one configurable result.
pub struct MockAdapter {
    name: String,
    result: Mutex<Result<f64, String>>,
    delay: Option<Duration>,
    timeout: Duration,
    calls: AtomicUsize,
}

impl MockAdapter {
    pub fn ok(name: &str, price: f64) -> Arc<Self> {
        Arc::new(Self::build(name, Ok(price), None))
    }

    pub fn failing(name: &str) -> Arc<Self> {
        Arc::new(Self::build(name, Err("source down".to_string()), None))
    }

    /// Answers `price` only after `delay`.
    pub fn slow(name: &str, price: f64, delay: Duration) -> Arc<Self> {
        Arc::new(Self::build(name, Ok(price), Some(delay)))
    }

    pub fn slow_with_timeout(name: &str, price: f64, delay: Duration, timeout: Duration) -> Arc<Self> {
        let mut adapter = Self::build(name, Ok(price), Some(delay));
        adapter.timeout = timeout;
        Arc::new(adapter)
    }

    fn build(name: &str, result: Result<f64, String>, delay: Option<Duration>) -> Self {
        Self {
            name: name.to_string(),
            result: Mutex::new(result),
            delay,
            timeout: Duration::from_secs(2),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn set_price(&self, price: f64) {
        *self.result.lock().unwrap() = Ok(price);
    }

    pub fn set_failing(&self) {
        *self.result.lock().unwrap() = Err("source down".to_string());
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PriceAdapter for MockAdapter {
    fn name(&self) -> &str {
        &self.name
    }

    fn timeout(&self) -> Duration {
        self.timeout
    }

    async fn fetch_price(&self, _asset: &PriceAsset) -> Result<f64, AdapterError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let result = self.result.lock().unwrap().clone();
        result.map_err(|reason| AdapterError::no_price(&self.name, reason))
    }
}

/// Token adapter with a fixed price table; unknown tokens have no price.
pub struct TablePriceAdapter {
    prices: HashMap<Address, f64>,
    calls: AtomicUsize,
}

impl TablePriceAdapter {
    pub fn new(prices: &[(Address, f64)]) -> Arc<Self> {
        Arc::new(Self {
            prices: prices.iter().copied().collect(),
            calls: AtomicUsize::new(0),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PriceAdapter for TablePriceAdapter {
    fn name(&self) -> &str {
        "Table"
    }

    async fn fetch_price(&self, asset: &PriceAsset) -> Result<f64, AdapterError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match asset {
            PriceAsset::Token(token) => self
                .prices
                .get(token)
                .copied()
                .ok_or_else(|| AdapterError::no_price("Table", format!("unknown token {:?}", token))),
            other => Err(AdapterError::no_price("Table", format!("{} is not supported", other))),
        }
    }
}

/// Basket source backed by a fixed table.
pub struct MockBaskets {
    baskets: HashMap<Address, Vec<UnderlyingToken>>,
    calls: AtomicUsize,
}

impl MockBaskets {
    pub fn new(baskets: Vec<(Address, Vec<(Address, f64)>)>) -> Arc<Self> {
        Arc::new(Self {
            baskets: baskets
                .into_iter()
                .map(|(token, basket)| {
                    let basket = basket
                        .into_iter()
                        .map(|(address, weight)| UnderlyingToken::new(address, weight))
                        .collect();
                    (token, basket)
                })
                .collect(),
            calls: AtomicUsize::new(0),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl UnderlyingTokenSource for MockBaskets {
    fn name(&self) -> &str {
        "MockBaskets"
    }

    async fn get_underlying_tokens(
        &self,
        token: Address,
    ) -> Result<Vec<UnderlyingToken>, AdapterError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.baskets
            .get(&token)
            .cloned()
            .ok_or_else(|| AdapterError::no_price("MockBaskets", "no basket"))
    }
}

pub fn chain<A: PriceAdapter + 'static>(adapters: &[&Arc<A>]) -> Vec<Arc<dyn PriceAdapter>> {
    adapters
        .iter()
        .map(|adapter| Arc::clone(*adapter) as Arc<dyn PriceAdapter>)
        .collect()
}

/// Mainnet service over `oracles` with a private in-memory backend.
pub fn service(oracles: NetworkOracles, config: PriceServiceConfig) -> PriceService {
    service_on(Arc::new(InMemoryBackend::new(1_024)), oracles, config)
}

pub fn service_on(
    backend: Arc<InMemoryBackend>,
    oracles: NetworkOracles,
    config: PriceServiceConfig,
) -> PriceService {
    let registry = OracleRegistry::builder()
        .network(Network::Mainnet, oracles)
        .build();
    PriceService::new(Network::Mainnet, &registry, backend, config)
}
