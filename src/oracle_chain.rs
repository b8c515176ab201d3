//! Ordered fallback over a list of price adapters.
//!
//! Sources are tried strictly in configured order, one at a time. The first success
//! wins and later sources are never consulted. Each attempt is bounded by the adapter's
//! own timeout and by the caller's deadline, so a full pass never takes longer than the
//! sum of the timeouts of the sources actually tried.

use log::{debug, warn};
use std::sync::Arc;
use tokio::time::Instant;

use crate::errors::{AdapterError, ResolverError, SourceFailure};
use crate::metrics;
use crate::price_adapter::{validate_price, PriceAdapter};
use crate::types::{PriceAsset, PriceCategory};

/// A price together with the adapter that produced it.
#[derive(Debug, Clone, PartialEq)]
pub struct SourcedPrice {
    pub price: f64,
    pub adapter: String,
}

/// Immutable, ordered adapter list for one price category.
#[derive(Clone)]
pub struct OracleChain {
    category: PriceCategory,
    adapters: Vec<Arc<dyn PriceAdapter>>,
}

impl std::fmt::Debug for OracleChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OracleChain")
            .field("category", &self.category)
            .field("adapters", &self.names())
            .finish()
    }
}

impl OracleChain {
    pub fn new(category: PriceCategory, adapters: Vec<Arc<dyn PriceAdapter>>) -> Self {
        Self { category, adapters }
    }

    pub fn empty(category: PriceCategory) -> Self {
        Self::new(category, Vec::new())
    }

    pub fn category(&self) -> PriceCategory {
        self.category
    }

    pub fn adapters(&self) -> &[Arc<dyn PriceAdapter>] {
        &self.adapters
    }

    pub fn names(&self) -> Vec<&str> {
        self.adapters.iter().map(|a| a.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.adapters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.adapters.is_empty()
    }

    /// Resolve `asset`, returning only the price.
    pub async fn resolve(
        &self,
        asset: &PriceAsset,
        deadline: Option<Instant>,
    ) -> Result<f64, ResolverError> {
        self.resolve_sourced(asset, deadline).await.map(|p| p.price)
    }

    /// Resolve `asset` and report which adapter answered.
    pub async fn resolve_sourced(
        &self,
        asset: &PriceAsset,
        deadline: Option<Instant>,
    ) -> Result<SourcedPrice, ResolverError> {
        let mut failures = Vec::with_capacity(self.adapters.len());

        for adapter in &self.adapters {
            let name = adapter.name();
            let budget = match deadline {
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        debug!(
                            "{} chain: deadline exceeded before trying {} for {}",
                            self.category, name, asset
                        );
                        failures.push(SourceFailure {
                            adapter: name.to_string(),
                            reason: "deadline exceeded".to_string(),
                        });
                        break;
                    }
                    adapter.timeout().min(deadline - now)
                }
                None => adapter.timeout(),
            };

            let start = Instant::now();
            let outcome = match tokio::time::timeout(budget, adapter.fetch_price(asset)).await {
                Ok(result) => result.and_then(|price| validate_price(name, asset, price)),
                Err(_) => Err(AdapterError::no_price(
                    name,
                    format!("timed out after {:?}", budget),
                )),
            };
            metrics::record_adapter_latency(name, start.elapsed());

            match outcome {
                Ok(price) => {
                    debug!("{} chain: {} priced {} at {}", self.category, name, asset, price);
                    return Ok(SourcedPrice {
                        price,
                        adapter: name.to_string(),
                    });
                }
                Err(err) => {
                    warn!("{} chain: {} failed for {}: {}", self.category, name, asset, err.reason());
                    metrics::increment_adapter_failure(name, self.category.as_str());
                    failures.push(err.into());
                }
            }
        }

        Err(ResolverError::exhausted(self.category, failures))
    }
}
