//! Error taxonomy.
//!
//! Failures are absorbed layer by layer: `AdapterError` never leaves an oracle chain,
//! `ResolverError` is handed to the cache layer for stale fallback, and
//! `PriceServiceError::Unresolvable` is the only failure a caller of the price service sees.

use ethers::types::Address;
use std::fmt;

use crate::types::{PriceCategory, PriceQuery};

/// Failure of a single price source.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum AdapterError {
    /// Unreachable source, malformed response, unsupported asset or an invalid price.
    #[error("{adapter}: no price ({reason})")]
    NoPrice { adapter: String, reason: String },
}

impl AdapterError {
    pub fn no_price(adapter: impl Into<String>, reason: impl Into<String>) -> Self {
        AdapterError::NoPrice {
            adapter: adapter.into(),
            reason: reason.into(),
        }
    }

    pub fn reason(&self) -> &str {
        match self {
            AdapterError::NoPrice { reason, .. } => reason,
        }
    }
}

/// One failed attempt inside an oracle chain.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceFailure {
    pub adapter: String,
    pub reason: String,
}

impl fmt::Display for SourceFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.adapter, self.reason)
    }
}

impl From<AdapterError> for SourceFailure {
    fn from(err: AdapterError) -> Self {
        match err {
            AdapterError::NoPrice { adapter, reason } => SourceFailure { adapter, reason },
        }
    }
}

fn join_failures(failures: &[SourceFailure]) -> String {
    if failures.is_empty() {
        return "no sources configured".to_string();
    }
    failures
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Failure of a whole resolution step.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ResolverError {
    #[error("all {category} sources exhausted ({})", join_failures(.failures))]
    AllSourcesExhausted {
        category: PriceCategory,
        failures: Vec<SourceFailure>,
    },
}

impl ResolverError {
    pub fn exhausted(category: PriceCategory, failures: Vec<SourceFailure>) -> Self {
        ResolverError::AllSourcesExhausted { category, failures }
    }

    pub fn failures(&self) -> &[SourceFailure] {
        match self {
            ResolverError::AllSourcesExhausted { failures, .. } => failures,
        }
    }

    /// Fold the failures of a later fallback step into this error.
    pub fn merge(self, other: ResolverError) -> Self {
        match (self, other) {
            (
                ResolverError::AllSourcesExhausted {
                    category,
                    mut failures,
                },
                ResolverError::AllSourcesExhausted {
                    failures: more, ..
                },
            ) => {
                failures.extend(more);
                ResolverError::AllSourcesExhausted { category, failures }
            }
        }
    }
}

/// Caller-visible failure: live resolution failed and no cached value existed.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum PriceServiceError {
    #[error("price unavailable for {query}: {source}")]
    Unresolvable {
        query: PriceQuery,
        #[source]
        source: ResolverError,
    },
}

impl PriceServiceError {
    pub fn query(&self) -> &PriceQuery {
        match self {
            PriceServiceError::Unresolvable { query, .. } => query,
        }
    }
}

/// Failure of the chain-state collaborator.
#[derive(Debug, thiserror::Error)]
pub enum ChainStateError {
    #[error("RPC call failed: {0}")]
    Rpc(String),
    #[error("Pool {0:?} has empty reserves")]
    EmptyReserves(Address),
    #[error("Token {token:?} is not part of pool {pool:?}")]
    TokenNotInPool { pool: Address, token: Address },
    #[error("Pool {0:?} has zero total supply")]
    ZeroSupply(Address),
    #[error("Invalid aggregator answer from {aggregator:?}: {reason}")]
    InvalidAnswer { aggregator: Address, reason: String },
}

/// Failure of a cache storage backend.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("Cache serialization failed: {0}")]
    Serialization(String),
    #[error("Cache backend error: {0}")]
    Backend(String),
}

impl From<bincode::Error> for CacheError {
    fn from(err: bincode::Error) -> Self {
        CacheError::Serialization(err.to_string())
    }
}

/// Failure while building adapters, registries or backends from settings.
#[derive(Debug, thiserror::Error)]
pub enum SetupError {
    #[error("Failed to build HTTP client: {0}")]
    HttpClient(#[from] reqwest::Error),
    #[error("Invalid URL {url}: {reason}")]
    InvalidUrl { url: String, reason: String },
    #[error("Invalid address in settings: {0}")]
    InvalidAddress(#[from] crate::types::conversions::ConversionError),
    #[error("Unknown network: {0}")]
    UnknownNetwork(String),
    #[error("Unknown adapter kind: {0}")]
    UnknownAdapter(String),
    #[error("Cache backend setup failed: {0}")]
    Backend(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merge_keeps_first_category_and_all_failures() {
        let direct = ResolverError::exhausted(
            PriceCategory::Token,
            vec![SourceFailure {
                adapter: "UniswapV2".into(),
                reason: "no pool".into(),
            }],
        );
        let pools = ResolverError::exhausted(
            PriceCategory::PoolToken,
            vec![SourceFailure {
                adapter: "Sushiswap".into(),
                reason: "timed out".into(),
            }],
        );
        let merged = direct.merge(pools);
        let ResolverError::AllSourcesExhausted { category, failures } = &merged;
        assert_eq!(*category, PriceCategory::Token);
        assert_eq!(failures.len(), 2);
        assert_eq!(
            merged.to_string(),
            "all token sources exhausted (UniswapV2: no pool; Sushiswap: timed out)"
        );
    }

    #[test]
    fn empty_chain_reports_no_sources() {
        let err = ResolverError::exhausted(PriceCategory::NativeCoin, vec![]);
        assert_eq!(
            err.to_string(),
            "all native_coin sources exhausted (no sources configured)"
        );
    }
}
