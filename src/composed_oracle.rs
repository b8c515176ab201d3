//! Pricing of tokens backed by a weighted basket of other tokens.
//!
//! The basket comes from the configured [`UnderlyingTokenSource`]s, tried in order.
//! Each constituent is priced through a caller-supplied resolver (normally the price
//! service itself, so constituents hit the cache and may be composed in turn) and the
//! results are summed by weight. Constituents that cannot be priced contribute 0: a
//! basket never fails once it is known.

use ethers::types::Address;
use futures::future::{join_all, BoxFuture};
use log::{debug, warn};
use std::sync::Arc;

use crate::errors::{ResolverError, SourceFailure};
use crate::price_adapter::UnderlyingTokenSource;
use crate::types::{PriceCategory, UnderlyingToken};

pub const DEFAULT_MAX_DEPTH: usize = 3;

/// Resolves one constituent. Receives the constituent and the resolution path leading
/// to it (outermost composed token first).
pub type ResolveFuture<'a> = BoxFuture<'a, Result<Valuation, ResolverError>>;

/// A native coin value and whether it depends on the resolution path.
///
/// A valuation is partial when the depth bound or a cycle cut part of the basket off,
/// here or in any constituent. The same token reached by a shorter path may be worth more.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Valuation {
    pub value: f64,
    pub partial: bool,
}

impl Valuation {
    pub fn complete(value: f64) -> Self {
        Self { value, partial: false }
    }

    pub fn partial(value: f64) -> Self {
        Self { value, partial: true }
    }
}

#[derive(Clone)]
pub struct ComposedResolver {
    sources: Vec<Arc<dyn UnderlyingTokenSource>>,
    max_depth: usize,
}

impl std::fmt::Debug for ComposedResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ComposedResolver")
            .field("sources", &self.names())
            .field("max_depth", &self.max_depth)
            .finish()
    }
}

impl ComposedResolver {
    pub fn new(sources: Vec<Arc<dyn UnderlyingTokenSource>>, max_depth: usize) -> Self {
        Self { sources, max_depth }
    }

    pub fn sources(&self) -> &[Arc<dyn UnderlyingTokenSource>] {
        &self.sources
    }

    pub fn names(&self) -> Vec<&str> {
        self.sources.iter().map(|s| s.name()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    pub fn max_depth(&self) -> usize {
        self.max_depth
    }

    /// Whether a token reached through `path` may still be decomposed.
    pub fn can_descend(&self, path: &[Address]) -> bool {
        path.len() < self.max_depth
    }

    /// Basket behind `token` from the first source that knows it.
    pub async fn lookup_underlyings(
        &self,
        token: Address,
    ) -> Result<Vec<UnderlyingToken>, ResolverError> {
        let mut failures = Vec::new();
        for source in &self.sources {
            match source.get_underlying_tokens(token).await {
                Ok(basket) if !basket.is_empty() => {
                    debug!(
                        "{} returned {} underlying tokens for {:?}",
                        source.name(),
                        basket.len(),
                        token
                    );
                    return Ok(basket);
                }
                Ok(_) => failures.push(SourceFailure {
                    adapter: source.name().to_string(),
                    reason: "empty basket".to_string(),
                }),
                Err(err) => {
                    debug!("{} has no basket for {:?}: {}", source.name(), token, err.reason());
                    failures.push(err.into());
                }
            }
        }
        Err(ResolverError::exhausted(PriceCategory::Composed, failures))
    }

    /// Weighted sum of constituent prices.
    ///
    /// `path` is the chain of composed tokens above `token`. Constituents already on the
    /// path (cycles), with a non-finite or negative weight, or failing to resolve
    /// contribute 0. Constituents are resolved concurrently; the sum follows basket order.
    ///
    /// The result is partial if a cycle was skipped or any constituent was partial.
    pub async fn combine<'a, F>(
        &self,
        token: Address,
        underlyings: &[UnderlyingToken],
        path: &[Address],
        resolve: F,
    ) -> Valuation
    where
        F: Fn(Address, Vec<Address>) -> ResolveFuture<'a>,
    {
        let mut child_path = path.to_vec();
        child_path.push(token);
        let mut partial = false;

        let lookups: Vec<_> = underlyings
            .iter()
            .map(|underlying| {
                let skip = if !underlying.weight.is_finite() || underlying.weight < 0.0 {
                    Some(format!("invalid weight {}", underlying.weight))
                } else if underlying.weight == 0.0 {
                    Some("zero weight".to_string())
                } else if child_path.contains(&underlying.address) {
                    partial = true;
                    Some("cycle in composed basket".to_string())
                } else {
                    None
                };
                let pending = skip.is_none().then(|| resolve(underlying.address, child_path.clone()));
                async move {
                    match (skip, pending) {
                        (Some(reason), _) => Err(reason),
                        (None, Some(pending)) => pending.await.map_err(|e| e.to_string()),
                        (None, None) => Err("not resolved".to_string()),
                    }
                }
            })
            .collect();
        let prices = join_all(lookups).await;

        let mut total = 0.0;
        for (underlying, price) in underlyings.iter().zip(prices) {
            match price {
                Ok(price) => {
                    total += price.value * underlying.weight;
                    partial |= price.partial;
                }
                Err(reason) => warn!(
                    "Underlying {:?} of {:?} contributes 0: {}",
                    underlying.address, token, reason
                ),
            }
        }
        debug!("Composed value of {:?} is {} (partial: {})", token, total, partial);
        Valuation { value: total, partial }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::AdapterError;
    use async_trait::async_trait;
    use futures::FutureExt;
    use std::collections::HashMap;

    fn addr(n: u64) -> Address {
        Address::from_low_u64_be(n)
    }

    fn priced(prices: HashMap<Address, f64>) -> impl Fn(Address, Vec<Address>) -> ResolveFuture<'static> {
        move |address, _path| {
            let result = prices
                .get(&address)
                .copied()
                .map(Valuation::complete)
                .ok_or_else(|| ResolverError::exhausted(PriceCategory::Token, vec![]));
            async move { result }.boxed()
        }
    }

    #[tokio::test]
    async fn failed_constituents_contribute_zero() {
        let resolver = ComposedResolver::new(vec![], DEFAULT_MAX_DEPTH);
        let basket = [
            UnderlyingToken::new(addr(0xa), 2.0),
            UnderlyingToken::new(addr(0xb), 3.0),
            UnderlyingToken::new(addr(0xc), 4.0),
        ];
        let total = resolver
            .combine(addr(1), &basket, &[], priced(HashMap::from([(addr(0xa), 0.25)])))
            .await;
        assert_eq!(total, Valuation::complete(0.5));
    }

    #[tokio::test]
    async fn all_failed_is_zero() {
        let resolver = ComposedResolver::new(vec![], DEFAULT_MAX_DEPTH);
        let basket = [UnderlyingToken::new(addr(0xb), 3.0)];
        let total = resolver.combine(addr(1), &basket, &[], priced(HashMap::new())).await;
        assert_eq!(total, Valuation::complete(0.0));
    }

    #[tokio::test]
    async fn cycles_and_bad_weights_are_skipped() {
        let resolver = ComposedResolver::new(vec![], DEFAULT_MAX_DEPTH);
        let prices = HashMap::from([(addr(1), 10.0), (addr(2), 10.0), (addr(3), 1.0)]);
        let basket = [
            UnderlyingToken::new(addr(1), 1.0),      // the token itself
            UnderlyingToken::new(addr(2), 1.0),      // on the path above
            UnderlyingToken::new(addr(3), f64::NAN), // bad weight
            UnderlyingToken::new(addr(3), -1.0),
            UnderlyingToken::new(addr(3), 1.5),
        ];
        let total = resolver.combine(addr(1), &basket, &[addr(2)], priced(prices)).await;
        assert_eq!(total, Valuation::partial(1.5));
    }

    #[tokio::test]
    async fn bad_weights_alone_are_not_partial() {
        let resolver = ComposedResolver::new(vec![], DEFAULT_MAX_DEPTH);
        let basket = [
            UnderlyingToken::new(addr(3), 0.0),
            UnderlyingToken::new(addr(3), -2.0),
            UnderlyingToken::new(addr(4), 2.0),
        ];
        let prices = HashMap::from([(addr(3), 1.0), (addr(4), 0.5)]);
        let total = resolver.combine(addr(1), &basket, &[], priced(prices)).await;
        assert_eq!(total, Valuation::complete(1.0));
    }

    #[tokio::test]
    async fn partial_constituent_makes_basket_partial() {
        let resolver = ComposedResolver::new(vec![], DEFAULT_MAX_DEPTH);
        let basket = [
            UnderlyingToken::new(addr(3), 1.0),
            UnderlyingToken::new(addr(4), 1.0),
        ];
        let total = resolver
            .combine(addr(1), &basket, &[], |address, _| {
                let valuation = if address == addr(3) {
                    Valuation::complete(0.5)
                } else {
                    Valuation::partial(0.0)
                };
                async move { Ok(valuation) }.boxed()
            })
            .await;
        assert_eq!(total, Valuation::partial(0.5));
    }

    #[tokio::test]
    async fn child_path_includes_parent() {
        let resolver = ComposedResolver::new(vec![], DEFAULT_MAX_DEPTH);
        let basket = [UnderlyingToken::new(addr(3), 1.0)];
        let total = resolver
            .combine(addr(2), &basket, &[addr(1)], |_, path| {
                let depth = path.len() as f64;
                assert_eq!(path, vec![addr(1), addr(2)]);
                async move { Ok(Valuation::complete(depth)) }.boxed()
            })
            .await;
        assert_eq!(total.value, 2.0);
    }

    #[test]
    fn depth_bound() {
        let resolver = ComposedResolver::new(vec![], 2);
        assert!(resolver.can_descend(&[]));
        assert!(resolver.can_descend(&[addr(1)]));
        assert!(!resolver.can_descend(&[addr(1), addr(2)]));
        assert!(!ComposedResolver::new(vec![], 0).can_descend(&[]));
    }

    struct Baskets(Option<Vec<UnderlyingToken>>);

    #[async_trait]
    impl UnderlyingTokenSource for Baskets {
        fn name(&self) -> &str {
            "Baskets"
        }

        async fn get_underlying_tokens(
            &self,
            _token: Address,
        ) -> Result<Vec<UnderlyingToken>, AdapterError> {
            self.0
                .clone()
                .ok_or_else(|| AdapterError::no_price("Baskets", "unknown token"))
        }
    }

    #[tokio::test]
    async fn first_non_empty_basket_wins() {
        let basket = vec![UnderlyingToken::new(addr(5), 1.0)];
        let resolver = ComposedResolver::new(
            vec![
                Arc::new(Baskets(None)),
                Arc::new(Baskets(Some(vec![]))),
                Arc::new(Baskets(Some(basket.clone()))),
            ],
            DEFAULT_MAX_DEPTH,
        );
        assert_eq!(resolver.lookup_underlyings(addr(1)).await.unwrap(), basket);

        let unknown = ComposedResolver::new(vec![Arc::new(Baskets(None))], DEFAULT_MAX_DEPTH);
        let err = unknown.lookup_underlyings(addr(1)).await.unwrap_err();
        assert_eq!(err.failures().len(), 1);
    }
}
