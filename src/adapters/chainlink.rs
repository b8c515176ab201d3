use async_trait::async_trait;
use ethers::prelude::Address;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use crate::chain_state::ChainState;
use crate::errors::AdapterError;
use crate::price_adapter::{unsupported, PriceAdapter, DEFAULT_ADAPTER_TIMEOUT};
use crate::types::PriceAsset;

/// Token prices from Chainlink TOKEN/ETH aggregators.
#[derive(Clone)]
pub struct ChainlinkAdapter {
    aggregators: HashMap<Address, Address>,
    chain: Arc<dyn ChainState>,
    timeout: Duration,
}

impl ChainlinkAdapter {
    pub const NAME: &'static str = "Chainlink";

    /// `aggregators` maps token -> aggregator quoting it in the native coin.
    pub fn new(aggregators: HashMap<Address, Address>, chain: Arc<dyn ChainState>) -> Self {
        Self {
            aggregators,
            chain,
            timeout: DEFAULT_ADAPTER_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn len(&self) -> usize {
        self.aggregators.len()
    }

    pub fn is_empty(&self) -> bool {
        self.aggregators.is_empty()
    }
}

#[async_trait]
impl PriceAdapter for ChainlinkAdapter {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn timeout(&self) -> Duration {
        self.timeout
    }

    async fn fetch_price(&self, asset: &PriceAsset) -> Result<f64, AdapterError> {
        let PriceAsset::Token(token) = asset else {
            return Err(unsupported(Self::NAME, asset));
        };
        let aggregator = self.aggregators.get(token).ok_or_else(|| {
            AdapterError::no_price(Self::NAME, format!("no aggregator configured for {:?}", token))
        })?;
        self.chain
            .read_aggregator_price(*aggregator)
            .await
            .map_err(|e| AdapterError::no_price(Self::NAME, e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ChainStateError;
    use crate::types::UnderlyingToken;

    struct Feeds;

    #[async_trait]
    impl ChainState for Feeds {
        async fn find_pool(&self, _: Address, _: Address, _: Address) -> Result<Option<Address>, ChainStateError> {
            Ok(None)
        }
        async fn read_pool_price(&self, pool: Address, _: Address) -> Result<f64, ChainStateError> {
            Err(ChainStateError::EmptyReserves(pool))
        }
        async fn read_pool_token_price(&self, pool: Address, _: Address) -> Result<f64, ChainStateError> {
            Err(ChainStateError::ZeroSupply(pool))
        }
        async fn read_pool_underlyings(&self, pool: Address) -> Result<Vec<UnderlyingToken>, ChainStateError> {
            Err(ChainStateError::ZeroSupply(pool))
        }
        async fn read_aggregator_price(&self, aggregator: Address) -> Result<f64, ChainStateError> {
            if aggregator == Address::from_low_u64_be(0xa1) {
                Ok(0.0005)
            } else {
                Err(ChainStateError::InvalidAnswer {
                    aggregator,
                    reason: "answer is -1".into(),
                })
            }
        }
    }

    #[tokio::test]
    async fn reads_configured_aggregator() {
        let token = Address::from_low_u64_be(0x70);
        let broken = Address::from_low_u64_be(0x71);
        let adapter = ChainlinkAdapter::new(
            HashMap::from([
                (token, Address::from_low_u64_be(0xa1)),
                (broken, Address::from_low_u64_be(0xa2)),
            ]),
            Arc::new(Feeds),
        );
        assert_eq!(adapter.fetch_price(&PriceAsset::Token(token)).await.unwrap(), 0.0005);
        assert!(adapter.fetch_price(&PriceAsset::Token(broken)).await.is_err());
        assert!(adapter
            .fetch_price(&PriceAsset::Token(Address::from_low_u64_be(0x72)))
            .await
            .unwrap_err()
            .reason()
            .contains("no aggregator"));
    }
}
