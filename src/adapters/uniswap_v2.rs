use async_trait::async_trait;
use ethers::prelude::Address;
use std::sync::Arc;
use std::time::Duration;

use crate::chain_state::ChainState;
use crate::errors::{AdapterError, ChainStateError};
use crate::price_adapter::{unsupported, PriceAdapter, UnderlyingTokenSource, DEFAULT_ADAPTER_TIMEOUT};
use crate::types::{PriceAsset, UnderlyingToken};

/// Token/LP pricing from a UniswapV2-style AMM.
///
/// One struct covers every fork (Uniswap V2, Sushiswap, Honeyswap, Quickswap); they
/// differ only by name and factory. Prices are quoted in the wrapped native token,
/// which stands in for the native coin.
#[derive(Clone)]
pub struct UniswapV2Adapter {
    name: String,
    factory: Address,
    wrapped_native: Address,
    chain: Arc<dyn ChainState>,
    timeout: Duration,
}

impl std::fmt::Debug for UniswapV2Adapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UniswapV2Adapter")
            .field("name", &self.name)
            .field("factory", &self.factory)
            .field("wrapped_native", &self.wrapped_native)
            .finish()
    }
}

impl UniswapV2Adapter {
    pub fn new(
        name: impl Into<String>,
        factory: Address,
        wrapped_native: Address,
        chain: Arc<dyn ChainState>,
    ) -> Self {
        Self {
            name: name.into(),
            factory,
            wrapped_native,
            chain,
            timeout: DEFAULT_ADAPTER_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn factory(&self) -> Address {
        self.factory
    }

    fn chain_error(&self, err: ChainStateError) -> AdapterError {
        AdapterError::no_price(self.name.as_str(), err.to_string())
    }

    async fn token_price(&self, token: Address) -> Result<f64, AdapterError> {
        if token == self.wrapped_native {
            return Ok(1.0);
        }
        let pool = self
            .chain
            .find_pool(self.factory, token, self.wrapped_native)
            .await
            .map_err(|e| self.chain_error(e))?
            .ok_or_else(|| {
                AdapterError::no_price(
                    self.name.as_str(),
                    format!("no pair for {:?} against the wrapped native token", token),
                )
            })?;
        self.chain
            .read_pool_price(pool, token)
            .await
            .map_err(|e| self.chain_error(e))
    }
}

#[async_trait]
impl PriceAdapter for UniswapV2Adapter {
    fn name(&self) -> &str {
        &self.name
    }

    fn timeout(&self) -> Duration {
        self.timeout
    }

    async fn fetch_price(&self, asset: &PriceAsset) -> Result<f64, AdapterError> {
        match asset {
            PriceAsset::Token(token) => self.token_price(*token).await,
            PriceAsset::PoolToken(pool) => self
                .chain
                .read_pool_token_price(*pool, self.wrapped_native)
                .await
                .map_err(|e| self.chain_error(e)),
            PriceAsset::NativeCoin => Err(unsupported(&self.name, asset)),
        }
    }
}

#[async_trait]
impl UnderlyingTokenSource for UniswapV2Adapter {
    fn name(&self) -> &str {
        &self.name
    }

    async fn get_underlying_tokens(
        &self,
        token: Address,
    ) -> Result<Vec<UnderlyingToken>, AdapterError> {
        self.chain
            .read_pool_underlyings(token)
            .await
            .map_err(|e| self.chain_error(e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain_state::{pool_share_underlyings, pool_share_value, PoolReserves};

    struct OnePool {
        pool: Address,
        reserves: PoolReserves,
        supply: f64,
    }

    #[async_trait]
    impl ChainState for OnePool {
        async fn find_pool(
            &self,
            _factory: Address,
            a: Address,
            b: Address,
        ) -> Result<Option<Address>, ChainStateError> {
            let sides = [self.reserves.token0, self.reserves.token1];
            Ok((sides.contains(&a) && sides.contains(&b)).then_some(self.pool))
        }

        async fn read_pool_price(&self, pool: Address, token: Address) -> Result<f64, ChainStateError> {
            self.reserves.price_of(pool, token)
        }

        async fn read_pool_token_price(
            &self,
            pool: Address,
            quote: Address,
        ) -> Result<f64, ChainStateError> {
            pool_share_value(pool, &self.reserves, self.supply, quote)
        }

        async fn read_pool_underlyings(
            &self,
            pool: Address,
        ) -> Result<Vec<UnderlyingToken>, ChainStateError> {
            pool_share_underlyings(pool, &self.reserves, self.supply)
        }

        async fn read_aggregator_price(&self, aggregator: Address) -> Result<f64, ChainStateError> {
            Err(ChainStateError::Rpc(format!("no aggregator {:?}", aggregator)))
        }
    }

    fn adapter() -> (UniswapV2Adapter, Address, Address, Address) {
        let dai = Address::from_low_u64_be(0xda1);
        let weth = Address::from_low_u64_be(0xeee);
        let pool = Address::from_low_u64_be(0x1);
        let chain = Arc::new(OnePool {
            pool,
            reserves: PoolReserves {
                token0: dai,
                token1: weth,
                reserve0: 16_000.0,
                reserve1: 10.0,
            },
            supply: 100.0,
        });
        let adapter = UniswapV2Adapter::new("UniswapV2", Address::from_low_u64_be(0xf), weth, chain);
        (adapter, dai, weth, pool)
    }

    #[tokio::test]
    async fn prices_tokens_against_wrapped_native() {
        let (adapter, dai, weth, _) = adapter();
        assert_eq!(adapter.fetch_price(&PriceAsset::Token(weth)).await.unwrap(), 1.0);
        let price = adapter.fetch_price(&PriceAsset::Token(dai)).await.unwrap();
        assert!((price - 0.000625).abs() < 1e-12);
    }

    #[tokio::test]
    async fn token_without_pair_is_no_price() {
        let (adapter, _, _, _) = adapter();
        let err = adapter
            .fetch_price(&PriceAsset::Token(Address::from_low_u64_be(0xbad)))
            .await
            .unwrap_err();
        assert!(err.reason().contains("no pair"));
    }

    #[tokio::test]
    async fn lp_share_value_and_basket() {
        let (adapter, dai, weth, pool) = adapter();
        let value = adapter.fetch_price(&PriceAsset::PoolToken(pool)).await.unwrap();
        assert!((value - 0.2).abs() < 1e-12);

        let basket = adapter.get_underlying_tokens(pool).await.unwrap();
        assert_eq!(
            basket,
            vec![UnderlyingToken::new(dai, 160.0), UnderlyingToken::new(weth, 0.1)]
        );
    }

    #[tokio::test]
    async fn native_coin_is_unsupported() {
        let (adapter, _, _, _) = adapter();
        assert!(adapter.fetch_price(&PriceAsset::NativeCoin).await.is_err());
    }
}
