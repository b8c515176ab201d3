//! On-chain state capability used by pool and feed adapters.
//!
//! The resolvers never talk to an RPC node directly; on-chain adapters go through
//! [`ChainState`]. [`EthersChainState`] is the production implementation over any
//! `ethers` middleware; tests substitute their own.

use async_trait::async_trait;
use dashmap::DashMap;
use ethers::prelude::{Address, Middleware, U256};
use log::debug;
use std::sync::Arc;

use crate::contracts::{AggregatorV3Interface, Erc20, IUniswapV2Factory, IUniswapV2Pair};
use crate::errors::ChainStateError;
use crate::types::conversions::{positive_i256_to_f64, u256_to_f64};
use crate::types::UnderlyingToken;

#[async_trait]
pub trait ChainState: Send + Sync {
    /// Pair created by `factory` for `token_a`/`token_b`, if any.
    async fn find_pool(
        &self,
        factory: Address,
        token_a: Address,
        token_b: Address,
    ) -> Result<Option<Address>, ChainStateError>;

    /// Spot price of `token` in units of the pool's other token, decimals normalized.
    async fn read_pool_price(&self, pool: Address, token: Address) -> Result<f64, ChainStateError>;

    /// Value of one pool share in units of `quote_token`, which must be one side of the pool.
    async fn read_pool_token_price(
        &self,
        pool: Address,
        quote_token: Address,
    ) -> Result<f64, ChainStateError>;

    /// Tokens backing one pool share, weighted by `reserve / total_supply`.
    async fn read_pool_underlyings(
        &self,
        pool: Address,
    ) -> Result<Vec<UnderlyingToken>, ChainStateError>;

    /// Latest answer of a Chainlink-style aggregator, scaled by its decimals.
    async fn read_aggregator_price(&self, aggregator: Address) -> Result<f64, ChainStateError>;
}

/// Decimal-normalized reserves of a two-token pool.
#[derive(Debug, Clone, PartialEq)]
pub struct PoolReserves {
    pub token0: Address,
    pub token1: Address,
    pub reserve0: f64,
    pub reserve1: f64,
}

impl PoolReserves {
    /// Price of `token` in the other token of the pool.
    pub fn price_of(&self, pool: Address, token: Address) -> Result<f64, ChainStateError> {
        if self.reserve0 <= 0.0 || self.reserve1 <= 0.0 {
            return Err(ChainStateError::EmptyReserves(pool));
        }
        if token == self.token0 {
            Ok(self.reserve1 / self.reserve0)
        } else if token == self.token1 {
            Ok(self.reserve0 / self.reserve1)
        } else {
            Err(ChainStateError::TokenNotInPool { pool, token })
        }
    }

    /// Reserve held on the `token` side.
    pub fn reserve_of(&self, pool: Address, token: Address) -> Result<f64, ChainStateError> {
        if token == self.token0 {
            Ok(self.reserve0)
        } else if token == self.token1 {
            Ok(self.reserve1)
        } else {
            Err(ChainStateError::TokenNotInPool { pool, token })
        }
    }
}

/// Value of one pool share in `quote_token`: both sides are worth the same at the spot
/// price, so the pool holds twice the quote reserve.
pub fn pool_share_value(
    pool: Address,
    reserves: &PoolReserves,
    total_supply: f64,
    quote_token: Address,
) -> Result<f64, ChainStateError> {
    if total_supply <= 0.0 {
        return Err(ChainStateError::ZeroSupply(pool));
    }
    let quote_reserve = reserves.reserve_of(pool, quote_token)?;
    Ok(2.0 * quote_reserve / total_supply)
}

/// Basket behind one pool share.
pub fn pool_share_underlyings(
    pool: Address,
    reserves: &PoolReserves,
    total_supply: f64,
) -> Result<Vec<UnderlyingToken>, ChainStateError> {
    if total_supply <= 0.0 {
        return Err(ChainStateError::ZeroSupply(pool));
    }
    Ok(vec![
        UnderlyingToken::new(reserves.token0, reserves.reserve0 / total_supply),
        UnderlyingToken::new(reserves.token1, reserves.reserve1 / total_supply),
    ])
}

fn rpc_error(err: impl std::fmt::Display) -> ChainStateError {
    ChainStateError::Rpc(err.to_string())
}

/// [`ChainState`] over an `ethers` middleware.
///
/// ERC20 and aggregator decimals never change, so they are cached for the
/// lifetime of the instance.
#[derive(Debug, Clone)]
pub struct EthersChainState<M: Middleware> {
    provider: Arc<M>,
    decimals_cache: Arc<DashMap<Address, u8>>,
}

impl<M: Middleware + 'static> EthersChainState<M> {
    pub fn new(provider: Arc<M>) -> Self {
        Self {
            provider,
            decimals_cache: Arc::new(DashMap::new()),
        }
    }

    async fn token_decimals(&self, token: Address) -> Result<u8, ChainStateError> {
        if let Some(decimals) = self.decimals_cache.get(&token) {
            return Ok(*decimals);
        }
        let decimals = Erc20::new(token, Arc::clone(&self.provider))
            .decimals()
            .call()
            .await
            .map_err(rpc_error)?;
        self.decimals_cache.insert(token, decimals);
        Ok(decimals)
    }

    async fn aggregator_decimals(&self, aggregator: Address) -> Result<u8, ChainStateError> {
        if let Some(decimals) = self.decimals_cache.get(&aggregator) {
            return Ok(*decimals);
        }
        let decimals = AggregatorV3Interface::new(aggregator, Arc::clone(&self.provider))
            .decimals()
            .call()
            .await
            .map_err(rpc_error)?;
        self.decimals_cache.insert(aggregator, decimals);
        Ok(decimals)
    }

    async fn pool_reserves(&self, pool: Address) -> Result<PoolReserves, ChainStateError> {
        let pair = IUniswapV2Pair::new(pool, Arc::clone(&self.provider));
        let token0_call = pair.token_0();
        let token1_call = pair.token_1();
        let reserves_call = pair.get_reserves();
        let (token0, token1, (reserve0, reserve1, _)) = tokio::try_join!(
            token0_call.call(),
            token1_call.call(),
            reserves_call.call()
        )
        .map_err(rpc_error)?;

        let (decimals0, decimals1) =
            tokio::try_join!(self.token_decimals(token0), self.token_decimals(token1))?;

        Ok(PoolReserves {
            token0,
            token1,
            reserve0: u256_to_f64(U256::from(reserve0), decimals0),
            reserve1: u256_to_f64(U256::from(reserve1), decimals1),
        })
    }

    async fn pool_total_supply(&self, pool: Address) -> Result<f64, ChainStateError> {
        let pair = IUniswapV2Pair::new(pool, Arc::clone(&self.provider));
        let supply_call = pair.total_supply();
        let decimals_call = pair.decimals();
        let (supply, decimals) =
            tokio::try_join!(supply_call.call(), decimals_call.call()).map_err(rpc_error)?;
        Ok(u256_to_f64(supply, decimals))
    }
}

#[async_trait]
impl<M: Middleware + 'static> ChainState for EthersChainState<M> {
    async fn find_pool(
        &self,
        factory: Address,
        token_a: Address,
        token_b: Address,
    ) -> Result<Option<Address>, ChainStateError> {
        let pair = IUniswapV2Factory::new(factory, Arc::clone(&self.provider))
            .get_pair(token_a, token_b)
            .call()
            .await
            .map_err(rpc_error)?;
        if pair == Address::zero() {
            debug!("No pair for {:?}/{:?} on factory {:?}", token_a, token_b, factory);
            return Ok(None);
        }
        Ok(Some(pair))
    }

    async fn read_pool_price(&self, pool: Address, token: Address) -> Result<f64, ChainStateError> {
        self.pool_reserves(pool).await?.price_of(pool, token)
    }

    async fn read_pool_token_price(
        &self,
        pool: Address,
        quote_token: Address,
    ) -> Result<f64, ChainStateError> {
        let (reserves, supply) =
            tokio::try_join!(self.pool_reserves(pool), self.pool_total_supply(pool))?;
        pool_share_value(pool, &reserves, supply, quote_token)
    }

    async fn read_pool_underlyings(
        &self,
        pool: Address,
    ) -> Result<Vec<UnderlyingToken>, ChainStateError> {
        let (reserves, supply) =
            tokio::try_join!(self.pool_reserves(pool), self.pool_total_supply(pool))?;
        pool_share_underlyings(pool, &reserves, supply)
    }

    async fn read_aggregator_price(&self, aggregator: Address) -> Result<f64, ChainStateError> {
        let feed = AggregatorV3Interface::new(aggregator, Arc::clone(&self.provider));
        let round_call = feed.latest_round_data();
        let (_round_id, answer, _started_at, _updated_at, _answered_in_round) =
            round_call.call().await.map_err(rpc_error)?;
        let decimals = self.aggregator_decimals(aggregator).await?;
        positive_i256_to_f64(answer, decimals).map_err(|e| ChainStateError::InvalidAnswer {
            aggregator,
            reason: e.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reserves() -> PoolReserves {
        PoolReserves {
            token0: Address::from_low_u64_be(1),
            token1: Address::from_low_u64_be(2),
            reserve0: 2_000.0,
            reserve1: 1.0,
        }
    }

    #[test]
    fn spot_price_in_both_directions() {
        let pool = Address::from_low_u64_be(99);
        let r = reserves();
        assert!((r.price_of(pool, r.token0).unwrap() - 0.0005).abs() < 1e-12);
        assert!((r.price_of(pool, r.token1).unwrap() - 2_000.0).abs() < 1e-9);
        assert!(matches!(
            r.price_of(pool, Address::from_low_u64_be(3)),
            Err(ChainStateError::TokenNotInPool { .. })
        ));
    }

    #[test]
    fn empty_pool_has_no_price() {
        let pool = Address::from_low_u64_be(99);
        let mut r = reserves();
        r.reserve1 = 0.0;
        assert!(matches!(r.price_of(pool, r.token0), Err(ChainStateError::EmptyReserves(_))));
    }

    #[test]
    fn share_value_and_underlyings() {
        let pool = Address::from_low_u64_be(99);
        let r = reserves();
        // 1 native coin on one side, 10 shares outstanding.
        let value = pool_share_value(pool, &r, 10.0, r.token1).unwrap();
        assert!((value - 0.2).abs() < 1e-12);

        let basket = pool_share_underlyings(pool, &r, 10.0).unwrap();
        assert_eq!(basket[0], UnderlyingToken::new(r.token0, 200.0));
        assert_eq!(basket[1], UnderlyingToken::new(r.token1, 0.1));
        assert!(pool_share_value(pool, &r, 0.0, r.token1).is_err());
    }
}
