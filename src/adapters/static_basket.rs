use async_trait::async_trait;
use ethers::prelude::Address;
use std::collections::HashMap;

use crate::errors::AdapterError;
use crate::price_adapter::UnderlyingTokenSource;
use crate::types::UnderlyingToken;

/// Underlying baskets supplied by configuration instead of read from chain.
#[derive(Debug, Clone, Default)]
pub struct StaticBasketSource {
    baskets: HashMap<Address, Vec<UnderlyingToken>>,
}

impl StaticBasketSource {
    pub const NAME: &'static str = "StaticBasket";

    pub fn new(baskets: HashMap<Address, Vec<UnderlyingToken>>) -> Self {
        Self { baskets }
    }

    pub fn len(&self) -> usize {
        self.baskets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.baskets.is_empty()
    }
}

#[async_trait]
impl UnderlyingTokenSource for StaticBasketSource {
    fn name(&self) -> &str {
        Self::NAME
    }

    async fn get_underlying_tokens(
        &self,
        token: Address,
    ) -> Result<Vec<UnderlyingToken>, AdapterError> {
        self.baskets
            .get(&token)
            .cloned()
            .ok_or_else(|| AdapterError::no_price(Self::NAME, format!("no basket for {:?}", token)))
    }
}
