//! Common types shared by adapters, resolvers, the cache layer and the price service.

pub mod conversions;
pub mod price;

pub use price::{
    Currency, EthValueWithTimestamp, PriceAsset, PriceCategory, PriceQuery, PriceState,
    UnderlyingToken,
};
