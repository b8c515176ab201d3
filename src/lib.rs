//! # Price Oracle SDK
//!
//! Multi-source price resolution for EVM networks. Given a token address (or the
//! network's native coin) the SDK produces a native coin or USD price by querying an
//! ordered set of independent, unreliable price sources, with fallback, composed-token
//! pricing and stale-tolerant caching.
//!
//! ## Overview
//!
//! - **Adapters**: uniform `fetch_price` over exchange tickers (Kraken, Kucoin, Binance),
//!   CoinGecko, UniswapV2-style pools and Chainlink feeds
//! - **Oracle chains**: ordered fallback, first success wins, bounded by timeouts and
//!   an optional caller deadline
//! - **Composed tokens**: LP shares and configured baskets priced from their weighted
//!   underlyings, depth-bounded
//! - **Caching**: per-category TTLs over a pluggable backend (in-memory or Redis) with
//!   last-known-good fallback when every source fails
//!
//! ## Architecture
//!
//! ### Sources
//! [`price_adapter::PriceAdapter`] and [`price_adapter::UnderlyingTokenSource`] are the
//! seams every source plugs into. On-chain sources read through [`chain_state::ChainState`].
//!
//! ### Resolution
//! [`oracle_chain::OracleChain`] and [`composed_oracle::ComposedResolver`] turn a list of
//! sources into one answer. [`oracle_registry::OracleRegistry`] holds the immutable
//! per-network selection.
//!
//! ### Service
//! [`price_service::PriceService`] wires resolution to [`cache::PriceCache`] and is the
//! only surface callers need.

// Core Types
/// Price queries, assets and results
pub mod types;
/// Error taxonomy
pub mod errors;
/// Network constants and default adapter selection
pub mod networks;

// Sources
/// Adapter traits
pub mod price_adapter;
/// HTTP and on-chain adapters
pub mod adapters;
/// On-chain reads used by pool and feed adapters
pub mod chain_state;
/// Contract bindings
pub mod contracts;

// Resolution
/// Ordered fallback over adapters
pub mod oracle_chain;
/// Weighted basket pricing
pub mod composed_oracle;
/// Per-network adapter table
pub mod oracle_registry;

// Caching
/// Storage backends
pub mod cache_backend;
/// TTL cache with stale fallback
pub mod cache;
/// Redis backend (feature `redis`)
pub mod redis_manager;

// Service
/// Public price API
pub mod price_service;

// Infrastructure
/// Metrics collection (feature `observability`)
pub mod metrics;
/// Configuration
pub mod settings;

// Re-exports for convenience
pub use errors::PriceServiceError;
pub use networks::Network;
pub use oracle_registry::OracleRegistry;
pub use price_service::{PriceService, PriceServiceConfig};
pub use settings::Settings;
pub use types::{Currency, PriceAsset, PriceQuery};
