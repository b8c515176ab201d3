// Contracts Module - ABIs read by EthersChainState

pub mod aggregator_v3_interface;
pub mod erc20;
pub mod i_uniswap_v2_factory;
pub mod i_uniswap_v2_pair;

// Public exports
pub use aggregator_v3_interface::AggregatorV3Interface;
pub use erc20::Erc20;
pub use i_uniswap_v2_factory::IUniswapV2Factory;
pub use i_uniswap_v2_pair::IUniswapV2Pair;
