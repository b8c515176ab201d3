use ethers::prelude::abigen;

// Chainlink TOKEN/ETH feeds answer in the quote asset with `decimals()` precision.
abigen!(
    AggregatorV3Interface,
    r#"[
        function latestRoundData() external view returns (uint80 roundId, int256 answer, uint256 startedAt, uint256 updatedAt, uint80 answeredInRound)
        function decimals() external view returns (uint8)
    ]"#
);
