use ethers::prelude::abigen;

abigen!(
    Erc20,
    r#"[
        function decimals() external view returns (uint8)
    ]"#
);
