//! # Price Probe
//!
//! Operator CLI that builds a price service from settings and resolves one query.
//!
//! ## Usage
//!
//! ```bash
//! cargo run --bin price_probe -- native
//! cargo run --bin price_probe -- --network gnosis usd 0x6A023CCd1ff6F2045C3309768eAd9E68F978f6e1
//! cargo run --bin price_probe -- --config Config.toml oracles
//! ```
//!
//! On-chain adapters are only enabled when `chain.rpc_url` (or `PRICE_SDK_RPC_URL`) is set.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use ethers::prelude::{Http, Provider};
use log::info;
use price_oracle_sdk::{
    cache_backend::build_backend,
    chain_state::{ChainState, EthersChainState},
    metrics,
    networks::Network,
    oracle_registry::OracleRegistry,
    price_adapter::UnderlyingTokenSource,
    price_service::{PriceService, PriceServiceConfig},
    settings::Settings,
    types::conversions::string_to_address,
};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "price_probe")]
#[command(about = "Resolve prices through the configured oracle chains", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Settings file. Defaults to ./Config.toml when present.
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Network name or chain id, overriding settings.
    #[arg(short, long)]
    network: Option<String>,

    /// Overall time budget for the query, in milliseconds.
    #[arg(long)]
    budget_ms: Option<u64>,

    /// Prometheus exporter port (only with the `observability` feature).
    #[arg(long, default_value_t = 9000)]
    metrics_port: u16,
}

#[derive(Subcommand)]
enum Command {
    /// USD price of the native coin
    Native,
    /// Native coin value of a token
    Token { address: String },
    /// USD price of a token
    Usd { address: String },
    /// Native coin value of one LP share
    PoolToken { address: String },
    /// Composed value of a token from its underlying basket
    Composed { address: String },
    /// Print the enabled oracle chains
    Oracles,
}

#[cfg(feature = "observability")]
fn install_metrics(port: u16) -> Result<()> {
    use metrics_exporter_prometheus::PrometheusBuilder;

    PrometheusBuilder::new()
        .with_http_listener(([0, 0, 0, 0], port))
        .install()
        .context("Failed to install Prometheus exporter")?;
    info!("Prometheus exporter listening on port {}", port);
    Ok(())
}

#[cfg(not(feature = "observability"))]
fn install_metrics(_port: u16) -> Result<()> {
    Ok(())
}

fn chain_states(settings: &Settings, network: Network) -> Result<HashMap<Network, Arc<dyn ChainState>>> {
    let mut states: HashMap<Network, Arc<dyn ChainState>> = HashMap::new();
    if let Some(rpc_url) = &settings.chain.rpc_url {
        let provider = Provider::<Http>::try_from(rpc_url.as_str())
            .with_context(|| format!("Invalid RPC URL {}", rpc_url))?;
        states.insert(network, Arc::new(EthersChainState::new(Arc::new(provider))));
        info!("On-chain adapters enabled for {} via {}", network, rpc_url);
    }
    Ok(states)
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env file
    dotenv::dotenv().ok();

    env_logger::init();

    let cli = Cli::parse();

    let mut settings = match &cli.config {
        Some(path) => Settings::from_path(path)
            .with_context(|| format!("Failed to load settings from {:?}", path))?,
        None => Settings::new().context("Failed to load settings")?,
    };
    if let Some(network) = &cli.network {
        settings.network = network.clone();
    }
    let network = settings.network()?;

    install_metrics(cli.metrics_port)?;
    metrics::describe_metrics();

    let registry = OracleRegistry::from_settings(&settings, &chain_states(&settings, network)?)?;
    let backend = build_backend(&settings.cache).await?;
    let service = PriceService::new(network, &registry, backend, PriceServiceConfig::from(&settings));
    let budget = cli.budget_ms.map(Duration::from_millis);

    match cli.command {
        Command::Native => {
            let price = match budget {
                Some(budget) => service.get_native_coin_usd_price_within(budget).await?,
                None => service.get_native_coin_usd_price().await?,
            };
            println!("{} native coin: {} USD", network, price);
        }
        Command::Token { address } => {
            let token = string_to_address(&address)?;
            let value = match budget {
                Some(budget) => service.get_token_eth_value_within(token, budget).await?,
                None => service.get_token_eth_value(token).await?,
            };
            println!("{:?}: {} native coin", token, value);
        }
        Command::Usd { address } => {
            let token = string_to_address(&address)?;
            let price = match budget {
                Some(budget) => service.get_token_usd_price_within(token, budget).await?,
                None => service.get_token_usd_price(token).await?,
            };
            println!("{:?}: {} USD", token, price);
        }
        Command::PoolToken { address } => {
            let pool = string_to_address(&address)?;
            let value = match budget {
                Some(budget) => service.get_pool_token_eth_value_within(pool, budget).await?,
                None => service.get_pool_token_eth_value(pool).await?,
            };
            println!("{:?}: {} native coin per LP share", pool, value);
        }
        Command::Composed { address } => {
            let token = string_to_address(&address)?;
            for underlying in service.get_underlying_tokens(token).await.unwrap_or_default() {
                println!("  {:?} x {}", underlying.address, underlying.weight);
            }
            let value = service.get_token_eth_price_from_composed_oracles(token).await;
            println!("{:?}: {} native coin (composed)", token, value);
        }
        Command::Oracles => {
            println!("network:     {} (chain id {})", network, network.chain_id());
            println!("native coin: {:?}", service.enabled_native_coin_oracles().names());
            println!("token:       {:?}", service.enabled_price_oracles().names());
            println!("pool token:  {:?}", service.enabled_price_pool_oracles().names());
            let composed: Vec<&str> = service
                .enabled_composed_price_oracles()
                .iter()
                .map(|source| source.name())
                .collect();
            println!("composed:    {:?}", composed);
        }
    }

    Ok(())
}
