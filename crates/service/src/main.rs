//! Network State Service
//!
//! Read-only daemon that keeps an operator's network snapshot current and
//! serves it over HTTP.

mod api;
mod scanner;
mod state;

use alloy::primitives::Address;
use anyhow::{Context, Result};
use clap::Parser;
use metrics_exporter_prometheus::PrometheusBuilder;
use network_state::{
    BeaconClient, BuildOptions, ConsensusClient, ContractAccessor, ContractAddresses,
    CycleCacheDir, MalformedCyclePolicy, NetworkStateBuilder, RewardProofApi,
};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "node-state-service")]
#[command(about = "Network state snapshots for Stader node operators")]
struct Args {
    /// Beacon node URL
    #[arg(long, env = "BEACON_URL", default_value = "http://localhost:5052")]
    beacon_url: String,

    /// Execution node RPC URL
    #[arg(long, env = "RPC_URL", default_value = "http://localhost:8545")]
    rpc_url: String,

    /// Operator node address
    #[arg(long, env = "NODE_ADDRESS")]
    node_address: Address,

    #[arg(long, env = "PERMISSIONLESS_NODE_REGISTRY")]
    permissionless_node_registry: Address,

    #[arg(long, env = "VAULT_FACTORY")]
    vault_factory: Address,

    #[arg(long, env = "SD_COLLATERAL")]
    sd_collateral: Address,

    #[arg(long, env = "ETHX_TOKEN")]
    ethx_token: Address,

    #[arg(long, env = "PENALTY_TRACKER")]
    penalty_tracker: Address,

    #[arg(long, env = "STAKE_POOL_MANAGER")]
    stake_pool_manager: Address,

    #[arg(long, env = "POOL_UTILS")]
    pool_utils: Address,

    #[arg(long, env = "STADER_CONFIG")]
    stader_config: Address,

    #[arg(long, env = "SOCIALIZING_POOL")]
    socializing_pool: Address,

    /// Directory of cached reward cycle records
    #[arg(long, env = "CYCLE_CACHE_DIR", default_value = "./cycle-cache")]
    cycle_cache_dir: PathBuf,

    /// Reward distribution API base URL; cache sync is disabled when unset
    #[arg(long, env = "MERKLE_API_URL")]
    merkle_api_url: Option<String>,

    /// Seconds between finality polls
    #[arg(long, env = "POLL_INTERVAL_SECS", default_value_t = 12)]
    poll_interval_secs: u64,

    /// Upper bound on concurrent upstream calls per build
    #[arg(long, env = "MAX_CONCURRENT_REQUESTS", default_value_t = 16)]
    max_concurrent_requests: usize,

    /// `isolate` or `strict`
    #[arg(long, env = "MALFORMED_CYCLE_POLICY", default_value = "isolate")]
    malformed_cycle_policy: MalformedCyclePolicy,

    /// Snapshots kept for `/snapshots/{slot}`
    #[arg(long, env = "SNAPSHOT_HISTORY", default_value_t = state::DEFAULT_HISTORY_LIMIT)]
    snapshot_history: usize,

    /// API listen address
    #[arg(long, env = "LISTEN", default_value = "0.0.0.0:8080")]
    listen: String,

    /// Metrics listen address
    #[arg(long, env = "METRICS_LISTEN", default_value = "0.0.0.0:9090")]
    metrics_listen: SocketAddr,

    /// Emit logs as JSON
    #[arg(long, env = "LOG_JSON")]
    log_json: bool,
}

impl Args {
    fn contract_addresses(&self) -> ContractAddresses {
        ContractAddresses {
            permissionless_node_registry: self.permissionless_node_registry,
            vault_factory: self.vault_factory,
            sd_collateral: self.sd_collateral,
            ethx_token: self.ethx_token,
            penalty_tracker: self.penalty_tracker,
            stake_pool_manager: self.stake_pool_manager,
            pool_utils: self.pool_utils,
            stader_config: self.stader_config,
            socializing_pool: self.socializing_pool,
        }
    }
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(json.then(|| tracing_subscriber::fmt::layer().json()))
        .with((!json).then(tracing_subscriber::fmt::layer))
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment from .env if present
    let _ = dotenvy::dotenv();

    let args = Args::parse();
    init_tracing(args.log_json);

    tracing::info!("Starting network state service");
    tracing::info!(beacon_url = %args.beacon_url, "Beacon node");
    tracing::info!(node = %args.node_address, "Operator");
    tracing::info!(listen = %args.listen, "API server");

    PrometheusBuilder::new()
        .with_http_listener(args.metrics_listen)
        .install()
        .context("installing metrics exporter")?;

    let beacon = BeaconClient::new(&args.beacon_url);
    let beacon_config = beacon
        .get_eth2_config()
        .await
        .context("fetching beacon chain config")?;
    tracing::info!(
        genesis_time = beacon_config.genesis_time,
        slots_per_epoch = beacon_config.slots_per_epoch,
        "Beacon config loaded"
    );

    let execution = ContractAccessor::new(&args.rpc_url, args.contract_addresses())
        .context("connecting to execution node")?;
    let cycle_cache = CycleCacheDir::open(&args.cycle_cache_dir)
        .with_context(|| format!("opening {}", args.cycle_cache_dir.display()))?;

    let builder = NetworkStateBuilder::new(
        Arc::new(beacon.clone()),
        Arc::new(execution),
        Arc::new(cycle_cache.clone()),
    )
    .with_options(BuildOptions {
        max_concurrent_requests: args.max_concurrent_requests,
        malformed_cycle_policy: args.malformed_cycle_policy,
    });

    let cache_sync = args.merkle_api_url.as_ref().map(|url| scanner::CacheSync {
        api: RewardProofApi::new(url.as_str()),
        cache: cycle_cache,
    });

    // Initialize application state
    let app_state = state::AppState::with_history_limit(args.snapshot_history);

    let scanner = scanner::Scanner::new(
        scanner::ScannerConfig {
            node_address: args.node_address,
            poll_interval: Duration::from_secs(args.poll_interval_secs),
        },
        beacon,
        beacon_config,
        builder,
        cache_sync,
        app_state.clone(),
    );

    let api_handle = tokio::spawn(api::run_server(args.listen.clone(), app_state));
    let scanner_handle = tokio::spawn(async move { scanner.run().await });

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Received shutdown signal");
        }
        result = api_handle => match result {
            Ok(Ok(())) => {}
            Ok(Err(e)) => tracing::error!(error = %e, "API server error"),
            Err(e) => tracing::error!(error = %e, "API server task failed"),
        },
        result = scanner_handle => match result {
            Ok(Ok(())) => {}
            Ok(Err(e)) => tracing::error!(error = %e, "Scanner error"),
            Err(e) => tracing::error!(error = %e, "Scanner task failed"),
        },
    }

    Ok(())
}
