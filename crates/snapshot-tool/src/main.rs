use alloy::primitives::Address;
use anyhow::{Context, Result};
use clap::Parser;
use network_state::{
    BeaconClient, BuildOptions, ConsensusClient, ContractAccessor, ContractAddresses,
    CycleCacheDir, MalformedCyclePolicy, NetworkStateBuilder, NetworkStateCache, RewardProofApi,
    ValidatorBucket,
};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "fetch-snapshot")]
#[command(about = "Build one network state snapshot and write it as JSON")]
struct Args {
    #[arg(long, env = "BEACON_URL", default_value = "http://localhost:5052")]
    beacon_url: String,

    #[arg(long, env = "RPC_URL", default_value = "http://localhost:8545")]
    rpc_url: String,

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

    /// Slot to reconstruct; defaults to the start of the finalized epoch
    #[arg(long)]
    slot: Option<u64>,

    /// Where to write the snapshot
    #[arg(long, short, default_value = "network_state_snapshot.json")]
    output: PathBuf,

    #[arg(long, env = "CYCLE_CACHE_DIR", default_value = "./cycle-cache")]
    cycle_cache_dir: PathBuf,

    /// Fill the cycle cache from this distribution API before building
    #[arg(long, env = "MERKLE_API_URL")]
    merkle_api_url: Option<String>,

    #[arg(long, default_value_t = 16)]
    max_concurrent_requests: usize,

    #[arg(long, default_value = "isolate")]
    malformed_cycle_policy: MalformedCyclePolicy,
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

#[tokio::main]
async fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let args = Args::parse();
    println!("Using beacon endpoint: {}", args.beacon_url);
    println!("Using execution endpoint: {}\n", args.rpc_url);

    let beacon = BeaconClient::new(&args.beacon_url);
    let beacon_config = beacon
        .get_eth2_config()
        .await
        .context("Failed to fetch beacon chain config")?;

    let slot = match args.slot {
        Some(slot) => slot,
        None => {
            let finality = beacon
                .get_finality_checkpoints()
                .await
                .context("Failed to fetch finality checkpoints")?;
            println!("Finalized epoch: {}", finality.finalized_epoch);
            beacon_config.epoch_start_slot(finality.finalized_epoch)
        }
    };

    let cycle_cache = CycleCacheDir::open(&args.cycle_cache_dir)
        .with_context(|| format!("Failed to open {}", args.cycle_cache_dir.display()))?;
    let execution = ContractAccessor::new(&args.rpc_url, args.contract_addresses())
        .context("Failed to connect to execution node")?;
    let builder = NetworkStateBuilder::new(
        Arc::new(beacon.clone()),
        Arc::new(execution),
        Arc::new(cycle_cache.clone()),
    )
    .with_options(BuildOptions {
        max_concurrent_requests: args.max_concurrent_requests,
        malformed_cycle_policy: args.malformed_cycle_policy,
    });

    println!("Building snapshot at slot {slot}...");
    let mut snapshot = builder
        .build(slot, &beacon_config, args.node_address)
        .await
        .with_context(|| format!("Failed to build snapshot at slot {slot}"))?;

    if let Some(url) = &args.merkle_api_url {
        let api = RewardProofApi::new(url.as_str());
        let current_index = snapshot
            .network_details
            .next_socializing_pool_reward_cycle
            .current_index;
        let written = api
            .sync_cycle_cache(&cycle_cache, args.node_address, current_index)
            .await
            .context("Failed to sync reward cycle cache")?;
        if written > 0 {
            println!("Cached {written} new reward cycles, rebuilding...");
            snapshot = builder
                .build(slot, &beacon_config, args.node_address)
                .await
                .with_context(|| format!("Failed to rebuild snapshot at slot {slot}"))?;
        }
    }

    print_summary(&snapshot);
    let id = write_snapshot(&snapshot, &args.output)?;
    println!("\nSnapshot {id}");
    println!("Saved to {}", args.output.display());

    Ok(())
}

fn print_summary(snapshot: &NetworkStateCache) {
    let details = &snapshot.network_details;
    let timestamp = snapshot.beacon_config.slot_timestamp(snapshot.beacon_slot_number);
    let slot_time = i64::try_from(timestamp)
        .ok()
        .and_then(|secs| chrono::DateTime::from_timestamp(secs, 0))
        .map_or_else(|| timestamp.to_string(), |time| time.to_rfc3339());

    println!("\nSummary:");
    println!("   Slot: {} ({slot_time})", snapshot.beacon_slot_number);
    println!("   Execution block: {}", snapshot.el_block_number);
    println!(
        "   Operator: {} (id {})",
        details.operator_address, details.operator_id
    );
    for bucket in ValidatorBucket::ALL {
        let count = details.validator_counts.bucket(bucket);
        if count > 0 {
            println!("   {bucket}: {count}");
        }
    }
    println!("   Slashed: {}", details.validator_counts.slashed);
    println!("   SD price: {}", details.sd_price);
    println!("   Operator SD staked: {}", details.operator_staked_sd);
    println!("   Cumulative penalty: {} ETH", details.cumulative_penalty);
    println!("   Unclaimed CL rewards: {} ETH", details.unclaimed_cl_rewards);
    println!(
        "   Socializing pool rewards: {} ETH / {} SD claimed, {} ETH / {} SD unclaimed",
        details.claimed_socializing_pool_el_rewards,
        details.claimed_socializing_pool_sd_rewards,
        details.unclaimed_socializing_pool_el_rewards,
        details.unclaimed_socializing_pool_sd_rewards,
    );
    if !details.skipped_reward_cycles.is_empty() {
        println!(
            "   Skipped reward cycles: {:?}",
            details.skipped_reward_cycles
        );
    }
}

/// Write pretty JSON and return the snapshot digest
fn write_snapshot(snapshot: &NetworkStateCache, output: &Path) -> Result<String> {
    let id = snapshot.digest().context("Failed to hash snapshot")?;
    let json = serde_json::to_string_pretty(snapshot)?;
    fs::write(output, json).with_context(|| format!("Failed to write {}", output.display()))?;
    Ok(id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use network_state::{BeaconConfig, NetworkDetails};
    use std::collections::BTreeMap;

    fn snapshot() -> NetworkStateCache {
        NetworkStateCache {
            el_block_number: 18_000_000,
            beacon_slot_number: 7_000_000,
            beacon_config: BeaconConfig::default(),
            network_details: NetworkDetails::default(),
            validator_details: BTreeMap::new(),
        }
    }

    #[test]
    fn test_written_snapshot_reloads() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("snapshot.json");
        let snapshot = snapshot();

        let id = write_snapshot(&snapshot, &output).unwrap();

        let loaded: NetworkStateCache =
            serde_json::from_str(&fs::read_to_string(&output).unwrap()).unwrap();
        assert_eq!(loaded, snapshot);
        assert_eq!(loaded.digest().unwrap(), id);
    }

    #[test]
    fn test_args_require_node_address() {
        let parsed = Args::try_parse_from(["fetch-snapshot", "--slot", "64"]);
        assert!(parsed.is_err());
    }
}
