//! Snapshot Refresher
//!
//! Follows finality and rebuilds the operator snapshot whenever a new epoch is
//! finalized.

use crate::state::{AppState, SnapshotEntry};
use alloy::primitives::Address;
use anyhow::{Context, Result};
use network_state::{
    BeaconClient, BeaconConfig, ConsensusClient, CycleCacheDir, ErrorKind, NetworkStateBuilder,
    NetworkStateCache, RewardProofApi, StateError, ValidatorBucket,
};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tokio::time::sleep;
use tracing::{error, info, info_span, instrument, warn, Instrument};

/// Scanner configuration
#[derive(Debug, Clone)]
pub struct ScannerConfig {
    /// Operator node address the snapshots are built for
    pub node_address: Address,
    /// Polling interval
    pub poll_interval: Duration,
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self {
            node_address: Address::ZERO,
            poll_interval: Duration::from_secs(12),
        }
    }
}

/// Keeps the local cycle cache in step with the distribution service
#[derive(Debug, Clone)]
pub struct CacheSync {
    pub api: RewardProofApi,
    pub cache: CycleCacheDir,
}

/// Finality-driven snapshot refresher
pub struct Scanner {
    config: ScannerConfig,
    client: BeaconClient,
    beacon_config: BeaconConfig,
    builder: NetworkStateBuilder,
    cache_sync: Option<CacheSync>,
    state: AppState,
    last_finalized_epoch: AtomicU64,
}

impl Scanner {
    pub fn new(
        config: ScannerConfig,
        client: BeaconClient,
        beacon_config: BeaconConfig,
        builder: NetworkStateBuilder,
        cache_sync: Option<CacheSync>,
        state: AppState,
    ) -> Self {
        Self {
            config,
            client,
            beacon_config,
            builder,
            cache_sync,
            state,
            last_finalized_epoch: AtomicU64::new(0),
        }
    }

    /// Run the scanner loop
    #[instrument(skip(self), fields(node = %self.config.node_address))]
    pub async fn run(&self) -> Result<()> {
        info!("Starting snapshot refresher");

        loop {
            match self.poll_once().await {
                Ok(()) => self.state.set_error(None),
                Err(e) => {
                    error!(error = %e, "Refresh failed");
                    self.state.record_failure(format!("{e:#}"));
                }
            }

            sleep(self.config.poll_interval).await;
        }
    }

    /// Single poll iteration
    async fn poll_once(&self) -> Result<()> {
        let head_slot = self.client.get_head_slot().await?;
        self.state.set_head_slot(head_slot);

        let checkpoints = self.client.get_finality_checkpoints().await?;
        let finalized_epoch = checkpoints.finalized_epoch;
        self.state.set_finalized_epoch(finalized_epoch);

        // Only process each finalized epoch once
        let last = self.last_finalized_epoch.load(Ordering::Relaxed);
        if finalized_epoch <= last {
            return Ok(());
        }

        let epoch_slot = self.beacon_config.epoch_start_slot(finalized_epoch);
        let span = info_span!("refresh", epoch = finalized_epoch, slot = epoch_slot);
        let Some(snapshot) = self.build_with_fallback(epoch_slot).instrument(span).await? else {
            return Ok(());
        };

        let snapshot = self.sync_cycle_cache(snapshot).await?;
        self.publish(snapshot)?;

        self.last_finalized_epoch
            .store(finalized_epoch, Ordering::Relaxed);
        Ok(())
    }

    /// Build at `slot`, stepping back over empty slots for at most one epoch
    async fn build_with_fallback(&self, slot: u64) -> Result<Option<NetworkStateCache>> {
        for candidate in fallback_slots(slot, self.beacon_config.slots_per_epoch) {
            match self.build(candidate).await {
                Ok(snapshot) => return Ok(Some(snapshot)),
                Err(e) if e.kind() == ErrorKind::EmptySlot => {
                    info!(slot = candidate, "Slot is empty, stepping back");
                }
                Err(e) => return Err(e.into()),
            }
        }

        warn!(slot, "No proposed block within one epoch, skipping round");
        Ok(None)
    }

    #[allow(clippy::cast_precision_loss)]
    async fn build(&self, slot: u64) -> Result<NetworkStateCache, StateError> {
        let start = Instant::now();
        let result = self
            .builder
            .build(slot, &self.beacon_config, self.config.node_address)
            .await;

        let outcome = match &result {
            Ok(_) => "success",
            Err(e) => e.kind().as_str(),
        };
        metrics::counter!("network_state_builds_total", "outcome" => outcome).increment(1);
        metrics::gauge!("network_state_build_seconds").set(start.elapsed().as_secs_f64());

        if let Ok(snapshot) = &result {
            metrics::gauge!("network_state_slot").set(snapshot.beacon_slot_number as f64);
            metrics::gauge!("network_state_el_block").set(snapshot.el_block_number as f64);
            let counts = snapshot.network_details.validator_counts;
            for bucket in ValidatorBucket::ALL {
                metrics::gauge!("network_state_validators", "bucket" => bucket.as_str())
                    .set(counts.bucket(bucket) as f64);
            }
            metrics::gauge!("network_state_validators", "bucket" => "slashed")
                .set(counts.slashed as f64);
        }
        result
    }

    /// Fill the cycle cache from the distribution service, rebuilding when new
    /// closed cycles arrived
    async fn sync_cycle_cache(&self, snapshot: NetworkStateCache) -> Result<NetworkStateCache> {
        let Some(sync) = &self.cache_sync else {
            return Ok(snapshot);
        };

        let current_index = snapshot
            .network_details
            .next_socializing_pool_reward_cycle
            .current_index;
        let written = match sync
            .api
            .sync_cycle_cache(&sync.cache, self.config.node_address, current_index)
            .await
        {
            Ok(written) => written,
            Err(e) => {
                // The snapshot stays valid with the records already cached
                warn!(error = %e, "Cycle cache sync failed");
                return Ok(snapshot);
            }
        };

        if written == 0 {
            return Ok(snapshot);
        }
        info!(written, "New reward cycles cached, rebuilding");
        Ok(self.build(snapshot.beacon_slot_number).await?)
    }

    fn publish(&self, snapshot: NetworkStateCache) -> Result<()> {
        let id = snapshot.digest().context("hashing snapshot")?;
        info!(
            slot = snapshot.beacon_slot_number,
            block = snapshot.el_block_number,
            %id,
            "Snapshot published"
        );
        self.state.publish(SnapshotEntry {
            id,
            built_at: chrono::Utc::now().to_rfc3339(),
            snapshot,
        });
        Ok(())
    }
}

/// `slot` and the slots before it, at most one epoch's worth
fn fallback_slots(slot: u64, slots_per_epoch: u64) -> impl Iterator<Item = u64> {
    let lowest = slot.saturating_sub(slots_per_epoch.saturating_sub(1));
    (lowest..=slot).rev()
}
