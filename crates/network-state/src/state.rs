//! State Builder
//!
//! Sequences the collaborators into one immutable [`NetworkStateCache`]:
//!
//! ```text
//! ResolveBlock -> FetchOperatorValidators -> FetchLifecycleStatuses
//!   -> Classify+AccumulateRewardShares -> FetchNetworkTotals
//!   -> ReconcileRewardCycles -> Assemble
//! ```
//!
//! Every execution read is pinned to the block anchored by the requested slot.
//! Any stage failure fails the build; there is no partial snapshot.

use crate::beacon_client::{BeaconClientError, ConsensusClient};
use crate::classifier::{classify, Classification, ClassifyError, ValidatorBucket};
use crate::execution::{ExecutionAccessor, ExecutionError};
use crate::fanout::try_join_ordered;
use crate::rewards::{
    reconcile_reward_cycles, CycleCacheError, MalformedCyclePolicy, ReconcileError,
    RewardProofCache, RewardTotals,
};
use crate::types::{
    BeaconConfig, RewardCycleDetails, ValidatorContractInfo, ValidatorPubkey, ValidatorStatus,
};
use crate::units::{round_down_wei, WEI_PER_ETH};
use alloy::primitives::{Address, U256};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tokio::task::JoinError;
use tracing::{debug, info, instrument};

/// Pool id of the permissionless pool
pub const PERMISSIONLESS_POOL_ID: u8 = 1;

/// ETH bonded by the operator for every permissionless key
pub const OPERATOR_BOND_ETH: u64 = 4;

/// Default bound on in-flight upstream calls per build
pub const DEFAULT_MAX_CONCURRENT_REQUESTS: usize = 16;

/// Tunables for a build
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildOptions {
    /// Upper bound on concurrent upstream calls; values below 1 act as 1
    pub max_concurrent_requests: usize,
    pub malformed_cycle_policy: MalformedCyclePolicy,
}

impl Default for BuildOptions {
    fn default() -> Self {
        Self {
            max_concurrent_requests: DEFAULT_MAX_CONCURRENT_REQUESTS,
            malformed_cycle_policy: MalformedCyclePolicy::default(),
        }
    }
}

/// Classification tag of a failed build
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// The requested slot has no block
    EmptySlot,
    /// A consensus, execution or cache call failed
    UpstreamUnavailable,
    /// The two chains disagree, or a validator could not be classified
    ConsistencyViolation,
    /// A cached reward record is malformed
    ParseError,
    /// A build task panicked
    Internal,
}

impl ErrorKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::EmptySlot => "empty_slot",
            Self::UpstreamUnavailable => "upstream_unavailable",
            Self::ConsistencyViolation => "consistency_violation",
            Self::ParseError => "parse_error",
            Self::Internal => "internal",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Terminal build failure
#[derive(Debug, Error)]
pub enum StateError {
    #[error("Slot {0} has no block")]
    EmptySlot(u64),

    #[error("Beacon client error: {0}")]
    Beacon(#[from] BeaconClientError),

    #[error("Execution error: {0}")]
    Execution(#[from] ExecutionError),

    #[error("Cycle cache error: {0}")]
    CycleCache(CycleCacheError),

    #[error("Reward cycle {cycle} record is malformed: {reason}")]
    MalformedCycle { cycle: u64, reason: String },

    #[error("Consistency violation: {0}")]
    Consistency(String),

    #[error(transparent)]
    Unclassified(#[from] ClassifyError),

    #[error("Build task failed: {0}")]
    Task(#[from] JoinError),
}

impl StateError {
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::EmptySlot(_) => ErrorKind::EmptySlot,
            Self::Beacon(_) | Self::Execution(_) => ErrorKind::UpstreamUnavailable,
            Self::CycleCache(e) if e.is_malformed_record() => ErrorKind::ParseError,
            Self::CycleCache(_) => ErrorKind::UpstreamUnavailable,
            Self::MalformedCycle { .. } => ErrorKind::ParseError,
            Self::Consistency(_) | Self::Unclassified(_) => ErrorKind::ConsistencyViolation,
            Self::Task(_) => ErrorKind::Internal,
        }
    }
}

impl From<ReconcileError> for StateError {
    fn from(err: ReconcileError) -> Self {
        match err {
            ReconcileError::Cache(e) => Self::CycleCache(e),
            ReconcileError::MalformedCycle { cycle, reason } => {
                Self::MalformedCycle { cycle, reason }
            }
            ReconcileError::Execution(e) => Self::Execution(e),
            ReconcileError::Task(e) => Self::Task(e),
        }
    }
}

/// Validator counts per primary bucket, plus the independent slashed tag
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidatorCounts {
    pub initialized: u64,
    pub invalid_signature: u64,
    pub front_run: u64,
    pub funds_settled: u64,
    pub exiting: u64,
    pub withdrawn: u64,
    pub queued: u64,
    pub active: u64,
    /// Slashed validators among those that reached the queued/active rows
    pub slashed: u64,
}

impl ValidatorCounts {
    pub fn record(&mut self, classification: Classification) {
        let counter = match classification.bucket {
            ValidatorBucket::Initialized => &mut self.initialized,
            ValidatorBucket::InvalidSignature => &mut self.invalid_signature,
            ValidatorBucket::FrontRun => &mut self.front_run,
            ValidatorBucket::FundsSettled => &mut self.funds_settled,
            ValidatorBucket::Exiting => &mut self.exiting,
            ValidatorBucket::Withdrawn => &mut self.withdrawn,
            ValidatorBucket::Queued => &mut self.queued,
            ValidatorBucket::Active => &mut self.active,
        };
        *counter += 1;

        if classification.slashed && classification.accrues_rewards() {
            self.slashed += 1;
        }
    }

    #[must_use]
    pub fn bucket(&self, bucket: ValidatorBucket) -> u64 {
        match bucket {
            ValidatorBucket::Initialized => self.initialized,
            ValidatorBucket::InvalidSignature => self.invalid_signature,
            ValidatorBucket::FrontRun => self.front_run,
            ValidatorBucket::FundsSettled => self.funds_settled,
            ValidatorBucket::Exiting => self.exiting,
            ValidatorBucket::Withdrawn => self.withdrawn,
            ValidatorBucket::Queued => self.queued,
            ValidatorBucket::Active => self.active,
        }
    }

    /// Sum over primary buckets; `slashed` is not included
    #[must_use]
    pub fn bucket_total(&self) -> u64 {
        ValidatorBucket::ALL.iter().map(|b| self.bucket(*b)).sum()
    }
}

/// Protocol and operator rollup. Display figures are truncated, never rounded up.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NetworkDetails {
    pub operator_address: Address,
    pub operator_id: u64,
    pub validator_counts: ValidatorCounts,

    /// SD per ETH, 2 digits
    pub sd_price: f64,
    pub total_operators: u64,
    pub total_validators: u64,
    pub total_active_validators: u64,
    pub total_queued_validators: u64,
    /// SD held as collateral across all operators, 10 digits
    pub total_staked_sd: f64,
    /// 10 digits
    pub total_ethx_supply: f64,
    /// Wei
    pub total_staked_eth_by_users: U256,
    /// Whole ETH
    pub total_staked_eth_by_nos: u64,
    /// Minimum SD collateral per key in ETH terms, 2 digits
    pub collateral_ratio: f64,
    pub collateral_ratio_in_sd: f64,

    /// 10 digits
    pub operator_staked_sd: f64,
    /// Whole ETH bonded by the operator's non-terminal keys
    pub operator_eth_collateral: u64,

    /// 2 digits
    pub cumulative_penalty: f64,
    pub cumulative_penalty_wei: U256,
    /// Operator share of withdraw vault balances at or below the rewards threshold, 18 digits
    pub unclaimed_cl_rewards: f64,
    pub unclaimed_cl_rewards_wei: U256,
    /// Operator share of the operator's own EL reward vault, 2 digits
    pub unclaimed_non_socializing_pool_el_rewards: f64,
    pub unclaimed_non_socializing_pool_el_rewards_wei: U256,

    pub claimed_socializing_pool_el_rewards: f64,
    pub claimed_socializing_pool_sd_rewards: f64,
    pub unclaimed_socializing_pool_el_rewards: f64,
    pub unclaimed_socializing_pool_sd_rewards: f64,
    pub claimed_socializing_pool_el_rewards_wei: U256,
    pub claimed_socializing_pool_sd_rewards_wei: U256,
    pub unclaimed_socializing_pool_el_rewards_wei: U256,
    pub unclaimed_socializing_pool_sd_rewards_wei: U256,
    pub next_socializing_pool_reward_cycle: RewardCycleDetails,
    /// Cycles left out because their cached record was malformed
    pub skipped_reward_cycles: Vec<u64>,

    pub validator_info_map: BTreeMap<ValidatorPubkey, ValidatorContractInfo>,
    pub validator_classifications: BTreeMap<ValidatorPubkey, Classification>,
}

/// Point-in-time snapshot of the network as seen by one operator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkStateCache {
    pub el_block_number: u64,
    pub beacon_slot_number: u64,
    pub beacon_config: BeaconConfig,
    pub network_details: NetworkDetails,
    pub validator_details: BTreeMap<ValidatorPubkey, ValidatorStatus>,
}

impl NetworkStateCache {
    /// Hex SHA-256 of the canonical JSON encoding
    ///
    /// # Errors
    /// Returns an error if serialization fails
    pub fn digest(&self) -> Result<String, serde_json::Error> {
        let json = serde_json::to_vec(self)?;
        Ok(hex::encode(Sha256::digest(&json)))
    }
}

struct OperatorValidators {
    operator_id: u64,
    total_keys: u64,
    infos: BTreeMap<ValidatorPubkey, ValidatorContractInfo>,
}

struct ValidatorRollup {
    counts: ValidatorCounts,
    classifications: BTreeMap<ValidatorPubkey, Classification>,
    cumulative_penalty: U256,
    unclaimed_cl_rewards: U256,
}

struct NetworkTotals {
    sd_price: U256,
    next_operator_id: u64,
    next_validator_id: u64,
    total_active_validators: u64,
    total_queued_validators: u64,
    total_sd_collateral: U256,
    ethx_supply: U256,
    total_staked_assets: U256,
    min_threshold: U256,
    operator_sd_balance: U256,
    operator_non_terminal_keys: u64,
    reward_cycle: RewardCycleDetails,
    operator_el_rewards: U256,
}

/// Builds [`NetworkStateCache`] snapshots from the consensus client, the
/// execution accessors and the reward-proof cache
#[derive(Clone)]
pub struct NetworkStateBuilder {
    consensus: Arc<dyn ConsensusClient>,
    execution: Arc<dyn ExecutionAccessor>,
    cycle_cache: Arc<dyn RewardProofCache>,
    options: BuildOptions,
}

impl NetworkStateBuilder {
    #[must_use]
    pub fn new(
        consensus: Arc<dyn ConsensusClient>,
        execution: Arc<dyn ExecutionAccessor>,
        cycle_cache: Arc<dyn RewardProofCache>,
    ) -> Self {
        Self {
            consensus,
            execution,
            cycle_cache,
            options: BuildOptions::default(),
        }
    }

    #[must_use]
    pub fn with_options(mut self, options: BuildOptions) -> Self {
        self.options = options;
        self
    }

    #[must_use]
    pub fn options(&self) -> &BuildOptions {
        &self.options
    }

    fn limit(&self) -> usize {
        self.options.max_concurrent_requests.max(1)
    }

    /// Build the snapshot for `node` at `slot`
    ///
    /// # Errors
    /// Returns [`StateError::EmptySlot`] when the slot has no block, and any
    /// upstream, consistency or parse failure otherwise. See
    /// [`StateError::kind`].
    #[instrument(skip(self, beacon_config, node), fields(node = %node))]
    pub async fn build(
        &self,
        slot: u64,
        beacon_config: &BeaconConfig,
        node: Address,
    ) -> Result<NetworkStateCache, StateError> {
        let start = Instant::now();

        let block = self.resolve_block(slot).await?;
        let validators = self.fetch_operator_validators(node, block).await?;
        let pubkeys: Vec<ValidatorPubkey> = validators.infos.keys().copied().collect();
        let statuses = self.fetch_lifecycle_statuses(&pubkeys, slot).await?;
        let rollup = self
            .classify_validators(&validators.infos, &statuses, block)
            .await?;
        let totals = self.fetch_network_totals(node, &validators, block).await?;
        let rewards = self
            .reconcile_rewards(node, totals.reward_cycle.current_index, block)
            .await?;

        let network_details = assemble_details(node, validators, rollup, &totals, rewards);

        info!(
            slot,
            block,
            validators = network_details.validator_info_map.len(),
            elapsed = ?start.elapsed(),
            "Network state built"
        );

        Ok(NetworkStateCache {
            el_block_number: block,
            beacon_slot_number: slot,
            beacon_config: beacon_config.clone(),
            network_details,
            validator_details: statuses,
        })
    }

    #[instrument(skip(self))]
    async fn resolve_block(&self, slot: u64) -> Result<u64, StateError> {
        let block = self
            .consensus
            .resolve_block(slot)
            .await?
            .ok_or(StateError::EmptySlot(slot))?;

        if !block.has_execution_payload {
            return Err(StateError::Consistency(format!(
                "block at slot {slot} has no execution payload"
            )));
        }
        debug!(slot, el_block = block.execution_block_number, "Resolved block");
        Ok(block.execution_block_number)
    }

    #[instrument(skip(self, node))]
    async fn fetch_operator_validators(
        &self,
        node: Address,
        block: u64,
    ) -> Result<OperatorValidators, StateError> {
        let operator_id = self.execution.operator_id(node, block).await?;
        let total_keys = self
            .execution
            .total_validator_keys(operator_id, block)
            .await?;
        debug!(operator_id, total_keys, "Enumerating operator keys");

        let execution = &self.execution;
        let ids = try_join_ordered(0..total_keys, self.limit(), |index| {
            let execution = Arc::clone(execution);
            async move {
                execution
                    .validator_id_by_operator_id(operator_id, index, block)
                    .await
                    .map_err(StateError::from)
            }
        })
        .await?;

        let records = try_join_ordered(ids, self.limit(), |validator_id| {
            let execution = Arc::clone(execution);
            async move {
                execution
                    .validator_info(validator_id, block)
                    .await
                    .map_err(StateError::from)
            }
        })
        .await?;

        let mut infos = BTreeMap::new();
        for info in records {
            if let Some(previous) = infos.insert(info.pubkey, info) {
                return Err(StateError::Consistency(format!(
                    "pubkey {} registered twice",
                    previous.pubkey
                )));
            }
        }

        Ok(OperatorValidators {
            operator_id,
            total_keys,
            infos,
        })
    }

    #[instrument(skip(self, pubkeys), fields(count = pubkeys.len()))]
    async fn fetch_lifecycle_statuses(
        &self,
        pubkeys: &[ValidatorPubkey],
        slot: u64,
    ) -> Result<BTreeMap<ValidatorPubkey, ValidatorStatus>, StateError> {
        if pubkeys.is_empty() {
            return Ok(BTreeMap::new());
        }

        let statuses = self.consensus.get_validator_statuses(pubkeys, slot).await?;

        if let Some(missing) = pubkeys.iter().find(|p| !statuses.contains_key(p)) {
            return Err(StateError::Consistency(format!(
                "no lifecycle record for registered validator {missing}"
            )));
        }
        if statuses.len() != pubkeys.len() {
            return Err(StateError::Consistency(format!(
                "beacon node returned {} records for {} requested validators",
                statuses.len(),
                pubkeys.len()
            )));
        }
        Ok(statuses)
    }

    #[instrument(skip_all, fields(count = statuses.len()))]
    async fn classify_validators(
        &self,
        infos: &BTreeMap<ValidatorPubkey, ValidatorContractInfo>,
        statuses: &BTreeMap<ValidatorPubkey, ValidatorStatus>,
        block: u64,
    ) -> Result<ValidatorRollup, StateError> {
        let mut counts = ValidatorCounts::default();
        let mut classifications = BTreeMap::new();
        let mut accruing = Vec::new();

        for (pubkey, status) in statuses {
            let info = infos.get(pubkey).ok_or_else(|| {
                StateError::Consistency(format!("no accounting record for validator {pubkey}"))
            })?;
            let classification = classify(info.status, status)?;
            counts.record(classification);
            if classification.accrues_rewards() {
                accruing.push(info.withdraw_vault_address);
            }
            classifications.insert(*pubkey, classification);
        }

        let execution = &self.execution;
        let penalties = try_join_ordered(statuses.keys().copied(), self.limit(), |pubkey| {
            let execution = Arc::clone(execution);
            async move {
                execution
                    .cumulative_validator_penalty(pubkey, block)
                    .await
                    .map_err(StateError::from)
            }
        })
        .await?;
        let cumulative_penalty = penalties.into_iter().fold(U256::ZERO, |acc, p| acc + p);

        let mut unclaimed_cl_rewards = U256::ZERO;
        if !accruing.is_empty() {
            let threshold = self.execution.rewards_threshold(block).await?;
            let shares = try_join_ordered(accruing, self.limit(), |vault| {
                let execution = Arc::clone(execution);
                async move {
                    let balance = execution.eth_balance(vault, block).await?;
                    let share = execution
                        .calculate_reward_share(PERMISSIONLESS_POOL_ID, balance, block)
                        .await?;
                    Ok::<_, StateError>(share.operator_share)
                }
            })
            .await?;

            for share in shares {
                if share <= threshold {
                    unclaimed_cl_rewards += share;
                } else {
                    debug!(%share, %threshold, "Withdraw vault share above rewards threshold");
                }
            }
        }

        Ok(ValidatorRollup {
            counts,
            classifications,
            cumulative_penalty,
            unclaimed_cl_rewards,
        })
    }

    #[instrument(skip(self, node, validators))]
    async fn fetch_network_totals(
        &self,
        node: Address,
        validators: &OperatorValidators,
        block: u64,
    ) -> Result<NetworkTotals, StateError> {
        let execution = self.execution.as_ref();
        let operator_id = validators.operator_id;

        let operator_el_rewards = async {
            let vault = execution
                .operator_el_reward_vault(PERMISSIONLESS_POOL_ID, operator_id, block)
                .await?;
            let balance = execution.eth_balance(vault, block).await?;
            let share = execution
                .calculate_reward_share(PERMISSIONLESS_POOL_ID, balance, block)
                .await?;
            Ok::<_, ExecutionError>(share.operator_share)
        };

        let (
            sd_price,
            next_operator_id,
            next_validator_id,
            total_active_validators,
            total_queued_validators,
            total_sd_collateral,
            ethx_supply,
            total_staked_assets,
            threshold,
            operator_sd_balance,
            operator_non_terminal_keys,
            reward_cycle,
            operator_el_rewards,
        ) = tokio::try_join!(
            execution.convert_eth_to_sd(U256::from(WEI_PER_ETH), block),
            execution.next_operator_id(block),
            execution.next_validator_id(block),
            execution.total_active_validators(block),
            execution.total_queued_validators(block),
            execution.total_sd_collateral(block),
            execution.ethx_total_supply(block),
            execution.total_staked_assets(block),
            execution.pool_threshold(PERMISSIONLESS_POOL_ID, block),
            execution.operator_sd_balance(node, block),
            execution.total_non_terminal_keys(node, validators.total_keys, block),
            execution.reward_cycle_details(block),
            operator_el_rewards,
        )?;

        Ok(NetworkTotals {
            sd_price,
            next_operator_id,
            next_validator_id,
            total_active_validators,
            total_queued_validators,
            total_sd_collateral,
            ethx_supply,
            total_staked_assets,
            min_threshold: threshold.min_threshold,
            operator_sd_balance,
            operator_non_terminal_keys,
            reward_cycle,
            operator_el_rewards,
        })
    }

    #[instrument(skip(self, node))]
    async fn reconcile_rewards(
        &self,
        node: Address,
        current_index: u64,
        block: u64,
    ) -> Result<RewardTotals, StateError> {
        let execution = &self.execution;
        let totals = reconcile_reward_cycles(
            self.cycle_cache.as_ref(),
            current_index,
            self.options.malformed_cycle_policy,
            self.limit(),
            |cycle| {
                let execution = Arc::clone(execution);
                async move { execution.has_claimed_rewards(node, cycle, block).await }
            },
        )
        .await?;
        Ok(totals)
    }
}

fn assemble_details(
    node: Address,
    validators: OperatorValidators,
    rollup: ValidatorRollup,
    totals: &NetworkTotals,
    rewards: RewardTotals,
) -> NetworkDetails {
    let sd_price = round_down_wei(totals.sd_price, 2);
    let collateral_ratio = round_down_wei(totals.min_threshold, 2);
    let total_validators = totals.next_validator_id.saturating_sub(1);

    NetworkDetails {
        operator_address: node,
        operator_id: validators.operator_id,
        validator_counts: rollup.counts,

        sd_price,
        total_operators: totals.next_operator_id.saturating_sub(1),
        total_validators,
        total_active_validators: totals.total_active_validators,
        total_queued_validators: totals.total_queued_validators,
        total_staked_sd: round_down_wei(totals.total_sd_collateral, 10),
        total_ethx_supply: round_down_wei(totals.ethx_supply, 10),
        total_staked_eth_by_users: totals.total_staked_assets,
        total_staked_eth_by_nos: total_validators.saturating_mul(OPERATOR_BOND_ETH),
        collateral_ratio,
        collateral_ratio_in_sd: collateral_ratio * sd_price,

        operator_staked_sd: round_down_wei(totals.operator_sd_balance, 10),
        operator_eth_collateral: totals
            .operator_non_terminal_keys
            .saturating_mul(OPERATOR_BOND_ETH),

        cumulative_penalty: round_down_wei(rollup.cumulative_penalty, 2),
        cumulative_penalty_wei: rollup.cumulative_penalty,
        unclaimed_cl_rewards: round_down_wei(rollup.unclaimed_cl_rewards, 18),
        unclaimed_cl_rewards_wei: rollup.unclaimed_cl_rewards,
        unclaimed_non_socializing_pool_el_rewards: round_down_wei(totals.operator_el_rewards, 2),
        unclaimed_non_socializing_pool_el_rewards_wei: totals.operator_el_rewards,

        claimed_socializing_pool_el_rewards: round_down_wei(rewards.claimed_eth, 2),
        claimed_socializing_pool_sd_rewards: round_down_wei(rewards.claimed_sd, 2),
        unclaimed_socializing_pool_el_rewards: round_down_wei(rewards.unclaimed_eth, 2),
        unclaimed_socializing_pool_sd_rewards: round_down_wei(rewards.unclaimed_sd, 2),
        claimed_socializing_pool_el_rewards_wei: rewards.claimed_eth,
        claimed_socializing_pool_sd_rewards_wei: rewards.claimed_sd,
        unclaimed_socializing_pool_el_rewards_wei: rewards.unclaimed_eth,
        unclaimed_socializing_pool_sd_rewards_wei: rewards.unclaimed_sd,
        next_socializing_pool_reward_cycle: totals.reward_cycle,
        skipped_reward_cycles: rewards.skipped_cycles,

        validator_info_map: validators.infos,
        validator_classifications: rollup.classifications,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn classification(bucket: ValidatorBucket, slashed: bool) -> Classification {
        Classification { bucket, slashed }
    }

    #[test]
    fn test_counts_exclude_slashed_from_total() {
        let mut counts = ValidatorCounts::default();
        counts.record(classification(ValidatorBucket::Active, true));
        counts.record(classification(ValidatorBucket::Active, false));
        counts.record(classification(ValidatorBucket::Initialized, false));

        assert_eq!(counts.active, 2);
        assert_eq!(counts.slashed, 1);
        assert_eq!(counts.bucket_total(), 3);
    }

    #[test]
    fn test_slashed_tag_not_counted_for_terminal_rows() {
        let mut counts = ValidatorCounts::default();
        counts.record(classification(ValidatorBucket::Exiting, true));

        assert_eq!(counts.exiting, 1);
        assert_eq!(counts.slashed, 0);
    }

    #[test]
    fn test_error_kinds() {
        assert_eq!(StateError::EmptySlot(5).kind(), ErrorKind::EmptySlot);
        assert_eq!(
            StateError::Consistency("x".into()).kind(),
            ErrorKind::ConsistencyViolation
        );
        assert_eq!(
            StateError::Execution(ExecutionError::InvalidResponse("x".into())).kind(),
            ErrorKind::UpstreamUnavailable
        );
        let malformed = StateError::from(ReconcileError::MalformedCycle {
            cycle: 2,
            reason: "bad".into(),
        });
        assert_eq!(malformed.kind(), ErrorKind::ParseError);
        assert_eq!(ErrorKind::EmptySlot.to_string(), "empty_slot");
    }

    #[test]
    fn test_default_options() {
        let options = BuildOptions::default();
        assert_eq!(options.max_concurrent_requests, 16);
        assert_eq!(options.malformed_cycle_policy, MalformedCyclePolicy::Isolate);
    }

    #[test]
    fn test_digest_is_stable() {
        let snapshot = NetworkStateCache {
            el_block_number: 100,
            beacon_slot_number: 3200,
            beacon_config: BeaconConfig::default(),
            network_details: NetworkDetails::default(),
            validator_details: BTreeMap::new(),
        };

        let first = snapshot.digest().unwrap();
        assert_eq!(first.len(), 64);
        assert_eq!(first, snapshot.clone().digest().unwrap());

        let other = NetworkStateCache {
            el_block_number: 101,
            ..snapshot
        };
        assert_ne!(first, other.digest().unwrap());
    }
}
