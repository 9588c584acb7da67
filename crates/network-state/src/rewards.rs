//! Reward Reconciler
//!
//! Walks the closed socializing-pool distribution cycles, joins each locally
//! cached merkle record with the on-chain claimed flag, and sums the amounts
//! into claimed and unclaimed totals.

use crate::execution::ExecutionError;
use crate::fanout::try_join_ordered;
use crate::units::{parse_wei, AmountParseError};
use alloy::primitives::U256;
use serde::{Deserialize, Serialize};
use std::fs::{self, OpenOptions};
use std::future::Future;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use thiserror::Error;
use tokio::task::JoinError;
use tracing::{debug, instrument, warn};

/// Merkle record for one operator and one distribution cycle
///
/// Amounts are base-10 integer strings of wei, as served by the distribution
/// service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RewardCycleRecord {
    pub cycle: u64,
    /// ETH reward
    pub eth: String,
    /// SD reward
    pub sd: String,
    #[serde(default)]
    pub proof: Vec<String>,
}

impl RewardCycleRecord {
    /// Parsed `(eth, sd)` amounts
    ///
    /// # Errors
    /// Returns an error if either amount is not a non-negative decimal integer
    pub fn amounts(&self) -> Result<(U256, U256), AmountParseError> {
        Ok((parse_wei(&self.eth)?, parse_wei(&self.sd)?))
    }
}

/// Errors reading or writing the cycle cache
#[derive(Debug, Error)]
pub enum CycleCacheError {
    #[error("Cycle cache I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Cycle cache file {path} is not a valid record: {source}")]
    Decode {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Cycle cache file for cycle {expected} holds cycle {found}")]
    CycleMismatch { expected: u64, found: u64 },
}

impl CycleCacheError {
    /// Whether the error describes a bad record rather than an unreadable store
    #[must_use]
    pub fn is_malformed_record(&self) -> bool {
        matches!(self, Self::Decode { .. } | Self::CycleMismatch { .. })
    }
}

/// Local store of merkle records, keyed by cycle
pub trait RewardProofCache: Send + Sync {
    /// Record for `cycle`, or `None` if it was never synced
    ///
    /// # Errors
    /// Returns an error if a record exists but cannot be read
    fn read_cycle(&self, cycle: u64) -> Result<Option<RewardCycleRecord>, CycleCacheError>;
}

/// File-backed cycle cache: one `<cycle>.json` per record, written once
#[derive(Debug, Clone)]
pub struct CycleCacheDir {
    dir: PathBuf,
}

impl CycleCacheDir {
    /// Open a cache directory, creating it if needed
    ///
    /// # Errors
    /// Returns an error if the directory cannot be created
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, CycleCacheError> {
        let dir = dir.into();
        fs::create_dir_all(&dir).map_err(|source| CycleCacheError::Io {
            path: dir.clone(),
            source,
        })?;
        Ok(Self { dir })
    }

    /// Directory holding the records
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.dir
    }

    fn cycle_path(&self, cycle: u64) -> PathBuf {
        self.dir.join(format!("{cycle}.json"))
    }

    /// Persist a record unless one already exists for its cycle
    ///
    /// Returns `true` if the record was written.
    ///
    /// # Errors
    /// Returns an error on I/O failure
    pub fn write_cycle(&self, record: &RewardCycleRecord) -> Result<bool, CycleCacheError> {
        let path = self.cycle_path(record.cycle);
        let json = serde_json::to_vec_pretty(record).map_err(|source| CycleCacheError::Decode {
            path: path.clone(),
            source,
        })?;

        let mut file = match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => return Ok(false),
            Err(source) => return Err(CycleCacheError::Io { path, source }),
        };
        file.write_all(&json)
            .and_then(|()| file.sync_all())
            .map_err(|source| CycleCacheError::Io { path, source })?;
        Ok(true)
    }

    /// Whether a record exists for `cycle`
    #[must_use]
    pub fn contains(&self, cycle: u64) -> bool {
        self.cycle_path(cycle).is_file()
    }
}

impl RewardProofCache for CycleCacheDir {
    fn read_cycle(&self, cycle: u64) -> Result<Option<RewardCycleRecord>, CycleCacheError> {
        let path = self.cycle_path(cycle);
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(source) => return Err(CycleCacheError::Io { path, source }),
        };

        let record: RewardCycleRecord = serde_json::from_slice(&bytes)
            .map_err(|source| CycleCacheError::Decode { path, source })?;
        if record.cycle != cycle {
            return Err(CycleCacheError::CycleMismatch {
                expected: cycle,
                found: record.cycle,
            });
        }
        Ok(Some(record))
    }
}

/// What to do with a cached record that cannot be parsed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MalformedCyclePolicy {
    /// Skip the cycle, log a warning and report it in the snapshot
    #[default]
    Isolate,
    /// Fail the whole build
    Strict,
}

impl FromStr for MalformedCyclePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "isolate" => Ok(Self::Isolate),
            "strict" => Ok(Self::Strict),
            other => Err(format!("unknown malformed cycle policy: {other}")),
        }
    }
}

/// Errors from reward reconciliation
#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error(transparent)]
    Cache(#[from] CycleCacheError),

    #[error("Reward cycle {cycle} record is malformed: {reason}")]
    MalformedCycle { cycle: u64, reason: String },

    #[error(transparent)]
    Execution(#[from] ExecutionError),

    #[error("Claim query task failed: {0}")]
    Task(#[from] JoinError),
}

/// Claimed and unclaimed socializing-pool totals, in wei
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RewardTotals {
    pub claimed_eth: U256,
    pub claimed_sd: U256,
    pub unclaimed_eth: U256,
    pub unclaimed_sd: U256,
    /// Cycles whose cached record was malformed and left out
    pub skipped_cycles: Vec<u64>,
}

struct CachedCycle {
    cycle: u64,
    eth: U256,
    sd: U256,
}

/// Closed cycles `1..current_index`, in increasing order
#[must_use]
pub fn closed_cycles(current_index: u64) -> std::ops::Range<u64> {
    1..current_index.max(1)
}

/// Reconcile every closed cycle against the cache and the claimed flags
///
/// `has_claimed` is queried once per cycle present in the cache, with at most
/// `max_concurrent` queries in flight. Cycles absent from the cache contribute
/// nothing.
///
/// # Errors
/// Fails on unreadable cache entries, on any claimed-flag query error, and on
/// malformed records when `policy` is [`MalformedCyclePolicy::Strict`]
#[instrument(skip(cache, has_claimed))]
pub async fn reconcile_reward_cycles<F, Fut>(
    cache: &dyn RewardProofCache,
    current_index: u64,
    policy: MalformedCyclePolicy,
    max_concurrent: usize,
    has_claimed: F,
) -> Result<RewardTotals, ReconcileError>
where
    F: Fn(u64) -> Fut,
    Fut: Future<Output = Result<bool, ExecutionError>> + Send + 'static,
{
    let mut totals = RewardTotals::default();
    let mut cached = Vec::new();

    for cycle in closed_cycles(current_index) {
        let parsed = match cache.read_cycle(cycle) {
            Ok(None) => {
                debug!(cycle, "Cycle not cached, skipping");
                continue;
            }
            Ok(Some(record)) => record.amounts().map_err(|e| e.to_string()),
            Err(e) if e.is_malformed_record() => Err(e.to_string()),
            Err(e) => return Err(e.into()),
        };

        match parsed {
            Ok((eth, sd)) => cached.push(CachedCycle { cycle, eth, sd }),
            Err(reason) => match policy {
                MalformedCyclePolicy::Strict => {
                    return Err(ReconcileError::MalformedCycle { cycle, reason });
                }
                MalformedCyclePolicy::Isolate => {
                    warn!(cycle, %reason, "Skipping malformed reward cycle");
                    totals.skipped_cycles.push(cycle);
                }
            },
        }
    }

    let claimed = try_join_ordered(cached.iter().map(|c| c.cycle), max_concurrent, |cycle| {
        let query = has_claimed(cycle);
        async move { query.await.map_err(ReconcileError::from) }
    })
    .await?;

    for (entry, claimed) in cached.iter().zip(claimed) {
        if claimed {
            totals.claimed_eth += entry.eth;
            totals.claimed_sd += entry.sd;
        } else {
            totals.unclaimed_eth += entry.eth;
            totals.unclaimed_sd += entry.sd;
        }
    }

    debug!(
        cycles = cached.len(),
        skipped = totals.skipped_cycles.len(),
        "Reward cycles reconciled"
    );
    Ok(totals)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::{BTreeMap, BTreeSet};
    use std::sync::{Arc, Mutex};

    #[derive(Default)]
    struct MemoryCache {
        records: BTreeMap<u64, RewardCycleRecord>,
        reads: Mutex<Vec<u64>>,
    }

    impl MemoryCache {
        fn with(records: &[(u64, &str, &str)]) -> Self {
            Self {
                records: records
                    .iter()
                    .map(|&(cycle, eth, sd)| (cycle, record(cycle, eth, sd)))
                    .collect(),
                reads: Mutex::default(),
            }
        }
    }

    impl RewardProofCache for MemoryCache {
        fn read_cycle(&self, cycle: u64) -> Result<Option<RewardCycleRecord>, CycleCacheError> {
            self.reads.lock().unwrap().push(cycle);
            Ok(self.records.get(&cycle).cloned())
        }
    }

    fn record(cycle: u64, eth: &str, sd: &str) -> RewardCycleRecord {
        RewardCycleRecord {
            cycle,
            eth: eth.to_string(),
            sd: sd.to_string(),
            proof: vec![],
        }
    }

    async fn run(
        cache: &MemoryCache,
        current_index: u64,
        claimed: &[u64],
        policy: MalformedCyclePolicy,
    ) -> Result<RewardTotals, ReconcileError> {
        let claimed: Arc<BTreeSet<u64>> = Arc::new(claimed.iter().copied().collect());
        reconcile_reward_cycles(cache, current_index, policy, 4, |cycle| {
            let claimed = Arc::clone(&claimed);
            async move { Ok(claimed.contains(&cycle)) }
        })
        .await
    }

    #[tokio::test]
    async fn test_claimed_and_unclaimed_split() {
        let cache = MemoryCache::with(&[(1, "100", "10"), (3, "300", "30"), (4, "400", "40")]);

        let totals = run(&cache, 5, &[1, 4], MalformedCyclePolicy::Isolate)
            .await
            .unwrap();

        assert_eq!(totals.claimed_eth, U256::from(500u64));
        assert_eq!(totals.claimed_sd, U256::from(50u64));
        assert_eq!(totals.unclaimed_eth, U256::from(300u64));
        assert_eq!(totals.unclaimed_sd, U256::from(30u64));
        assert!(totals.skipped_cycles.is_empty());
    }

    #[tokio::test]
    async fn test_open_cycle_and_cycle_zero_never_read() {
        let cache = MemoryCache::with(&[(0, "1", "1"), (5, "1", "1")]);

        let totals = run(&cache, 5, &[], MalformedCyclePolicy::Isolate).await.unwrap();

        assert_eq!(totals, RewardTotals::default());
        assert_eq!(*cache.reads.lock().unwrap(), vec![1, 2, 3, 4]);
    }

    #[tokio::test]
    async fn test_cache_miss_is_a_no_op() {
        let with_gap = MemoryCache::with(&[(1, "100", "10"), (3, "300", "30")]);
        let without = MemoryCache::with(&[(1, "100", "10")]);

        let a = run(&with_gap, 3, &[1], MalformedCyclePolicy::Isolate).await.unwrap();
        let b = run(&without, 2, &[1], MalformedCyclePolicy::Isolate).await.unwrap();

        assert_eq!(a, b);
    }

    #[tokio::test]
    async fn test_no_closed_cycles() {
        let cache = MemoryCache::with(&[(1, "100", "10")]);
        for current in [0, 1] {
            let totals = run(&cache, current, &[], MalformedCyclePolicy::Strict)
                .await
                .unwrap();
            assert_eq!(totals, RewardTotals::default());
        }
    }

    #[tokio::test]
    async fn test_malformed_cycle_isolated() {
        let cache = MemoryCache::with(&[(1, "100", "10"), (2, "12abc", "20"), (3, "300", "30")]);

        let totals = run(&cache, 4, &[], MalformedCyclePolicy::Isolate).await.unwrap();

        assert_eq!(totals.unclaimed_eth, U256::from(400u64));
        assert_eq!(totals.unclaimed_sd, U256::from(40u64));
        assert_eq!(totals.skipped_cycles, vec![2]);
    }

    #[tokio::test]
    async fn test_malformed_cycle_strict() {
        let cache = MemoryCache::with(&[(1, "100", "10"), (2, "-5", "20")]);

        let err = run(&cache, 3, &[], MalformedCyclePolicy::Strict).await.unwrap_err();

        assert!(matches!(err, ReconcileError::MalformedCycle { cycle: 2, .. }));
    }

    #[tokio::test]
    async fn test_claim_query_failure_aborts() {
        let cache = MemoryCache::with(&[(1, "100", "10")]);

        let result = reconcile_reward_cycles(
            &cache,
            2,
            MalformedCyclePolicy::Isolate,
            4,
            |_| async { Err(ExecutionError::InvalidResponse("boom".into())) },
        )
        .await;

        assert!(matches!(result, Err(ReconcileError::Execution(_))));
    }

    #[test]
    fn test_cache_dir_roundtrip_and_write_once() {
        let dir = tempfile::tempdir().unwrap();
        let cache = CycleCacheDir::open(dir.path().join("cycles")).unwrap();

        assert!(cache.read_cycle(7).unwrap().is_none());

        let first = record(7, "1000", "2000");
        assert!(cache.write_cycle(&first).unwrap());
        assert!(cache.contains(7));

        let second = record(7, "9999", "9999");
        assert!(!cache.write_cycle(&second).unwrap());

        assert_eq!(cache.read_cycle(7).unwrap(), Some(first));
    }

    #[test]
    fn test_cache_dir_corrupt_file() {
        let dir = tempfile::tempdir().unwrap();
        let cache = CycleCacheDir::open(dir.path()).unwrap();
        fs::write(dir.path().join("3.json"), b"{not json").unwrap();

        let err = cache.read_cycle(3).unwrap_err();
        assert!(err.is_malformed_record());
    }

    #[test]
    fn test_cache_dir_cycle_mismatch() {
        let dir = tempfile::tempdir().unwrap();
        let cache = CycleCacheDir::open(dir.path()).unwrap();
        let json = serde_json::to_vec(&record(4, "1", "1")).unwrap();
        fs::write(dir.path().join("3.json"), json).unwrap();

        let err = cache.read_cycle(3).unwrap_err();
        assert!(matches!(
            err,
            CycleCacheError::CycleMismatch { expected: 3, found: 4 }
        ));
    }

    #[test]
    fn test_policy_from_str() {
        assert_eq!(
            "strict".parse::<MalformedCyclePolicy>(),
            Ok(MalformedCyclePolicy::Strict)
        );
        assert_eq!(
            "Isolate".parse::<MalformedCyclePolicy>(),
            Ok(MalformedCyclePolicy::Isolate)
        );
        assert!("lenient".parse::<MalformedCyclePolicy>().is_err());
    }
}
