//! Shared Application State
//!
//! Thread-safe holder for the latest snapshot, a bounded history of earlier
//! ones, and refresh progress.

use dashmap::DashMap;
use network_state::NetworkStateCache;
use parking_lot::RwLock;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Default number of snapshots kept in history
pub const DEFAULT_HISTORY_LIMIT: usize = 32;

/// Slots the latest snapshot may trail the head before the service is degraded
pub const MAX_SLOTS_BEHIND: u64 = 128;

/// A built snapshot with its identity
#[derive(Debug, Clone, Serialize)]
pub struct SnapshotEntry {
    /// SHA-256 of the snapshot's canonical JSON
    pub id: String,
    /// RFC 3339 build time
    pub built_at: String,
    pub snapshot: NetworkStateCache,
}

/// Build outcome counts since start
#[derive(Debug, Default, Clone, Copy, Serialize)]
pub struct BuildCounts {
    pub succeeded: u64,
    pub failed: u64,
}

/// Shared application state
#[derive(Debug, Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

#[derive(Debug)]
struct AppStateInner {
    /// Slot of the latest snapshot
    current_slot: AtomicU64,
    /// Latest finalized epoch seen
    finalized_epoch: AtomicU64,
    /// Head slot from beacon node
    head_slot: AtomicU64,
    latest: RwLock<Option<Arc<SnapshotEntry>>>,
    /// Earlier snapshots by slot
    history: DashMap<u64, Arc<SnapshotEntry>>,
    history_limit: usize,
    builds_succeeded: AtomicU64,
    builds_failed: AtomicU64,
    /// Service start time
    start_time: std::time::Instant,
    /// Last error message
    last_error: RwLock<Option<String>>,
}

impl AppState {
    #[must_use]
    pub fn new() -> Self {
        Self::with_history_limit(DEFAULT_HISTORY_LIMIT)
    }

    /// Create state keeping at most `history_limit` snapshots
    #[must_use]
    pub fn with_history_limit(history_limit: usize) -> Self {
        Self {
            inner: Arc::new(AppStateInner {
                current_slot: AtomicU64::new(0),
                finalized_epoch: AtomicU64::new(0),
                head_slot: AtomicU64::new(0),
                latest: RwLock::new(None),
                history: DashMap::new(),
                history_limit: history_limit.max(1),
                builds_succeeded: AtomicU64::new(0),
                builds_failed: AtomicU64::new(0),
                start_time: std::time::Instant::now(),
                last_error: RwLock::new(None),
            }),
        }
    }

    #[must_use]
    pub fn current_slot(&self) -> u64 {
        self.inner.current_slot.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn finalized_epoch(&self) -> u64 {
        self.inner.finalized_epoch.load(Ordering::Relaxed)
    }

    pub fn set_finalized_epoch(&self, epoch: u64) {
        self.inner.finalized_epoch.store(epoch, Ordering::Relaxed);
    }

    #[must_use]
    pub fn head_slot(&self) -> u64 {
        self.inner.head_slot.load(Ordering::Relaxed)
    }

    pub fn set_head_slot(&self, slot: u64) {
        self.inner.head_slot.store(slot, Ordering::Relaxed);
    }

    /// Get slots behind head
    #[must_use]
    pub fn slots_behind(&self) -> u64 {
        self.head_slot().saturating_sub(self.current_slot())
    }

    /// Healthy once a snapshot exists and it trails the head by at most
    /// [`MAX_SLOTS_BEHIND`]
    #[must_use]
    pub fn is_healthy(&self) -> bool {
        self.inner.latest.read().is_some() && self.slots_behind() <= MAX_SLOTS_BEHIND
    }

    /// Get uptime in seconds
    #[must_use]
    pub fn uptime_secs(&self) -> u64 {
        self.inner.start_time.elapsed().as_secs()
    }

    /// Publish a freshly built snapshot, evicting the oldest beyond the limit
    pub fn publish(&self, entry: SnapshotEntry) {
        let slot = entry.snapshot.beacon_slot_number;
        let entry = Arc::new(entry);

        self.inner.history.insert(slot, Arc::clone(&entry));
        while self.inner.history.len() > self.inner.history_limit {
            let oldest = self.inner.history.iter().map(|e| *e.key()).min();
            match oldest {
                Some(oldest) => {
                    self.inner.history.remove(&oldest);
                }
                None => break,
            }
        }

        let mut latest = self.inner.latest.write();
        let newer = latest
            .as_ref()
            .is_none_or(|current| current.snapshot.beacon_slot_number <= slot);
        if newer {
            *latest = Some(entry);
            self.inner.current_slot.store(slot, Ordering::Relaxed);
        }
        self.inner.builds_succeeded.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_failure(&self, error: String) {
        self.inner.builds_failed.fetch_add(1, Ordering::Relaxed);
        self.set_error(Some(error));
    }

    #[must_use]
    pub fn latest(&self) -> Option<Arc<SnapshotEntry>> {
        self.inner.latest.read().clone()
    }

    #[must_use]
    pub fn snapshot_at(&self, slot: u64) -> Option<Arc<SnapshotEntry>> {
        self.inner.history.get(&slot).map(|e| Arc::clone(e.value()))
    }

    /// Slots with a stored snapshot, ascending
    #[must_use]
    pub fn snapshot_slots(&self) -> Vec<u64> {
        let mut slots: Vec<u64> = self.inner.history.iter().map(|e| *e.key()).collect();
        slots.sort_unstable();
        slots
    }

    #[must_use]
    pub fn build_counts(&self) -> BuildCounts {
        BuildCounts {
            succeeded: self.inner.builds_succeeded.load(Ordering::Relaxed),
            failed: self.inner.builds_failed.load(Ordering::Relaxed),
        }
    }

    /// Set last error
    pub fn set_error(&self, error: Option<String>) {
        *self.inner.last_error.write() = error;
    }

    /// Get last error
    #[must_use]
    pub fn last_error(&self) -> Option<String> {
        self.inner.last_error.read().clone()
    }
}

impl Default for AppState {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use network_state::{BeaconConfig, NetworkDetails};
    use std::collections::BTreeMap;

    pub(crate) fn entry(slot: u64) -> SnapshotEntry {
        SnapshotEntry {
            id: format!("{slot:064x}"),
            built_at: "2026-01-01T00:00:00+00:00".to_string(),
            snapshot: NetworkStateCache {
                el_block_number: slot + 1_000,
                beacon_slot_number: slot,
                beacon_config: BeaconConfig::default(),
                network_details: NetworkDetails::default(),
                validator_details: BTreeMap::new(),
            },
        }
    }

    #[test]
    fn test_app_state_basic() {
        let state = AppState::new();
        assert!(!state.is_healthy());

        state.publish(entry(100));
        state.set_head_slot(150);

        assert_eq!(state.current_slot(), 100);
        assert_eq!(state.head_slot(), 150);
        assert_eq!(state.slots_behind(), 50);
        assert!(state.is_healthy());
    }

    #[test]
    fn test_app_state_unhealthy() {
        let state = AppState::new();

        state.publish(entry(100));
        state.set_head_slot(400);

        assert_eq!(state.slots_behind(), 300);
        assert!(!state.is_healthy());
    }

    #[test]
    fn test_history_is_bounded() {
        let state = AppState::with_history_limit(3);
        for slot in [32, 64, 96, 128, 160] {
            state.publish(entry(slot));
        }

        assert_eq!(state.snapshot_slots(), vec![96, 128, 160]);
        assert!(state.snapshot_at(32).is_none());
        assert_eq!(state.latest().unwrap().snapshot.beacon_slot_number, 160);
        assert_eq!(state.build_counts().succeeded, 5);
    }

    #[test]
    fn test_older_snapshot_does_not_replace_latest() {
        let state = AppState::new();
        state.publish(entry(64));
        state.publish(entry(32));

        assert_eq!(state.current_slot(), 64);
        assert!(state.snapshot_at(32).is_some());
    }

    #[test]
    fn test_failure_tracking() {
        let state = AppState::new();
        state.record_failure("beacon node down".to_string());

        assert_eq!(state.build_counts().failed, 1);
        assert_eq!(state.last_error().as_deref(), Some("beacon node down"));
    }
}
