//! Shared Data Model
//!
//! Consensus-side lifecycle records, execution-side accounting records and the
//! small value types both sides are joined on.

use alloy::primitives::{Address, U256};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// Length of a BLS public key in bytes
pub const PUBKEY_LENGTH: usize = 48;

/// Epoch value used by the beacon chain for "not scheduled"
pub const FAR_FUTURE_EPOCH: u64 = u64::MAX;

/// Validator BLS public key, the join key between both chains
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ValidatorPubkey(pub [u8; PUBKEY_LENGTH]);

/// Error parsing a validator public key from hex
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PubkeyParseError {
    #[error("Invalid hex: {0}")]
    InvalidHex(String),

    #[error("Expected {PUBKEY_LENGTH} bytes, got {0}")]
    InvalidLength(usize),
}

impl ValidatorPubkey {
    /// Build a pubkey from raw bytes, checking the length
    ///
    /// # Errors
    /// Returns an error if `bytes` is not exactly 48 bytes long
    pub fn from_slice(bytes: &[u8]) -> Result<Self, PubkeyParseError> {
        let array: [u8; PUBKEY_LENGTH] = bytes
            .try_into()
            .map_err(|_| PubkeyParseError::InvalidLength(bytes.len()))?;
        Ok(Self(array))
    }

    /// Raw key bytes
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// `0x`-prefixed lowercase hex
    #[must_use]
    pub fn to_hex(&self) -> String {
        format!("0x{}", hex::encode(self.0))
    }
}

impl FromStr for ValidatorPubkey {
    type Err = PubkeyParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.strip_prefix("0x").unwrap_or(s);
        let bytes = hex::decode(s).map_err(|e| PubkeyParseError::InvalidHex(e.to_string()))?;
        Self::from_slice(&bytes)
    }
}

impl fmt::Display for ValidatorPubkey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for ValidatorPubkey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ValidatorPubkey({})", self.to_hex())
    }
}

impl Serialize for ValidatorPubkey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for ValidatorPubkey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Network-wide consensus parameters, supplied by the caller
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BeaconConfig {
    /// Fork version at genesis
    #[serde(with = "hex_bytes4")]
    pub genesis_fork_version: [u8; 4],
    /// Genesis validators root
    #[serde(with = "hex_bytes32")]
    pub genesis_validators_root: [u8; 32],
    /// Genesis epoch
    pub genesis_epoch: u64,
    /// Unix timestamp of genesis
    pub genesis_time: u64,
    /// Seconds per slot
    pub seconds_per_slot: u64,
    /// Slots per epoch
    pub slots_per_epoch: u64,
    /// Epochs per sync committee period
    pub epochs_per_sync_committee_period: u64,
}

impl BeaconConfig {
    /// Seconds in one epoch
    #[must_use]
    pub fn seconds_per_epoch(&self) -> u64 {
        self.seconds_per_slot * self.slots_per_epoch
    }

    /// Epoch containing `slot`
    #[must_use]
    pub fn slot_to_epoch(&self, slot: u64) -> u64 {
        slot.checked_div(self.slots_per_epoch).unwrap_or(0)
    }

    /// First slot of `epoch`
    #[must_use]
    pub fn epoch_start_slot(&self, epoch: u64) -> u64 {
        epoch.saturating_mul(self.slots_per_epoch)
    }

    /// Unix timestamp at the start of `slot`
    #[must_use]
    pub fn slot_timestamp(&self, slot: u64) -> u64 {
        self.genesis_time
            .saturating_add(slot.saturating_mul(self.seconds_per_slot))
    }
}

/// Beacon block summary: the only part of the block the engine needs
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BeaconBlock {
    /// Slot the block was proposed in
    pub slot: u64,
    /// Proposer validator index
    pub proposer_index: u64,
    /// Whether the block carries an execution payload
    pub has_execution_payload: bool,
    /// Fee recipient of the execution payload
    pub fee_recipient: Address,
    /// Execution block number anchored by this slot
    pub execution_block_number: u64,
}

/// Consensus lifecycle phase, as reported by the Beacon API
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidatorState {
    PendingInitialized,
    PendingQueued,
    ActiveOngoing,
    ActiveExiting,
    ActiveSlashed,
    ExitedUnslashed,
    ExitedSlashed,
    WithdrawalPossible,
    WithdrawalDone,
    /// Any phase string this build does not recognise
    #[serde(other)]
    Unknown,
}

/// Consensus-side lifecycle record for one validator
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidatorStatus {
    pub pubkey: ValidatorPubkey,
    pub index: u64,
    #[serde(with = "hex_bytes32")]
    pub withdrawal_credentials: [u8; 32],
    /// Balance in gwei
    pub balance: u64,
    pub status: ValidatorState,
    /// Effective balance in gwei
    pub effective_balance: u64,
    pub slashed: bool,
    pub activation_eligibility_epoch: u64,
    pub activation_epoch: u64,
    pub exit_epoch: u64,
    pub withdrawable_epoch: u64,
}

impl ValidatorStatus {
    /// Active, slashed or not, and not yet exiting
    #[must_use]
    pub fn is_active(&self) -> bool {
        matches!(
            self.status,
            ValidatorState::ActiveOngoing | ValidatorState::ActiveSlashed
        )
    }

    /// Waiting for activation
    #[must_use]
    pub fn is_queued(&self) -> bool {
        matches!(
            self.status,
            ValidatorState::PendingInitialized | ValidatorState::PendingQueued
        )
    }

    /// Exit initiated or completed, but funds not yet swept
    #[must_use]
    pub fn is_exiting_but_not_withdrawn(&self) -> bool {
        matches!(
            self.status,
            ValidatorState::ActiveExiting
                | ValidatorState::ExitedUnslashed
                | ValidatorState::ExitedSlashed
                | ValidatorState::WithdrawalPossible
        )
    }

    /// Funds fully withdrawn
    #[must_use]
    pub fn is_withdrawn(&self) -> bool {
        self.status == ValidatorState::WithdrawalDone
    }

    /// Slashed at any point of its life
    #[must_use]
    pub fn is_slashed(&self) -> bool {
        self.slashed
            || matches!(
                self.status,
                ValidatorState::ActiveSlashed | ValidatorState::ExitedSlashed
            )
    }
}

/// On-chain validator status code held by the node registry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidatorContractStatus {
    Initialized,
    InvalidSignature,
    FrontRun,
    PreDeposit,
    Deposited,
    FundsSettled,
    Unknown(u8),
}

impl From<u8> for ValidatorContractStatus {
    fn from(code: u8) -> Self {
        match code {
            0 => Self::Initialized,
            1 => Self::InvalidSignature,
            2 => Self::FrontRun,
            3 => Self::PreDeposit,
            4 => Self::Deposited,
            5 => Self::FundsSettled,
            other => Self::Unknown(other),
        }
    }
}

/// Execution-side accounting record for one validator
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidatorContractInfo {
    pub status: ValidatorContractStatus,
    pub pubkey: ValidatorPubkey,
    pub withdraw_vault_address: Address,
    pub operator_id: u64,
}

/// Split of a reward amount between users, operator and protocol
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RewardShare {
    pub user_share: U256,
    pub operator_share: U256,
    pub protocol_share: U256,
}

/// SD collateral thresholds for a pool, in SD wei per unit
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolThreshold {
    pub min_threshold: U256,
    pub max_threshold: U256,
    pub withdraw_threshold: U256,
    pub units: String,
}

/// State of the socializing pool reward cycles
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RewardCycleDetails {
    /// Index of the currently open cycle
    pub current_index: u64,
    pub current_start_block: u64,
    pub current_end_block: u64,
}

/// Beacon node sync status
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct SyncStatus {
    pub syncing: bool,
    /// Fraction of the chain synced, in `[0, 1]`
    pub progress: f64,
}

/// Beacon node software version
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeVersion {
    pub version: String,
}

/// Head and checkpoint epochs
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BeaconHead {
    pub epoch: u64,
    pub finalized_epoch: u64,
    pub justified_epoch: u64,
    pub previous_justified_epoch: u64,
}

/// Beacon block header
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BeaconBlockHeader {
    /// Slot number
    pub slot: u64,
    /// Proposer validator index
    pub proposer_index: u64,
    /// Root of the parent block
    #[serde(with = "hex_bytes32")]
    pub parent_root: [u8; 32],
    /// Root of the beacon state
    #[serde(with = "hex_bytes32")]
    pub state_root: [u8; 32],
    /// Root of the block body
    #[serde(with = "hex_bytes32")]
    pub body_root: [u8; 32],
}

/// Checkpoint for finality
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FinalityCheckpoints {
    /// Previous justified checkpoint epoch
    pub previous_justified_epoch: u64,
    /// Current justified checkpoint epoch
    pub current_justified_epoch: u64,
    /// Finalized checkpoint epoch
    pub finalized_epoch: u64,
    /// Finalized checkpoint root
    #[serde(with = "hex_bytes32")]
    pub finalized_root: [u8; 32],
}

// Hex encoding helpers for serde
pub(crate) mod hex_bytes32 {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(bytes: &[u8; 32], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&format!("0x{}", hex::encode(bytes)))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<[u8; 32], D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        let s = s.strip_prefix("0x").unwrap_or(&s);
        let bytes = hex::decode(s).map_err(serde::de::Error::custom)?;
        bytes
            .try_into()
            .map_err(|_| serde::de::Error::custom("expected 32 bytes"))
    }
}

pub(crate) mod hex_bytes4 {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(bytes: &[u8; 4], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&format!("0x{}", hex::encode(bytes)))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<[u8; 4], D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        let s = s.strip_prefix("0x").unwrap_or(&s);
        let bytes = hex::decode(s).map_err(serde::de::Error::custom)?;
        bytes
            .try_into()
            .map_err(|_| serde::de::Error::custom("expected 4 bytes"))
    }
}
