//! # Network State Library
//!
//! Point-in-time reconstruction of the Stader protocol as seen by one node
//! operator. Given a beacon slot it resolves the execution block, joins the
//! operator's validators across both chains, classifies them, and reconciles
//! socializing-pool reward cycles against the local merkle record cache:
//! - `NetworkStateBuilder` sequences the build
//! - `ConsensusClient` / `ExecutionAccessor` / `RewardProofCache` are the
//!   collaborator seams, with HTTP, JSON-RPC and file-backed implementations

pub mod beacon_client;
pub mod classifier;
pub mod execution;
pub mod fanout;
pub mod merkle_api;
pub mod rewards;
pub mod state;
pub mod types;
pub mod units;

pub use beacon_client::{BeaconClient, BeaconClientError, ConsensusClient};
pub use classifier::{classify, Classification, ClassifyError, ValidatorBucket};
pub use execution::{ContractAccessor, ContractAddresses, ExecutionAccessor, ExecutionError};
pub use merkle_api::{RewardProofApi, RewardProofApiError};
pub use rewards::{
    CycleCacheDir, CycleCacheError, MalformedCyclePolicy, RewardCycleRecord, RewardProofCache,
    RewardTotals,
};
pub use state::{
    BuildOptions, ErrorKind, NetworkDetails, NetworkStateBuilder, NetworkStateCache, StateError,
    ValidatorCounts,
};
pub use types::*;
