//! Beacon API HTTP Client
//!
//! `ConsensusClient` is the uniform contract the state builder consumes over
//! any beacon node implementation. `BeaconClient` implements it against the
//! standard Beacon node REST API.

use crate::types::{
    BeaconBlock, BeaconBlockHeader, BeaconConfig, BeaconHead, FinalityCheckpoints, NodeVersion,
    SyncStatus, ValidatorPubkey, ValidatorState, ValidatorStatus,
};
use alloy::primitives::Address;
use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};
use thiserror::Error;
use tracing::{debug, instrument};

/// Validator ids per `/validators` request, keeps URLs well under common limits
pub const DEFAULT_VALIDATOR_BATCH_SIZE: usize = 64;

/// Errors from beacon API operations
#[derive(Debug, Error)]
pub enum BeaconClientError {
    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("State not found for slot {0}")]
    StateNotFound(u64),

    #[error("Header not found for block {0}")]
    HeaderNotFound(String),

    #[error("Operation not supported by this client: {0}")]
    Unsupported(&'static str),
}

/// Consensus-chain queries used by node tooling
///
/// `resolve_block` and `get_validator_statuses` are the only calls the state
/// builder depends on. The remaining queries serve other tooling and default
/// to [`BeaconClientError::Unsupported`].
#[async_trait]
pub trait ConsensusClient: Send + Sync {
    /// Block proposed at `slot`, or `None` when the slot was skipped
    async fn resolve_block(&self, slot: u64) -> Result<Option<BeaconBlock>, BeaconClientError>;

    /// Lifecycle records at `slot`; pubkeys unknown to the chain are omitted
    async fn get_validator_statuses(
        &self,
        pubkeys: &[ValidatorPubkey],
        slot: u64,
    ) -> Result<BTreeMap<ValidatorPubkey, ValidatorStatus>, BeaconClientError>;

    async fn get_sync_status(&self) -> Result<SyncStatus, BeaconClientError> {
        Err(BeaconClientError::Unsupported("sync status"))
    }

    async fn get_node_version(&self) -> Result<NodeVersion, BeaconClientError> {
        Err(BeaconClientError::Unsupported("node version"))
    }

    async fn get_eth2_config(&self) -> Result<BeaconConfig, BeaconClientError> {
        Err(BeaconClientError::Unsupported("eth2 config"))
    }

    async fn get_finality_checkpoints(&self) -> Result<FinalityCheckpoints, BeaconClientError> {
        Err(BeaconClientError::Unsupported("finality checkpoints"))
    }

    async fn get_beacon_head(&self) -> Result<BeaconHead, BeaconClientError> {
        Err(BeaconClientError::Unsupported("beacon head"))
    }
}

/// Client for interacting with the Beacon API
#[derive(Debug, Clone)]
pub struct BeaconClient {
    client: Client,
    base_url: String,
    batch_size: usize,
}

impl BeaconClient {
    /// Create a new beacon client
    ///
    /// # Arguments
    /// * `base_url` - Base URL of the beacon node (e.g., `http://localhost:5052`)
    #[must_use]
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_client(Client::new(), base_url)
    }

    /// Create a beacon client reusing an existing HTTP client
    #[must_use]
    pub fn with_client(client: Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            batch_size: DEFAULT_VALIDATOR_BATCH_SIZE,
        }
    }

    /// Override the number of validator ids sent per request
    #[must_use]
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    async fn get(&self, path: &str) -> Result<Response, BeaconClientError> {
        let url = format!("{}{path}", self.base_url);
        Ok(self.client.get(&url).send().await?)
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, BeaconClientError> {
        let response = expect_success(self.get(path).await?)?;
        Ok(response.json().await?)
    }

    /// Fetch beacon block header
    ///
    /// # Arguments
    /// * `block_id` - Block identifier (slot number, "head", "finalized", etc.)
    ///
    /// # Errors
    /// Returns error if the request fails or header is not found
    #[instrument(skip(self))]
    pub async fn get_header(&self, block_id: &str) -> Result<BeaconBlockHeader, BeaconClientError> {
        let response = self
            .get(&format!("/eth/v1/beacon/headers/{block_id}"))
            .await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Err(BeaconClientError::HeaderNotFound(block_id.to_string()));
        }

        #[derive(Deserialize)]
        struct HeaderResponse {
            data: HeaderData,
        }

        #[derive(Deserialize)]
        struct HeaderData {
            header: HeaderMessage,
        }

        #[derive(Deserialize)]
        struct HeaderMessage {
            message: BeaconBlockHeaderJson,
        }

        #[derive(Deserialize)]
        struct BeaconBlockHeaderJson {
            slot: String,
            proposer_index: String,
            parent_root: String,
            state_root: String,
            body_root: String,
        }

        let header_resp: HeaderResponse = expect_success(response)?.json().await?;
        let msg = header_resp.data.header.message;

        Ok(BeaconBlockHeader {
            slot: parse_u64("slot", &msg.slot)?,
            proposer_index: parse_u64("proposer_index", &msg.proposer_index)?,
            parent_root: parse_hex32(&msg.parent_root)?,
            state_root: parse_hex32(&msg.state_root)?,
            body_root: parse_hex32(&msg.body_root)?,
        })
    }

    /// Get current head slot
    ///
    /// # Errors
    /// Returns error if the request fails
    pub async fn get_head_slot(&self) -> Result<u64, BeaconClientError> {
        let header = self.get_header("head").await?;
        Ok(header.slot)
    }

    async fn fetch_validator_batch(
        &self,
        ids: &[ValidatorPubkey],
        slot: u64,
    ) -> Result<Vec<ValidatorStatus>, BeaconClientError> {
        let ids = ids
            .iter()
            .map(ValidatorPubkey::to_hex)
            .collect::<Vec<_>>()
            .join(",");
        let response = self
            .get(&format!("/eth/v1/beacon/states/{slot}/validators?id={ids}"))
            .await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Err(BeaconClientError::StateNotFound(slot));
        }

        #[derive(Deserialize)]
        struct ValidatorsResponse {
            data: Vec<ValidatorEntryJson>,
        }

        #[derive(Deserialize)]
        struct ValidatorEntryJson {
            index: String,
            balance: String,
            status: ValidatorState,
            validator: ValidatorJson,
        }

        #[derive(Deserialize)]
        struct ValidatorJson {
            pubkey: String,
            withdrawal_credentials: String,
            effective_balance: String,
            slashed: bool,
            activation_eligibility_epoch: String,
            activation_epoch: String,
            exit_epoch: String,
            withdrawable_epoch: String,
        }

        let resp: ValidatorsResponse = expect_success(response)?.json().await?;

        resp.data
            .into_iter()
            .map(|entry| -> Result<ValidatorStatus, BeaconClientError> {
                let v = entry.validator;
                Ok(ValidatorStatus {
                    pubkey: v.pubkey.parse().map_err(|e| {
                        BeaconClientError::InvalidResponse(format!("Invalid pubkey: {e}"))
                    })?,
                    index: parse_u64("index", &entry.index)?,
                    withdrawal_credentials: parse_hex32(&v.withdrawal_credentials)?,
                    balance: parse_u64("balance", &entry.balance)?,
                    status: entry.status,
                    effective_balance: parse_u64("effective_balance", &v.effective_balance)?,
                    slashed: v.slashed,
                    activation_eligibility_epoch: parse_u64(
                        "activation_eligibility_epoch",
                        &v.activation_eligibility_epoch,
                    )?,
                    activation_epoch: parse_u64("activation_epoch", &v.activation_epoch)?,
                    exit_epoch: parse_u64("exit_epoch", &v.exit_epoch)?,
                    withdrawable_epoch: parse_u64("withdrawable_epoch", &v.withdrawable_epoch)?,
                })
            })
            .collect()
    }
}

#[async_trait]
impl ConsensusClient for BeaconClient {
    #[instrument(skip(self))]
    async fn resolve_block(&self, slot: u64) -> Result<Option<BeaconBlock>, BeaconClientError> {
        let response = self.get(&format!("/eth/v2/beacon/blocks/{slot}")).await?;

        if response.status() == StatusCode::NOT_FOUND {
            debug!(slot, "Slot has no block");
            return Ok(None);
        }

        #[derive(Deserialize)]
        struct BlockResponse {
            data: SignedBlockJson,
        }

        #[derive(Deserialize)]
        struct SignedBlockJson {
            message: BlockMessageJson,
        }

        #[derive(Deserialize)]
        struct BlockMessageJson {
            slot: String,
            proposer_index: String,
            body: BlockBodyJson,
        }

        #[derive(Deserialize)]
        struct BlockBodyJson {
            execution_payload: Option<ExecutionPayloadJson>,
        }

        #[derive(Deserialize)]
        struct ExecutionPayloadJson {
            fee_recipient: Address,
            block_number: String,
        }

        let resp: BlockResponse = expect_success(response)?.json().await?;
        let msg = resp.data.message;

        let mut block = BeaconBlock {
            slot: parse_u64("slot", &msg.slot)?,
            proposer_index: parse_u64("proposer_index", &msg.proposer_index)?,
            ..BeaconBlock::default()
        };
        if let Some(payload) = msg.body.execution_payload {
            block.has_execution_payload = true;
            block.fee_recipient = payload.fee_recipient;
            block.execution_block_number = parse_u64("block_number", &payload.block_number)?;
        }

        Ok(Some(block))
    }

    #[instrument(skip(self, pubkeys), fields(count = pubkeys.len()))]
    async fn get_validator_statuses(
        &self,
        pubkeys: &[ValidatorPubkey],
        slot: u64,
    ) -> Result<BTreeMap<ValidatorPubkey, ValidatorStatus>, BeaconClientError> {
        let mut statuses = BTreeMap::new();
        for batch in pubkeys.chunks(self.batch_size) {
            for status in self.fetch_validator_batch(batch, slot).await? {
                statuses.insert(status.pubkey, status);
            }
        }
        debug!(requested = pubkeys.len(), found = statuses.len(), "Fetched validator statuses");
        Ok(statuses)
    }

    #[instrument(skip(self))]
    async fn get_sync_status(&self) -> Result<SyncStatus, BeaconClientError> {
        #[derive(Deserialize)]
        struct SyncingResponse {
            data: SyncingData,
        }

        #[derive(Deserialize)]
        struct SyncingData {
            head_slot: String,
            sync_distance: String,
            is_syncing: bool,
        }

        let resp: SyncingResponse = self.get_json("/eth/v1/node/syncing").await?;
        let head_slot = parse_u64("head_slot", &resp.data.head_slot)?;
        let sync_distance = parse_u64("sync_distance", &resp.data.sync_distance)?;

        Ok(SyncStatus {
            syncing: resp.data.is_syncing,
            progress: sync_progress(head_slot, sync_distance),
        })
    }

    #[instrument(skip(self))]
    async fn get_node_version(&self) -> Result<NodeVersion, BeaconClientError> {
        #[derive(Deserialize)]
        struct VersionResponse {
            data: NodeVersion,
        }

        let resp: VersionResponse = self.get_json("/eth/v1/node/version").await?;
        Ok(resp.data)
    }

    #[instrument(skip(self))]
    async fn get_eth2_config(&self) -> Result<BeaconConfig, BeaconClientError> {
        #[derive(Deserialize)]
        struct SpecResponse {
            data: HashMap<String, serde_json::Value>,
        }

        #[derive(Deserialize)]
        struct GenesisResponse {
            data: GenesisData,
        }

        #[derive(Deserialize)]
        struct GenesisData {
            genesis_time: String,
            genesis_validators_root: String,
            genesis_fork_version: String,
        }

        let spec: SpecResponse = self.get_json("/eth/v1/config/spec").await?;
        let genesis: GenesisResponse = self.get_json("/eth/v1/beacon/genesis").await?;

        let spec_u64 = |key: &str| -> Result<u64, BeaconClientError> {
            let value = spec
                .data
                .get(key)
                .and_then(serde_json::Value::as_str)
                .ok_or_else(|| BeaconClientError::InvalidResponse(format!("Missing {key}")))?;
            parse_u64(key, value)
        };

        let fork_version = hex::decode(
            genesis
                .data
                .genesis_fork_version
                .trim_start_matches("0x"),
        )
        .map_err(|e| BeaconClientError::InvalidResponse(format!("Invalid hex: {e}")))?;

        Ok(BeaconConfig {
            genesis_fork_version: fork_version.try_into().map_err(|_| {
                BeaconClientError::InvalidResponse("Expected 4 byte fork version".to_string())
            })?,
            genesis_validators_root: parse_hex32(&genesis.data.genesis_validators_root)?,
            genesis_epoch: 0,
            genesis_time: parse_u64("genesis_time", &genesis.data.genesis_time)?,
            seconds_per_slot: spec_u64("SECONDS_PER_SLOT")?,
            slots_per_epoch: spec_u64("SLOTS_PER_EPOCH")?,
            epochs_per_sync_committee_period: spec_u64("EPOCHS_PER_SYNC_COMMITTEE_PERIOD")?,
        })
    }

    #[instrument(skip(self))]
    async fn get_finality_checkpoints(&self) -> Result<FinalityCheckpoints, BeaconClientError> {
        #[derive(Deserialize)]
        struct CheckpointsResponse {
            data: CheckpointsData,
        }

        #[derive(Deserialize)]
        struct CheckpointsData {
            previous_justified: Checkpoint,
            current_justified: Checkpoint,
            finalized: Checkpoint,
        }

        #[derive(Deserialize)]
        struct Checkpoint {
            epoch: String,
            root: String,
        }

        let resp: CheckpointsResponse = self
            .get_json("/eth/v1/beacon/states/head/finality_checkpoints")
            .await?;

        Ok(FinalityCheckpoints {
            previous_justified_epoch: parse_u64("epoch", &resp.data.previous_justified.epoch)?,
            current_justified_epoch: parse_u64("epoch", &resp.data.current_justified.epoch)?,
            finalized_epoch: parse_u64("epoch", &resp.data.finalized.epoch)?,
            finalized_root: parse_hex32(&resp.data.finalized.root)?,
        })
    }

    #[instrument(skip(self))]
    async fn get_beacon_head(&self) -> Result<BeaconHead, BeaconClientError> {
        let config = self.get_eth2_config().await?;
        let head_slot = self.get_head_slot().await?;
        let checkpoints = self.get_finality_checkpoints().await?;

        Ok(BeaconHead {
            epoch: config.slot_to_epoch(head_slot),
            finalized_epoch: checkpoints.finalized_epoch,
            justified_epoch: checkpoints.current_justified_epoch,
            previous_justified_epoch: checkpoints.previous_justified_epoch,
        })
    }
}

fn expect_success(response: Response) -> Result<Response, BeaconClientError> {
    if response.status().is_success() {
        Ok(response)
    } else {
        Err(BeaconClientError::InvalidResponse(format!(
            "Unexpected status: {}",
            response.status()
        )))
    }
}

#[allow(clippy::cast_precision_loss)]
fn sync_progress(head_slot: u64, sync_distance: u64) -> f64 {
    let target = head_slot.saturating_add(sync_distance);
    if target == 0 {
        return 1.0;
    }
    head_slot as f64 / target as f64
}

fn parse_u64(field: &str, value: &str) -> Result<u64, BeaconClientError> {
    value
        .parse()
        .map_err(|e| BeaconClientError::InvalidResponse(format!("Invalid {field}: {e}")))
}

fn parse_hex32(s: &str) -> Result<[u8; 32], BeaconClientError> {
    let s = s.strip_prefix("0x").unwrap_or(s);
    let bytes = hex::decode(s)
        .map_err(|e| BeaconClientError::InvalidResponse(format!("Invalid hex: {e}")))?;
    bytes
        .try_into()
        .map_err(|_| BeaconClientError::InvalidResponse("Expected 32 bytes".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn pubkey(byte: u8) -> ValidatorPubkey {
        ValidatorPubkey([byte; 48])
    }

    fn validator_entry(byte: u8, index: u64, status: &str) -> serde_json::Value {
        json!({
            "index": index.to_string(),
            "balance": "32000000000",
            "status": status,
            "validator": {
                "pubkey": pubkey(byte).to_hex(),
                "withdrawal_credentials": format!("0x01{}", "00".repeat(31)),
                "effective_balance": "32000000000",
                "slashed": false,
                "activation_eligibility_epoch": "10",
                "activation_epoch": "12",
                "exit_epoch": "18446744073709551615",
                "withdrawable_epoch": "18446744073709551615"
            }
        })
    }

    #[test]
    fn test_parse_hex32() {
        let hex = "0x0102030405060708091011121314151617181920212223242526272829303132";
        let result = parse_hex32(hex).unwrap();
        assert_eq!(result[0], 0x01);
        assert_eq!(result[31], 0x32);
    }

    #[test]
    fn test_parse_hex32_invalid_length() {
        let hex = "0x0102";
        assert!(parse_hex32(hex).is_err());
    }

    #[test]
    fn test_sync_progress() {
        assert!((sync_progress(50, 50) - 0.5).abs() < f64::EPSILON);
        assert!((sync_progress(0, 0) - 1.0).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn test_resolve_block_with_payload() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/eth/v2/beacon/blocks/100"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "version": "deneb",
                "data": {
                    "message": {
                        "slot": "100",
                        "proposer_index": "7",
                        "body": {
                            "execution_payload": {
                                "fee_recipient": "0x0000000000000000000000000000000000000001",
                                "block_number": "5000"
                            }
                        }
                    }
                }
            })))
            .mount(&server)
            .await;

        let client = BeaconClient::new(server.uri());
        let block = client.resolve_block(100).await.unwrap().unwrap();

        assert_eq!(block.slot, 100);
        assert_eq!(block.proposer_index, 7);
        assert!(block.has_execution_payload);
        assert_eq!(block.execution_block_number, 5000);
    }

    #[tokio::test]
    async fn test_resolve_block_missing_slot() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/eth/v2/beacon/blocks/101"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let client = BeaconClient::new(server.uri());
        assert!(client.resolve_block(101).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_resolve_block_server_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/eth/v2/beacon/blocks/102"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let client = BeaconClient::new(server.uri());
        let err = client.resolve_block(102).await.unwrap_err();
        assert!(matches!(err, BeaconClientError::InvalidResponse(_)));
    }

    #[tokio::test]
    async fn test_get_validator_statuses_omits_unknown() {
        let server = MockServer::start().await;
        let requested = [pubkey(1), pubkey(2)];
        let ids = format!("{},{}", pubkey(1).to_hex(), pubkey(2).to_hex());

        Mock::given(method("GET"))
            .and(path("/eth/v1/beacon/states/64/validators"))
            .and(query_param("id", ids.as_str()))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": [validator_entry(1, 11, "active_ongoing")]
            })))
            .mount(&server)
            .await;

        let client = BeaconClient::new(server.uri());
        let statuses = client.get_validator_statuses(&requested, 64).await.unwrap();

        assert_eq!(statuses.len(), 1);
        let status = &statuses[&pubkey(1)];
        assert_eq!(status.index, 11);
        assert_eq!(status.status, ValidatorState::ActiveOngoing);
        assert_eq!(status.exit_epoch, u64::MAX);
    }

    #[tokio::test]
    async fn test_get_validator_statuses_batches_requests() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/eth/v1/beacon/states/64/validators"))
            .and(query_param("id", pubkey(1).to_hex().as_str()))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": [validator_entry(1, 11, "pending_queued")]
            })))
            .expect(1)
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path("/eth/v1/beacon/states/64/validators"))
            .and(query_param("id", pubkey(2).to_hex().as_str()))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": [validator_entry(2, 12, "withdrawal_done")]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = BeaconClient::new(server.uri()).with_batch_size(1);
        let statuses = client
            .get_validator_statuses(&[pubkey(1), pubkey(2)], 64)
            .await
            .unwrap();

        assert_eq!(statuses.len(), 2);
        assert_eq!(statuses[&pubkey(2)].status, ValidatorState::WithdrawalDone);
    }

    #[tokio::test]
    async fn test_get_eth2_config() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/eth/v1/config/spec"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": {
                    "SECONDS_PER_SLOT": "12",
                    "SLOTS_PER_EPOCH": "32",
                    "EPOCHS_PER_SYNC_COMMITTEE_PERIOD": "256",
                    "CONFIG_NAME": "mainnet"
                }
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/eth/v1/beacon/genesis"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": {
                    "genesis_time": "1606824023",
                    "genesis_validators_root": format!("0x{}", "4b".repeat(32)),
                    "genesis_fork_version": "0x00000000"
                }
            })))
            .mount(&server)
            .await;

        let client = BeaconClient::new(server.uri());
        let config = client.get_eth2_config().await.unwrap();

        assert_eq!(config.genesis_time, 1_606_824_023);
        assert_eq!(config.seconds_per_slot, 12);
        assert_eq!(config.slots_per_epoch, 32);
        assert_eq!(config.epochs_per_sync_committee_period, 256);
        assert_eq!(config.genesis_validators_root, [0x4b; 32]);
    }

    #[tokio::test]
    async fn test_get_sync_status() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/eth/v1/node/syncing"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": {
                    "head_slot": "300",
                    "sync_distance": "100",
                    "is_syncing": true,
                    "is_optimistic": false
                }
            })))
            .mount(&server)
            .await;

        let client = BeaconClient::new(server.uri());
        let status = client.get_sync_status().await.unwrap();

        assert!(status.syncing);
        assert!((status.progress - 0.75).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn test_get_head_slot() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/eth/v1/beacon/headers/head"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": {
                    "root": format!("0x{}", "aa".repeat(32)),
                    "canonical": true,
                    "header": {
                        "message": {
                            "slot": "8000123",
                            "proposer_index": "42",
                            "parent_root": format!("0x{}", "01".repeat(32)),
                            "state_root": format!("0x{}", "02".repeat(32)),
                            "body_root": format!("0x{}", "03".repeat(32))
                        },
                        "signature": "0x00"
                    }
                }
            })))
            .mount(&server)
            .await;

        let client = BeaconClient::new(server.uri());
        assert_eq!(client.get_head_slot().await.unwrap(), 8_000_123);

        let header = client.get_header("head").await.unwrap();
        assert_eq!(header.proposer_index, 42);
        assert_eq!(header.state_root, [0x02; 32]);
    }

    #[tokio::test]
    async fn test_get_header_not_found() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/eth/v1/beacon/headers/77"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let client = BeaconClient::new(server.uri());
        let err = client.get_header("77").await.unwrap_err();
        assert!(matches!(err, BeaconClientError::HeaderNotFound(id) if id == "77"));
    }

    #[tokio::test]
    async fn test_get_finality_checkpoints() {
        let server = MockServer::start().await;
        let root = |epoch: &str, byte: &str| {
            json!({ "epoch": epoch, "root": format!("0x{}", byte.repeat(32)) })
        };
        Mock::given(method("GET"))
            .and(path("/eth/v1/beacon/states/head/finality_checkpoints"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "execution_optimistic": false,
                "data": {
                    "previous_justified": root("249", "0a"),
                    "current_justified": root("250", "0b"),
                    "finalized": root("248", "0c")
                }
            })))
            .mount(&server)
            .await;

        let client = BeaconClient::new(server.uri());
        let checkpoints = client.get_finality_checkpoints().await.unwrap();

        assert_eq!(checkpoints.finalized_epoch, 248);
        assert_eq!(checkpoints.current_justified_epoch, 250);
        assert_eq!(checkpoints.previous_justified_epoch, 249);
        assert_eq!(checkpoints.finalized_root, [0x0c; 32]);
    }

    #[tokio::test]
    async fn test_get_node_version() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/eth/v1/node/version"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": { "version": "Lighthouse/v5.3.0" }
            })))
            .mount(&server)
            .await;

        let client = BeaconClient::new(server.uri());
        let version = client.get_node_version().await.unwrap();
        assert_eq!(version.version, "Lighthouse/v5.3.0");
    }
}
