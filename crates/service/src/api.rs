//! REST API Endpoints
//!
//! Health, status, and snapshot query endpoints.

use crate::state::{AppState, BuildCounts, SnapshotEntry};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use network_state::{
    Classification, NetworkDetails, ValidatorContractInfo, ValidatorPubkey, ValidatorStatus,
};
use serde::Serialize;
use tower_http::trace::TraceLayer;

/// Run the API server
pub async fn run_server(listen: String, state: AppState) -> anyhow::Result<()> {
    let app = create_router(state);

    let listener = tokio::net::TcpListener::bind(&listen).await?;
    tracing::info!(address = %listen, "API server listening");

    axum::serve(listener, app).await?;

    Ok(())
}

/// Create the API router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/status", get(status))
        .route("/network", get(network))
        .route("/validators", get(list_validators))
        .route("/validators/{pubkey}", get(get_validator))
        .route("/snapshots/{slot}", get(get_snapshot))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Health check response
#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    slots_behind: u64,
}

/// Health check endpoint
async fn health(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    let healthy = state.is_healthy();
    let status_code = if healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    let response = HealthResponse {
        status: if healthy { "healthy" } else { "degraded" },
        slots_behind: state.slots_behind(),
    };

    (status_code, Json(response))
}

/// Status response
#[derive(Serialize)]
struct StatusResponse {
    current_slot: u64,
    finalized_epoch: u64,
    head_slot: u64,
    slots_behind: u64,
    uptime_secs: u64,
    snapshot_id: Option<String>,
    snapshot_slots: Vec<u64>,
    builds: BuildCounts,
    last_error: Option<String>,
}

/// Status endpoint
async fn status(State(state): State<AppState>) -> Json<StatusResponse> {
    Json(StatusResponse {
        current_slot: state.current_slot(),
        finalized_epoch: state.finalized_epoch(),
        head_slot: state.head_slot(),
        slots_behind: state.slots_behind(),
        uptime_secs: state.uptime_secs(),
        snapshot_id: state.latest().map(|e| e.id.clone()),
        snapshot_slots: state.snapshot_slots(),
        builds: state.build_counts(),
        last_error: state.last_error(),
    })
}

#[derive(Serialize)]
struct NetworkResponse {
    snapshot_id: String,
    slot: u64,
    el_block: u64,
    details: NetworkDetails,
}

/// Latest network rollup
async fn network(State(state): State<AppState>) -> Result<Json<NetworkResponse>, StatusCode> {
    let entry = state.latest().ok_or(StatusCode::SERVICE_UNAVAILABLE)?;
    Ok(Json(NetworkResponse {
        snapshot_id: entry.id.clone(),
        slot: entry.snapshot.beacon_slot_number,
        el_block: entry.snapshot.el_block_number,
        details: entry.snapshot.network_details.clone(),
    }))
}

/// One validator joined across both chains
#[derive(Debug, Serialize)]
struct ValidatorView {
    pubkey: ValidatorPubkey,
    lifecycle: Option<ValidatorStatus>,
    accounting: Option<ValidatorContractInfo>,
    classification: Option<Classification>,
}

fn validator_view(entry: &SnapshotEntry, pubkey: ValidatorPubkey) -> Option<ValidatorView> {
    let details = &entry.snapshot.network_details;
    let view = ValidatorView {
        pubkey,
        lifecycle: entry.snapshot.validator_details.get(&pubkey).cloned(),
        accounting: details.validator_info_map.get(&pubkey).cloned(),
        classification: details.validator_classifications.get(&pubkey).copied(),
    };
    (view.lifecycle.is_some() || view.accounting.is_some()).then_some(view)
}

/// Every validator of the operator in the latest snapshot
async fn list_validators(
    State(state): State<AppState>,
) -> Result<Json<Vec<ValidatorView>>, StatusCode> {
    let entry = state.latest().ok_or(StatusCode::SERVICE_UNAVAILABLE)?;
    let views = entry
        .snapshot
        .network_details
        .validator_info_map
        .keys()
        .filter_map(|pubkey| validator_view(&entry, *pubkey))
        .collect();
    Ok(Json(views))
}

/// A single validator by hex pubkey
async fn get_validator(
    State(state): State<AppState>,
    Path(pubkey): Path<String>,
) -> Result<Json<ValidatorView>, StatusCode> {
    let pubkey: ValidatorPubkey = pubkey.parse().map_err(|_| StatusCode::BAD_REQUEST)?;
    let entry = state.latest().ok_or(StatusCode::SERVICE_UNAVAILABLE)?;
    validator_view(&entry, pubkey)
        .map(Json)
        .ok_or(StatusCode::NOT_FOUND)
}

/// A stored snapshot by slot
async fn get_snapshot(
    State(state): State<AppState>,
    Path(slot): Path<u64>,
) -> Result<Json<SnapshotEntry>, StatusCode> {
    state
        .snapshot_at(slot)
        .map(|entry| Json(entry.as_ref().clone()))
        .ok_or(StatusCode::NOT_FOUND)
}
