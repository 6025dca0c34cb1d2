//! HTTP control API
//!
//! Routes:
//! - `POST /watch`     register an address for polling
//! - `GET  /accounts`  live fetch of every watched account
//! - `GET  /snapshots` last normalized snapshot per address (background cache)
//! - `GET  /stats`     collector counters
//! - `GET  /health`    liveness + watch count
//!
//! Per-address fetch failures never fail a listing; they are embedded as
//! `{"address", "error"}` elements.

use crate::client::{fetch_with_timeout, AccountClient};
use crate::scheduler::{SchedulerState, StatsHandle};
use crate::state::{SnapshotStore, WatchRegistry};
use crate::types::{AccountSnapshot, Address, RawAccount};
use axum::{
    body::Bytes,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use futures::stream::{self, StreamExt};
use serde::Serialize;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::watch;
use tracing::{error, info};

pub const MISSING_ADDRESS_MESSAGE: &str = "Algorand address is required";

/// Max concurrent algod requests for one `/accounts` listing
pub const LIVE_FETCH_CONCURRENCY: usize = 8;

/// Shared handles for the request handlers
#[derive(Clone)]
pub struct AppState {
    pub registry: WatchRegistry,
    pub store: SnapshotStore,
    pub client: Arc<dyn AccountClient>,
    pub fetch_timeout: Duration,
    pub stats: StatsHandle,
    pub scheduler_state: watch::Receiver<SchedulerState>,
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{}", MISSING_ADDRESS_MESSAGE)]
    MissingParameter,
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::MissingParameter => StatusCode::BAD_REQUEST,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status(), Json(json!({ "error": self.to_string() }))).into_response()
    }
}

/// One element of the live `/accounts` listing
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum AccountListing {
    /// Raw `account_info` payload as returned by the node
    Account(RawAccount),
    Error { address: Address, error: String },
}

#[derive(Debug, Serialize)]
struct SnapshotEntry {
    address: Address,
    #[serde(flatten)]
    snapshot: AccountSnapshot,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/watch", post(watch_account))
        .route("/accounts", get(list_accounts))
        .route("/snapshots", get(list_snapshots))
        .route("/stats", get(stats_handler))
        .route("/health", get(health_check))
        .with_state(state)
}

/// Fetch every watched account now, in registry order.
///
/// At most `LIVE_FETCH_CONCURRENCY` fetches are in flight, each bounded by
/// `timeout`.
pub async fn live_listing(
    registry: &WatchRegistry,
    client: &dyn AccountClient,
    timeout: Duration,
) -> Vec<AccountListing> {
    let addresses = registry.snapshot_keys();

    let fetches = addresses.into_iter().map(|address| async move {
        match fetch_with_timeout(client, &address, timeout).await {
            Ok(raw) => {
                info!("Fetched account info for {}", address);
                AccountListing::Account(raw)
            }
            Err(e) => {
                error!("Error fetching account info for {}: {}", address, e.log_detail());
                AccountListing::Error {
                    address,
                    error: e.to_string(),
                }
            }
        }
    });

    stream::iter(fetches)
        .buffered(LIVE_FETCH_CONCURRENCY)
        .collect()
        .await
}

/// Pull a non-empty string `address` out of a request body.
/// Anything else (bad JSON, missing key, wrong type, "") is a missing parameter.
fn parse_address(body: &[u8]) -> Result<Address, ApiError> {
    serde_json::from_slice::<Value>(body)
        .ok()
        .and_then(|v| v.get("address").and_then(Value::as_str).map(str::to_string))
        .filter(|address| !address.is_empty())
        .ok_or(ApiError::MissingParameter)
}

async fn watch_account(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<Value>, ApiError> {
    let address = parse_address(&body)?;

    if state.registry.add(address.clone()) {
        info!("Started watching address {}", address);
    } else {
        info!("Address {} already watched", address);
    }

    Ok(Json(json!({ "message": format!("Watching address {}", address) })))
}

async fn list_accounts(State(state): State<AppState>) -> Json<Vec<AccountListing>> {
    let listing = live_listing(&state.registry, state.client.as_ref(), state.fetch_timeout).await;
    Json(listing)
}

async fn list_snapshots(State(state): State<AppState>) -> Json<Vec<SnapshotEntry>> {
    let entries = state
        .store
        .list_all()
        .into_iter()
        .map(|(address, snapshot)| SnapshotEntry { address, snapshot })
        .collect();
    Json(entries)
}

async fn stats_handler(State(state): State<AppState>) -> Json<Value> {
    let stats = state.stats.read().await.clone();
    let scheduler = *state.scheduler_state.borrow();
    Json(json!({
        "scheduler": scheduler,
        "watched": state.registry.len(),
        "snapshots": state.store.len(),
        "collector": stats,
    }))
}

async fn health_check(State(state): State<AppState>) -> Json<Value> {
    Json(json!({ "status": "ok", "watched": state.registry.len() }))
}
