use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use std::sync::Arc;

use super::types::*;
use super::AppState;
use crate::db::models::Wallet;
use crate::error::DaemonError;

type ApiError = (StatusCode, Json<ErrorResponse>);
type ApiResult<T> = Result<Json<T>, ApiError>;

fn api_error(status: StatusCode, msg: impl Into<String>) -> ApiError {
    (
        status,
        Json(ErrorResponse {
            error: msg.into(),
        }),
    )
}

/// Map a daemon error to the status and message callers see. Node and
/// store details stay in the logs.
pub(crate) fn daemon_error(e: DaemonError) -> ApiError {
    match e {
        DaemonError::Unauthorized => api_error(StatusCode::UNAUTHORIZED, "unauthorized"),
        DaemonError::CurrencyNotFound(_) => api_error(StatusCode::NOT_FOUND, "currency not found"),
        DaemonError::NoDaemon(_) => api_error(StatusCode::NOT_FOUND, "no daemon for blockchain"),
        DaemonError::AddressGeneration(_) | DaemonError::Rpc(_) => {
            tracing::warn!(error = %e, "Deposit address generation failed");
            api_error(StatusCode::BAD_GATEWAY, "address generation failed")
        }
        other => {
            tracing::error!(error = %other, "Request failed");
            api_error(StatusCode::INTERNAL_SERVER_ERROR, "internal error")
        }
    }
}

fn caller(headers: &HeaderMap) -> Result<String, ApiError> {
    headers
        .get(USER_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .ok_or_else(|| daemon_error(DaemonError::Unauthorized))
}

// ============================================================
// Daemon lifecycle
// ============================================================

pub async fn start_daemons(State(state): State<Arc<AppState>>) -> ApiResult<DaemonStartResponse> {
    let started = state
        .manager
        .ensure_started(state.poll_interval)
        .await
        .map_err(daemon_error)?;

    Ok(Json(DaemonStartResponse {
        status: if started { "started" } else { "already running" }.to_string(),
        blockchains: state.manager.running_blockchains().await,
    }))
}

pub async fn health(State(state): State<Arc<AppState>>) -> ApiResult<HealthResponse> {
    let running = state.manager.running_blockchains().await;
    let chains = state
        .store
        .active_blockchains()
        .await
        .map_err(daemon_error)?;

    let blockchains = chains
        .into_iter()
        .map(|b| BlockchainHealth {
            running: running.contains(&b.name.to_lowercase()),
            name: b.name,
            height: b.height,
            last_checked: b.last_checked,
        })
        .collect();

    Ok(Json(HealthResponse {
        status: "ok".to_string(),
        daemons_started: state.manager.is_started(),
        blockchains,
    }))
}

// ============================================================
// Wallets
// ============================================================

pub async fn generate_deposit_address(
    State(state): State<Arc<AppState>>,
    Path(symbol): Path<String>,
    headers: HeaderMap,
) -> ApiResult<Wallet> {
    let user_id = caller(&headers)?;
    state
        .manager
        .generate_deposit_address(&user_id, &symbol)
        .await
        .map(Json)
        .map_err(daemon_error)
}

pub async fn list_deposits(
    State(state): State<Arc<AppState>>,
    Path(wallet_id): Path<i64>,
    Query(params): Query<DepositParams>,
    headers: HeaderMap,
) -> ApiResult<DepositsResponse> {
    let user_id = caller(&headers)?;

    let wallet = state
        .store
        .wallet_by_id(wallet_id)
        .await
        .map_err(daemon_error)?
        .filter(|w| w.user_id == user_id)
        .ok_or_else(|| api_error(StatusCode::NOT_FOUND, "wallet not found"))?;

    let deposits = state
        .store
        .deposits_for_wallet(wallet.id, params.limit())
        .await
        .map_err(daemon_error)?;

    Ok(Json(DepositsResponse {
        wallet_id: wallet.id,
        deposits,
    }))
}
