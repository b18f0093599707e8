//! HTTP and WebSocket API handlers.
//!
//! # Endpoints
//!
//! - `POST /create-payment` – mint a receiving address and register the payment
//! - `GET  /pending-count`  – number of payments currently monitored
//! - `GET  /health`         – wallet RPC liveness probe
//! - `GET  /ws`             – WebSocket superchat event stream

use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
};
use serde::Serialize;
use xmrchat_core::wallet::{WalletError, WalletRpc};

use crate::state::AppState;

mod create_payment;
mod ws;

/// Build the API router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/create-payment", post(create_payment::create_payment))
        .route("/pending-count", get(pending_count))
        .route("/health", get(health))
        .route("/ws", get(ws::superchat_ws))
}

/// `GET /pending-count` — observability hook for the monitor.
async fn pending_count(state: State<AppState>) -> impl IntoResponse {
    #[derive(Serialize)]
    struct PendingCountResponse {
        count: usize,
    }

    Json(PendingCountResponse {
        count: state.monitor.pending_count().await,
    })
}

/// `GET /health` — probes the wallet RPC via its balance call.
async fn health(state: State<AppState>) -> impl IntoResponse {
    #[derive(Serialize)]
    struct HealthResponse {
        healthy: bool,
    }

    let healthy = state.wallet.check_liveness().await;
    let status = if healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(HealthResponse { healthy }))
}

// ---------------------------------------------------------------------------
// Error handling
// ---------------------------------------------------------------------------

/// Errors that can occur in API handlers.
#[derive(Debug)]
enum ApiError {
    /// Malformed request input; never reaches the monitor.
    Validation(&'static str),
    /// The wallet RPC call failed.
    Wallet(WalletError),
}

impl From<WalletError> for ApiError {
    fn from(e: WalletError) -> Self {
        ApiError::Wallet(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        #[derive(Serialize)]
        struct ErrorResponse {
            error: String,
        }

        match self {
            ApiError::Validation(message) => (
                StatusCode::BAD_REQUEST,
                Json(ErrorResponse {
                    error: message.to_string(),
                }),
            )
                .into_response(),
            ApiError::Wallet(e) => {
                tracing::error!(error = %e, "wallet rpc call failed in API handler");
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    Json(ErrorResponse {
                        error: "wallet service unavailable".to_string(),
                    }),
                )
                    .into_response()
            }
        }
    }
}
