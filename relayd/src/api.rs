//! HTTP API for the relay daemon.
//!
//! Provides read-only REST endpoints for operators:
//! - Health check
//! - Status (position, balance, processed message count)

use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use relay_domain::Position;

use crate::error::DaemonError;
use crate::processor::SignalProcessor;

// =============================================================================
// API State
// =============================================================================

/// Shared state for API handlers.
pub struct ApiState {
    pub processor: Arc<SignalProcessor>,
}

// =============================================================================
// Response Types
// =============================================================================

/// Health check response.
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

/// Status response.
#[derive(Debug, Serialize, Deserialize)]
pub struct StatusResponse {
    pub mode: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub position: Option<PositionSummary>,
    pub balance: Decimal,
    pub initial_balance: Decimal,
    pub leverage: u32,
    pub processed_ids: usize,
}

/// Summary of the open position.
#[derive(Debug, Serialize, Deserialize)]
pub struct PositionSummary {
    pub side: String,
    pub entry_price: Decimal,
    pub size: Decimal,
    pub opened_by: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub order_reference: Option<String>,
}

/// Error response.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

// =============================================================================
// Router
// =============================================================================

/// Create the API router.
pub fn create_router(state: Arc<ApiState>) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/status", get(status_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// =============================================================================
// Handlers
// =============================================================================

/// Health check endpoint.
async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// Current position and ledger.
async fn status_handler(
    State(state): State<Arc<ApiState>>,
) -> Result<Json<StatusResponse>, (StatusCode, Json<ErrorResponse>)> {
    let snapshot = state.processor.snapshot().await.map_err(to_error_response)?;

    Ok(Json(StatusResponse {
        mode: snapshot.mode.to_string(),
        position: snapshot.position.as_ref().map(position_to_summary),
        balance: snapshot.balance,
        initial_balance: snapshot.initial_balance,
        leverage: snapshot.leverage,
        processed_ids: snapshot.processed_ids,
    }))
}

// =============================================================================
// Helpers
// =============================================================================

fn to_error_response(error: DaemonError) -> (StatusCode, Json<ErrorResponse>) {
    let status = match &error {
        DaemonError::Config(_) => StatusCode::BAD_REQUEST,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };

    (status, Json(ErrorResponse { error: error.to_string() }))
}

fn position_to_summary(position: &Position) -> PositionSummary {
    PositionSummary {
        side: position.side.to_string(),
        entry_price: position.entry_price.as_decimal(),
        size: position.size.as_decimal(),
        opened_by: position.opened_by.to_string(),
        order_reference: position.order_reference.clone(),
    }
}

// =============================================================================
// Tests
// =============================================================================
