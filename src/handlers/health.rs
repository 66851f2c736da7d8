use crate::{models::HealthResponse, AppState};
use axum::{extract::State, Json};
use chrono::Utc;
use std::sync::Arc;

/// GET /health
pub async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "OK",
        timestamp: Utc::now(),
        uptime: state.started_at.elapsed().as_secs_f64(),
    })
}
