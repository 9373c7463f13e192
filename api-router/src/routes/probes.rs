use axum::{extract::State, http::StatusCode, response::IntoResponse};

use crate::api_state::ApiState;

/// Process is up.
pub async fn live() -> impl IntoResponse {
    StatusCode::OK
}

/// Process can reach its database.
pub async fn ready(State(state): State<ApiState>) -> impl IntoResponse {
    match state.db.query("RETURN 1").await {
        Ok(_) => StatusCode::OK,
        Err(_) => StatusCode::SERVICE_UNAVAILABLE,
    }
}
