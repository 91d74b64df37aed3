use crate::controller::ApiResponse;
use crate::AppState;
use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use serde::Serialize;
use sse::UpstreamState;
use utoipa::ToSchema;

/// Snapshot of the relay for operators.
#[derive(Debug, Serialize, ToSchema)]
pub struct RelayStatus {
    /// One of `disconnected`, `connecting`, `streaming`, `failed`.
    #[schema(value_type = String, example = "streaming")]
    pub upstream: UpstreamState,
    pub subscribers: usize,
    pub connection_attempts: u64,
    pub dropped_events: u64,
}

/// GET the current upstream state and subscriber counts
#[utoipa::path(
    get,
    path = "/api/status",
    responses(
        (status = 200, description = "Current relay status", body = RelayStatus),
    )
)]
pub async fn read(State(app_state): State<AppState>) -> impl IntoResponse {
    let hub = app_state.hub();
    let status = RelayStatus {
        upstream: hub.upstream_state(),
        subscribers: hub.subscriber_count(),
        connection_attempts: app_state.session_manager.connector().attempts(),
        dropped_events: hub.dropped_total(),
    };

    Json(ApiResponse::new(StatusCode::OK.into(), status))
}
