use crate::controller::{health_check_controller, status_controller};
use crate::sse;
use crate::AppState;
use axum::{http::HeaderValue, http::Method, routing::get, Json, Router};
use log::*;
use tower_http::cors::{AllowOrigin, CorsLayer};
use utoipa::OpenApi;

// This is the global definition of our OpenAPI document. To be a part
// of the rendered document, a path and schema must be listed here.
#[derive(OpenApi)]
#[openapi(
        info(
            title = "SSE Relay API"
        ),
        paths(
            health_check_controller::health_check,
            status_controller::read,
            sse::handler::process_handler,
        ),
        components(
            schemas(
                status_controller::RelayStatus,
            )
        ),
        tags(
            (name = "sse_relay", description = "Fan-out relay for a single upstream event stream")
        )
    )]
pub(crate) struct ApiDoc;

pub fn define_routes(app_state: AppState) -> Router {
    let cors = cors_layer(&app_state.config.allowed_origins);

    Router::new()
        .merge(health_routes())
        .merge(openapi_routes())
        .merge(process_routes(app_state.clone()))
        .merge(status_routes(app_state))
        .layer(cors)
}

/// Only the configured front-end origins may read relay responses.
fn cors_layer(allowed_origins: &[String]) -> CorsLayer {
    let origins: Vec<HeaderValue> = allowed_origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(e) => {
                warn!("Ignoring invalid allowed origin {origin:?}: {e}");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([Method::GET])
}

fn health_routes() -> Router {
    Router::new().route("/health", get(health_check_controller::health_check))
}

fn openapi_routes() -> Router {
    Router::new().route(
        "/api-docs/openapi.json",
        get(|| async { Json(ApiDoc::openapi()) }),
    )
}

fn process_routes(app_state: AppState) -> Router {
    Router::new()
        .route("/api/process", get(sse::handler::process_handler))
        .with_state(app_state)
}

fn status_routes(app_state: AppState) -> Router {
    Router::new()
        .route("/api/status", get(status_controller::read))
        .with_state(app_state)
}
