use axum::extract::State;
use axum::response::sse::{Event, KeepAlive, Sse};
use futures::Stream;
use log::*;
use service::AppState;
use std::convert::Infallible;

/// GET a live stream of the events relayed from upstream
///
/// Each caller becomes one hub subscriber for as long as the response is open.
/// Only events published after the call are delivered.
#[utoipa::path(
    get,
    path = "/api/process",
    responses(
        (status = 200, description = "Server-sent event stream of relayed events", content_type = "text/event-stream", body = String),
    )
)]
pub(crate) async fn process_handler(
    State(app_state): State<AppState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let session = app_state.session_manager.open_session();
    debug!("Streaming relayed events to session {}", session.id());

    Sse::new(session.into_stream())
        .keep_alive(KeepAlive::new().interval(app_state.config.keep_alive_interval()))
}
