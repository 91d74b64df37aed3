use log::*;
use std::future::Future;
use tokio::net::TcpListener;

pub use service::AppState;

pub(crate) mod controller;
pub mod router;
pub(crate) mod sse;

/// Bind the configured address and serve the relay until Ctrl-C.
pub async fn init_server(app_state: AppState) -> std::io::Result<()> {
    let listen_address = app_state.config.listen_address();
    let listener = TcpListener::bind(&listen_address).await?;
    info!("Server starting... listening for connections on http://{listen_address}");

    serve(listener, app_state, shutdown_signal()).await
}

/// Serve the relay on an already bound listener until `shutdown` resolves.
///
/// On shutdown the upstream connection is aborted and every client stream is ended
/// so that graceful shutdown does not wait on open event streams.
pub async fn serve<F>(listener: TcpListener, app_state: AppState, shutdown: F) -> std::io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let session_manager = app_state.session_manager.clone();
    let app = router::define_routes(app_state);

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown.await;
            info!("Shutdown requested, closing client streams");
            session_manager.shutdown();
        })
        .await
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {e}");
        std::future::pending::<()>().await;
    }
}
