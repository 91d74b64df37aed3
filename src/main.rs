use log::*;
use service::{config::Config, logging::Logger, AppState};

#[tokio::main]
async fn main() {
    let config = Config::new();

    if let Err(e) = Logger::init_logger(&config) {
        eprintln!("Failed to start logger: {e}");
    }

    info!("Starting up SSE relay...");

    let connect_on_start = config.connect_on_start;
    let app_state = AppState::new(config);

    if connect_on_start {
        app_state.session_manager.connector().start();
    }

    if let Err(e) = web::init_server(app_state).await {
        error!("Server terminated with error: {e}");
        std::process::exit(1);
    }

    info!("SSE relay stopped");
}
