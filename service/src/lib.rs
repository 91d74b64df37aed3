use config::Config;
use log::info;
use sse::{Connector, EventSourceUpstream, Hub, SessionManager, UpstreamSource};
use std::sync::Arc;

pub mod config;
pub mod logging;

// Service-level state shared by every handler.
// Needs to implement Clone to be able to be passed into Router as State
#[derive(Clone)]
pub struct AppState {
    pub session_manager: Arc<SessionManager>,
    pub config: Config,
}

impl AppState {
    /// Wire the relay against the upstream named in the configuration.
    pub fn new(app_config: Config) -> Self {
        let upstream = EventSourceUpstream::new(app_config.upstream_url());
        Self::with_upstream(app_config, Arc::new(upstream))
    }

    /// Wire the relay against an arbitrary upstream source.
    pub fn with_upstream(app_config: Config, upstream: Arc<dyn UpstreamSource>) -> Self {
        info!(
            "Relay config: upstream={}, mailbox_capacity={}, keep_alive={}s",
            upstream.endpoint(),
            app_config.mailbox_capacity(),
            app_config.keep_alive_secs,
        );

        let hub = Arc::new(Hub::new(app_config.mailbox_capacity()));
        let connector = Arc::new(Connector::new(Arc::clone(&hub), upstream));

        Self {
            session_manager: Arc::new(SessionManager::new(hub, connector)),
            config: app_config,
        }
    }

    pub fn hub(&self) -> &Arc<Hub> {
        self.session_manager.hub()
    }
}
