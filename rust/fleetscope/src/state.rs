use crate::{config::AppConfig, session::Dashboard, session::SessionRegistry};
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub dashboard: Arc<Dashboard>,
    pub sessions: Arc<SessionRegistry>,
}

impl AppState {
    pub fn new(config: Arc<AppConfig>, dashboard: Arc<Dashboard>) -> Self {
        Self {
            config,
            dashboard,
            sessions: Arc::new(SessionRegistry::new()),
        }
    }
}
