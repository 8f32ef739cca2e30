use std::sync::Arc;

use application::{Authenticator, ChatDirectory, EventRouter, RealtimeHub};
use config::RealtimeConfig;

#[derive(Clone)]
pub struct AppState {
    pub hub: Arc<RealtimeHub>,
    pub event_router: Arc<EventRouter>,
    pub authenticator: Arc<dyn Authenticator>,
    pub directory: Arc<dyn ChatDirectory>,
    pub realtime: RealtimeConfig,
}

impl AppState {
    pub fn new(
        hub: Arc<RealtimeHub>,
        event_router: Arc<EventRouter>,
        authenticator: Arc<dyn Authenticator>,
        directory: Arc<dyn ChatDirectory>,
        realtime: RealtimeConfig,
    ) -> Self {
        Self {
            hub,
            event_router,
            authenticator,
            directory,
            realtime,
        }
    }
}
