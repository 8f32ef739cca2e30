use std::sync::Arc;

use application::ports::memory::{MemoryChatDirectory, MemoryMessageStore};
use application::{EventRouter, RealtimeHub};
use axum::Router;
use config::{JwtConfig, RealtimeConfig};
use infrastructure::JwtAuthenticator;
use web_api::{router, AppState};

pub struct TestApp {
    pub router: Router,
    pub hub: Arc<RealtimeHub>,
    pub authenticator: Arc<JwtAuthenticator>,
    pub directory: Arc<MemoryChatDirectory>,
    pub store: Arc<MemoryMessageStore>,
}

pub fn build_app() -> TestApp {
    let realtime = RealtimeConfig {
        shard_count: 4,
        idle_timeout_secs: 30,
        collaborator_timeout_ms: 500,
    };
    let hub = Arc::new(RealtimeHub::new(&realtime));
    let directory = Arc::new(MemoryChatDirectory::new());
    let store = Arc::new(MemoryMessageStore::new());
    let authenticator = Arc::new(JwtAuthenticator::new(JwtConfig {
        secret: "test-secret-key-with-at-least-32-characters".to_string(),
        expiration_hours: 1,
    }));
    let event_router = Arc::new(EventRouter::new(
        hub.clone(),
        directory.clone(),
        store.clone(),
        realtime.collaborator_timeout(),
    ));
    let state = AppState::new(
        hub.clone(),
        event_router,
        authenticator.clone(),
        directory.clone(),
        realtime,
    );

    TestApp {
        router: router(state),
        hub,
        authenticator,
        directory,
        store,
    }
}
