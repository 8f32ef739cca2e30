use axum::{
    extract::{Path, State},
    http::{header, Method, StatusCode},
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use serde_json::Value as JsonValue;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use uuid::Uuid;

use domain::{ChatId, UserId};

use crate::state::AppState;
use crate::websocket::websocket_upgrade;

#[derive(Debug, Serialize)]
struct HealthBody {
    status: &'static str,
    connections: usize,
}

#[derive(Debug, Serialize)]
struct OnlineUsersBody {
    online_users: Vec<UserId>,
}

#[derive(Debug, Serialize)]
struct PresenceBody {
    user_id: UserId,
    is_online: bool,
}

#[derive(Debug, Serialize)]
struct NotifyBody {
    delivered: usize,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/ws", get(websocket_upgrade))
        .nest("/api", api_routes())
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer())
        .with_state(state)
}

fn cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
}

fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/presence/online", get(online_users))
        .route("/presence/{user_id}", get(user_presence))
        .route("/chats/{chat_id}/notify", post(notify_chat))
        .route("/users/{user_id}/notify", post(notify_user))
}

async fn health(State(state): State<AppState>) -> Json<HealthBody> {
    Json(HealthBody {
        status: "ok",
        connections: state.hub.connection_count().await,
    })
}

async fn online_users(State(state): State<AppState>) -> Json<OnlineUsersBody> {
    Json(OnlineUsersBody {
        online_users: state.hub.online_users().await,
    })
}

async fn user_presence(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
) -> Json<PresenceBody> {
    let user_id = UserId::new(user_id);
    Json(PresenceBody {
        user_id,
        is_online: state.hub.is_user_online(user_id).await,
    })
}

/// HTTP 处理器持久化了某个变更后，经此向聊天订阅者广播系统通知。
async fn notify_chat(
    State(state): State<AppState>,
    Path(chat_id): Path<Uuid>,
    Json(notification): Json<JsonValue>,
) -> (StatusCode, Json<NotifyBody>) {
    let delivered = state
        .hub
        .notify_chat_participants(ChatId::new(chat_id), notification)
        .await;
    (StatusCode::ACCEPTED, Json(NotifyBody { delivered }))
}

async fn notify_user(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
    Json(notification): Json<JsonValue>,
) -> (StatusCode, Json<NotifyBody>) {
    let delivered = state
        .hub
        .send_global_notification(UserId::new(user_id), notification)
        .await;
    (StatusCode::ACCEPTED, Json(NotifyBody { delivered }))
}
