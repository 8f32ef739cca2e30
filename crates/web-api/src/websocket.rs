//! WebSocket 升级入口
//!
//! 升级前完成认证（Connecting -> Authenticating）：令牌无效直接拒绝，
//! 连接不会进入注册表。升级成功后由 `WsSession` 接管生命周期。

use application::RealtimeError;
use axum::{
    extract::{Query, State, WebSocketUpgrade},
    response::Response,
};
use serde::Deserialize;
use tracing::{info, warn};

use crate::error::ApiError;
use crate::state::AppState;
use crate::ws_connection::WsSession;

/// WebSocket连接查询参数
#[derive(Debug, Deserialize)]
pub struct WebSocketQuery {
    /// JWT access token
    pub token: String,
}

pub async fn websocket_upgrade(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Query(query): Query<WebSocketQuery>,
) -> Result<Response, ApiError> {
    if query.token.is_empty() {
        warn!("websocket upgrade rejected: empty token");
        return Err(ApiError::unauthorized("missing token"));
    }

    let identity = match state.authenticator.verify(&query.token).await {
        Ok(identity) => identity,
        Err(err) => {
            warn!(%err, "websocket upgrade rejected: authentication failed");
            return Err(RealtimeError::Auth(err).into());
        }
    };

    info!(user_id = %identity.user_id, username = %identity.username, "websocket upgrade accepted");
    Ok(ws.on_upgrade(move |socket| async move {
        WsSession::new(state, identity).run(socket).await;
    }))
}
