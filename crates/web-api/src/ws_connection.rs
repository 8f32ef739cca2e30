//! WebSocket 连接生命周期
//!
//! 升级成功后的状态推进：Hydrating（拉取所属聊天并注册到中枢）->
//! Active（读循环串行处理命令，出站事件经发送任务写回）-> Closing
//! （优雅关闭、传输错误、空闲超时共用同一条清理路径）。

use axum::extract::ws::{Message as WsMessage, WebSocket};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use domain::{ClientCommand, UserIdentity};

use crate::state::AppState;

/// 单个 WebSocket 连接的生命周期管理器。
pub struct WsSession {
    state: AppState,
    identity: UserIdentity,
}

impl WsSession {
    pub fn new(state: AppState, identity: UserIdentity) -> Self {
        Self { state, identity }
    }

    /// 运行连接主循环，返回即表示连接已清理完毕。
    pub async fn run(self, mut socket: WebSocket) {
        let user_id = self.identity.user_id;

        // Hydrating：拉取所属聊天。目录不可用时不进入 Active，直接关闭
        let membership = timeout(
            self.state.realtime.collaborator_timeout(),
            self.state.directory.membership_of(user_id),
        )
        .await;
        let chat_ids = match membership {
            Ok(Ok(chat_ids)) => chat_ids,
            Ok(Err(err)) => {
                warn!(%user_id, %err, "hydration failed, closing connection");
                let _ = socket.close().await;
                return;
            }
            Err(_) => {
                warn!(%user_id, "hydration timed out, closing connection");
                let _ = socket.close().await;
                return;
            }
        };

        let (mut ws_tx, mut ws_rx) = socket.split();
        let (event_tx, mut event_rx) = mpsc::unbounded_channel();

        let outcome = self.state.hub.connect(user_id, &chat_ids, event_tx).await;
        let connection_id = outcome.connection_id;
        info!(
            %user_id,
            %connection_id,
            chats = chat_ids.len(),
            first_connection = outcome.first_connection,
            "websocket connection active"
        );

        // 发送任务：事件队列 -> JSON 文本帧。中枢剔除连接后发送端被丢弃，
        // 队列耗尽时任务自然退出
        let send_task = tokio::spawn(async move {
            while let Some(event) = event_rx.recv().await {
                let payload = match serde_json::to_string(&event) {
                    Ok(json) => json,
                    Err(err) => {
                        warn!(%err, "failed to serialize outbound event");
                        continue;
                    }
                };
                if ws_tx.send(WsMessage::Text(payload.into())).await.is_err() {
                    break;
                }
            }
            let _ = ws_tx.close().await;
        });

        // 读循环：同一连接的命令按到达顺序串行处理
        let idle_timeout = self.state.realtime.idle_timeout();
        loop {
            let frame = match timeout(idle_timeout, ws_rx.next()).await {
                Err(_) => {
                    info!(%user_id, %connection_id, "connection idle timeout");
                    break;
                }
                Ok(None) => break,
                Ok(Some(Err(err))) => {
                    debug!(%user_id, %connection_id, %err, "websocket transport error");
                    break;
                }
                Ok(Some(Ok(frame))) => frame,
            };

            match frame {
                WsMessage::Text(text) => {
                    self.state.hub.registry().touch(user_id, connection_id).await;
                    match serde_json::from_str::<ClientCommand>(&text) {
                        Ok(command) => {
                            self.state
                                .event_router
                                .handle_command(connection_id, &self.identity, command)
                                .await;
                        }
                        Err(_) => {
                            self.state
                                .event_router
                                .handle_malformed(connection_id, &self.identity)
                                .await;
                        }
                    }
                }
                WsMessage::Ping(_) | WsMessage::Pong(_) => {
                    // 协议层心跳只刷新活跃时间
                    self.state.hub.registry().touch(user_id, connection_id).await;
                }
                WsMessage::Binary(_) => {
                    self.state
                        .event_router
                        .handle_malformed(connection_id, &self.identity)
                        .await;
                }
                WsMessage::Close(_) => {
                    info!(%user_id, %connection_id, "websocket closed by client");
                    break;
                }
            }
        }

        // Closing：所有退出路径共用同一清理
        self.state.hub.disconnect(user_id, connection_id).await;
        send_task.abort();
        info!(%user_id, %connection_id, "websocket connection cleaned up");
    }
}
