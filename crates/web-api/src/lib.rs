//! Web API 层。
//!
//! 提供 Axum 路由：WebSocket 升级入口和少量 HTTP 接口
//! （健康检查、在线状态查询、系统通知触发）。

mod error;
mod routes;
mod state;
mod websocket;
mod ws_connection;

pub use error::ApiError;
pub use routes::router;
pub use state::AppState;
