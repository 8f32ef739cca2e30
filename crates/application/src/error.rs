use domain::DomainError;
use thiserror::Error;

use crate::ports::{AuthError, CollaboratorError};

/// 实时核心错误分类。
///
/// 除 `Auth` 发生在握手阶段（连接直接关闭）外，其余错误只会转换成发给
/// 发起连接的 `error` 事件；单个命令的失败不影响其它连接。
#[derive(Debug, Error)]
pub enum RealtimeError {
    /// 握手认证失败，连接不会进入 Active 状态
    #[error("authentication failed: {0}")]
    Auth(#[from] AuthError),
    /// 命令载荷不合法
    #[error("validation failed: {0}")]
    Validation(String),
    /// 用户不是目标聊天的成员
    #[error("not a member of chat {chat_id}")]
    Authorization { chat_id: domain::ChatId },
    /// 外部协作者调用失败或超时，不自动重试
    #[error("collaborator call failed: {0}")]
    Collaborator(String),
    /// 向某个连接发送失败，该连接走断开清理路径
    #[error("transport failure on connection {connection_id}")]
    Transport { connection_id: domain::ConnectionId },
}

impl RealtimeError {
    pub fn collaborator(message: impl Into<String>) -> Self {
        Self::Collaborator(message.into())
    }

    /// 面向客户端的错误描述（`error` 事件的 message 字段）。
    pub fn client_message(&self) -> String {
        match self {
            RealtimeError::Auth(_) => "authentication failed".to_string(),
            RealtimeError::Validation(message) => format!("invalid command: {message}"),
            RealtimeError::Authorization { chat_id } => {
                format!("you are not a participant of chat {chat_id}")
            }
            RealtimeError::Collaborator(_) => {
                "temporary failure, please retry".to_string()
            }
            RealtimeError::Transport { .. } => "connection failure".to_string(),
        }
    }
}

impl From<DomainError> for RealtimeError {
    fn from(value: DomainError) -> Self {
        RealtimeError::Validation(value.to_string())
    }
}

impl From<CollaboratorError> for RealtimeError {
    fn from(value: CollaboratorError) -> Self {
        RealtimeError::Collaborator(value.to_string())
    }
}
