//! 出站事件信封
//!
//! 服务端通过 WebSocket 下发 `{"type": <事件名>, "data": {...}}`。
//! 事件由路由器构造、广播器消费一次，本核心从不持久化事件本身
//! （消息正文在事件发出前已由 MessageStore 落库）。

use serde::{Deserialize, Serialize};

use crate::message::{ChatStatus, ChatSummary, MessageRecord};
use crate::value_objects::{ChatId, Timestamp, UserId};

/// 服务端出站事件。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum ServerEvent {
    /// 新消息，发给目标聊天的全部订阅者
    NewMessage { message: MessageRecord },
    /// 已读回执，发给目标聊天的全部订阅者
    MessagesRead {
        chat_id: ChatId,
        user_id: UserId,
        read_at: Timestamp,
    },
    /// 用户开始输入（不含发起者本人）
    UserTyping { chat_id: ChatId, user_id: UserId },
    /// 用户停止输入（不含发起者本人）
    UserStoppedTyping { chat_id: ChatId, user_id: UserId },
    /// 用户加入聊天 / 首个连接上线
    UserJoined { chat_id: ChatId, user_id: UserId },
    /// 用户离开聊天 / 最后一个连接下线
    UserLeft { chat_id: ChatId, user_id: UserId },
    /// 系统通知，由非实时路径（HTTP 等）触发
    GlobalNotification { notification: serde_json::Value },
    /// `get_my_chats` 的回复，仅发给发起连接
    MyChats { chats: Vec<ChatSummary> },
    /// `get_chat_status` 的回复，仅发给发起连接
    ChatStatus { chats: Vec<ChatStatus> },
    /// 错误回复，仅发给发起连接，从不触发连接关闭
    Error { message: String },
}

impl ServerEvent {
    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
        }
    }

    /// 事件名，用于日志。
    pub fn name(&self) -> &'static str {
        match self {
            ServerEvent::NewMessage { .. } => "new_message",
            ServerEvent::MessagesRead { .. } => "messages_read",
            ServerEvent::UserTyping { .. } => "user_typing",
            ServerEvent::UserStoppedTyping { .. } => "user_stopped_typing",
            ServerEvent::UserJoined { .. } => "user_joined",
            ServerEvent::UserLeft { .. } => "user_left",
            ServerEvent::GlobalNotification { .. } => "global_notification",
            ServerEvent::MyChats { .. } => "my_chats",
            ServerEvent::ChatStatus { .. } => "chat_status",
            ServerEvent::Error { .. } => "error",
        }
    }
}
