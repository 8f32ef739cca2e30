//! 消息与聊天的只读视图类型
//!
//! 这些结构由外部协作者（MessageStore / ChatDirectory / Authenticator）
//! 返回，实时核心只负责转发，不拥有其存储。

use serde::{Deserialize, Serialize};

use crate::value_objects::{ChatId, MessageId, Timestamp, UserId};

/// 经过验证的用户身份，由 Authenticator 在握手阶段返回。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserIdentity {
    pub user_id: UserId,
    pub username: String,
}

/// 已持久化消息的规范记录。
///
/// `id` 与 `created_at` 由 MessageStore 分配；广播永远使用这里的值，
/// 绝不在持久化完成前发出。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageRecord {
    pub id: MessageId,
    pub chat_id: ChatId,
    pub sender_id: UserId,
    pub sender_username: String,
    pub content: String,
    pub created_at: Timestamp,
}

/// 用户所属聊天的摘要（`my_chats` 回复的元素）。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatSummary {
    pub chat_id: ChatId,
    pub name: Option<String>,
    pub is_group: bool,
    /// 未读消息数：聊天内非本人发送且尚未标记已读的消息
    pub unread_count: i64,
}

/// 单个聊天的实时状态聚合（`chat_status` 回复的元素）。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatStatus {
    pub chat_id: ChatId,
    /// 当前订阅该聊天的用户数
    pub subscriber_count: usize,
    /// 订阅者中处于在线状态的用户
    pub online_users: Vec<UserId>,
    /// 正在输入的用户
    pub typing_users: Vec<UserId>,
}
