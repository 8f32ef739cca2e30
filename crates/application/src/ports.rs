//! 外部协作者端口
//!
//! 实时核心不拥有用户、聊天和消息的存储，全部通过这里的端口访问。
//! 端口调用可能缓慢、可能失败，调用方必须在不持有任何内部锁的前提下
//! 发起，并套用超时（见 `EventRouter`）。

use async_trait::async_trait;
use thiserror::Error;

use domain::{ChatId, ChatSummary, MessageContent, MessageRecord, Timestamp, UserId, UserIdentity};

/// 握手认证错误。
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthError {
    #[error("invalid token")]
    InvalidToken,
    #[error("token expired")]
    Expired,
    #[error("unknown user")]
    UnknownUser,
}

/// 协作者调用错误（聊天目录 / 消息存储）。
#[derive(Debug, Error)]
pub enum CollaboratorError {
    #[error("not found")]
    NotFound,
    #[error("collaborator unavailable: {message}")]
    Unavailable { message: String },
}

impl CollaboratorError {
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::Unavailable {
            message: message.into(),
        }
    }
}

/// 将连接携带的令牌解析为已验证身份。
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Authenticator: Send + Sync {
    async fn verify(&self, token: &str) -> Result<UserIdentity, AuthError>;
}

/// 聊天目录：成员关系的权威来源。
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ChatDirectory: Send + Sync {
    /// 用户所属的全部聊天
    async fn membership_of(&self, user_id: UserId) -> Result<Vec<ChatId>, CollaboratorError>;

    /// 用户是否为聊天成员
    async fn is_member(&self, user_id: UserId, chat_id: ChatId)
        -> Result<bool, CollaboratorError>;

    /// 所属聊天摘要（含未读数），`get_my_chats` 使用
    async fn chat_summaries(&self, user_id: UserId)
        -> Result<Vec<ChatSummary>, CollaboratorError>;
}

/// 消息存储：广播前必须先完成持久化。
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MessageStore: Send + Sync {
    /// 持久化一条消息并返回规范记录（id、时间戳由存储分配）
    async fn append(
        &self,
        chat_id: ChatId,
        sender: &UserIdentity,
        content: MessageContent,
    ) -> Result<MessageRecord, CollaboratorError>;

    /// 将聊天内非本人发送的消息标记为已读，返回回执时间
    async fn mark_read(
        &self,
        chat_id: ChatId,
        reader_id: UserId,
    ) -> Result<Timestamp, CollaboratorError>;
}

/// 内存实现（用于测试和本地开发）
pub mod memory {
    use super::*;
    use std::collections::{HashMap, HashSet};
    use tokio::sync::RwLock;
    use uuid::Uuid;

    /// 内存聊天目录。
    #[derive(Default)]
    pub struct MemoryChatDirectory {
        members: RwLock<HashMap<ChatId, HashSet<UserId>>>,
        names: RwLock<HashMap<ChatId, Option<String>>>,
    }

    impl MemoryChatDirectory {
        pub fn new() -> Self {
            Self::default()
        }

        pub async fn add_member(&self, chat_id: ChatId, user_id: UserId) {
            self.members
                .write()
                .await
                .entry(chat_id)
                .or_default()
                .insert(user_id);
            self.names.write().await.entry(chat_id).or_insert(None);
        }
    }

    #[async_trait]
    impl ChatDirectory for MemoryChatDirectory {
        async fn membership_of(&self, user_id: UserId) -> Result<Vec<ChatId>, CollaboratorError> {
            let members = self.members.read().await;
            Ok(members
                .iter()
                .filter(|(_, users)| users.contains(&user_id))
                .map(|(chat_id, _)| *chat_id)
                .collect())
        }

        async fn is_member(
            &self,
            user_id: UserId,
            chat_id: ChatId,
        ) -> Result<bool, CollaboratorError> {
            let members = self.members.read().await;
            Ok(members
                .get(&chat_id)
                .map(|users| users.contains(&user_id))
                .unwrap_or(false))
        }

        async fn chat_summaries(
            &self,
            user_id: UserId,
        ) -> Result<Vec<ChatSummary>, CollaboratorError> {
            let chat_ids = self.membership_of(user_id).await?;
            let names = self.names.read().await;
            Ok(chat_ids
                .into_iter()
                .map(|chat_id| ChatSummary {
                    chat_id,
                    name: names.get(&chat_id).cloned().flatten(),
                    is_group: false,
                    unread_count: 0,
                })
                .collect())
        }
    }

    /// 内存消息存储：仅追加，id 与时间戳在写入时分配。
    #[derive(Default)]
    pub struct MemoryMessageStore {
        messages: RwLock<Vec<MessageRecord>>,
    }

    impl MemoryMessageStore {
        pub fn new() -> Self {
            Self::default()
        }

        pub async fn messages_in(&self, chat_id: ChatId) -> Vec<MessageRecord> {
            self.messages
                .read()
                .await
                .iter()
                .filter(|m| m.chat_id == chat_id)
                .cloned()
                .collect()
        }
    }

    #[async_trait]
    impl MessageStore for MemoryMessageStore {
        async fn append(
            &self,
            chat_id: ChatId,
            sender: &UserIdentity,
            content: MessageContent,
        ) -> Result<MessageRecord, CollaboratorError> {
            let record = MessageRecord {
                id: domain::MessageId::new(Uuid::new_v4()),
                chat_id,
                sender_id: sender.user_id,
                sender_username: sender.username.clone(),
                content: content.into_string(),
                created_at: chrono::Utc::now(),
            };
            self.messages.write().await.push(record.clone());
            Ok(record)
        }

        async fn mark_read(
            &self,
            _chat_id: ChatId,
            _reader_id: UserId,
        ) -> Result<Timestamp, CollaboratorError> {
            Ok(chrono::Utc::now())
        }
    }
}
