//! 聊天目录适配器
//!
//! 成员关系的权威来源是 `chat_participants` 表；未读数从 `messages.is_read`
//! 统计（聊天内非本人发送且未读的消息）。

use async_trait::async_trait;
use sqlx::FromRow;
use tracing::error;
use uuid::Uuid;

use application::ports::{ChatDirectory, CollaboratorError};
use domain::{ChatId, ChatSummary, UserId};

use crate::db::DbPool;

pub struct PgChatDirectory {
    pool: DbPool,
}

impl PgChatDirectory {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, FromRow)]
struct DbChatSummary {
    chat_id: Uuid,
    name: Option<String>,
    is_group: bool,
    unread_count: i64,
}

impl From<DbChatSummary> for ChatSummary {
    fn from(row: DbChatSummary) -> Self {
        ChatSummary {
            chat_id: ChatId::new(row.chat_id),
            name: row.name,
            is_group: row.is_group,
            unread_count: row.unread_count,
        }
    }
}

fn db_unavailable(err: sqlx::Error) -> CollaboratorError {
    error!(%err, "chat directory query failed");
    CollaboratorError::unavailable(err.to_string())
}

#[async_trait]
impl ChatDirectory for PgChatDirectory {
    async fn membership_of(&self, user_id: UserId) -> Result<Vec<ChatId>, CollaboratorError> {
        let rows: Vec<(Uuid,)> =
            sqlx::query_as("SELECT chat_id FROM chat_participants WHERE user_id = $1")
                .bind(Uuid::from(user_id))
                .fetch_all(&self.pool)
                .await
                .map_err(db_unavailable)?;
        Ok(rows.into_iter().map(|(id,)| ChatId::new(id)).collect())
    }

    async fn is_member(
        &self,
        user_id: UserId,
        chat_id: ChatId,
    ) -> Result<bool, CollaboratorError> {
        let (exists,): (bool,) = sqlx::query_as(
            "SELECT EXISTS(SELECT 1 FROM chat_participants WHERE chat_id = $1 AND user_id = $2)",
        )
        .bind(Uuid::from(chat_id))
        .bind(Uuid::from(user_id))
        .fetch_one(&self.pool)
        .await
        .map_err(db_unavailable)?;
        Ok(exists)
    }

    async fn chat_summaries(
        &self,
        user_id: UserId,
    ) -> Result<Vec<ChatSummary>, CollaboratorError> {
        let rows: Vec<DbChatSummary> = sqlx::query_as(
            r#"SELECT c.id AS chat_id,
                      c.name,
                      c.is_group,
                      COUNT(m.id) FILTER (
                          WHERE m.sender_id <> $1 AND NOT m.is_read
                      ) AS unread_count
               FROM chats c
               JOIN chat_participants cp ON cp.chat_id = c.id AND cp.user_id = $1
               LEFT JOIN messages m ON m.chat_id = c.id
               GROUP BY c.id, c.name, c.is_group
               ORDER BY c.created_at"#,
        )
        .bind(Uuid::from(user_id))
        .fetch_all(&self.pool)
        .await
        .map_err(db_unavailable)?;
        Ok(rows.into_iter().map(ChatSummary::from).collect())
    }
}
