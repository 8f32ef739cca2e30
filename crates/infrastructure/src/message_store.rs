//! 消息存储适配器
//!
//! 广播使用的规范记录以数据库返回的 id 和 created_at 为准，
//! `INSERT ... RETURNING` 保证消息先落库再进入扇出。

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::FromRow;
use tracing::error;
use uuid::Uuid;

use application::ports::{CollaboratorError, MessageStore};
use domain::{ChatId, MessageContent, MessageId, MessageRecord, Timestamp, UserId, UserIdentity};

use crate::db::DbPool;

pub struct PgMessageStore {
    pool: DbPool,
}

impl PgMessageStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, FromRow)]
struct InsertedMessage {
    id: Uuid,
    created_at: DateTime<Utc>,
}

fn db_unavailable(err: sqlx::Error) -> CollaboratorError {
    error!(%err, "message store query failed");
    CollaboratorError::unavailable(err.to_string())
}

#[async_trait]
impl MessageStore for PgMessageStore {
    async fn append(
        &self,
        chat_id: ChatId,
        sender: &UserIdentity,
        content: MessageContent,
    ) -> Result<MessageRecord, CollaboratorError> {
        let inserted: InsertedMessage = sqlx::query_as(
            r#"INSERT INTO messages (chat_id, sender_id, content)
               VALUES ($1, $2, $3)
               RETURNING id, created_at"#,
        )
        .bind(Uuid::from(chat_id))
        .bind(Uuid::from(sender.user_id))
        .bind(content.as_str())
        .fetch_one(&self.pool)
        .await
        .map_err(db_unavailable)?;

        Ok(MessageRecord {
            id: MessageId::new(inserted.id),
            chat_id,
            sender_id: sender.user_id,
            sender_username: sender.username.clone(),
            content: content.into_string(),
            created_at: inserted.created_at,
        })
    }

    async fn mark_read(
        &self,
        chat_id: ChatId,
        reader_id: UserId,
    ) -> Result<Timestamp, CollaboratorError> {
        // 批量翻转：聊天内非本人发送且未读的消息
        sqlx::query(
            r#"UPDATE messages
               SET is_read = TRUE, updated_at = NOW()
               WHERE chat_id = $1 AND sender_id <> $2 AND NOT is_read"#,
        )
        .bind(Uuid::from(chat_id))
        .bind(Uuid::from(reader_id))
        .execute(&self.pool)
        .await
        .map_err(db_unavailable)?;
        Ok(Utc::now())
    }
}
