//! 基础设施层实现。
//!
//! 提供应用层端口的具体适配器：PostgreSQL 聊天目录与消息存储、
//! JWT 认证器，以及数据库连接池工具。

pub mod auth;
pub mod chat_directory;
pub mod db;
pub mod message_store;

pub use auth::{Claims, JwtAuthenticator};
pub use chat_directory::PgChatDirectory;
pub use db::{create_pg_pool, DbPool};
pub use message_store::PgMessageStore;
