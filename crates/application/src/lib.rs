//! 应用层实现。
//!
//! 这里承载实时核心：连接注册表、订阅索引、在线状态、广播器与命令路由器，
//! 以及对外部协作者（认证、聊天目录、消息存储）的端口抽象。
//! 注册表与订阅索引是进程内仅有的两块共享可变状态，均按 key 分片加锁；
//! 持有内部锁时绝不调用外部协作者。

pub mod error;
pub mod ports;
pub mod realtime;

pub use error::RealtimeError;
pub use ports::{AuthError, Authenticator, ChatDirectory, CollaboratorError, MessageStore};
pub use realtime::{
    AddOutcome, Broadcaster, ConnectionRegistry, EventRouter, PresenceTracker, RealtimeHub,
    RemoveOutcome, SubscriptionIndex, TypingTracker,
};
