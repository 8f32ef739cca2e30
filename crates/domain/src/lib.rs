//! 聊天系统核心领域模型
//!
//! 包含标识符、连接实体、入站命令与出站事件信封，以及相关的校验规则。

pub mod commands;
pub mod connection;
pub mod errors;
pub mod events;
pub mod message;
pub mod value_objects;

// 重新导出常用类型
pub use commands::*;
pub use connection::*;
pub use errors::*;
pub use events::*;
pub use message::*;
pub use value_objects::*;
