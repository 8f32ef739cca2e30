//! 连接实体
//!
//! 一个 `Connection` 对应一条活跃的传输层会话，由连接注册表独占持有；
//! 其它组件只通过 `ConnectionId` 引用它。

use serde::{Deserialize, Serialize};

use crate::value_objects::{ConnectionId, Timestamp, UserId};

/// 活跃连接的元数据。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Connection {
    /// 连接标识，进程内唯一且永不复用
    pub connection_id: ConnectionId,
    /// 连接所属用户
    pub user_id: UserId,
    /// 建立时间
    pub created_at: Timestamp,
    /// 最近一次收到客户端数据的时间
    pub last_active: Timestamp,
}

impl Connection {
    pub fn new(user_id: UserId) -> Self {
        let now = chrono::Utc::now();
        Self {
            connection_id: ConnectionId::generate(),
            user_id,
            created_at: now,
            last_active: now,
        }
    }

    /// 刷新活跃时间，用于空闲超时判定。
    pub fn update_activity(&mut self) {
        self.last_active = chrono::Utc::now();
    }
}
