//! 在线状态
//!
//! 在线与否不是独立存储的状态：用户在线 当且仅当 注册表中存在其至少
//! 一个连接。这里只是注册表之上的一层只读视图，不可能与注册表脱节。

use std::sync::Arc;

use domain::UserId;

use super::registry::ConnectionRegistry;

/// 从连接注册表派生的在线状态视图。
#[derive(Clone)]
pub struct PresenceTracker {
    registry: Arc<ConnectionRegistry>,
}

impl PresenceTracker {
    pub fn new(registry: Arc<ConnectionRegistry>) -> Self {
        Self { registry }
    }

    pub async fn is_online(&self, user_id: UserId) -> bool {
        self.registry.is_online(user_id).await
    }

    pub async fn online_users(&self) -> Vec<UserId> {
        self.registry.all_user_ids().await
    }
}
