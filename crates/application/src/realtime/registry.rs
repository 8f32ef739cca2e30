//! 连接注册表
//!
//! 按用户分片存放活跃连接。每个连接持有一个无界发送端，出站事件经由它
//! 进入该连接的发送任务。在线状态直接派生自本结构：增删连接与在线计数
//! 在同一把分片锁下完成，外界永远观察不到两者不一致。

use std::collections::HashMap;

use tokio::sync::mpsc;
use tracing::{debug, info};

use domain::{Connection, ConnectionId, ServerEvent, UserId};

use super::shard::ShardedMap;

/// 注册表内的连接句柄：实体 + 出站发送端。
pub struct ConnectionHandle {
    pub connection: Connection,
    sender: mpsc::UnboundedSender<ServerEvent>,
}

/// `add` 的结果。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AddOutcome {
    pub connection_id: ConnectionId,
    /// 是否是该用户的第一个连接（在线状态由 false 翻转为 true）
    pub first_connection: bool,
}

/// `remove` 的结果。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RemoveOutcome {
    /// 连接是否存在并被移除；重复移除是无副作用的 no-op
    pub removed: bool,
    /// 是否是该用户的最后一个连接（在线状态翻转为 false）
    pub was_last: bool,
}

/// 进程内活跃连接的唯一持有者。
pub struct ConnectionRegistry {
    slots: ShardedMap<UserId, HashMap<ConnectionId, ConnectionHandle>>,
}

impl ConnectionRegistry {
    pub fn new(shard_count: usize) -> Self {
        Self {
            slots: ShardedMap::new(shard_count),
        }
    }

    /// 注册一个新连接并返回其标识。
    pub async fn add(
        &self,
        user_id: UserId,
        sender: mpsc::UnboundedSender<ServerEvent>,
    ) -> AddOutcome {
        let connection = Connection::new(user_id);
        let connection_id = connection.connection_id;

        let mut shard = self.slots.shard_write(&user_id).await;
        let slot = shard.entry(user_id).or_default();
        let first_connection = slot.is_empty();
        slot.insert(connection_id, ConnectionHandle { connection, sender });
        drop(shard);

        info!(%user_id, %connection_id, first_connection, "connection registered");
        AddOutcome {
            connection_id,
            first_connection,
        }
    }

    /// 移除连接。移除后该连接标识不会再被 `connections_of` 返回。
    pub async fn remove(&self, user_id: UserId, connection_id: ConnectionId) -> RemoveOutcome {
        let mut shard = self.slots.shard_write(&user_id).await;
        let Some(slot) = shard.get_mut(&user_id) else {
            return RemoveOutcome {
                removed: false,
                was_last: false,
            };
        };
        let removed = slot.remove(&connection_id).is_some();
        let was_last = removed && slot.is_empty();
        if slot.is_empty() {
            shard.remove(&user_id);
        }
        drop(shard);

        if removed {
            info!(%user_id, %connection_id, was_last, "connection removed");
        } else {
            debug!(%user_id, %connection_id, "remove of unknown connection ignored");
        }
        RemoveOutcome { removed, was_last }
    }

    /// 用户全部活跃连接的快照。
    pub async fn connections_of(&self, user_id: UserId) -> Vec<Connection> {
        let shard = self.slots.shard_read(&user_id).await;
        shard
            .get(&user_id)
            .map(|slot| slot.values().map(|h| h.connection.clone()).collect())
            .unwrap_or_default()
    }

    /// 用户全部连接的发送端快照（广播器使用）。
    pub async fn senders_of(
        &self,
        user_id: UserId,
    ) -> Vec<(ConnectionId, mpsc::UnboundedSender<ServerEvent>)> {
        let shard = self.slots.shard_read(&user_id).await;
        shard
            .get(&user_id)
            .map(|slot| {
                slot.iter()
                    .map(|(id, handle)| (*id, handle.sender.clone()))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// 指定连接的发送端。
    pub async fn sender_of(
        &self,
        user_id: UserId,
        connection_id: ConnectionId,
    ) -> Option<mpsc::UnboundedSender<ServerEvent>> {
        let shard = self.slots.shard_read(&user_id).await;
        shard
            .get(&user_id)
            .and_then(|slot| slot.get(&connection_id))
            .map(|handle| handle.sender.clone())
    }

    /// 用户是否至少有一个活跃连接。
    pub async fn is_online(&self, user_id: UserId) -> bool {
        let shard = self.slots.shard_read(&user_id).await;
        shard.get(&user_id).map(|s| !s.is_empty()).unwrap_or(false)
    }

    /// 当前有活跃连接的全部用户。
    pub async fn all_user_ids(&self) -> Vec<UserId> {
        self.slots.keys().await
    }

    /// 刷新连接活跃时间。
    pub async fn touch(&self, user_id: UserId, connection_id: ConnectionId) {
        let mut shard = self.slots.shard_write(&user_id).await;
        if let Some(handle) = shard
            .get_mut(&user_id)
            .and_then(|slot| slot.get_mut(&connection_id))
        {
            handle.connection.update_activity();
        }
    }

    /// 活跃连接总数（监控用）。
    pub async fn connection_count(&self) -> usize {
        let mut total = 0;
        for user_id in self.slots.keys().await {
            let shard = self.slots.shard_read(&user_id).await;
            if let Some(slot) = shard.get(&user_id) {
                total += slot.len();
            }
        }
        total
    }
}
