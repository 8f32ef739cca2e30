//! 事件广播器
//!
//! 把一个出站事件投递到正确的连接集合。投递路径：订阅者快照（短暂读锁）
//! -> 逐用户 -> 逐连接发送端。某个连接的发送失败只影响它自己：失败的
//! 连接被就地从注册表剔除（等同断开路径的第一步），扇出继续。

use std::sync::Arc;

use tracing::{debug, warn};

use domain::{ChatId, ConnectionId, ServerEvent, UserId};

use crate::error::RealtimeError;

use super::registry::ConnectionRegistry;
use super::subscriptions::SubscriptionIndex;

#[derive(Clone)]
pub struct Broadcaster {
    registry: Arc<ConnectionRegistry>,
    subscriptions: Arc<SubscriptionIndex>,
}

impl Broadcaster {
    pub fn new(registry: Arc<ConnectionRegistry>, subscriptions: Arc<SubscriptionIndex>) -> Self {
        Self {
            registry,
            subscriptions,
        }
    }

    /// 投递给某个用户的全部活跃连接（多设备同时在线时每个设备一份）。
    /// 返回成功投递的连接数。
    pub async fn deliver_to_user(&self, user_id: UserId, event: &ServerEvent) -> usize {
        let senders = self.registry.senders_of(user_id).await;
        let mut delivered = 0;
        for (connection_id, sender) in senders {
            if sender.send(event.clone()).is_ok() {
                delivered += 1;
            } else {
                // 发送端已关闭：连接的发送任务已经退出。就地剔除，
                // 完整清理（订阅、在线广播）由其生命周期负责。
                let error = RealtimeError::Transport { connection_id };
                warn!(%user_id, %error, event = event.name(), "dead connection pruned during fan-out");
                self.registry.remove(user_id, connection_id).await;
            }
        }
        delivered
    }

    /// 投递给聊天的全部订阅用户，可选排除发起者。
    ///
    /// 在订阅者快照上迭代：广播期间的并发 join/leave 不会让本次扇出
    /// 观察到半更新的集合。
    pub async fn deliver_to_chat(
        &self,
        chat_id: ChatId,
        event: &ServerEvent,
        exclude: Option<UserId>,
    ) -> usize {
        let subscribers = self.subscriptions.subscribers_of(chat_id).await;
        let mut delivered = 0;
        for user_id in subscribers {
            if Some(user_id) == exclude {
                continue;
            }
            delivered += self.deliver_to_user(user_id, event).await;
        }
        debug!(%chat_id, event = event.name(), delivered, "chat fan-out complete");
        delivered
    }

    /// 只回复发起命令的那一个连接（错误和查询应答）。
    pub async fn deliver_to_connection(
        &self,
        user_id: UserId,
        connection_id: ConnectionId,
        event: ServerEvent,
    ) -> bool {
        let Some(sender) = self.registry.sender_of(user_id, connection_id).await else {
            debug!(%user_id, %connection_id, "reply target already gone");
            return false;
        };
        if sender.send(event).is_err() {
            self.registry.remove(user_id, connection_id).await;
            return false;
        }
        true
    }
}
