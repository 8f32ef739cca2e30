//! 实时中枢
//!
//! 持有注册表、订阅索引、在线状态、输入状态和广播器，并提供两类入口：
//! 连接生命周期钩子（connect / disconnect），以及给非实时代码路径
//! （HTTP 处理器等）使用的对外协作接口。

use std::sync::Arc;

use tokio::sync::{mpsc, Mutex};
use tracing::info;

use config::RealtimeConfig;
use domain::{ChatId, ConnectionId, ServerEvent, UserId};

use super::broadcaster::Broadcaster;
use super::presence::PresenceTracker;
use super::registry::{AddOutcome, ConnectionRegistry};
use super::shard::ShardedMap;
use super::subscriptions::SubscriptionIndex;
use super::typing::TypingTracker;

pub struct RealtimeHub {
    registry: Arc<ConnectionRegistry>,
    subscriptions: Arc<SubscriptionIndex>,
    presence: PresenceTracker,
    typing: Arc<TypingTracker>,
    broadcaster: Broadcaster,
    /// 同一用户的 connect / disconnect 串行执行：注册、订阅水合与
    /// 订阅拆除之间存在多个让出点，并发重连不得交错观察到半成品状态。
    /// 锁条目按出现过的用户驻留，不回收。
    lifecycle_locks: ShardedMap<UserId, Arc<Mutex<()>>>,
}

impl RealtimeHub {
    pub fn new(config: &RealtimeConfig) -> Self {
        let registry = Arc::new(ConnectionRegistry::new(config.shard_count));
        let subscriptions = Arc::new(SubscriptionIndex::new(config.shard_count));
        let presence = PresenceTracker::new(registry.clone());
        let typing = Arc::new(TypingTracker::new(config.shard_count));
        let broadcaster = Broadcaster::new(registry.clone(), subscriptions.clone());
        Self {
            registry,
            subscriptions,
            presence,
            typing,
            broadcaster,
            lifecycle_locks: ShardedMap::new(config.shard_count),
        }
    }

    async fn lifecycle_lock(&self, user_id: UserId) -> Arc<Mutex<()>> {
        let mut shard = self.lifecycle_locks.shard_write(&user_id).await;
        shard.entry(user_id).or_default().clone()
    }

    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.registry
    }

    pub fn subscriptions(&self) -> &Arc<SubscriptionIndex> {
        &self.subscriptions
    }

    pub fn presence(&self) -> &PresenceTracker {
        &self.presence
    }

    pub fn typing(&self) -> &Arc<TypingTracker> {
        &self.typing
    }

    pub fn broadcaster(&self) -> &Broadcaster {
        &self.broadcaster
    }

    // ---- 连接生命周期钩子 ----

    /// 完成 Hydrating 阶段：注册连接、批量订阅所属聊天；若是用户的
    /// 第一个连接，向其各个聊天的其余订阅者广播上线。
    pub async fn connect(
        &self,
        user_id: UserId,
        chat_ids: &[ChatId],
        sender: mpsc::UnboundedSender<ServerEvent>,
    ) -> AddOutcome {
        let lock = self.lifecycle_lock(user_id).await;
        let _guard = lock.lock().await;

        let outcome = self.registry.add(user_id, sender).await;
        self.subscriptions.hydrate(user_id, chat_ids).await;

        if outcome.first_connection {
            for &chat_id in chat_ids {
                self.broadcaster
                    .deliver_to_chat(
                        chat_id,
                        &ServerEvent::UserJoined { chat_id, user_id },
                        Some(user_id),
                    )
                    .await;
            }
        }
        outcome
    }

    /// 断开清理。优雅关闭、传输错误和空闲超时共用此路径；重复调用
    /// 是 no-op。最后一个连接关闭时：清除输入标志并广播 stopped_typing，
    /// 拆除订阅，向相关聊天广播下线。
    pub async fn disconnect(&self, user_id: UserId, connection_id: ConnectionId) {
        let lock = self.lifecycle_lock(user_id).await;
        let _guard = lock.lock().await;

        self.registry.remove(user_id, connection_id).await;

        // 广播器可能已在扇出中先行剔除该连接；只要用户还有别的连接，
        // 或订阅已经拆除过，这里就无事可做
        if self.registry.is_online(user_id).await {
            return;
        }
        let chat_ids = self.subscriptions.chats_of(user_id).await;
        if chat_ids.is_empty() {
            return;
        }
        let stopped = self.typing.clear_user(user_id, &chat_ids).await;
        for chat_id in stopped {
            self.broadcaster
                .deliver_to_chat(
                    chat_id,
                    &ServerEvent::UserStoppedTyping { chat_id, user_id },
                    Some(user_id),
                )
                .await;
        }

        // 最后一个连接关闭即拆除订阅；下次连接时重新 hydrate 等价
        self.subscriptions.remove_user(user_id).await;
        for chat_id in chat_ids {
            self.broadcaster
                .deliver_to_chat(
                    chat_id,
                    &ServerEvent::UserLeft { chat_id, user_id },
                    Some(user_id),
                )
                .await;
        }
        info!(%user_id, %connection_id, "user went offline, subscriptions torn down");
    }

    // ---- 对外协作接口（非实时路径使用） ----

    /// 向聊天的全部订阅者发送系统通知。
    pub async fn notify_chat_participants(
        &self,
        chat_id: ChatId,
        notification: serde_json::Value,
    ) -> usize {
        self.broadcaster
            .deliver_to_chat(
                chat_id,
                &ServerEvent::GlobalNotification { notification },
                None,
            )
            .await
    }

    /// 向单个用户的全部连接发送系统通知。
    pub async fn send_global_notification(
        &self,
        user_id: UserId,
        notification: serde_json::Value,
    ) -> usize {
        self.broadcaster
            .deliver_to_user(user_id, &ServerEvent::GlobalNotification { notification })
            .await
    }

    pub async fn is_user_online(&self, user_id: UserId) -> bool {
        self.presence.is_online(user_id).await
    }

    pub async fn online_users(&self) -> Vec<UserId> {
        self.presence.online_users().await
    }

    pub async fn chats_of(&self, user_id: UserId) -> Vec<ChatId> {
        self.subscriptions.chats_of(user_id).await
    }

    pub async fn connection_count(&self) -> usize {
        self.registry.connection_count().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use uuid::Uuid;

    fn hub() -> RealtimeHub {
        RealtimeHub::new(&RealtimeConfig::default())
    }

    fn user() -> UserId {
        UserId::new(Uuid::new_v4())
    }

    fn chat() -> ChatId {
        ChatId::new(Uuid::new_v4())
    }

    #[tokio::test]
    async fn connect_hydrates_and_flips_presence() {
        let hub = hub();
        let user_id = user();
        let chats = vec![chat(), chat()];

        let (tx, _rx) = mpsc::unbounded_channel();
        let outcome = hub.connect(user_id, &chats, tx).await;

        assert!(outcome.first_connection);
        assert!(hub.is_user_online(user_id).await);
        assert_eq!(hub.chats_of(user_id).await.len(), 2);
    }

    #[tokio::test]
    async fn first_connection_announces_presence_to_chat_subscribers() {
        let hub = hub();
        let chat_id = chat();
        let (watcher, joiner) = (user(), user());

        let (tx_w, mut rx_w) = mpsc::unbounded_channel();
        hub.connect(watcher, &[chat_id], tx_w).await;

        let (tx_j, _rx_j) = mpsc::unbounded_channel();
        hub.connect(joiner, &[chat_id], tx_j).await;

        let event = rx_w.try_recv().unwrap();
        assert_eq!(
            event,
            ServerEvent::UserJoined {
                chat_id,
                user_id: joiner
            }
        );
    }

    #[tokio::test]
    async fn second_device_does_not_reannounce_presence() {
        let hub = hub();
        let chat_id = chat();
        let (watcher, user_id) = (user(), user());

        let (tx_w, mut rx_w) = mpsc::unbounded_channel();
        hub.connect(watcher, &[chat_id], tx_w).await;

        let (tx1, _rx1) = mpsc::unbounded_channel();
        hub.connect(user_id, &[chat_id], tx1).await;
        let _ = rx_w.try_recv();

        let (tx2, _rx2) = mpsc::unbounded_channel();
        let outcome = hub.connect(user_id, &[chat_id], tx2).await;
        assert!(!outcome.first_connection);
        assert!(rx_w.try_recv().is_err());
    }

    #[tokio::test]
    async fn last_disconnect_tears_down_and_announces_offline() {
        let hub = hub();
        let chat_id = chat();
        let (watcher, user_id) = (user(), user());

        let (tx_w, mut rx_w) = mpsc::unbounded_channel();
        hub.connect(watcher, &[chat_id], tx_w).await;

        let (tx, _rx) = mpsc::unbounded_channel();
        let outcome = hub.connect(user_id, &[chat_id], tx).await;
        let _ = rx_w.try_recv(); // 上线事件

        hub.disconnect(user_id, outcome.connection_id).await;

        assert!(!hub.is_user_online(user_id).await);
        assert!(hub.chats_of(user_id).await.is_empty());
        assert_eq!(
            rx_w.try_recv().unwrap(),
            ServerEvent::UserLeft {
                chat_id,
                user_id
            }
        );

        // 重复断开是 no-op，不再产生事件
        hub.disconnect(user_id, outcome.connection_id).await;
        assert!(rx_w.try_recv().is_err());
    }

    #[tokio::test]
    async fn presence_stays_until_both_devices_close() {
        let hub = hub();
        let user_id = user();
        let chat_id = chat();

        let (tx1, _rx1) = mpsc::unbounded_channel();
        let (tx2, _rx2) = mpsc::unbounded_channel();
        let first = hub.connect(user_id, &[chat_id], tx1).await;
        let second = hub.connect(user_id, &[chat_id], tx2).await;

        hub.disconnect(user_id, first.connection_id).await;
        assert!(hub.is_user_online(user_id).await);
        // 订阅保留到最后一个连接关闭
        assert_eq!(hub.chats_of(user_id).await, vec![chat_id]);

        hub.disconnect(user_id, second.connection_id).await;
        assert!(!hub.is_user_online(user_id).await);
    }

    #[tokio::test]
    async fn reconnect_racing_disconnect_keeps_subscriptions() {
        let hub = Arc::new(hub());
        let user_id = user();
        let chat_id = chat();

        // 旧连接的拆除与新连接的注册并发执行；两者按用户串行化，
        // 任一先后顺序都必须收敛到在线且订阅完整
        for _ in 0..64 {
            let (tx_old, _rx_old) = mpsc::unbounded_channel();
            let old = hub.connect(user_id, &[chat_id], tx_old).await;

            let (tx_new, _rx_new) = mpsc::unbounded_channel();
            let disconnecting = tokio::spawn({
                let hub = hub.clone();
                async move { hub.disconnect(user_id, old.connection_id).await }
            });
            let connecting = tokio::spawn({
                let hub = hub.clone();
                async move { hub.connect(user_id, &[chat_id], tx_new).await }
            });
            let (closed, outcome) = tokio::join!(disconnecting, connecting);
            closed.unwrap();
            let outcome = outcome.unwrap();

            assert!(hub.is_user_online(user_id).await);
            assert_eq!(hub.chats_of(user_id).await, vec![chat_id]);

            hub.disconnect(user_id, outcome.connection_id).await;
        }
    }

    #[tokio::test]
    async fn pruned_connection_still_gets_full_teardown() {
        let hub = hub();
        let chat_id = chat();
        let (watcher, user_id) = (user(), user());

        let (tx_w, mut rx_w) = mpsc::unbounded_channel();
        hub.connect(watcher, &[chat_id], tx_w).await;

        let (tx, rx) = mpsc::unbounded_channel();
        let outcome = hub.connect(user_id, &[chat_id], tx).await;
        let _ = rx_w.try_recv(); // 上线事件

        // 接收端先行关闭，扇出时广播器会剔除该连接
        drop(rx);
        hub.notify_chat_participants(chat_id, serde_json::json!({"kind": "ping"}))
            .await;
        let _ = rx_w.try_recv(); // 通知本身

        // 生命周期随后的 disconnect 仍需拆除订阅并广播下线
        hub.disconnect(user_id, outcome.connection_id).await;
        assert!(hub.chats_of(user_id).await.is_empty());
        assert_eq!(
            rx_w.try_recv().unwrap(),
            ServerEvent::UserLeft { chat_id, user_id }
        );
    }

    #[tokio::test]
    async fn notifications_reach_chat_participants() {
        let hub = hub();
        let chat_id = chat();
        let user_id = user();

        let (tx, mut rx) = mpsc::unbounded_channel();
        hub.connect(user_id, &[chat_id], tx).await;

        let payload = serde_json::json!({"kind": "chat_renamed"});
        let delivered = hub.notify_chat_participants(chat_id, payload.clone()).await;
        assert_eq!(delivered, 1);
        assert_eq!(
            rx.try_recv().unwrap(),
            ServerEvent::GlobalNotification {
                notification: payload
            }
        );
    }
}
