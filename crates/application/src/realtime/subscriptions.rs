//! 订阅索引
//!
//! 维护 聊天 ↔ 订阅用户 的双向多对多映射。两个方向各自分片：
//! chat -> users 按聊天分片（广播扇出的读取路径），
//! user -> chats 按用户分片（连接建立/断开的写入路径）。
//! 两个方向的锁从不嵌套持有，无死锁可能。

use std::collections::HashSet;

use tracing::debug;

use domain::{ChatId, UserId};

use super::shard::ShardedMap;

/// 进程内订阅关系的唯一持有者。
pub struct SubscriptionIndex {
    chat_users: ShardedMap<ChatId, HashSet<UserId>>,
    user_chats: ShardedMap<UserId, HashSet<ChatId>>,
}

impl SubscriptionIndex {
    pub fn new(shard_count: usize) -> Self {
        Self {
            chat_users: ShardedMap::new(shard_count),
            user_chats: ShardedMap::new(shard_count),
        }
    }

    /// 建立订阅。重复订阅同一 (user, chat) 是 no-op，返回 false。
    pub async fn subscribe(&self, user_id: UserId, chat_id: ChatId) -> bool {
        let newly = {
            let mut shard = self.user_chats.shard_write(&user_id).await;
            shard.entry(user_id).or_default().insert(chat_id)
        };
        {
            let mut shard = self.chat_users.shard_write(&chat_id).await;
            shard.entry(chat_id).or_default().insert(user_id);
        }
        if newly {
            debug!(%user_id, %chat_id, "subscription added");
        }
        newly
    }

    /// 解除订阅。不存在的订阅是 no-op，返回 false。
    pub async fn unsubscribe(&self, user_id: UserId, chat_id: ChatId) -> bool {
        let existed = {
            let mut shard = self.user_chats.shard_write(&user_id).await;
            let removed = shard
                .get_mut(&user_id)
                .map(|chats| chats.remove(&chat_id))
                .unwrap_or(false);
            if shard.get(&user_id).map(|c| c.is_empty()).unwrap_or(false) {
                shard.remove(&user_id);
            }
            removed
        };
        {
            let mut shard = self.chat_users.shard_write(&chat_id).await;
            if let Some(users) = shard.get_mut(&chat_id) {
                users.remove(&user_id);
                if users.is_empty() {
                    shard.remove(&chat_id);
                }
            }
        }
        if existed {
            debug!(%user_id, %chat_id, "subscription removed");
        }
        existed
    }

    /// 连接建立时批量订阅用户的全部所属聊天。
    pub async fn hydrate(&self, user_id: UserId, chat_ids: &[ChatId]) {
        for &chat_id in chat_ids {
            self.subscribe(user_id, chat_id).await;
        }
        debug!(%user_id, count = chat_ids.len(), "subscriptions hydrated");
    }

    /// 聊天订阅者快照。广播在快照上迭代，期间的并发加入/离开
    /// 不会影响本次扇出。
    pub async fn subscribers_of(&self, chat_id: ChatId) -> Vec<UserId> {
        let shard = self.chat_users.shard_read(&chat_id).await;
        shard
            .get(&chat_id)
            .map(|users| users.iter().copied().collect())
            .unwrap_or_default()
    }

    /// 用户已订阅聊天的快照。
    pub async fn chats_of(&self, user_id: UserId) -> Vec<ChatId> {
        let shard = self.user_chats.shard_read(&user_id).await;
        shard
            .get(&user_id)
            .map(|chats| chats.iter().copied().collect())
            .unwrap_or_default()
    }

    pub async fn is_subscribed(&self, user_id: UserId, chat_id: ChatId) -> bool {
        let shard = self.user_chats.shard_read(&user_id).await;
        shard
            .get(&user_id)
            .map(|chats| chats.contains(&chat_id))
            .unwrap_or(false)
    }

    /// 用户最后一个连接关闭时拆除其全部订阅，返回受影响的聊天。
    pub async fn remove_user(&self, user_id: UserId) -> Vec<ChatId> {
        let chat_ids: Vec<ChatId> = {
            let mut shard = self.user_chats.shard_write(&user_id).await;
            shard
                .remove(&user_id)
                .map(|chats| chats.into_iter().collect())
                .unwrap_or_default()
        };
        for &chat_id in &chat_ids {
            let mut shard = self.chat_users.shard_write(&chat_id).await;
            if let Some(users) = shard.get_mut(&chat_id) {
                users.remove(&user_id);
                if users.is_empty() {
                    shard.remove(&chat_id);
                }
            }
        }
        chat_ids
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn user() -> UserId {
        UserId::new(Uuid::new_v4())
    }

    fn chat() -> ChatId {
        ChatId::new(Uuid::new_v4())
    }

    #[tokio::test]
    async fn subscribe_is_idempotent() {
        let index = SubscriptionIndex::new(4);
        let (user_id, chat_id) = (user(), chat());

        assert!(index.subscribe(user_id, chat_id).await);
        assert!(!index.subscribe(user_id, chat_id).await);

        assert_eq!(index.subscribers_of(chat_id).await, vec![user_id]);
        assert_eq!(index.chats_of(user_id).await, vec![chat_id]);
    }

    #[tokio::test]
    async fn unsubscribe_missing_pair_is_noop() {
        let index = SubscriptionIndex::new(4);
        assert!(!index.unsubscribe(user(), chat()).await);
    }

    #[tokio::test]
    async fn unsubscribe_clears_both_directions() {
        let index = SubscriptionIndex::new(4);
        let (user_id, chat_id) = (user(), chat());

        index.subscribe(user_id, chat_id).await;
        assert!(index.unsubscribe(user_id, chat_id).await);

        assert!(index.subscribers_of(chat_id).await.is_empty());
        assert!(index.chats_of(user_id).await.is_empty());
        assert!(!index.is_subscribed(user_id, chat_id).await);
    }

    #[tokio::test]
    async fn hydrate_subscribes_all_chats() {
        let index = SubscriptionIndex::new(4);
        let user_id = user();
        let chats: Vec<ChatId> = (0..3).map(|_| chat()).collect();

        index.hydrate(user_id, &chats).await;

        let mut subscribed = index.chats_of(user_id).await;
        subscribed.sort_by_key(|c| c.0);
        let mut expected = chats.clone();
        expected.sort_by_key(|c| c.0);
        assert_eq!(subscribed, expected);
        for chat_id in chats {
            assert!(index.is_subscribed(user_id, chat_id).await);
        }
    }

    #[tokio::test]
    async fn remove_user_returns_affected_chats() {
        let index = SubscriptionIndex::new(4);
        let user_id = user();
        let other = user();
        let (c1, c2) = (chat(), chat());

        index.hydrate(user_id, &[c1, c2]).await;
        index.subscribe(other, c1).await;

        let mut affected = index.remove_user(user_id).await;
        affected.sort_by_key(|c| c.0);
        let mut expected = vec![c1, c2];
        expected.sort_by_key(|c| c.0);
        assert_eq!(affected, expected);

        assert!(index.chats_of(user_id).await.is_empty());
        // 其它用户的订阅不受影响
        assert_eq!(index.subscribers_of(c1).await, vec![other]);
        assert!(index.subscribers_of(c2).await.is_empty());
    }
}
