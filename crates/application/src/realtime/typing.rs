//! 输入状态
//!
//! (聊天, 用户) 维度的瞬时标志，last-write-wins，进程重启后不保留，
//! 除当次广播外没有任何存储要求。

use std::collections::HashSet;

use domain::{ChatId, UserId};

use super::shard::ShardedMap;

pub struct TypingTracker {
    typing: ShardedMap<ChatId, HashSet<UserId>>,
}

impl TypingTracker {
    pub fn new(shard_count: usize) -> Self {
        Self {
            typing: ShardedMap::new(shard_count),
        }
    }

    /// 更新输入标志，返回标志是否发生变化（未变化时调用方跳过广播）。
    pub async fn set_typing(&self, chat_id: ChatId, user_id: UserId, is_typing: bool) -> bool {
        let mut shard = self.typing.shard_write(&chat_id).await;
        if is_typing {
            shard.entry(chat_id).or_default().insert(user_id)
        } else {
            let removed = shard
                .get_mut(&chat_id)
                .map(|users| users.remove(&user_id))
                .unwrap_or(false);
            if shard.get(&chat_id).map(|u| u.is_empty()).unwrap_or(false) {
                shard.remove(&chat_id);
            }
            removed
        }
    }

    pub async fn typing_users(&self, chat_id: ChatId) -> Vec<UserId> {
        let shard = self.typing.shard_read(&chat_id).await;
        shard
            .get(&chat_id)
            .map(|users| users.iter().copied().collect())
            .unwrap_or_default()
    }

    /// 用户断开时清除其全部输入标志，返回此前标志为真的聊天
    /// （调用方据此向其余订阅者广播 stopped_typing）。
    pub async fn clear_user(&self, user_id: UserId, chat_ids: &[ChatId]) -> Vec<ChatId> {
        let mut cleared = Vec::new();
        for &chat_id in chat_ids {
            if self.set_typing(chat_id, user_id, false).await {
                cleared.push(chat_id);
            }
        }
        cleared
    }
}
