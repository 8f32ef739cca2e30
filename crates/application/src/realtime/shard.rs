//! 按 key 分片的并发哈希表
//!
//! 注册表、订阅索引和输入状态都构建在它之上：互不相关的用户/聊天落在
//! 不同分片上，写入（连接、加入/离开）不会串行化其它聊天的广播读取。

use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};

use tokio::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

/// 固定分片数的读写锁哈希表。
pub struct ShardedMap<K, V> {
    shards: Vec<RwLock<HashMap<K, V>>>,
    mask: usize,
}

impl<K, V> ShardedMap<K, V>
where
    K: Hash + Eq + Clone,
{
    /// 创建分片表；`shard_count` 向上取整到 2 的幂。
    pub fn new(shard_count: usize) -> Self {
        let count = shard_count.max(1).next_power_of_two();
        let shards = (0..count).map(|_| RwLock::new(HashMap::new())).collect();
        Self {
            shards,
            mask: count - 1,
        }
    }

    fn shard_index(&self, key: &K) -> usize {
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        (hasher.finish() as usize) & self.mask
    }

    /// 锁定 key 所在分片用于写入。
    pub async fn shard_write(&self, key: &K) -> RwLockWriteGuard<'_, HashMap<K, V>> {
        self.shards[self.shard_index(key)].write().await
    }

    /// 锁定 key 所在分片用于读取。
    pub async fn shard_read(&self, key: &K) -> RwLockReadGuard<'_, HashMap<K, V>> {
        self.shards[self.shard_index(key)].read().await
    }

    /// 全部 key 的快照（逐分片短暂读锁，不存在全局锁）。
    pub async fn keys(&self) -> Vec<K> {
        let mut keys = Vec::new();
        for shard in &self.shards {
            let guard = shard.read().await;
            keys.extend(guard.keys().cloned());
        }
        keys
    }

    /// 条目总数（逐分片统计）。
    pub async fn len(&self) -> usize {
        let mut total = 0;
        for shard in &self.shards {
            total += shard.read().await.len();
        }
        total
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}
