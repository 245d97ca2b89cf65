//! Cross-request memo of computed plug hashes.
//!
//! Keys include the plug's dirty count, so dirtying a plug makes its old
//! entries unreachable without touching the table; they age out of the LRU.

use std::num::NonZeroUsize;
use std::sync::Mutex;

use lru::LruCache;

use crate::hash::{Hash, Hasher};
use crate::plug::PlugRef;
use crate::util::sync::lock;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub(crate) struct HashKey {
    pub plug: PlugRef,
    pub context: Hash,
    pub dirty_count: u64,
}

pub(crate) struct HashCache {
    shards: Box<[Mutex<LruCache<HashKey, Hash>>]>,
}

impl HashCache {
    /// A capacity of zero disables the cache.
    pub fn new(capacity: usize, shards: NonZeroUsize) -> Self {
        let per_shard = NonZeroUsize::new(capacity / shards.get());
        let shards = match per_shard {
            Some(per_shard) => (0..shards.get())
                .map(|_| Mutex::new(LruCache::new(per_shard)))
                .collect(),
            None => Box::default(),
        };
        Self { shards }
    }

    fn shard(&self, key: &HashKey) -> Option<&Mutex<LruCache<HashKey, Hash>>> {
        if self.shards.is_empty() {
            return None;
        }
        // The context hash is already uniformly distributed; mix in the plug
        // index so one context doesn't pin every plug to one shard.
        let mut h = Hasher::new();
        h.append_hash(&key.context).append_u64(key.plug.index as u64);
        let index = (h.finish().prefix() % self.shards.len() as u64) as usize;
        Some(&self.shards[index])
    }

    pub fn get(&self, key: &HashKey) -> Option<Hash> {
        self.shard(key)
            .and_then(|shard| lock(shard).get(key).copied())
    }

    pub fn insert(&self, key: HashKey, hash: Hash) {
        if let Some(shard) = self.shard(&key) {
            lock(shard).put(key, hash);
        }
    }

    pub fn clear(&self) {
        for shard in self.shards.iter() {
            lock(shard).clear();
        }
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.shards.iter().map(|shard| lock(shard).len()).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::NodeId;

    fn key(dirty_count: u64) -> HashKey {
        HashKey {
            plug: PlugRef::new(NodeId::new(), 0),
            context: Hash([0; 32]),
            dirty_count,
        }
    }

    #[test]
    fn test_dirty_count_is_part_of_the_key() {
        let cache = HashCache::new(64, NonZeroUsize::new(2).unwrap());
        let clean = key(0);
        let dirtied = HashKey {
            dirty_count: 1,
            ..clean
        };
        cache.insert(clean, Hash([1; 32]));
        assert_eq!(cache.get(&clean), Some(Hash([1; 32])));
        assert_eq!(cache.get(&dirtied), None);
    }

    #[test]
    fn test_zero_capacity_disables() {
        let cache = HashCache::new(0, NonZeroUsize::new(4).unwrap());
        cache.insert(key(0), Hash([1; 32]));
        assert_eq!(cache.len(), 0);
    }
}
