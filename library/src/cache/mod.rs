//! Caches backing graph evaluation.

mod hash_cache;
mod value_cache;

pub(crate) use hash_cache::{HashCache, HashKey};
pub use value_cache::ValueCache;

/// Counters reported by [`ValueCache::stats`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Lookups answered from a stored entry
    pub hits: u64,
    /// Computations started (including ones that failed)
    pub computes: u64,
    /// Lookups that waited for another caller's computation
    pub waits: u64,
    pub evictions: u64,
    pub entries: usize,
    /// Total cost of stored entries, in approximate bytes
    pub cost: usize,
}
