//! Content-addressed value cache.
//!
//! Entries are keyed by [`Hash`] alone: any plug in any context whose hash
//! matches may reuse the value. The table is split into shards, each with its
//! own lock, LRU list and in-flight table, so unrelated lookups never contend
//! on a single lock.

use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::thread::{self, ThreadId};

use log::{debug, trace};
use lru::LruCache;

use super::CacheStats;
use crate::error::GraphError;
use crate::hash::Hash;
use crate::util::sync::lock;
use crate::value::Value;

struct Entry {
    value: Arc<Value>,
    cost: usize,
}

struct Shard {
    entries: LruCache<Hash, Entry>,
    cost: usize,
    in_flight: HashMap<Hash, Arc<InFlight>>,
}

impl Shard {
    fn new() -> Self {
        Self {
            entries: LruCache::unbounded(),
            cost: 0,
            in_flight: HashMap::new(),
        }
    }
}

#[derive(Clone)]
enum Outcome {
    Ready(Arc<Value>),
    Failed(GraphError),
    /// The computing caller gave up (cancelled or panicked); waiters retry.
    Abandoned,
}

/// A computation currently running for one hash.
struct InFlight {
    owner: ThreadId,
    outcome: Mutex<Option<Outcome>>,
    ready: Condvar,
}

impl InFlight {
    fn new() -> Self {
        Self {
            owner: thread::current().id(),
            outcome: Mutex::new(None),
            ready: Condvar::new(),
        }
    }

    fn wait(&self) -> Outcome {
        let mut outcome = lock(&self.outcome);
        loop {
            if let Some(result) = outcome.as_ref() {
                return result.clone();
            }
            outcome = self
                .ready
                .wait(outcome)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    fn publish(&self, result: Outcome) {
        *lock(&self.outcome) = Some(result);
        self.ready.notify_all();
    }
}

#[derive(Default)]
struct Counters {
    hits: AtomicU64,
    computes: AtomicU64,
    waits: AtomicU64,
    evictions: AtomicU64,
}

pub struct ValueCache {
    shards: Box<[Mutex<Shard>]>,
    shard_budget: usize,
    counters: Counters,
}

enum Role {
    Wait(Arc<InFlight>),
    Compute(Arc<InFlight>),
}

impl ValueCache {
    /// `memory_budget` is the total cost (in approximate bytes) the cache may
    /// hold, split evenly across `shards`.
    pub fn new(memory_budget: usize, shards: NonZeroUsize) -> Self {
        let shards = shards.get();
        Self {
            shards: (0..shards).map(|_| Mutex::new(Shard::new())).collect(),
            shard_budget: memory_budget / shards,
            counters: Counters::default(),
        }
    }

    fn shard(&self, hash: &Hash) -> &Mutex<Shard> {
        let index = (hash.prefix() % self.shards.len() as u64) as usize;
        &self.shards[index]
    }

    /// Returns the value stored for `hash`, running `compute` if there is none.
    ///
    /// Concurrent callers asking for the same hash wait for the first one
    /// instead of computing again. Failed computations are not stored.
    pub fn get_or_compute<F>(&self, hash: Hash, compute: F) -> Result<Arc<Value>, GraphError>
    where
        F: FnOnce() -> Result<Value, GraphError>,
    {
        let mut compute = Some(compute);
        let shard = self.shard(&hash);

        loop {
            let role = {
                let mut guard = lock(shard);
                if let Some(entry) = guard.entries.get(&hash) {
                    self.counters.hits.fetch_add(1, Ordering::Relaxed);
                    trace!("Value cache hit {:?}", hash);
                    return Ok(Arc::clone(&entry.value));
                }
                let existing = guard.in_flight.get(&hash).cloned();
                match existing {
                    Some(flight) if flight.owner == thread::current().id() => {
                        // This thread is already computing the same hash further up
                        // the stack. Waiting would deadlock, so compute uncached.
                        drop(guard);
                        debug!("Re-entrant request for {:?}, computing without cache", hash);
                        let compute = take_compute(&mut compute)?;
                        return compute().map(Arc::new);
                    }
                    Some(flight) => Role::Wait(flight),
                    None => {
                        let flight = Arc::new(InFlight::new());
                        guard.in_flight.insert(hash, Arc::clone(&flight));
                        Role::Compute(flight)
                    }
                }
            };

            match role {
                Role::Wait(flight) => {
                    self.counters.waits.fetch_add(1, Ordering::Relaxed);
                    match flight.wait() {
                        Outcome::Ready(value) => return Ok(value),
                        Outcome::Failed(err) => return Err(err),
                        Outcome::Abandoned => continue,
                    }
                }
                Role::Compute(flight) => {
                    self.counters.computes.fetch_add(1, Ordering::Relaxed);
                    let mut publisher = Publisher {
                        cache: self,
                        shard,
                        hash,
                        flight,
                        published: false,
                    };
                    let compute = take_compute(&mut compute)?;
                    return publisher.finish(compute());
                }
            }
        }
    }

    pub fn get(&self, hash: &Hash) -> Option<Arc<Value>> {
        lock(self.shard(hash))
            .entries
            .get(hash)
            .map(|entry| Arc::clone(&entry.value))
    }

    pub fn contains(&self, hash: &Hash) -> bool {
        lock(self.shard(hash)).entries.contains(hash)
    }

    /// Number of stored entries.
    pub fn len(&self) -> usize {
        self.shards.iter().map(|shard| lock(shard).entries.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Total cost of stored entries.
    pub fn cost(&self) -> usize {
        self.shards.iter().map(|shard| lock(shard).cost).sum()
    }

    /// Drops every stored entry. Computations in flight are unaffected and
    /// still publish their results.
    pub fn clear(&self) {
        for shard in self.shards.iter() {
            let mut guard = lock(shard);
            guard.entries.clear();
            guard.cost = 0;
        }
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.counters.hits.load(Ordering::Relaxed),
            computes: self.counters.computes.load(Ordering::Relaxed),
            waits: self.counters.waits.load(Ordering::Relaxed),
            evictions: self.counters.evictions.load(Ordering::Relaxed),
            entries: self.len(),
            cost: self.cost(),
        }
    }

    fn store(&self, shard: &mut Shard, hash: Hash, value: &Arc<Value>) {
        let cost = value.cost();
        if cost > self.shard_budget {
            debug!(
                "Not caching {:?}: cost {} exceeds shard budget {}",
                hash, cost, self.shard_budget
            );
            return;
        }
        if let Some(previous) = shard.entries.put(
            hash,
            Entry {
                value: Arc::clone(value),
                cost,
            },
        ) {
            shard.cost -= previous.cost;
        }
        shard.cost += cost;
        while shard.cost > self.shard_budget {
            match shard.entries.pop_lru() {
                Some((evicted, entry)) => {
                    trace!("Evicting {:?} (cost {})", evicted, entry.cost);
                    shard.cost -= entry.cost;
                    self.counters.evictions.fetch_add(1, Ordering::Relaxed);
                }
                None => break,
            }
        }
    }
}

fn take_compute<F>(compute: &mut Option<F>) -> Result<F, GraphError> {
    compute
        .take()
        .ok_or_else(|| GraphError::CacheInvariant("compute closure already consumed".to_string()))
}

/// Publishes the outcome of a computation exactly once, including when the
/// compute closure panics.
struct Publisher<'a> {
    cache: &'a ValueCache,
    shard: &'a Mutex<Shard>,
    hash: Hash,
    flight: Arc<InFlight>,
    published: bool,
}

impl Publisher<'_> {
    fn finish(&mut self, result: Result<Value, GraphError>) -> Result<Arc<Value>, GraphError> {
        self.published = true;
        match result {
            Ok(value) => {
                let value = Arc::new(value);
                {
                    let mut guard = lock(self.shard);
                    guard.in_flight.remove(&self.hash);
                    self.cache.store(&mut guard, self.hash, &value);
                }
                self.flight.publish(Outcome::Ready(Arc::clone(&value)));
                Ok(value)
            }
            Err(err) => {
                lock(self.shard).in_flight.remove(&self.hash);
                if err.is_cancellation() {
                    self.flight.publish(Outcome::Abandoned);
                } else {
                    self.flight.publish(Outcome::Failed(err.clone()));
                }
                Err(err)
            }
        }
    }
}

impl Drop for Publisher<'_> {
    fn drop(&mut self) {
        if !self.published {
            lock(self.shard).in_flight.remove(&self.hash);
            self.flight.publish(Outcome::Abandoned);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Barrier;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    fn cache(budget: usize) -> ValueCache {
        ValueCache::new(budget, NonZeroUsize::new(4).unwrap())
    }

    fn key(n: u8) -> Hash {
        Hash([n; 32])
    }

    #[test]
    fn test_second_lookup_is_a_hit() {
        let cache = cache(1 << 20);
        let calls = AtomicUsize::new(0);
        let compute = || {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok(Value::from(1.0))
        };
        let a = cache.get_or_compute(key(1), compute).unwrap();
        let b = cache.get_or_compute(key(1), compute).unwrap();
        assert_eq!(a, b);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.computes, 1);
    }

    #[test]
    fn test_failures_are_not_cached() {
        let cache = cache(1 << 20);
        let err = cache
            .get_or_compute(key(2), || Err(GraphError::compute("n.out", "boom")))
            .unwrap_err();
        assert_eq!(err, GraphError::compute("n.out", "boom"));
        assert!(!cache.contains(&key(2)));

        let value = cache.get_or_compute(key(2), || Ok(Value::from(3.0))).unwrap();
        assert_eq!(*value, Value::from(3.0));
    }

    #[test]
    fn test_concurrent_requests_compute_once() {
        let cache = cache(1 << 20);
        let calls = AtomicUsize::new(0);
        let threads = 8;
        let barrier = Barrier::new(threads);

        let results: Vec<Arc<Value>> = thread::scope(|s| {
            let handles: Vec<_> = (0..threads)
                .map(|_| {
                    s.spawn(|| {
                        barrier.wait();
                        cache
                            .get_or_compute(key(3), || {
                                calls.fetch_add(1, Ordering::SeqCst);
                                thread::sleep(Duration::from_millis(50));
                                Ok(Value::from(42.0))
                            })
                            .unwrap()
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(results.iter().all(|v| Arc::ptr_eq(v, &results[0])));
    }

    #[test]
    fn test_cancelled_leader_hands_over_to_waiter() {
        let cache = cache(1 << 20);
        let barrier = Barrier::new(2);

        let (leader, follower) = thread::scope(|s| {
            let leader = s.spawn(|| {
                cache.get_or_compute(key(4), || {
                    barrier.wait();
                    thread::sleep(Duration::from_millis(50));
                    Err(GraphError::Cancelled)
                })
            });
            let follower = s.spawn(|| {
                barrier.wait();
                cache.get_or_compute(key(4), || Ok(Value::from(7.0)))
            });
            (leader.join().unwrap(), follower.join().unwrap())
        });

        assert_eq!(leader, Err(GraphError::Cancelled));
        assert_eq!(*follower.unwrap(), Value::from(7.0));
    }

    #[test]
    fn test_reentrant_request_does_not_deadlock() {
        let cache = cache(1 << 20);
        let value = cache
            .get_or_compute(key(5), || {
                let inner = cache.get_or_compute(key(5), || Ok(Value::from(1.0)))?;
                Ok(Value::from(inner.as_number().unwrap_or(0.0) + 1.0))
            })
            .unwrap();
        assert_eq!(*value, Value::from(2.0));
    }

    #[test]
    fn test_lru_eviction_respects_budget() {
        let entry_cost = Value::Bytes(vec![0; 100]).cost();
        // One shard so the budget is exact.
        let cache = ValueCache::new(entry_cost * 2, NonZeroUsize::new(1).unwrap());
        for n in 0..3 {
            cache
                .get_or_compute(key(n), || Ok(Value::Bytes(vec![n; 100])))
                .unwrap();
        }
        assert_eq!(cache.len(), 2);
        assert!(!cache.contains(&key(0)));
        assert!(cache.cost() <= entry_cost * 2);
        assert_eq!(cache.stats().evictions, 1);
    }

    #[test]
    fn test_recently_used_entries_survive() {
        let entry_cost = Value::Bytes(vec![0; 100]).cost();
        let cache = ValueCache::new(entry_cost * 2, NonZeroUsize::new(1).unwrap());
        cache.get_or_compute(key(0), || Ok(Value::Bytes(vec![0; 100]))).unwrap();
        cache.get_or_compute(key(1), || Ok(Value::Bytes(vec![1; 100]))).unwrap();
        assert!(cache.get(&key(0)).is_some());
        cache.get_or_compute(key(2), || Ok(Value::Bytes(vec![2; 100]))).unwrap();
        assert!(cache.contains(&key(0)));
        assert!(!cache.contains(&key(1)));
    }

    #[test]
    fn test_oversized_values_are_returned_but_not_stored() {
        let cache = ValueCache::new(64, NonZeroUsize::new(1).unwrap());
        let value = cache
            .get_or_compute(key(6), || Ok(Value::Bytes(vec![0; 1024])))
            .unwrap();
        assert_eq!(value.cost(), Value::Bytes(vec![0; 1024]).cost());
        assert!(cache.is_empty());
    }

    #[test]
    fn test_panicking_compute_releases_waiters() {
        let cache = cache(1 << 20);
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _ = cache.get_or_compute(key(7), || -> Result<Value, GraphError> {
                panic!("compute panicked")
            });
        }));
        assert!(result.is_err());
        let value = cache.get_or_compute(key(7), || Ok(Value::from(1.0))).unwrap();
        assert_eq!(*value, Value::from(1.0));
    }
}
