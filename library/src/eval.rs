//! Evaluation: hashing plugs and computing their values.
//!
//! An [`Evaluation`] serves one request against a read-locked
//! [`GraphState`]. Hashes are memoized per request (so a plug is hashed once
//! per context no matter how many downstream nodes read it) and across
//! requests in the [`HashCache`], keyed by the plug's dirty count. Values go
//! through the shared [`ValueCache`].

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use log::{Level, error};

use crate::cache::{HashCache, HashKey, ValueCache};
use crate::config::EngineConfig;
use crate::context::Context;
use crate::dirty;
use crate::error::GraphError;
use crate::graph::{GraphState, NodeEntry, leaf_name};
use crate::hash::{Hash, Hasher};
use crate::node::CachePolicy;
use crate::plug::{PlugDirection, PlugRef};
use crate::util::sync::lock;
use crate::util::timing::ScopedTimer;
use crate::value::{Value, ValueType};

pub(crate) struct Caches {
    pub values: ValueCache,
    pub hashes: HashCache,
    pub verify: bool,
    volatile: AtomicU64,
}

impl Caches {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            values: ValueCache::new(config.cache.memory_budget, config.shard_count()),
            hashes: HashCache::new(config.cache.hash_cache_entries, config.shard_count()),
            verify: config.evaluation.verify,
            volatile: AtomicU64::new(0),
        }
    }

    /// A hash no other request will ever produce.
    fn volatile_hash(&self) -> Hash {
        let serial = self.volatile.fetch_add(1, Ordering::Relaxed);
        let mut h = Hasher::new();
        h.append_str("volatile").append_u64(serial);
        h.finish()
    }
}

#[derive(Clone, Copy, Debug)]
pub(crate) struct Hashed {
    pub hash: Hash,
    /// False when anything upstream has [`CachePolicy::Uncached`]
    pub cacheable: bool,
}

pub(crate) struct Evaluation<'g> {
    state: &'g GraphState,
    caches: &'g Caches,
    memo: Mutex<HashMap<(PlugRef, Hash), Hashed>>,
    /// Values of non-cacheable hashes, kept for this request only.
    volatile_values: Mutex<HashMap<(PlugRef, Hash), Arc<Value>>>,
}

impl<'g> Evaluation<'g> {
    pub fn new(state: &'g GraphState, caches: &'g Caches) -> Self {
        Self {
            state,
            caches,
            memo: Mutex::new(HashMap::new()),
            volatile_values: Mutex::new(HashMap::new()),
        }
    }

    pub fn hash(&self, plug: PlugRef, context: &Context) -> Result<Hashed, GraphError> {
        context.check_cancellation()?;
        let source = self.state.source(plug);
        let state_plug = self.state.plug(source)?;

        if state_plug.is_compound() {
            let mut h = Hasher::new();
            h.append_str("compound");
            let mut cacheable = true;
            for &child in &state_plug.children {
                let child = PlugRef::new(source.node, child);
                let hashed = self.hash(child, context)?;
                h.append_str(leaf_name(&self.state.plug(child)?.name))
                    .append_hash(&hashed.hash);
                cacheable &= hashed.cacheable;
            }
            return Ok(Hashed {
                hash: h.finish(),
                cacheable,
            });
        }

        match state_plug.direction {
            PlugDirection::Input => {
                let mut h = Hasher::new();
                match state_plug.effective_value() {
                    Some(value) => value.hash_into(&mut h),
                    None => {
                        h.append_str("none");
                    }
                }
                Ok(Hashed {
                    hash: h.finish(),
                    cacheable: true,
                })
            }
            PlugDirection::Output => self.hash_computed(source, context),
        }
    }

    fn hash_computed(&self, plug: PlugRef, context: &Context) -> Result<Hashed, GraphError> {
        let entry = self.state.entry(plug.node)?;
        let state_plug = self.state.plug(plug)?;
        let memo_key = (plug, context.hash());

        let memoized = lock(&self.memo).get(&memo_key).copied();
        if let Some(hashed) = memoized {
            return Ok(hashed);
        }

        if entry.node.cache_policy(&state_plug.name) == CachePolicy::Uncached {
            let hashed = Hashed {
                hash: self.caches.volatile_hash(),
                cacheable: false,
            };
            lock(&self.memo).insert(memo_key, hashed);
            return Ok(hashed);
        }

        let key = HashKey {
            plug,
            context: memo_key.1,
            dirty_count: state_plug.dirty_count,
        };
        let previous = self.caches.hashes.get(&key);
        if let (Some(hash), false) = (previous, self.caches.verify) {
            let hashed = Hashed {
                hash,
                cacheable: true,
            };
            lock(&self.memo).insert(memo_key, hashed);
            return Ok(hashed);
        }

        let scope = EvalScope::new(self, plug, entry, context);
        let mut h = Hasher::new();
        h.append_str(entry.node.type_name())
            .append_str(&state_plug.name);
        entry.node.hash(&state_plug.name, &scope, &mut h)?;
        scope.verify_reads()?;
        let hashed = Hashed {
            hash: h.finish(),
            cacheable: scope.is_cacheable(),
        };

        if hashed.cacheable {
            if let Some(previous) = previous.filter(|previous| *previous != hashed.hash) {
                let message = format!(
                    "hash of {} changed from {:?} to {:?} without the plug being dirtied",
                    self.state.display_name(plug),
                    previous,
                    hashed.hash
                );
                error!("{}", message);
                return Err(GraphError::CacheInvariant(message));
            }
            self.caches.hashes.insert(key, hashed.hash);
        }
        lock(&self.memo).insert(memo_key, hashed);
        Ok(hashed)
    }

    pub fn value(&self, plug: PlugRef, context: &Context) -> Result<Arc<Value>, GraphError> {
        context.check_cancellation()?;
        let requested = self.state.plug(plug)?;
        let source = self.state.source(plug);
        let state_plug = self.state.plug(source)?;

        let value = if state_plug.is_compound() {
            let mut values = BTreeMap::new();
            for &child in &state_plug.children {
                let child = PlugRef::new(source.node, child);
                let value = self.value(child, context)?;
                values.insert(
                    leaf_name(&self.state.plug(child)?.name).to_string(),
                    Value::clone(&value),
                );
            }
            Arc::new(Value::Map(values))
        } else {
            match state_plug.direction {
                PlugDirection::Input => state_plug.effective_value().cloned().ok_or_else(|| {
                    GraphError::compute(self.state.display_name(source), "plug has no value")
                })?,
                PlugDirection::Output => self.value_computed(source, context)?,
            }
        };

        // Any-typed sources are only checked here, once the value is known.
        if !requested.value_type.accepts(value.value_type()) {
            return Err(GraphError::TypeMismatch {
                plug: self.state.display_name(plug),
                expected: requested.value_type,
                actual: value.value_type(),
            });
        }
        Ok(value)
    }

    fn value_computed(&self, plug: PlugRef, context: &Context) -> Result<Arc<Value>, GraphError> {
        let hashed = self.hash(plug, context)?;
        if !hashed.cacheable {
            return self.volatile_value(plug, hashed.hash, context);
        }

        if self.caches.verify {
            if let Some(cached) = self.caches.values.get(&hashed.hash) {
                let fresh = self.compute(plug, context)?;
                if *cached != fresh {
                    let message = format!(
                        "cached value of {} for {:?} is {} but recomputing gives {}",
                        self.state.display_name(plug),
                        hashed.hash,
                        cached,
                        fresh
                    );
                    error!("{}", message);
                    return Err(GraphError::CacheInvariant(message));
                }
                return Ok(cached);
            }
        }

        self.caches
            .values
            .get_or_compute(hashed.hash, || self.compute(plug, context))
    }

    /// Computes a non-cacheable value at most once per request, so every
    /// read of the same hash within the request sees the same value.
    fn volatile_value(
        &self,
        plug: PlugRef,
        hash: Hash,
        context: &Context,
    ) -> Result<Arc<Value>, GraphError> {
        let key = (plug, hash);
        if let Some(value) = lock(&self.volatile_values).get(&key) {
            return Ok(Arc::clone(value));
        }
        let value = Arc::new(self.compute(plug, context)?);
        let stored = Arc::clone(lock(&self.volatile_values).entry(key).or_insert(value));
        Ok(stored)
    }

    fn compute(&self, plug: PlugRef, context: &Context) -> Result<Value, GraphError> {
        let entry = self.state.entry(plug.node)?;
        let state_plug = self.state.plug(plug)?;
        let _timer = ScopedTimer::lazy(Level::Trace, || {
            format!("Compute {}.{}", entry.name, state_plug.name)
        });

        let scope = EvalScope::new(self, plug, entry, context);
        let value = entry.node.compute(&state_plug.name, &scope)?;
        // A result produced after cancellation may be partial.
        context.check_cancellation()?;

        if !state_plug.value_type.accepts(value.value_type()) {
            return Err(GraphError::TypeMismatch {
                plug: self.state.display_name(plug),
                expected: state_plug.value_type,
                actual: value.value_type(),
            });
        }
        scope.verify_reads()?;
        Ok(value)
    }
}

/// What a node sees while hashing or computing one of its outputs.
pub struct EvalScope<'a> {
    eval: &'a Evaluation<'a>,
    plug: PlugRef,
    entry: &'a NodeEntry,
    context: &'a Context,
    cacheable: AtomicBool,
    /// Plug indices read so far; only tracked when verifying.
    reads: Option<Mutex<Vec<usize>>>,
}

impl<'a> EvalScope<'a> {
    fn new(eval: &'a Evaluation<'a>, plug: PlugRef, entry: &'a NodeEntry, context: &'a Context) -> Self {
        Self {
            eval,
            plug,
            entry,
            context,
            cacheable: AtomicBool::new(true),
            reads: eval.caches.verify.then(|| Mutex::new(Vec::new())),
        }
    }

    pub fn context(&self) -> &Context {
        self.context
    }

    /// Name of the output being hashed or computed.
    pub fn output(&self) -> &str {
        &self.entry.plugs[self.plug.index].name
    }

    pub fn node_name(&self) -> &str {
        &self.entry.name
    }

    fn resolve(&self, name: &str) -> Result<PlugRef, GraphError> {
        let index = self
            .entry
            .index(name)
            .ok_or_else(|| GraphError::PlugNotFound(format!("{}.{}", self.entry.name, name)))?;
        if let Some(reads) = &self.reads {
            lock(reads).push(index);
        }
        Ok(PlugRef::new(self.plug.node, index))
    }

    /// Value of one of this node's plugs in the current context.
    pub fn input(&self, name: &str) -> Result<Arc<Value>, GraphError> {
        self.input_in(name, self.context)
    }

    /// Value of one of this node's plugs in another context.
    pub fn input_in(&self, name: &str, context: &Context) -> Result<Arc<Value>, GraphError> {
        let plug = self.resolve(name)?;
        self.eval.value(plug, context)
    }

    pub fn number(&self, name: &str) -> Result<f64, GraphError> {
        let value = self.input(name)?;
        value.as_number().ok_or_else(|| self.mismatch(name, ValueType::Number, &value))
    }

    pub fn integer(&self, name: &str) -> Result<i64, GraphError> {
        let value = self.input(name)?;
        value.as_integer().ok_or_else(|| self.mismatch(name, ValueType::Integer, &value))
    }

    pub fn string(&self, name: &str) -> Result<String, GraphError> {
        let value = self.input(name)?;
        value
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| self.mismatch(name, ValueType::String, &value))
    }

    pub fn boolean(&self, name: &str) -> Result<bool, GraphError> {
        let value = self.input(name)?;
        value.as_bool().ok_or_else(|| self.mismatch(name, ValueType::Boolean, &value))
    }

    fn mismatch(&self, name: &str, expected: ValueType, value: &Value) -> GraphError {
        GraphError::TypeMismatch {
            plug: format!("{}.{}", self.entry.name, name),
            expected,
            actual: value.value_type(),
        }
    }

    pub fn input_hash(&self, name: &str) -> Result<Hash, GraphError> {
        self.input_hash_in(name, self.context)
    }

    pub fn input_hash_in(&self, name: &str, context: &Context) -> Result<Hash, GraphError> {
        let plug = self.resolve(name)?;
        let hashed = self.eval.hash(plug, context)?;
        if !hashed.cacheable {
            self.mark_uncacheable();
        }
        Ok(hashed.hash)
    }

    /// Appends a plug's name and hash.
    pub fn append_input(&self, h: &mut Hasher, name: &str) -> Result<(), GraphError> {
        let hash = self.input_hash(name)?;
        h.append_str(name).append_hash(&hash);
        Ok(())
    }

    pub fn append_input_in(&self, h: &mut Hasher, name: &str, context: &Context) -> Result<(), GraphError> {
        let hash = self.input_hash_in(name, context)?;
        h.append_str(name).append_hash(&hash);
        Ok(())
    }

    /// Appends the current values of the given context keys.
    pub fn append_context(&self, h: &mut Hasher, keys: &[&str]) {
        self.context.append_keys(h, keys);
    }

    pub fn check_cancellation(&self) -> Result<(), GraphError> {
        self.context.check_cancellation()
    }

    /// A compute error attributed to the current output.
    pub fn error(&self, message: impl Into<String>) -> GraphError {
        GraphError::compute(format!("{}.{}", self.entry.name, self.output()), message)
    }

    pub fn unknown_output(&self) -> GraphError {
        GraphError::PlugNotFound(format!(
            "{} ({}) has no computed output '{}'",
            self.entry.name,
            self.entry.node.type_name(),
            self.output()
        ))
    }

    /// Keeps the hash being built out of every cache.
    pub fn mark_uncacheable(&self) {
        self.cacheable.store(false, Ordering::Relaxed);
    }

    pub fn is_cacheable(&self) -> bool {
        self.cacheable.load(Ordering::Relaxed)
    }

    /// Checks that every plug read so far is declared to affect the output.
    fn verify_reads(&self) -> Result<(), GraphError> {
        let Some(reads) = &self.reads else {
            return Ok(());
        };
        for &read in lock(reads).iter() {
            if read == self.plug.index {
                continue;
            }
            if !dirty::affects_closure(self.entry, read).contains(&self.plug.index) {
                let message = format!(
                    "{} ({}) read {} while evaluating {}, but affects() does not relate them",
                    self.entry.name,
                    self.entry.node.type_name(),
                    self.entry.plugs[read].name,
                    self.output()
                );
                error!("{}", message);
                return Err(GraphError::CacheInvariant(message));
            }
        }
        Ok(())
    }
}
