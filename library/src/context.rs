//! Evaluation contexts.
//!
//! A [`Context`] is an immutable snapshot of named variables (current frame,
//! current scene path, ...) under which plugs are evaluated. Cloning is cheap;
//! `set` on a shared snapshot copies it first, so readers holding the old
//! snapshot are never affected.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};

use crate::error::GraphError;
use crate::hash::{Hash, Hasher};
use crate::value::Value;

/// Shared cooperative cancellation flag.
#[derive(Clone, Debug, Default)]
pub struct Canceller {
    cancelled: Arc<AtomicBool>,
}

impl Canceller {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }
}

#[derive(Clone, Debug, Default)]
struct ContextData {
    variables: BTreeMap<String, Value>,
    hash: OnceLock<Hash>,
}

#[derive(Clone, Debug, Default)]
pub struct Context {
    data: Arc<ContextData>,
    canceller: Option<Canceller>,
}

impl PartialEq for Context {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.data, &other.data) || self.data.variables == other.data.variables
    }
}

impl Eq for Context {}

impl Context {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        let data = Arc::make_mut(&mut self.data);
        data.variables.insert(key.into(), value.into());
        data.hash = OnceLock::new();
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        if !self.data.variables.contains_key(key) {
            return None;
        }
        let data = Arc::make_mut(&mut self.data);
        data.hash = OnceLock::new();
        data.variables.remove(key)
    }

    /// Returns a copy with `key` overridden, leaving `self` untouched.
    pub fn with(&self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        let mut scoped = self.clone();
        scoped.set(key, value);
        scoped
    }

    pub fn with_canceller(&self, canceller: Canceller) -> Self {
        Self {
            data: Arc::clone(&self.data),
            canceller: Some(canceller),
        }
    }

    pub fn get(&self, key: &str) -> Result<&Value, GraphError> {
        self.data
            .variables
            .get(key)
            .ok_or_else(|| GraphError::MissingContextVariable(key.to_string()))
    }

    pub fn get_or<'a>(&'a self, key: &str, default: &'a Value) -> &'a Value {
        self.data.variables.get(key).unwrap_or(default)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.data.variables.contains_key(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.data.variables.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.data.variables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.variables.is_empty()
    }

    /// Hash of the given keys only. Keys are deduplicated and sorted, absent
    /// keys contribute an explicit marker.
    pub fn hash_keys(&self, keys: &[&str]) -> Hash {
        let mut sorted: Vec<&str> = keys.to_vec();
        sorted.sort_unstable();
        sorted.dedup();
        let mut h = Hasher::new();
        self.append_keys(&mut h, &sorted);
        h.finish()
    }

    /// Appends the given keys (in the order given) to an existing hash.
    pub fn append_keys(&self, h: &mut Hasher, keys: &[&str]) {
        for key in keys {
            h.append_str(key);
            match self.data.variables.get(*key) {
                Some(value) => {
                    h.append_bool(true);
                    value.hash_into(h);
                }
                None => {
                    h.append_bool(false);
                }
            }
        }
    }

    /// Hash of every variable. Memoized per snapshot.
    pub fn hash(&self) -> Hash {
        *self.data.hash.get_or_init(|| {
            let mut h = Hasher::new();
            h.append_u64(self.data.variables.len() as u64);
            for (key, value) in &self.data.variables {
                h.append_str(key);
                value.hash_into(&mut h);
            }
            h.finish()
        })
    }

    pub fn canceller(&self) -> Option<&Canceller> {
        self.canceller.as_ref()
    }

    pub fn check_cancellation(&self) -> Result<(), GraphError> {
        match &self.canceller {
            Some(canceller) if canceller.is_cancelled() => Err(GraphError::Cancelled),
            _ => Ok(()),
        }
    }

    /// Builds a context from a JSON object of variables.
    pub fn from_json(json: serde_json::Value) -> Result<Self, GraphError> {
        let serde_json::Value::Object(object) = json else {
            return Err(GraphError::invalid_argument(
                "context JSON must be an object of variables",
            ));
        };
        let mut context = Context::new();
        for (key, value) in object {
            context.set(key, Value::from(value));
        }
        Ok(context)
    }

    /// The innermost context entered on this thread with [`ContextScope`], or an
    /// empty context.
    pub fn current() -> Context {
        CURRENT.with(|stack| stack.borrow().last().cloned().unwrap_or_default())
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Context {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut context = Context::new();
        for (key, value) in iter {
            context.set(key, value);
        }
        context
    }
}

thread_local! {
    static CURRENT: RefCell<Vec<Context>> = const { RefCell::new(Vec::new()) };
}

/// Makes a context current on this thread until dropped.
///
/// Scopes nest; dropping restores the enclosing context, including when the
/// scope is left through `?` or a panic.
#[must_use = "the context is only current while the scope is alive"]
pub struct ContextScope {
    depth: usize,
}

impl ContextScope {
    pub fn enter(context: Context) -> Self {
        let depth = CURRENT.with(|stack| {
            let mut stack = stack.borrow_mut();
            stack.push(context);
            stack.len()
        });
        Self { depth }
    }

    /// Enters a copy of the current context with `key` overridden.
    pub fn with(key: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::enter(Context::current().with(key, value))
    }
}

impl Drop for ContextScope {
    fn drop(&mut self) {
        CURRENT.with(|stack| {
            let mut stack = stack.borrow_mut();
            debug_assert_eq!(stack.len(), self.depth, "context scopes dropped out of order");
            stack.truncate(self.depth - 1);
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_on_shared_snapshot_copies() {
        let mut a = Context::new();
        a.set("frame", 1.0);
        let b = a.clone();
        a.set("frame", 2.0);
        assert_eq!(b.get("frame").unwrap(), &Value::from(1.0));
        assert_eq!(a.get("frame").unwrap(), &Value::from(2.0));
    }

    #[test]
    fn test_missing_variable() {
        let context = Context::new();
        assert_eq!(
            context.get("frame"),
            Err(GraphError::MissingContextVariable("frame".to_string()))
        );
        let fallback = Value::from(24.0);
        assert_eq!(context.get_or("frame", &fallback), &fallback);
    }

    #[test]
    fn test_hash_keys_ignores_undeclared_variables() {
        let a: Context = [("frame", Value::from(1.0)), ("path", Value::path("/a"))]
            .into_iter()
            .collect();
        let b = a.with("path", Value::path("/b"));
        assert_eq!(a.hash_keys(&["frame"]), b.hash_keys(&["frame"]));
        assert_ne!(a.hash_keys(&["frame", "path"]), b.hash_keys(&["frame", "path"]));
        assert_ne!(a.hash(), b.hash());
    }

    #[test]
    fn test_hash_keys_distinguishes_absent_from_present() {
        let empty = Context::new();
        let set = empty.with("frame", 0.0);
        assert_ne!(empty.hash_keys(&["frame"]), set.hash_keys(&["frame"]));
    }

    #[test]
    fn test_equality_ignores_canceller() {
        let a = Context::new().with("frame", 1.0);
        let b = a.with_canceller(Canceller::new());
        assert_eq!(a, b);
        assert_eq!(a.hash(), b.hash());
    }

    #[test]
    fn test_hash_is_recomputed_after_set() {
        let mut context = Context::new().with("frame", 1.0);
        let before = context.hash();
        context.set("frame", 2.0);
        assert_ne!(before, context.hash());
    }

    #[test]
    fn test_cancellation() {
        let canceller = Canceller::new();
        let context = Context::new().with_canceller(canceller.clone());
        assert!(context.check_cancellation().is_ok());
        canceller.cancel();
        assert_eq!(context.check_cancellation(), Err(GraphError::Cancelled));
    }

    #[test]
    fn test_scopes_nest_and_unwind() {
        assert!(Context::current().is_empty());
        {
            let _outer = ContextScope::enter(Context::new().with("frame", 1.0));
            {
                let _inner = ContextScope::with("frame", 2.0);
                assert_eq!(Context::current().get("frame").unwrap(), &Value::from(2.0));
            }
            assert_eq!(Context::current().get("frame").unwrap(), &Value::from(1.0));
        }
        assert!(Context::current().is_empty());
    }

    #[test]
    fn test_scope_unwinds_on_error_path() {
        fn failing() -> Result<(), GraphError> {
            let _scope = ContextScope::with("frame", 5.0);
            Context::current().get("missing")?;
            Ok(())
        }
        assert!(failing().is_err());
        assert!(Context::current().is_empty());
    }

    #[test]
    fn test_from_json() {
        let context = Context::from_json(serde_json::json!({"frame": 10, "path": "/world"})).unwrap();
        assert_eq!(context.get("frame").unwrap(), &Value::Integer(10));
        assert_eq!(context.get("path").unwrap(), &Value::path("/world"));
        assert!(Context::from_json(serde_json::json!([1, 2])).is_err());
    }
}
