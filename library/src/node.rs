//! The node contract.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::GraphError;
use crate::eval::EvalScope;
use crate::hash::Hasher;
use crate::plug::PlugDefinition;
use crate::value::Value;

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub Uuid);

impl NodeId {
    pub fn new() -> Self {
        NodeId(Uuid::new_v4())
    }
}

impl Default for NodeId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// How results of an output may be reused.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum CachePolicy {
    /// Hash by content, store values in the value cache.
    #[default]
    Standard,
    /// The output is not a function of its hash (random, clock, external
    /// state). Every request recomputes it, and every hash downstream of it is
    /// treated as uncacheable too.
    Uncached,
}

/// A node type.
///
/// The graph owns one boxed instance per node. Implementations describe
/// their plugs, which outputs each input influences, how to hash an output
/// without computing it, and how to compute it.
///
/// `hash` must append everything `compute` reads: the hashes of the plugs
/// it reads (through [`EvalScope::append_input`]), the context keys it
/// depends on, and any parameter state held on `self`. The engine already
/// seeds the hasher with [`Node::type_name`] and the output name.
pub trait Node: Send + Sync {
    fn type_name(&self) -> &'static str;

    fn plugs(&self) -> Vec<PlugDefinition>;

    /// Outputs of this node influenced by `plug`. Called during dirty
    /// propagation; must not consult values.
    fn affects<'a>(&'a self, plug: &str) -> Vec<&'a str>;

    fn hash(&self, output: &str, scope: &EvalScope<'_>, h: &mut Hasher) -> Result<(), GraphError>;

    fn compute(&self, output: &str, scope: &EvalScope<'_>) -> Result<Value, GraphError>;

    fn cache_policy(&self, _output: &str) -> CachePolicy {
        CachePolicy::Standard
    }
}
