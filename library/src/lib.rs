//! Dependency-graph evaluation with content-hash caching.
//!
//! Nodes expose typed plugs. Connecting an output plug to an input plug
//! makes the input read its value from upstream. Values are requested per
//! [`Context`]: every computed output is first hashed (cheaply, from its
//! inputs' hashes and the context variables it uses), and the hash keys a
//! shared [`ValueCache`], so identical work is done once no matter which
//! plug or context asks for it.
//!
//! ```no_run
//! use nodegraph::{Context, Graph, NodeRegistry, PlugId};
//!
//! let registry = NodeRegistry::with_builtin_nodes();
//! let graph = Graph::default();
//! let square = graph.create_node(&registry, "Square", "square").unwrap();
//! graph.set_value(&PlugId::new(square, "width"), 4.0).unwrap();
//! let area = graph.get_value(&PlugId::new(square, "area"), &Context::new()).unwrap();
//! assert_eq!(area.as_number(), Some(16.0));
//! ```

pub mod cache;
pub mod config;
pub mod context;
mod dirty;
pub mod error;
pub mod eval;
pub mod graph;
pub mod hash;
pub mod node;
pub mod nodes;
pub mod plug;
pub mod registry;
pub mod signal;
pub mod util;
pub mod value;

pub use cache::{CacheStats, ValueCache};
pub use config::EngineConfig;
pub use context::{Canceller, Context, ContextScope};
pub use error::{ConfigError, GraphError};
pub use eval::EvalScope;
pub use graph::{Edit, Graph};
pub use hash::{Hash, Hasher};
pub use node::{CachePolicy, Node, NodeId};
pub use plug::{PlugDefinition, PlugDirection, PlugId};
pub use registry::{NodePlugin, NodeRegistry};
pub use signal::{PlugEvent, SubscriptionId};
pub use value::{Value, ValueType};
