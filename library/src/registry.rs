//! Node type registry.
//!
//! Maps type names to constructors. A registry is an ordinary value: build it
//! (usually with [`NodeRegistry::with_builtin_nodes`]) before creating nodes,
//! hand it to [`Graph::create_node`](crate::graph::Graph::create_node), and
//! [`clear`](NodeRegistry::clear) it on shutdown to drop constructors that
//! came from plugins.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use log::{debug, warn};

use crate::error::GraphError;
use crate::node::Node;
use crate::util::sync::{read, write};

pub type NodeConstructor = Arc<dyn Fn() -> Box<dyn Node> + Send + Sync>;

/// A bundle of node types provided by another crate.
pub trait NodePlugin: Send + Sync {
    fn id(&self) -> &'static str;

    fn register(&self, registry: &NodeRegistry);
}

pub struct NodeRegistry {
    constructors: RwLock<HashMap<String, NodeConstructor>>,
}

impl Default for NodeRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl NodeRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self {
            constructors: RwLock::new(HashMap::new()),
        }
    }

    pub fn with_builtin_nodes() -> Self {
        let registry = Self::new();
        crate::nodes::register_builtin_nodes(&registry);
        registry
    }

    pub fn register<F>(&self, type_name: &str, constructor: F)
    where
        F: Fn() -> Box<dyn Node> + Send + Sync + 'static,
    {
        let previous = write(&self.constructors).insert(type_name.to_string(), Arc::new(constructor));
        if previous.is_some() {
            warn!("Node type '{}' registered twice; replacing", type_name);
        }
    }

    pub fn register_plugin(&self, plugin: &dyn NodePlugin) {
        debug!("Registering node plugin '{}'", plugin.id());
        plugin.register(self);
    }

    pub fn unregister(&self, type_name: &str) -> bool {
        write(&self.constructors).remove(type_name).is_some()
    }

    pub fn create(&self, type_name: &str) -> Result<Box<dyn Node>, GraphError> {
        // Clone the constructor out so the lock isn't held while it runs.
        let constructor = read(&self.constructors)
            .get(type_name)
            .cloned()
            .ok_or_else(|| GraphError::UnknownNodeType(type_name.to_string()))?;
        Ok(constructor())
    }

    pub fn contains(&self, type_name: &str) -> bool {
        read(&self.constructors).contains_key(type_name)
    }

    /// Registered type names, sorted.
    pub fn type_names(&self) -> Vec<String> {
        let mut names: Vec<String> = read(&self.constructors).keys().cloned().collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        read(&self.constructors).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        write(&self.constructors).clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nodes::math::Square;

    struct SquarePlugin;

    impl NodePlugin for SquarePlugin {
        fn id(&self) -> &'static str {
            "square_plugin"
        }

        fn register(&self, registry: &NodeRegistry) {
            registry.register("PluginSquare", || Box::new(Square));
        }
    }

    #[test]
    fn test_builtin_nodes_are_registered() {
        let registry = NodeRegistry::with_builtin_nodes();
        for name in ["Square", "Add", "Multiply", "ContextVariable", "ContextOverride", "Length"] {
            assert!(registry.contains(name), "missing {}", name);
        }
        assert_eq!(registry.create("Add").unwrap().type_name(), "Arithmetic");
    }

    #[test]
    fn test_unknown_type() {
        let registry = NodeRegistry::new();
        assert!(matches!(
            registry.create("Nope"),
            Err(GraphError::UnknownNodeType(name)) if name == "Nope"
        ));
    }

    #[test]
    fn test_plugin_registration_and_clear() {
        let registry = NodeRegistry::new();
        registry.register_plugin(&SquarePlugin);
        assert_eq!(registry.type_names(), vec!["PluginSquare".to_string()]);
        registry.clear();
        assert!(registry.is_empty());
    }
}
