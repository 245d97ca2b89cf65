//! Plugs: the typed slots through which values flow between nodes.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::node::NodeId;
use crate::value::{Value, ValueType};

/// Direction of a plug.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum PlugDirection {
    Input,
    Output,
}

/// Declaration of a plug on a node type.
///
/// Compound plugs are declared with [`PlugDefinition::compound`]; their
/// children are addressed with dotted paths (`vector.x`).
#[derive(Clone, Debug)]
pub struct PlugDefinition {
    /// Name relative to the parent plug (or the node for top-level plugs)
    pub name: String,
    pub direction: PlugDirection,
    pub value_type: ValueType,
    /// Value used while nothing has been authored (input plugs only)
    pub default_value: Option<Value>,
    pub children: Vec<PlugDefinition>,
}

impl PlugDefinition {
    pub fn input(name: &str, value_type: ValueType) -> Self {
        Self {
            name: name.to_string(),
            direction: PlugDirection::Input,
            value_type,
            default_value: value_type.default_value(),
            children: Vec::new(),
        }
    }

    pub fn output(name: &str, value_type: ValueType) -> Self {
        Self {
            name: name.to_string(),
            direction: PlugDirection::Output,
            value_type,
            default_value: None,
            children: Vec::new(),
        }
    }

    /// A compound plug. Children inherit the parent's direction.
    pub fn compound(name: &str, direction: PlugDirection, children: Vec<PlugDefinition>) -> Self {
        Self {
            name: name.to_string(),
            direction,
            value_type: ValueType::Map,
            default_value: None,
            children: children
                .into_iter()
                .map(|child| child.with_direction(direction))
                .collect(),
        }
    }

    pub fn with_default(mut self, value: impl Into<Value>) -> Self {
        self.default_value = Some(value.into());
        self
    }

    fn with_direction(mut self, direction: PlugDirection) -> Self {
        self.direction = direction;
        if direction == PlugDirection::Output {
            self.default_value = None;
        }
        self.children = self
            .children
            .into_iter()
            .map(|child| child.with_direction(direction))
            .collect();
        self
    }
}

/// Public identity of a plug: owning node plus dotted name path.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, Hash)]
pub struct PlugId {
    pub node_id: NodeId,
    pub name: String,
}

impl PlugId {
    pub fn new(node_id: NodeId, name: &str) -> Self {
        Self {
            node_id,
            name: name.to_string(),
        }
    }

    /// Id of a child of this (compound) plug.
    pub fn child(&self, name: &str) -> Self {
        Self {
            node_id: self.node_id,
            name: format!("{}.{}", self.name, name),
        }
    }
}

impl fmt::Display for PlugId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.node_id, self.name)
    }
}

/// Internal plug address: node plus index into the node's plug table.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub(crate) struct PlugRef {
    pub node: NodeId,
    pub index: usize,
}

impl PlugRef {
    pub fn new(node: NodeId, index: usize) -> Self {
        Self { node, index }
    }
}

/// Runtime state of one plug in the graph.
#[derive(Debug)]
pub(crate) struct PlugState {
    /// Full dotted path
    pub name: String,
    pub direction: PlugDirection,
    pub value_type: ValueType,
    pub default_value: Option<Arc<Value>>,
    /// Authored value; `None` means the default applies
    pub value: Option<Arc<Value>>,
    pub input: Option<PlugRef>,
    pub parent: Option<usize>,
    pub children: Vec<usize>,
    /// Bumped every time the plug is dirtied
    pub dirty_count: u64,
}

impl PlugState {
    pub fn is_compound(&self) -> bool {
        !self.children.is_empty()
    }

    /// The value an unconnected input leaf currently holds.
    pub fn effective_value(&self) -> Option<&Arc<Value>> {
        self.value.as_ref().or(self.default_value.as_ref())
    }
}

/// Flattens a definition tree into plug states, parents before children.
pub(crate) fn flatten_definitions(
    definitions: &[PlugDefinition],
    parent: Option<usize>,
    prefix: &str,
    out: &mut Vec<PlugState>,
) {
    for definition in definitions {
        let name = if prefix.is_empty() {
            definition.name.clone()
        } else {
            format!("{}.{}", prefix, definition.name)
        };
        let index = out.len();
        out.push(PlugState {
            name: name.clone(),
            direction: definition.direction,
            value_type: definition.value_type,
            default_value: definition.default_value.clone().map(Arc::new),
            value: None,
            input: None,
            parent,
            children: Vec::new(),
            dirty_count: 0,
        });
        if let Some(parent) = parent {
            out[parent].children.push(index);
        }
        flatten_definitions(&definition.children, Some(index), &name, out);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flatten_compound() {
        let definitions = vec![
            PlugDefinition::compound(
                "vector",
                PlugDirection::Input,
                vec![
                    PlugDefinition::input("x", ValueType::Number),
                    PlugDefinition::input("y", ValueType::Number),
                ],
            ),
            PlugDefinition::output("length", ValueType::Number),
        ];
        let mut plugs = Vec::new();
        flatten_definitions(&definitions, None, "", &mut plugs);

        let names: Vec<&str> = plugs.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["vector", "vector.x", "vector.y", "length"]);
        assert_eq!(plugs[0].children, vec![1, 2]);
        assert_eq!(plugs[1].parent, Some(0));
        assert!(plugs[0].is_compound());
        assert!(!plugs[3].is_compound());
    }

    #[test]
    fn test_compound_children_follow_parent_direction() {
        let definition = PlugDefinition::compound(
            "out",
            PlugDirection::Output,
            vec![PlugDefinition::input("x", ValueType::Number)],
        );
        assert_eq!(definition.children[0].direction, PlugDirection::Output);
        assert!(definition.children[0].default_value.is_none());
    }
}
