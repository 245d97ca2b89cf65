//! Nodes with compound plugs.

use crate::error::GraphError;
use crate::eval::EvalScope;
use crate::hash::Hasher;
use crate::node::Node;
use crate::plug::{PlugDefinition, PlugDirection};
use crate::value::{Value, ValueType};

/// Euclidean length of the compound input `vector {x, y}`.
pub struct Length;

impl Node for Length {
    fn type_name(&self) -> &'static str {
        "Length"
    }

    fn plugs(&self) -> Vec<PlugDefinition> {
        vec![
            PlugDefinition::compound(
                "vector",
                PlugDirection::Input,
                vec![
                    PlugDefinition::input("x", ValueType::Number),
                    PlugDefinition::input("y", ValueType::Number),
                ],
            ),
            PlugDefinition::output("length", ValueType::Number),
        ]
    }

    fn affects<'a>(&'a self, plug: &str) -> Vec<&'a str> {
        // Children reach `length` through their parent.
        match plug {
            "vector" => vec!["length"],
            _ => Vec::new(),
        }
    }

    fn hash(&self, output: &str, scope: &EvalScope<'_>, h: &mut Hasher) -> Result<(), GraphError> {
        match output {
            "length" => scope.append_input(h, "vector"),
            _ => Err(scope.unknown_output()),
        }
    }

    fn compute(&self, output: &str, scope: &EvalScope<'_>) -> Result<Value, GraphError> {
        if output != "length" {
            return Err(scope.unknown_output());
        }
        let x = scope.number("vector.x")?;
        let y = scope.number("vector.y")?;
        Ok(Value::from(x.hypot(y)))
    }
}

/// Splits a `Vec2` into the compound output `components {x, y}`.
pub struct Decompose;

impl Node for Decompose {
    fn type_name(&self) -> &'static str {
        "Decompose"
    }

    fn plugs(&self) -> Vec<PlugDefinition> {
        vec![
            PlugDefinition::input("value", ValueType::Vec2),
            PlugDefinition::compound(
                "components",
                PlugDirection::Output,
                vec![
                    PlugDefinition::output("x", ValueType::Number),
                    PlugDefinition::output("y", ValueType::Number),
                ],
            ),
        ]
    }

    fn affects<'a>(&'a self, plug: &str) -> Vec<&'a str> {
        match plug {
            "value" => vec!["components"],
            _ => Vec::new(),
        }
    }

    fn hash(&self, output: &str, scope: &EvalScope<'_>, h: &mut Hasher) -> Result<(), GraphError> {
        match output {
            "components.x" | "components.y" => scope.append_input(h, "value"),
            _ => Err(scope.unknown_output()),
        }
    }

    fn compute(&self, output: &str, scope: &EvalScope<'_>) -> Result<Value, GraphError> {
        let value = scope.input("value")?;
        let Value::Vec2(vector) = *value else {
            return Err(scope.error(format!("expected vec2, got {}", value.value_type())));
        };
        match output {
            "components.x" => Ok(Value::from(vector.x.into_inner())),
            "components.y" => Ok(Value::from(vector.y.into_inner())),
            _ => Err(scope.unknown_output()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::Context;
    use crate::graph::Graph;
    use crate::plug::PlugId;
    use crate::value::Vec2;
    use std::collections::BTreeMap;

    #[test]
    fn test_length_of_compound_input() {
        let graph = Graph::default();
        let node = graph.add_node("length", Box::new(Length)).unwrap();
        let vector = PlugId::new(node, "vector");
        graph.set_value(&vector.child("x"), 3.0).unwrap();
        graph.set_value(&vector.child("y"), 4.0).unwrap();

        let length = PlugId::new(node, "length");
        assert_eq!(graph.get_value(&length, &Context::new()).unwrap().as_number(), Some(5.0));
    }

    #[test]
    fn test_decompose_feeds_length_through_compound_connection() {
        let graph = Graph::default();
        let decompose = graph.add_node("decompose", Box::new(Decompose)).unwrap();
        let length = graph.add_node("length", Box::new(Length)).unwrap();
        graph
            .set_value(&PlugId::new(decompose, "value"), Vec2::new(6.0, 8.0))
            .unwrap();
        graph
            .connect(&PlugId::new(decompose, "components"), &PlugId::new(length, "vector"))
            .unwrap();

        let context = Context::new();
        assert_eq!(
            graph.get_value(&PlugId::new(length, "length"), &context).unwrap().as_number(),
            Some(10.0)
        );
        let components = graph.get_value(&PlugId::new(decompose, "components"), &context).unwrap();
        let expected: BTreeMap<String, Value> = [
            ("x".to_string(), Value::from(6.0)),
            ("y".to_string(), Value::from(8.0)),
        ]
        .into_iter()
        .collect();
        assert_eq!(*components, Value::Map(expected));
    }
}
