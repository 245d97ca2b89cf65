use crate::error::GraphError;
use crate::eval::EvalScope;
use crate::hash::Hasher;
use crate::node::Node;
use crate::plug::PlugDefinition;
use crate::value::{Value, ValueType};

/// `area = width * width`
pub struct Square;

impl Node for Square {
    fn type_name(&self) -> &'static str {
        "Square"
    }

    fn plugs(&self) -> Vec<PlugDefinition> {
        vec![
            PlugDefinition::input("width", ValueType::Number),
            PlugDefinition::output("area", ValueType::Number),
        ]
    }

    fn affects<'a>(&'a self, plug: &str) -> Vec<&'a str> {
        match plug {
            "width" => vec!["area"],
            _ => Vec::new(),
        }
    }

    fn hash(&self, output: &str, scope: &EvalScope<'_>, h: &mut Hasher) -> Result<(), GraphError> {
        match output {
            "area" => scope.append_input(h, "width"),
            _ => Err(scope.unknown_output()),
        }
    }

    fn compute(&self, output: &str, scope: &EvalScope<'_>) -> Result<Value, GraphError> {
        match output {
            "area" => {
                let width = scope.number("width")?;
                Ok(Value::from(width * width))
            }
            _ => Err(scope.unknown_output()),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Operation {
    Add,
    Subtract,
    Multiply,
    Divide,
}

impl Operation {
    pub const ALL: [Operation; 4] = [
        Operation::Add,
        Operation::Subtract,
        Operation::Multiply,
        Operation::Divide,
    ];

    /// Registry name of the node type performing this operation.
    pub fn name(self) -> &'static str {
        match self {
            Operation::Add => "Add",
            Operation::Subtract => "Subtract",
            Operation::Multiply => "Multiply",
            Operation::Divide => "Divide",
        }
    }
}

/// `result = a <op> b`. The operation is parameter state held on the node,
/// so it is part of the hash.
pub struct Arithmetic {
    operation: Operation,
}

impl Arithmetic {
    pub fn new(operation: Operation) -> Self {
        Self { operation }
    }

    pub fn operation(&self) -> Operation {
        self.operation
    }
}

impl Node for Arithmetic {
    fn type_name(&self) -> &'static str {
        "Arithmetic"
    }

    fn plugs(&self) -> Vec<PlugDefinition> {
        vec![
            PlugDefinition::input("a", ValueType::Number),
            PlugDefinition::input("b", ValueType::Number),
            PlugDefinition::output("result", ValueType::Number),
        ]
    }

    fn affects<'a>(&'a self, plug: &str) -> Vec<&'a str> {
        match plug {
            "a" | "b" => vec!["result"],
            _ => Vec::new(),
        }
    }

    fn hash(&self, output: &str, scope: &EvalScope<'_>, h: &mut Hasher) -> Result<(), GraphError> {
        if output != "result" {
            return Err(scope.unknown_output());
        }
        h.append_str(self.operation.name());
        scope.append_input(h, "a")?;
        scope.append_input(h, "b")
    }

    fn compute(&self, output: &str, scope: &EvalScope<'_>) -> Result<Value, GraphError> {
        if output != "result" {
            return Err(scope.unknown_output());
        }
        let a = scope.number("a")?;
        let b = scope.number("b")?;
        let result = match self.operation {
            Operation::Add => a + b,
            Operation::Subtract => a - b,
            Operation::Multiply => a * b,
            Operation::Divide => {
                if b == 0.0 {
                    return Err(scope.error("division by zero"));
                }
                a / b
            }
        };
        Ok(Value::from(result))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::Context;
    use crate::graph::Graph;
    use crate::plug::PlugId;

    fn arithmetic(graph: &Graph, operation: Operation, a: f64, b: f64) -> PlugId {
        let node = graph
            .add_node("op", Box::new(Arithmetic::new(operation)))
            .unwrap();
        graph.set_value(&PlugId::new(node, "a"), a).unwrap();
        graph.set_value(&PlugId::new(node, "b"), b).unwrap();
        PlugId::new(node, "result")
    }

    #[test]
    fn test_operations() {
        let graph = Graph::default();
        let context = Context::new();
        for (operation, expected) in [
            (Operation::Add, 8.0),
            (Operation::Subtract, 4.0),
            (Operation::Multiply, 12.0),
            (Operation::Divide, 3.0),
        ] {
            let result = arithmetic(&graph, operation, 6.0, 2.0);
            assert_eq!(
                graph.get_value(&result, &context).unwrap().as_number(),
                Some(expected),
                "{:?}",
                operation
            );
        }
    }

    #[test]
    fn test_operation_is_part_of_the_hash() {
        let graph = Graph::default();
        let context = Context::new();
        let add = arithmetic(&graph, Operation::Add, 1.0, 2.0);
        let multiply = arithmetic(&graph, Operation::Multiply, 1.0, 2.0);
        let add_again = arithmetic(&graph, Operation::Add, 1.0, 2.0);
        assert_ne!(
            graph.hash(&add, &context).unwrap(),
            graph.hash(&multiply, &context).unwrap()
        );
        assert_eq!(
            graph.hash(&add, &context).unwrap(),
            graph.hash(&add_again, &context).unwrap()
        );
    }

    #[test]
    fn test_divide_by_zero_is_a_compute_error() {
        let graph = Graph::default();
        let result = arithmetic(&graph, Operation::Divide, 1.0, 0.0);
        let err = graph.get_value(&result, &Context::new()).unwrap_err();
        assert!(matches!(err, GraphError::Compute { .. }));
    }
}
