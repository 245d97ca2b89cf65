//! Nodes that read or change the evaluation context.

use crate::context::Context;
use crate::error::GraphError;
use crate::eval::EvalScope;
use crate::hash::Hasher;
use crate::node::Node;
use crate::plug::PlugDefinition;
use crate::value::{Value, ValueType};

/// Outputs the context variable called `name`.
///
/// When the variable is missing, `out` is `default`, or a
/// `MissingContextVariable` error if `strict` is set.
pub struct ContextVariable;

impl Node for ContextVariable {
    fn type_name(&self) -> &'static str {
        "ContextVariable"
    }

    fn plugs(&self) -> Vec<PlugDefinition> {
        vec![
            PlugDefinition::input("name", ValueType::String),
            PlugDefinition::input("default", ValueType::Any).with_default(0.0),
            PlugDefinition::input("strict", ValueType::Boolean),
            PlugDefinition::output("out", ValueType::Any),
        ]
    }

    fn affects<'a>(&'a self, plug: &str) -> Vec<&'a str> {
        match plug {
            "name" | "default" | "strict" => vec!["out"],
            _ => Vec::new(),
        }
    }

    fn hash(&self, output: &str, scope: &EvalScope<'_>, h: &mut Hasher) -> Result<(), GraphError> {
        if output != "out" {
            return Err(scope.unknown_output());
        }
        scope.append_input(h, "name")?;
        scope.append_input(h, "default")?;
        scope.append_input(h, "strict")?;
        let name = scope.string("name")?;
        scope.append_context(h, &[name.as_str()]);
        Ok(())
    }

    fn compute(&self, output: &str, scope: &EvalScope<'_>) -> Result<Value, GraphError> {
        if output != "out" {
            return Err(scope.unknown_output());
        }
        let name = scope.string("name")?;
        if name.is_empty() {
            return Err(scope.error("no variable name set"));
        }
        match scope.context().get(&name) {
            Ok(value) => Ok(value.clone()),
            Err(err) => {
                if scope.boolean("strict")? {
                    return Err(err);
                }
                Ok(Value::clone(&*scope.input("default")?))
            }
        }
    }
}

/// Evaluates `in` with the context variable `variable` set to `value`.
pub struct ContextOverride;

impl ContextOverride {
    fn overridden(scope: &EvalScope<'_>) -> Result<Context, GraphError> {
        let variable = scope.string("variable")?;
        if variable.is_empty() {
            return Ok(scope.context().clone());
        }
        let value = scope.input("value")?;
        Ok(scope.context().with(variable, Value::clone(&value)))
    }
}

impl Node for ContextOverride {
    fn type_name(&self) -> &'static str {
        "ContextOverride"
    }

    fn plugs(&self) -> Vec<PlugDefinition> {
        vec![
            PlugDefinition::input("in", ValueType::Any),
            PlugDefinition::input("variable", ValueType::String),
            PlugDefinition::input("value", ValueType::Any).with_default(0.0),
            PlugDefinition::output("out", ValueType::Any),
        ]
    }

    fn affects<'a>(&'a self, plug: &str) -> Vec<&'a str> {
        match plug {
            "in" | "variable" | "value" => vec!["out"],
            _ => Vec::new(),
        }
    }

    fn hash(&self, output: &str, scope: &EvalScope<'_>, h: &mut Hasher) -> Result<(), GraphError> {
        if output != "out" {
            return Err(scope.unknown_output());
        }
        scope.append_input(h, "variable")?;
        scope.append_input(h, "value")?;
        let context = Self::overridden(scope)?;
        scope.append_input_in(h, "in", &context)
    }

    fn compute(&self, output: &str, scope: &EvalScope<'_>) -> Result<Value, GraphError> {
        if output != "out" {
            return Err(scope.unknown_output());
        }
        let context = Self::overridden(scope)?;
        Ok(Value::clone(&*scope.input_in("in", &context)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::Graph;
    use crate::plug::PlugId;

    fn variable(graph: &Graph, name: &str) -> (PlugId, PlugId) {
        let node = graph.add_node("var", Box::new(ContextVariable)).unwrap();
        graph.set_value(&PlugId::new(node, "name"), name).unwrap();
        (PlugId::new(node, "strict"), PlugId::new(node, "out"))
    }

    #[test]
    fn test_reads_variable_and_falls_back_to_default() {
        let graph = Graph::default();
        let (_, out) = variable(&graph, "frame");
        let context = Context::new().with("frame", 12i64);
        assert_eq!(*graph.get_value(&out, &context).unwrap(), Value::Integer(12));
        assert_eq!(graph.get_value(&out, &Context::new()).unwrap().as_number(), Some(0.0));
    }

    #[test]
    fn test_strict_missing_variable() {
        let graph = Graph::default();
        let (strict, out) = variable(&graph, "frame");
        graph.set_value(&strict, true).unwrap();
        assert_eq!(
            graph.get_value(&out, &Context::new()).unwrap_err(),
            GraphError::MissingContextVariable("frame".to_string())
        );
    }

    #[test]
    fn test_hash_depends_only_on_the_named_variable() {
        let graph = Graph::default();
        let (_, out) = variable(&graph, "frame");
        let base = Context::new().with("frame", 1i64);
        let unrelated = base.with("other", "x");
        let changed = base.with("frame", 2i64);
        assert_eq!(graph.hash(&out, &base).unwrap(), graph.hash(&out, &unrelated).unwrap());
        assert_ne!(graph.hash(&out, &base).unwrap(), graph.hash(&out, &changed).unwrap());
    }

    #[test]
    fn test_override_scopes_upstream_context() {
        let graph = Graph::default();
        let (_, var_out) = variable(&graph, "frame");
        let node = graph.add_node("override", Box::new(ContextOverride)).unwrap();
        graph.connect(&var_out, &PlugId::new(node, "in")).unwrap();
        graph.set_value(&PlugId::new(node, "variable"), "frame").unwrap();
        graph.set_value(&PlugId::new(node, "value"), 42i64).unwrap();

        let context = Context::new().with("frame", 1i64);
        let out = PlugId::new(node, "out");
        assert_eq!(*graph.get_value(&out, &context).unwrap(), Value::Integer(42));
        // The caller's context is left alone.
        assert_eq!(*graph.get_value(&var_out, &context).unwrap(), Value::Integer(1));
        // The override makes the result independent of the outer frame.
        assert_eq!(
            graph.hash(&out, &context).unwrap(),
            graph.hash(&out, &context.with("frame", 7i64)).unwrap()
        );
    }
}
