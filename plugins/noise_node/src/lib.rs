use nodegraph::error::GraphError;
use nodegraph::eval::EvalScope;
use nodegraph::hash::Hasher;
use nodegraph::node::{CachePolicy, Node};
use nodegraph::plug::PlugDefinition;
use nodegraph::registry::{NodePlugin, NodeRegistry};
use nodegraph::value::{Value, ValueType};
use ordered_float::OrderedFloat;
use rand::Rng;

pub struct NoisePlugin;

impl NodePlugin for NoisePlugin {
    fn id(&self) -> &'static str {
        "noise_node_plugin"
    }

    fn register(&self, registry: &NodeRegistry) {
        registry.register("Noise", || Box::new(NoiseNode));
    }
}

/// Uniform noise in `[-amplitude, amplitude]`, drawn fresh on every request.
pub struct NoiseNode;

impl Node for NoiseNode {
    fn type_name(&self) -> &'static str {
        "Noise"
    }

    fn plugs(&self) -> Vec<PlugDefinition> {
        vec![
            PlugDefinition::input("amplitude", ValueType::Number).with_default(1.0),
            PlugDefinition::output("out", ValueType::Number),
        ]
    }

    fn affects<'a>(&'a self, plug: &str) -> Vec<&'a str> {
        match plug {
            "amplitude" => vec!["out"],
            _ => Vec::new(),
        }
    }

    fn hash(&self, output: &str, scope: &EvalScope<'_>, h: &mut Hasher) -> Result<(), GraphError> {
        // Never consulted for caching; kept meaningful for debugging.
        match output {
            "out" => scope.append_input(h, "amplitude"),
            _ => Err(scope.unknown_output()),
        }
    }

    fn compute(&self, output: &str, scope: &EvalScope<'_>) -> Result<Value, GraphError> {
        if output != "out" {
            return Err(scope.unknown_output());
        }
        let amplitude = scope.number("amplitude")?.abs();
        if amplitude == 0.0 {
            return Ok(Value::Number(OrderedFloat(0.0)));
        }
        let value = rand::thread_rng().gen_range(-amplitude..=amplitude);
        Ok(Value::Number(OrderedFloat(value)))
    }

    fn cache_policy(&self, _output: &str) -> CachePolicy {
        CachePolicy::Uncached
    }
}
