use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::Duration;

use nodegraph::config::EngineConfig;
use nodegraph::context::Context;
use nodegraph::error::GraphError;
use nodegraph::eval::EvalScope;
use nodegraph::graph::Graph;
use nodegraph::hash::Hasher;
use nodegraph::node::Node;
use nodegraph::nodes::{ContextVariable, Square};
use nodegraph::plug::{PlugDefinition, PlugId};
use nodegraph::value::{Value, ValueType};

/// Doubles `in` slowly, counting computes.
struct SlowDouble {
    computes: Arc<AtomicUsize>,
}

impl Node for SlowDouble {
    fn type_name(&self) -> &'static str {
        "SlowDouble"
    }

    fn plugs(&self) -> Vec<PlugDefinition> {
        vec![
            PlugDefinition::input("in", ValueType::Any).with_default(0.0),
            PlugDefinition::output("out", ValueType::Number),
        ]
    }

    fn affects<'a>(&'a self, plug: &str) -> Vec<&'a str> {
        match plug {
            "in" => vec!["out"],
            _ => Vec::new(),
        }
    }

    fn hash(&self, _output: &str, scope: &EvalScope<'_>, h: &mut Hasher) -> Result<(), GraphError> {
        scope.append_input(h, "in")
    }

    fn compute(&self, _output: &str, scope: &EvalScope<'_>) -> Result<Value, GraphError> {
        self.computes.fetch_add(1, Ordering::SeqCst);
        thread::sleep(Duration::from_millis(20));
        Ok(Value::from(scope.number("in")? * 2.0))
    }
}

fn slow_graph(config: EngineConfig) -> (Graph, Arc<AtomicUsize>, PlugId) {
    let graph = Graph::new(config);
    let computes = Arc::new(AtomicUsize::new(0));
    let frame = graph.add_node("frame", Box::new(ContextVariable)).unwrap();
    let double = graph
        .add_node("double", Box::new(SlowDouble { computes: Arc::clone(&computes) }))
        .unwrap();
    graph.set_value(&PlugId::new(frame, "name"), "frame").unwrap();
    graph
        .connect(&PlugId::new(frame, "out"), &PlugId::new(double, "in"))
        .unwrap();
    (graph, computes, PlugId::new(double, "out"))
}

#[test]
fn test_concurrent_requests_compute_once() {
    let (graph, computes, out) = slow_graph(EngineConfig::default());
    let threads = 8;
    let barrier = Barrier::new(threads);
    let context = Context::new().with("frame", 21.0);

    let results: Vec<f64> = thread::scope(|s| {
        let handles: Vec<_> = (0..threads)
            .map(|_| {
                s.spawn(|| {
                    barrier.wait();
                    graph.get_value(&out, &context).unwrap().as_number().unwrap()
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    assert!(results.iter().all(|v| *v == 42.0));
    assert_eq!(computes.load(Ordering::SeqCst), 1);
    // The leader also computed `frame.out` on the way.
    let stats = graph.cache_stats();
    assert_eq!(stats.computes, 2);
    assert_eq!(stats.hits + stats.waits, threads as u64 - 1);
}

#[test]
fn test_get_values_keeps_request_order() {
    let mut config = EngineConfig::default();
    config.evaluation.threads = 4;
    let (graph, computes, out) = slow_graph(config);

    let requests: Vec<(PlugId, Context)> = (0..40)
        .map(|i| (out.clone(), Context::new().with("frame", (i % 10) as f64)))
        .collect();
    let results = graph.get_values(&requests);

    for (i, result) in results.into_iter().enumerate() {
        assert_eq!(result.unwrap().as_number(), Some(((i % 10) * 2) as f64));
    }
    // One compute per distinct frame, however the requests interleave.
    assert_eq!(computes.load(Ordering::SeqCst), 10);
}

#[test]
fn test_edits_between_concurrent_reads() {
    let graph = Graph::default();
    let node = graph.add_node("square", Box::new(Square)).unwrap();
    let width = PlugId::new(node, "width");
    let area = PlugId::new(node, "area");

    thread::scope(|s| {
        s.spawn(|| {
            for w in 1..=50 {
                graph.set_value(&width, w as f64).unwrap();
            }
        });
        for _ in 0..4 {
            s.spawn(|| {
                for _ in 0..50 {
                    let value = graph.get_value(&area, &Context::new()).unwrap();
                    let root = value.as_number().unwrap().sqrt();
                    // Every read sees some width that was set, never a torn state.
                    assert_eq!(root, root.round());
                    assert!(root <= 50.0);
                }
            });
        }
    });

    assert_eq!(
        graph.get_value(&area, &Context::new()).unwrap().as_number(),
        Some(2500.0)
    );
}
