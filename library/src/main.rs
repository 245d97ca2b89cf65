use std::env;
use std::error::Error;
use std::fs;
use std::path::Path;

use log::info;
use nodegraph::util::timing::ScopedTimer;
use nodegraph::{Context, EngineConfig, Graph, NodeRegistry, PlugId};

const FRAMES: i64 = 8;

fn main() -> Result<(), Box<dyn Error>> {
    env_logger::init();

    let args: Vec<String> = env::args().collect();
    let config = match env::var("NODEGRAPH_CONFIG") {
        Ok(path) => EngineConfig::load(Path::new(&path))?,
        Err(_) => EngineConfig::load_or_default(),
    };

    // Optional JSON object of extra context variables, e.g. {"scale": 2.0}
    let base = match args.get(1) {
        Some(file_path) => {
            let json_str = fs::read_to_string(file_path)?;
            Context::from_json(serde_json::from_str(&json_str)?)?
        }
        None => Context::new(),
    };

    let registry = NodeRegistry::with_builtin_nodes();
    let graph = Graph::new(config);

    let frame = graph.create_node(&registry, "ContextVariable", "frame")?;
    let scale = graph.create_node(&registry, "ContextVariable", "scale")?;
    let multiply = graph.create_node(&registry, "Multiply", "scaled")?;
    let square = graph.create_node(&registry, "Square", "square")?;
    graph.edit(|edit| {
        edit.set_value(&PlugId::new(frame, "name"), "frame")?;
        edit.set_value(&PlugId::new(scale, "name"), "scale")?;
        edit.set_value(&PlugId::new(scale, "default"), 1.0)?;
        edit.connect(&PlugId::new(frame, "out"), &PlugId::new(multiply, "a"))?;
        edit.connect(&PlugId::new(scale, "out"), &PlugId::new(multiply, "b"))?;
        edit.connect(&PlugId::new(multiply, "result"), &PlugId::new(square, "width"))
    })?;

    let area = PlugId::new(square, "area");
    let requests: Vec<(PlugId, Context)> = (0..FRAMES)
        .map(|f| (area.clone(), base.with("frame", f as f64)))
        .collect();

    for pass in 1..=2 {
        let _timer = ScopedTimer::debug(format!("Evaluation pass {}", pass));
        for ((_, context), result) in requests.iter().zip(graph.get_values(&requests)) {
            let frame = context.get("frame")?;
            println!("pass {} frame {}: area = {}", pass, frame, result?);
        }
    }

    let stats = graph.cache_stats();
    info!("Cache stats: {:?}", stats);
    println!(
        "cache: {} hits, {} computes, {} waits, {} entries ({} bytes)",
        stats.hits, stats.computes, stats.waits, stats.entries, stats.cost
    );
    Ok(())
}
