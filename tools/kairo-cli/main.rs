use clap::{Parser, ValueEnum};
use kairo::prelude::*;
use serde::Deserialize;
use std::fs;
use std::time::Instant;

// --- JSON Deserialization Structs (Input Format Specific) ---
// These structs match the editor's graph.json export and are only used here
// for conversion into kairo's canonical model.

#[derive(Deserialize)]
struct RawGraph {
    nodes: Vec<RawNode>,
    edges: Vec<RawEdge>,
    #[serde(default)]
    entries: Vec<RawEntry>,
}

#[derive(Deserialize)]
struct RawNode {
    id: String,
    #[serde(alias = "nodeKind")]
    kind: String,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    properties: ahash::AHashMap<String, serde_json::Value>,
}

#[derive(Deserialize)]
struct RawEdge {
    source: String,
    #[serde(alias = "sourceHandle")]
    source_handle: String,
    target: String,
    #[serde(alias = "targetHandle")]
    target_handle: String,
}

#[derive(Deserialize)]
struct RawEntry {
    event: String,
    node: String,
}

// --- Converter Implementation ---

impl IntoGraph for RawGraph {
    fn into_graph(self) -> std::result::Result<GraphDefinition, ConversionError> {
        let nodes = self
            .nodes
            .into_iter()
            .map(|raw| NodeDefinition {
                id: raw.id,
                kind: raw.kind,
                name: raw.name,
                properties: raw.properties,
            })
            .collect();
        let edges = self
            .edges
            .into_iter()
            .map(|raw| EdgeDefinition {
                source: raw.source,
                source_handle: raw.source_handle,
                target: raw.target,
                target_handle: raw.target_handle,
            })
            .collect();
        let entries = self
            .entries
            .into_iter()
            .map(|raw| EntryDefinition {
                event: raw.event,
                node: raw.node,
            })
            .collect();
        Ok(GraphDefinition {
            nodes,
            edges,
            entries,
        })
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Mode {
    /// Interpret the graph and print the execution trace.
    Run,
    /// Generate source text for the graph.
    Emit,
}

/// A dual-backend execution and code generation engine CLI
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Cli {
    /// Path to the graph JSON file
    graph_path: String,

    /// Optional path to a JSON object of initial host variables
    variables_path: Option<String>,

    /// What to do with the graph
    #[arg(short, long, value_enum)]
    mode: Option<Mode>,

    /// Save the generated artifact to this path (emit mode)
    #[arg(short, long)]
    output: Option<String>,

    /// Maximum scheduler ticks before giving up (run mode)
    #[arg(long, default_value_t = 10_000)]
    max_ticks: u64,
}

fn main() {
    env_logger::init();
    let cli = Cli::parse();

    let total_start = Instant::now();

    // --- 1. File Loading and Conversion ---
    let load_start = Instant::now();
    let graph_json = fs::read_to_string(&cli.graph_path).unwrap_or_else(|e| {
        exit_with_error(&format!(
            "Failed to read graph file '{}': {}",
            &cli.graph_path, e
        ))
    });
    let raw_graph: RawGraph = serde_json::from_str(&graph_json)
        .unwrap_or_else(|e| exit_with_error(&format!("Failed to parse graph JSON: {}", e)));
    let definition = raw_graph
        .into_graph()
        .unwrap_or_else(|e| exit_with_error(&format!("Failed to convert graph: {}", e)));

    let mut host = InMemoryHost::new();
    if let Some(path) = &cli.variables_path {
        let json = fs::read_to_string(path).unwrap_or_else(|e| {
            exit_with_error(&format!("Failed to read variables file '{}': {}", path, e))
        });
        let variables: ahash::AHashMap<String, serde_json::Value> = serde_json::from_str(&json)
            .unwrap_or_else(|e| exit_with_error(&format!("Failed to parse variables JSON: {}", e)));
        for (name, value) in &variables {
            host.set_variable(name, Value::from_json(value));
        }
    }
    let load_duration = load_start.elapsed();

    // --- 2. Graph Resolution ---
    let build_start = Instant::now();
    let graph = GraphBuilder::new(definition)
        .build()
        .unwrap_or_else(|e| exit_with_error(&format!("Graph resolution failed: {}", e)));
    let build_duration = build_start.elapsed();
    println!(
        "Graph resolved: {} nodes, {} entry points in {:?}",
        graph.len(),
        graph.entries().len(),
        build_duration
    );

    let entries: Vec<_> = graph.entries_for(LifecycleEvent::Enable).collect();
    if entries.is_empty() {
        exit_with_error("The graph registers no 'enable' entry points.");
    }

    match cli.mode.unwrap_or(Mode::Run) {
        Mode::Run => run_graph(&graph, &entries, &mut host, cli.max_ticks),
        Mode::Emit => emit_graph(&graph, &entries, cli.output.as_deref()),
    }

    println!("\nTotal execution: {:?}", total_start.elapsed());
}

fn run_graph(graph: &Graph, entries: &[NodeId], host: &mut InMemoryHost, max_ticks: u64) {
    println!("\nInterpreting {} entry point(s)...", entries.len());
    let run_start = Instant::now();

    let interpreter = Interpreter::new(graph);
    let mut scheduler = Scheduler::new();
    let mut handles = Vec::new();
    for entry in entries {
        let task = interpreter
            .spawn(*entry)
            .unwrap_or_else(|e| exit_with_error(&format!("Failed to spawn task: {}", e)));
        handles.push(scheduler.spawn(task));
    }

    match scheduler.run_until_idle(host, max_ticks) {
        Some(ticks) => println!("Scheduler idle after {} tick(s) in {:?}", ticks, run_start.elapsed()),
        None => exit_with_error(&format!("Scheduler still busy after {} ticks", max_ticks)),
    }

    for handle in handles {
        if let Some(error) = scheduler.failure(handle) {
            exit_with_error(&format!("Task failed: {}", error));
        }
        if let Some(task) = scheduler.task(handle) {
            println!("\n--- Execution Trace ---");
            println!("{}", TraceFormatter::format_events(task.events()));
            if let Some(result) = task.result() {
                println!("--- Result: {} ---", result);
            }
        }
    }
}

fn emit_graph(graph: &Graph, entries: &[NodeId], output: Option<&str>) {
    println!("\nGenerating source for {} entry point(s)...", entries.len());
    let emit_start = Instant::now();

    let generator = CodeGenerator::new(graph);
    for entry in entries {
        let artifact = generator
            .generate(*entry)
            .unwrap_or_else(|e| exit_with_error(&format!("Generation failed: {}", e)));

        println!(
            "\n--- Routine '{}'{} ---",
            artifact.routine,
            if artifact.suspendable { " (suspendable)" } else { "" }
        );
        println!("{}", artifact.source);
        for helper in &artifact.helpers {
            println!("\n{}", helper);
        }
        println!(
            "\nDeclared variables: {}",
            artifact
                .variables
                .iter()
                .map(|v| v.name.as_str())
                .collect::<Vec<_>>()
                .join(", ")
        );

        if let Some(path) = output {
            artifact
                .save(path)
                .unwrap_or_else(|e| exit_with_error(&format!("Failed to save artifact: {}", e)));
            println!("Artifact saved to '{}'", path);
        }
    }
    println!("\nGeneration finished in {:?}", emit_start.elapsed());
}

fn exit_with_error(message: &str) -> ! {
    eprintln!("\nError: {}", message);
    std::process::exit(1);
}
