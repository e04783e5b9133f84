//! # Kairo - Node Graph Execution and Code Generation Engine
//!
//! **Kairo** is the execution core of a visual-scripting system: a directed
//! graph of typed flow and value nodes is either interpreted directly at
//! runtime with cooperative suspension, or compiled once into equivalent
//! procedural source text for the host's imperative language. Both
//! strategies share one graph model and keep their semantics identical -
//! branches, switches, loops, exception handling, scoped resources,
//! coroutine suspension, and early-exit propagation behave the same whether
//! the graph is walked live or emitted as static code.
//!
//! ## Core Workflow
//!
//! The engine is format-agnostic. It operates on a canonical internal model
//! of a "graph definition." The primary workflow is:
//!
//! 1.  **Load Your Data**: Parse your custom graph format (editor JSON,
//!     asset files, etc.) into your own Rust structs.
//! 2.  **Convert to Kairo's Model**: Implement the `IntoGraph` trait for
//!     your structs to translate into Kairo's `GraphDefinition`.
//! 3.  **Build**: Use `GraphBuilder` to resolve the definition into the
//!     engine's closed node table. All kind dispatch and type checking
//!     happens once, here.
//! 4.  **Run or Emit**: Create an `Interpreter` and drive tasks through a
//!     `Scheduler`, or create a `CodeGenerator` and emit a source artifact.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use kairo::prelude::*;
//! use serde_json::json;
//!
//! fn main() -> Result<()> {
//!     // A one-node graph: set `x` to 5 when the flow runs.
//!     let definition = GraphDefinition {
//!         nodes: vec![NodeDefinition {
//!             id: "set-x".to_string(),
//!             kind: "setVariable".to_string(),
//!             name: None,
//!             properties: [
//!                 ("variable".to_string(), json!("x")),
//!                 ("value".to_string(), json!(5.0)),
//!             ]
//!             .into_iter()
//!             .collect(),
//!         }],
//!         edges: vec![],
//!         entries: vec![EntryDefinition {
//!             event: "enable".to_string(),
//!             node: "set-x".to_string(),
//!         }],
//!     };
//!
//!     let graph = GraphBuilder::new(definition).build()?;
//!
//!     // Interpret it against an in-memory host.
//!     let mut host = InMemoryHost::new();
//!     let interpreter = Interpreter::new(&graph);
//!     for entry in graph.entries_for(LifecycleEvent::Enable).collect::<Vec<_>>() {
//!         interpreter.run(entry, &mut host)?;
//!     }
//!     assert_eq!(host.variable("x"), Some(&Value::Number(5.0)));
//!
//!     // Or emit the equivalent source text once, ahead of runtime.
//!     let generator = CodeGenerator::new(&graph);
//!     let artifact = generator.generate(0)?;
//!     println!("{}", artifact.source);
//!
//!     Ok(())
//! }
//! ```

pub mod classify;
pub mod codegen;
pub mod error;
pub mod graph;
pub mod host;
pub mod interpreter;
pub mod prelude;
pub mod trace;
pub mod value;
