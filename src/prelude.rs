//! Prelude module for convenient imports
//!
//! Re-exports the most commonly used types from the kairo crate. Import
//! this module to get access to the core functionality without having to
//! import each type individually.
//!
//! # Example
//!
//! ```rust,no_run
//! use kairo::prelude::*;
//!
//! # fn run_example() -> Result<()> {
//! let json = std::fs::read_to_string("path/to/graph.json")?;
//! let graph = GraphBuilder::from_json(&json)?;
//!
//! let mut host = InMemoryHost::new();
//! let interpreter = Interpreter::new(&graph);
//! let mut scheduler = Scheduler::new();
//! scheduler.fire(&interpreter, LifecycleEvent::Enable)?;
//! scheduler.run_until_idle(&mut host, 1_000);
//! # Ok(())
//! # }
//! ```

// Graph model
pub use crate::graph::definition::{
    EdgeDefinition, EntryDefinition, GraphDefinition, IntoGraph, NodeDefinition,
};
pub use crate::graph::{
    BinaryOp, CatchClause, FlowReference, Graph, GraphBuilder, LifecycleEvent, Node, NodeId,
    NodeKind, SwitchCase, UnaryOp,
};

// Values and exceptions
pub use crate::value::{Exception, Value};

// Classification
pub use crate::classify::CoroutineClassifier;

// Interpretation
pub use crate::host::{Host, InMemoryHost};
pub use crate::interpreter::{
    Completion, Interpreter, JumpSignal, RunState, Scheduler, Suspension, Task, TaskHandle,
    TaskStatus,
};
pub use crate::trace::{ExecutionEvent, TraceFormatter};

// Code generation
pub use crate::codegen::{CodeGenerator, GeneratedSource, VariableBinding};

// Error types
pub use crate::error::{CodegenError, ConversionError, GraphError, RuntimeError};

// Result type alias for convenience
pub type Result<T> = std::result::Result<T, Box<dyn std::error::Error>>;
