//! The interpreter backend.
//!
//! Walks the graph at runtime as an explicit frame-stack machine: each
//! active node owns one frame, jump signals unwind through frames to their
//! nearest consumer, and suspension points hand control back to a
//! cooperative [`Scheduler`]. The same construct semantics are emitted as
//! static source text by the code-generator backend.

use crate::classify::CoroutineClassifier;
use crate::error::{GraphError, RuntimeError};
use crate::graph::{FlowReference, Graph, NodeId, NodeKind};
use crate::host::Host;
use crate::value::Value;
use ahash::AHashSet;

pub mod scheduler;
mod task;

pub use scheduler::{Scheduler, TaskHandle};
pub use task::Task;

/// Lifecycle of one node within one activation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    NotStarted,
    Running,
    Success,
    Failure,
}

/// A propagating control value unwinding through nested constructs.
///
/// Loops consume `Continue` and `Break`; flow-entry boundaries consume
/// `Return`. Every other construct forwards the signal unchanged after its
/// own scoped cleanup.
#[derive(Debug, Clone, PartialEq)]
pub enum JumpSignal {
    Continue,
    Break,
    Return(Option<Value>),
}

/// How a node (or a nested body) finished.
#[derive(Debug, Clone, PartialEq)]
pub enum Completion {
    Normal,
    Jump(JumpSignal),
    /// A thrown exception, carrying the node that raised it.
    Raised {
        exception: crate::value::Exception,
        origin: NodeId,
    },
}

/// A designated suspension point handed to the scheduler.
#[derive(Debug, Clone, PartialEq)]
pub enum Suspension {
    /// Yield-Return: a value produced for the host, resumed next tick.
    Yield(Value),
    /// Host-timed wait in seconds.
    Wait(f64),
    /// Iteration boundary of a coroutine-classified loop body.
    Tick,
}

/// Result of stepping a task once.
#[derive(Debug, Clone, PartialEq)]
pub enum TaskStatus {
    Suspended(Suspension),
    Done(Option<Value>),
}

/// The interpreter backend for one graph.
///
/// Spawning a task classifies the entry's subgraph so loops with
/// suspendable bodies yield at iteration boundaries instead of
/// busy-looping.
pub struct Interpreter<'g> {
    graph: &'g Graph,
}

impl<'g> Interpreter<'g> {
    pub fn new(graph: &'g Graph) -> Self {
        Self { graph }
    }

    pub fn graph(&self) -> &'g Graph {
        self.graph
    }

    /// Creates a task for an entry node without running it.
    pub fn spawn(&self, entry: NodeId) -> Result<Task<'g>, GraphError> {
        let node = self.graph.node(entry)?;
        if !node.kind.is_flow() {
            return Err(GraphError::InvalidEntry {
                event: "spawn".to_string(),
                node_id: entry.to_string(),
            });
        }

        let mut classifier = CoroutineClassifier::new(self.graph);
        let mut tick_loops: AHashSet<NodeId> = AHashSet::new();
        for id in self.reachable_from(entry)? {
            let kind = &self.graph.node(id)?.kind;
            let body = match kind {
                NodeKind::For { body, .. }
                | NodeKind::Foreach { body, .. }
                | NodeKind::While { body, .. }
                | NodeKind::DoWhile { body, .. } => body,
                _ => continue,
            };
            if let FlowReference::NodeOutput(body_id) = body {
                if classifier.requires_suspension(*body_id)? {
                    tick_loops.insert(id);
                }
            }
        }

        log::debug!(
            "Spawning task at node {} ({} tick-classified loops)",
            entry,
            tick_loops.len()
        );
        Ok(Task::new(self.graph, entry, tick_loops))
    }

    /// Runs an entry to completion, resuming every suspension immediately.
    ///
    /// Timing-faithful execution goes through a [`Scheduler`]; this is the
    /// synchronous convenience used when wall-clock waits do not matter.
    pub fn run(
        &self,
        entry: NodeId,
        host: &mut dyn Host,
    ) -> Result<Task<'g>, RuntimeError> {
        let mut task = self.spawn(entry).map_err(|e| RuntimeError::UnsupportedOperation {
            node: entry,
            message: e.to_string(),
        })?;
        task.run(host)?;
        Ok(task)
    }

    fn reachable_from(&self, entry: NodeId) -> Result<Vec<NodeId>, GraphError> {
        let mut seen: AHashSet<NodeId> = AHashSet::new();
        let mut stack = vec![entry];
        let mut order = Vec::new();
        while let Some(id) = stack.pop() {
            if !seen.insert(id) {
                continue;
            }
            order.push(id);
            for flow in self.graph.node(id)?.kind.nested_flows() {
                if let FlowReference::NodeOutput(child) = flow {
                    stack.push(*child);
                }
            }
        }
        Ok(order)
    }
}
