use crate::graph::NodeId;
use crate::interpreter::RunState;
use crate::value::Value;

/// One observable event of an interpreted run.
///
/// The ordered event sequence is the interpreter's observable behavior; it
/// is what the generated source must reproduce.
#[derive(Debug, Clone, PartialEq)]
pub enum ExecutionEvent {
    Activated { node: NodeId },
    Finished { node: NodeId, state: RunState },
    Suspended { node: NodeId },
    Resumed { node: NodeId },
    Yielded { node: NodeId, value: Value },
    VariableSet { name: String, value: Value },
    Cancelled { node: NodeId },
}

/// Formats execution event logs into human-readable run summaries.
pub struct TraceFormatter;

impl TraceFormatter {
    pub fn format_events(events: &[ExecutionEvent]) -> String {
        events
            .iter()
            .map(Self::format_event)
            .collect::<Vec<_>>()
            .join("\n")
    }

    fn format_event(event: &ExecutionEvent) -> String {
        match event {
            ExecutionEvent::Activated { node } => format!("activate #{}", node),
            ExecutionEvent::Finished { node, state } => {
                format!("finish   #{} ({:?})", node, state)
            }
            ExecutionEvent::Suspended { node } => format!("suspend  #{}", node),
            ExecutionEvent::Resumed { node } => format!("resume   #{}", node),
            ExecutionEvent::Yielded { node, value } => {
                format!("yield    #{} -> {}", node, value)
            }
            ExecutionEvent::VariableSet { name, value } => {
                format!("set      {} = {}", name, value)
            }
            ExecutionEvent::Cancelled { node } => format!("cancel   #{}", node),
        }
    }
}
