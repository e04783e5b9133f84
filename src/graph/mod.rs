use crate::error::GraphError;
use crate::value::Value;
use std::fmt;

mod builder;
pub mod definition;
mod node;

pub use builder::GraphBuilder;
pub use node::{BinaryOp, CatchClause, Node, NodeKind, SwitchCase, UnaryOp};

/// Identifies a node in the graph arena.
pub type NodeId = u32;

/// An immutable handle wiring control and data between nodes.
///
/// Used both as a control edge (must resolve to a flow node; `Unassigned`
/// bodies are a no-op) and as a value reference (`Unassigned` where a value
/// is required is an error).
#[derive(Debug, Clone, PartialEq)]
pub enum FlowReference {
    Unassigned,
    NodeOutput(NodeId),
    Literal(Value),
    Member(String),
}

impl FlowReference {
    pub fn is_assigned(&self) -> bool {
        !matches!(self, FlowReference::Unassigned)
    }

    pub fn node(id: NodeId) -> Self {
        FlowReference::NodeOutput(id)
    }

    pub fn literal(value: Value) -> Self {
        FlowReference::Literal(value)
    }

    pub fn member(path: impl Into<String>) -> Self {
        FlowReference::Member(path.into())
    }
}

impl fmt::Display for FlowReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FlowReference::Unassigned => write!(f, "<unassigned>"),
            FlowReference::NodeOutput(id) => write!(f, "#{}", id),
            FlowReference::Literal(v) => write!(f, "{}", v),
            FlowReference::Member(path) => write!(f, "${}", path),
        }
    }
}

/// Host lifecycle hook points the engine can register flow entries against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LifecycleEvent {
    Enable,
    Disable,
    Destroy,
}

impl LifecycleEvent {
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "enable" => Some(LifecycleEvent::Enable),
            "disable" => Some(LifecycleEvent::Disable),
            "destroy" => Some(LifecycleEvent::Destroy),
            _ => None,
        }
    }
}

/// The arena owning every node of one logic graph.
///
/// All node-to-node references are ids into this arena; nodes never hold
/// owner back-references.
#[derive(Debug, Clone, Default)]
pub struct Graph {
    nodes: Vec<Node>,
    entries: Vec<(LifecycleEvent, NodeId)>,
}

impl Graph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a node to the arena and returns its id.
    pub fn add_node(&mut self, name: impl Into<String>, kind: NodeKind) -> NodeId {
        let id = self.nodes.len() as NodeId;
        self.nodes.push(Node {
            id,
            name: name.into(),
            kind,
        });
        id
    }

    pub fn node(&self, id: NodeId) -> Result<&Node, GraphError> {
        self.nodes
            .get(id as usize)
            .ok_or_else(|| GraphError::NodeNotFound {
                missing_node_id: id.to_string(),
                source_node_id: "N/A".to_string(),
            })
    }

    /// Registers a flow entry point for a lifecycle event. The target must
    /// be a flow node.
    pub fn add_entry(&mut self, event: LifecycleEvent, node: NodeId) -> Result<(), GraphError> {
        let target = self.node(node)?;
        if !target.kind.is_flow() {
            return Err(GraphError::InvalidEntry {
                event: format!("{:?}", event),
                node_id: node.to_string(),
            });
        }
        self.entries.push((event, node));
        Ok(())
    }

    pub fn entries_for(&self, event: LifecycleEvent) -> impl Iterator<Item = NodeId> + '_ {
        self.entries
            .iter()
            .filter(move |(e, _)| *e == event)
            .map(|(_, id)| *id)
    }

    pub fn entries(&self) -> &[(LifecycleEvent, NodeId)] {
        &self.entries
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}
