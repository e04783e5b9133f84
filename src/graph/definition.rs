//! The canonical, format-agnostic definition of a logic graph.
//!
//! Custom authoring formats (editor JSON, asset files) convert into these
//! structures via [`IntoGraph`]; the [`GraphBuilder`](super::GraphBuilder)
//! then resolves them into the engine's closed node table.

use crate::error::ConversionError;
use ahash::AHashMap;
use serde::{Deserialize, Serialize};

/// The complete definition of a logic graph, ready for resolution.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GraphDefinition {
    pub nodes: Vec<NodeDefinition>,
    pub edges: Vec<EdgeDefinition>,
    #[serde(default)]
    pub entries: Vec<EntryDefinition>,
}

/// Defines a single node. `kind` is the string-typed operation name that the
/// builder resolves into the closed `NodeKind` table; `properties` carries
/// kind-specific literals (case values, variable names, loop bounds).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeDefinition {
    pub id: String,
    pub kind: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub properties: AHashMap<String, serde_json::Value>,
}

/// Defines a connection between two node sockets.
///
/// For control edges, `source_handle` names the flow output on the source
/// node (`"body"`, `"true"`, `"next"`, ...) and `target` is the node it
/// activates. For value edges, `target_handle` names the input socket on the
/// consumer (`"condition"`, `"left"`, ...).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EdgeDefinition {
    pub source: String,
    pub source_handle: String,
    pub target: String,
    pub target_handle: String,
}

/// Registers a node as the flow entry for a host lifecycle event
/// (`"enable"`, `"disable"`, `"destroy"`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntryDefinition {
    pub event: String,
    pub node: String,
}

/// Conversion from a custom user format into kairo's canonical model.
pub trait IntoGraph {
    fn into_graph(self) -> Result<GraphDefinition, ConversionError>;
}

impl IntoGraph for GraphDefinition {
    fn into_graph(self) -> Result<GraphDefinition, ConversionError> {
        Ok(self)
    }
}
