use crate::graph::NodeId;
use crate::value::{Exception, Value};
use thiserror::Error;

/// Errors that can occur while resolving a `GraphDefinition` into a `Graph`.
#[derive(Error, Debug, Clone)]
pub enum GraphError {
    #[error("Failed to parse graph JSON: {0}")]
    JsonParse(String),

    #[error(
        "Node '{missing_node_id}' not found, which is required by a connection from node '{source_node_id}'"
    )]
    NodeNotFound {
        missing_node_id: String,
        source_node_id: String,
    },

    #[error("Node '{node_id}' has an unregistered or invalid kind: '{kind_name}'")]
    UnknownKind { node_id: String, kind_name: String },

    #[error("A connection to node '{node_id}' on socket '{socket}' is invalid: {message}")]
    Connection {
        node_id: String,
        socket: String,
        message: String,
    },

    #[error("Node '{node_id}' socket '{socket}': expected {expected}, but found value '{found}'")]
    TypeMismatch {
        node_id: String,
        socket: String,
        expected: &'static str,
        found: Value,
    },

    #[error("Entry point '{event}' references node '{node_id}', which is not a flow node")]
    InvalidEntry { event: String, node_id: String },
}

/// Errors that can occur while interpreting a graph.
///
/// Thrown exceptions travel separately (they are catchable by Try nodes);
/// everything here aborts the task.
#[derive(Error, Debug, Clone)]
pub enum RuntimeError {
    #[error("Node {node} requires a connection on socket '{socket}', but none was assigned")]
    UnassignedInput { node: NodeId, socket: &'static str },

    #[error(
        "Type mismatch at node {node} during '{operation}': expected {expected}, but found value '{found}'"
    )]
    TypeMismatch {
        node: NodeId,
        operation: String,
        expected: &'static str,
        found: Value,
    },

    #[error("Node {node} was activated while already running")]
    DoubleActivation { node: NodeId },

    #[error("Unsupported operation at node {node}: {message}")]
    UnsupportedOperation { node: NodeId, message: String },

    #[error("Input '{path}' referenced by node {node} was not found in the host context")]
    InputNotFound { node: NodeId, path: String },

    #[error("Node {node} raised an unhandled exception: {exception}")]
    Host { node: NodeId, exception: Exception },
}

/// Errors that abort a code-generation pass.
///
/// The generator never recovers; no partial source text is ever returned.
#[derive(Error, Debug, Clone)]
pub enum CodegenError {
    #[error("Node {node} requires a connection on socket '{socket}', but none was assigned")]
    UnassignedInput { node: NodeId, socket: &'static str },

    #[error("Type mismatch at node {node}: {message}")]
    TypeMismatch { node: NodeId, message: String },

    #[error("Node {node} cannot be emitted: {message}")]
    UnsupportedNode { node: NodeId, message: String },

    #[error("Generated artifact could not be serialized: {0}")]
    Artifact(String),
}

/// Errors that can occur when converting a custom user format into a
/// kairo `GraphDefinition`.
#[derive(Error, Debug, Clone)]
pub enum ConversionError {
    #[error("Invalid custom data: {0}")]
    Validation(String),
}
