use crate::error::CodegenError;
use crate::graph::NodeId;
use bincode::config::standard;
use bincode::serde::{decode_from_slice, encode_to_vec};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::{Read, Write};

/// A declared variable in the generated source, traced back to the node
/// that introduced it.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct VariableBinding {
    pub node: NodeId,
    pub name: String,
}

/// The sole artifact of a code-generation pass: the routine's source text,
/// the table of declared variable names, and any helper routines emitted
/// for suspendable subgraphs.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct GeneratedSource {
    /// Name of the generated routine.
    pub routine: String,
    /// Whether the routine was emitted as a suspendable coroutine.
    pub suspendable: bool,
    pub source: String,
    pub variables: Vec<VariableBinding>,
    pub helpers: Vec<String>,
}

impl GeneratedSource {
    /// Saves the artifact to a file using the bincode format.
    pub fn save(&self, path: &str) -> Result<(), CodegenError> {
        let bytes = encode_to_vec(self, standard())
            .map_err(|e| CodegenError::Artifact(format!("Serialization failed: {}", e)))?;
        let mut file = fs::File::create(path).map_err(|e| {
            CodegenError::Artifact(format!("Could not create file '{}': {}", path, e))
        })?;
        file.write_all(&bytes).map_err(|e| {
            CodegenError::Artifact(format!("Could not write to file '{}': {}", path, e))
        })?;
        Ok(())
    }

    /// Loads an artifact from a file.
    pub fn from_file(path: &str) -> Result<Self, CodegenError> {
        let mut file = fs::File::open(path).map_err(|e| {
            CodegenError::Artifact(format!("Could not open file '{}': {}", path, e))
        })?;
        let mut bytes = Vec::new();
        file.read_to_end(&mut bytes).map_err(|e| {
            CodegenError::Artifact(format!("Could not read from file '{}': {}", path, e))
        })?;
        Self::from_bytes(&bytes)
    }

    /// Deserializes an artifact from a byte slice.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CodegenError> {
        decode_from_slice(bytes, standard())
            .map(|(artifact, _)| artifact)
            .map_err(|e| CodegenError::Artifact(format!("Deserialization failed: {}", e)))
    }
}
