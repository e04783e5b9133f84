//! Static coroutine classification.
//!
//! Determines, ahead of execution, whether running a subgraph requires
//! cooperative suspension. The interpreter uses the answer to decide
//! between synchronous completion and scheduled stepping; the code
//! generator uses it to choose between a plain method and a suspendable
//! routine.

use crate::error::GraphError;
use crate::graph::{FlowReference, Graph, NodeId};
use ahash::AHashMap;

/// Memoized transitive suspension analysis over a graph.
///
/// `requires_suspension(node)` is true when the node itself is a suspension
/// point or when any node reachable through its nested flow references is.
/// The result is a pure function of graph topology; a classifier instance
/// is only valid for the graph it was created with.
pub struct CoroutineClassifier<'a> {
    graph: &'a Graph,
    memo: AHashMap<NodeId, bool>,
}

impl<'a> CoroutineClassifier<'a> {
    pub fn new(graph: &'a Graph) -> Self {
        Self {
            graph,
            memo: AHashMap::new(),
        }
    }

    pub fn requires_suspension(&mut self, node: NodeId) -> Result<bool, GraphError> {
        let mut visiting = Vec::new();
        Ok(self.classify(node, &mut visiting)?.0)
    }

    /// Returns `(suspends, saw_back_edge)`. A `false` computed while a
    /// cycle was open is incomplete and must not be memoized: the node on
    /// the back-edge may still turn out to suspend once the full cycle is
    /// resolved.
    fn classify(
        &mut self,
        node: NodeId,
        visiting: &mut Vec<NodeId>,
    ) -> Result<(bool, bool), GraphError> {
        if let Some(&cached) = self.memo.get(&node) {
            return Ok((cached, false));
        }
        if visiting.contains(&node) {
            return Ok((false, true));
        }

        let kind = &self.graph.node(node)?.kind;
        if kind.is_self_suspending() {
            self.memo.insert(node, true);
            return Ok((true, false));
        }

        visiting.push(node);
        let mut suspends = false;
        let mut saw_back_edge = false;
        for flow in kind.nested_flows() {
            if let FlowReference::NodeOutput(child) = flow {
                let (child_suspends, child_back_edge) = self.classify(*child, visiting)?;
                saw_back_edge |= child_back_edge;
                if child_suspends {
                    suspends = true;
                    break;
                }
            }
        }
        visiting.pop();

        if suspends || !saw_back_edge {
            self.memo.insert(node, suspends);
        }
        Ok((suspends, saw_back_edge))
    }
}
