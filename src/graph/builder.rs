use crate::error::GraphError;
use crate::graph::definition::{GraphDefinition, NodeDefinition};
use crate::graph::node::{BinaryOp, CatchClause, NodeKind, SwitchCase, UnaryOp};
use crate::graph::{FlowReference, Graph, LifecycleEvent, NodeId};
use crate::value::Value;
use ahash::AHashMap;

/// Resolves a string-typed `GraphDefinition` into the engine's closed node
/// table.
///
/// All kind dispatch happens here, once, at load time. Both backends operate
/// on the resulting `Graph` and never see the definition layer again.
pub struct GraphBuilder {
    definition: GraphDefinition,
    aliases: AHashMap<String, String>,
}

impl GraphBuilder {
    pub fn new(definition: GraphDefinition) -> Self {
        Self {
            definition,
            aliases: AHashMap::new(),
        }
    }

    /// Maps a user-specific kind name onto one of kairo's canonical kinds.
    pub fn with_kind_alias(
        mut self,
        user_kind_name: &str,
        kairo_kind_name: &str,
    ) -> Self {
        self.aliases
            .insert(user_kind_name.to_string(), kairo_kind_name.to_string());
        self
    }

    /// Parses a graph definition straight from JSON and builds it.
    pub fn from_json(json: &str) -> Result<Graph, GraphError> {
        let definition: GraphDefinition =
            serde_json::from_str(json).map_err(|e| GraphError::JsonParse(e.to_string()))?;
        Self::new(definition).build()
    }

    pub fn build(self) -> Result<Graph, GraphError> {
        let mut ids: AHashMap<String, NodeId> = AHashMap::new();
        for (index, node) in self.definition.nodes.iter().enumerate() {
            ids.insert(node.id.clone(), index as NodeId);
        }

        // Pre-index edges by the socket that will look them up: control
        // edges by (source, source_handle), value edges by
        // (target, target_handle).
        let mut flow_index: AHashMap<(NodeId, String), NodeId> = AHashMap::new();
        let mut value_index: AHashMap<(NodeId, String), NodeId> = AHashMap::new();
        for edge in &self.definition.edges {
            let source = *ids
                .get(&edge.source)
                .ok_or_else(|| GraphError::NodeNotFound {
                    missing_node_id: edge.source.clone(),
                    source_node_id: edge.target.clone(),
                })?;
            let target = *ids
                .get(&edge.target)
                .ok_or_else(|| GraphError::NodeNotFound {
                    missing_node_id: edge.target.clone(),
                    source_node_id: edge.source.clone(),
                })?;
            flow_index.insert((source, edge.source_handle.clone()), target);
            value_index.insert((target, edge.target_handle.clone()), source);
        }

        let mut resolver = KindResolver {
            flow_index: &flow_index,
            value_index: &value_index,
            deferred: Vec::new(),
        };

        let mut graph = Graph::new();
        for (index, definition) in self.definition.nodes.iter().enumerate() {
            let kind_name = self
                .aliases
                .get(&definition.kind)
                .map(String::as_str)
                .unwrap_or(&definition.kind);
            let kind = resolver.resolve(definition, kind_name, index as NodeId)?;
            let name = definition
                .name
                .clone()
                .unwrap_or_else(|| definition.id.clone());
            log::debug!(
                "Resolved node '{}' as kind '{}'",
                definition.id,
                kind.kind_name()
            );
            graph.add_node(name, kind);
        }

        // Socket targets can reference nodes defined later; check the
        // flow/value contracts now that every kind is resolved.
        for check in &resolver.deferred {
            let target = graph.node(check.target)?;
            match check.expect {
                SocketExpect::Flow if !target.kind.is_flow() => {
                    return Err(GraphError::Connection {
                        node_id: check.node_id.clone(),
                        socket: check.socket.clone(),
                        message: format!(
                            "flow socket is connected to '{}', which is not a flow node",
                            target.kind.kind_name()
                        ),
                    });
                }
                SocketExpect::Value if !target.kind.produces_value() => {
                    return Err(GraphError::Connection {
                        node_id: check.node_id.clone(),
                        socket: check.socket.clone(),
                        message: format!(
                            "value socket is connected to '{}', which does not produce a value",
                            target.kind.kind_name()
                        ),
                    });
                }
                _ => {}
            }
        }

        for entry in &self.definition.entries {
            let event = LifecycleEvent::parse(&entry.event).ok_or_else(|| {
                GraphError::InvalidEntry {
                    event: entry.event.clone(),
                    node_id: entry.node.clone(),
                }
            })?;
            let node = *ids
                .get(&entry.node)
                .ok_or_else(|| GraphError::NodeNotFound {
                    missing_node_id: entry.node.clone(),
                    source_node_id: format!("entry '{}'", entry.event),
                })?;
            graph.add_entry(event, node)?;
        }

        log::info!(
            "Graph resolved: {} nodes, {} entry points",
            graph.len(),
            graph.entries().len()
        );
        Ok(graph)
    }
}

enum SocketExpect {
    Flow,
    Value,
}

struct DeferredCheck {
    node_id: String,
    socket: String,
    target: NodeId,
    expect: SocketExpect,
}

struct KindResolver<'a> {
    flow_index: &'a AHashMap<(NodeId, String), NodeId>,
    value_index: &'a AHashMap<(NodeId, String), NodeId>,
    deferred: Vec<DeferredCheck>,
}

impl<'a> KindResolver<'a> {
    fn resolve(
        &mut self,
        node: &NodeDefinition,
        kind_name: &str,
        id: NodeId,
    ) -> Result<NodeKind, GraphError> {
        let kind = match kind_name {
            "entry" => NodeKind::Entry {
                body: self.flow_ref(node, id, "body"),
            },
            "if" => NodeKind::If {
                condition: self.value_ref(node, id, "condition", Some("Bool"))?,
                on_true: self.flow_ref(node, id, "true"),
                on_false: self.flow_ref(node, id, "false"),
                next: self.flow_ref(node, id, "next"),
            },
            "switch" => NodeKind::Switch {
                target: self.value_ref(node, id, "target", None)?,
                cases: self.switch_cases(node, id)?,
                default: self.flow_ref(node, id, "default"),
                next: self.flow_ref(node, id, "next"),
            },
            "for" => NodeKind::For {
                variable: self.string_property(node, "variable")?,
                from: self.value_ref(node, id, "from", Some("Number"))?,
                to: self.value_ref(node, id, "to", Some("Number"))?,
                step: self.value_ref(node, id, "step", Some("Number"))?,
                body: self.flow_ref(node, id, "body"),
                next: self.flow_ref(node, id, "next"),
            },
            "foreach" => NodeKind::Foreach {
                variable: self.string_property(node, "variable")?,
                source: self.value_ref(node, id, "source", None)?,
                body: self.flow_ref(node, id, "body"),
                next: self.flow_ref(node, id, "next"),
            },
            "while" => NodeKind::While {
                condition: self.value_ref(node, id, "condition", Some("Bool"))?,
                body: self.flow_ref(node, id, "body"),
                next: self.flow_ref(node, id, "next"),
            },
            "doWhile" => NodeKind::DoWhile {
                condition: self.value_ref(node, id, "condition", Some("Bool"))?,
                body: self.flow_ref(node, id, "body"),
                next: self.flow_ref(node, id, "next"),
            },
            "try" => NodeKind::Try {
                body: self.flow_ref(node, id, "body"),
                catches: self.catch_clauses(node, id)?,
                finally: self.flow_ref(node, id, "finally"),
                next: self.flow_ref(node, id, "next"),
            },
            "lock" => NodeKind::Lock {
                target: self.value_ref(node, id, "target", None)?,
                body: self.flow_ref(node, id, "body"),
                next: self.flow_ref(node, id, "next"),
            },
            "using" => NodeKind::Using {
                binding: self.string_property(node, "binding")?,
                resource: self.value_ref(node, id, "resource", None)?,
                body: self.flow_ref(node, id, "body"),
                next: self.flow_ref(node, id, "next"),
            },
            "nullCheck" => NodeKind::NullCheck {
                value: self.value_ref(node, id, "value", None)?,
                on_null: self.flow_ref(node, id, "null"),
                on_value: self.flow_ref(node, id, "notNull"),
                next: self.flow_ref(node, id, "next"),
            },
            "throw" => NodeKind::Throw {
                exception_type: self.string_property(node, "type")?,
                message: self.value_ref(node, id, "message", None)?,
            },
            "yieldReturn" => NodeKind::YieldReturn {
                value: self.value_ref(node, id, "value", None)?,
                next: self.flow_ref(node, id, "next"),
            },
            "wait" => NodeKind::Wait {
                seconds: self.value_ref(node, id, "seconds", Some("Number"))?,
                next: self.flow_ref(node, id, "next"),
            },
            "continue" => NodeKind::Continue,
            "break" => NodeKind::Break,
            "return" => NodeKind::Return {
                value: self.value_ref(node, id, "value", None)?,
            },
            "setVariable" => NodeKind::SetVariable {
                variable: self.string_property(node, "variable")?,
                value: self.value_ref(node, id, "value", None)?,
                next: self.flow_ref(node, id, "next"),
            },
            "not" => self.unary(node, id, UnaryOp::Not)?,
            "negate" => self.unary(node, id, UnaryOp::Negate)?,
            "abs" => self.unary(node, id, UnaryOp::Abs)?,
            "add" => self.binary(node, id, BinaryOp::Add)?,
            "subtract" => self.binary(node, id, BinaryOp::Subtract)?,
            "multiply" => self.binary(node, id, BinaryOp::Multiply)?,
            "divide" => self.binary(node, id, BinaryOp::Divide)?,
            "equal" => self.binary(node, id, BinaryOp::Equal)?,
            "notEqual" => self.binary(node, id, BinaryOp::NotEqual)?,
            "greaterThan" => self.binary(node, id, BinaryOp::GreaterThan)?,
            "smallerThan" => self.binary(node, id, BinaryOp::SmallerThan)?,
            "greaterThanOrEqual" => self.binary(node, id, BinaryOp::GreaterThanOrEqual)?,
            "smallerThanOrEqual" => self.binary(node, id, BinaryOp::SmallerThanOrEqual)?,
            "and" => self.binary(node, id, BinaryOp::And)?,
            "or" => self.binary(node, id, BinaryOp::Or)?,
            "xor" => self.binary(node, id, BinaryOp::Xor)?,
            _ => {
                return Err(GraphError::UnknownKind {
                    node_id: node.id.clone(),
                    kind_name: kind_name.to_string(),
                });
            }
        };
        Ok(kind)
    }

    fn binary(
        &mut self,
        node: &NodeDefinition,
        id: NodeId,
        op: BinaryOp,
    ) -> Result<NodeKind, GraphError> {
        Ok(NodeKind::Operator {
            op,
            left: self.value_ref(node, id, "left", None)?,
            right: self.value_ref(node, id, "right", None)?,
        })
    }

    fn unary(
        &mut self,
        node: &NodeDefinition,
        id: NodeId,
        op: UnaryOp,
    ) -> Result<NodeKind, GraphError> {
        Ok(NodeKind::UnaryOperator {
            op,
            operand: self.value_ref(node, id, "operand", None)?,
        })
    }

    /// Resolves a control socket. Unconnected bodies stay `Unassigned`,
    /// which both backends treat as an empty body.
    fn flow_ref(&mut self, node: &NodeDefinition, id: NodeId, socket: &str) -> FlowReference {
        match self.flow_index.get(&(id, socket.to_string())) {
            Some(target) => {
                self.deferred.push(DeferredCheck {
                    node_id: node.id.clone(),
                    socket: socket.to_string(),
                    target: *target,
                    expect: SocketExpect::Flow,
                });
                FlowReference::NodeOutput(*target)
            }
            None => FlowReference::Unassigned,
        }
    }

    /// Resolves a value socket: a connected edge wins, then a property
    /// literal (strings starting with `$` are member references), else
    /// `Unassigned`. Literal types are checked here, at resolution time.
    fn value_ref(
        &mut self,
        node: &NodeDefinition,
        id: NodeId,
        socket: &str,
        expected: Option<&'static str>,
    ) -> Result<FlowReference, GraphError> {
        if let Some(source) = self.value_index.get(&(id, socket.to_string())) {
            self.deferred.push(DeferredCheck {
                node_id: node.id.clone(),
                socket: socket.to_string(),
                target: *source,
                expect: SocketExpect::Value,
            });
            return Ok(FlowReference::NodeOutput(*source));
        }

        let Some(raw) = node.properties.get(socket) else {
            return Ok(FlowReference::Unassigned);
        };

        if let Some(path) = raw.as_str().and_then(|s| s.strip_prefix('$')) {
            return Ok(FlowReference::Member(path.to_string()));
        }

        let value = Value::from_json(raw);
        if let Some(expected) = expected {
            if value.type_name() != expected {
                return Err(GraphError::TypeMismatch {
                    node_id: node.id.clone(),
                    socket: socket.to_string(),
                    expected,
                    found: value,
                });
            }
        }
        Ok(FlowReference::Literal(value))
    }

    fn string_property(
        &self,
        node: &NodeDefinition,
        key: &str,
    ) -> Result<String, GraphError> {
        node.properties
            .get(key)
            .and_then(|v| v.as_str())
            .map(str::to_string)
            .ok_or_else(|| GraphError::Connection {
                node_id: node.id.clone(),
                socket: key.to_string(),
                message: format!("missing required string property '{}'", key),
            })
    }

    fn switch_cases(
        &mut self,
        node: &NodeDefinition,
        id: NodeId,
    ) -> Result<Vec<SwitchCase>, GraphError> {
        let raw = node
            .properties
            .get("cases")
            .and_then(|v| v.as_array())
            .cloned()
            .unwrap_or_default();

        let mut cases = Vec::with_capacity(raw.len());
        for (index, value) in raw.iter().enumerate() {
            cases.push(SwitchCase {
                value: Value::from_json(value),
                body: self.flow_ref(node, id, &format!("case-{}", index)),
            });
        }
        Ok(cases)
    }

    fn catch_clauses(
        &mut self,
        node: &NodeDefinition,
        id: NodeId,
    ) -> Result<Vec<CatchClause>, GraphError> {
        let raw = node
            .properties
            .get("catches")
            .and_then(|v| v.as_array())
            .cloned()
            .unwrap_or_default();

        let mut catches = Vec::with_capacity(raw.len());
        for (index, clause) in raw.iter().enumerate() {
            let exception_type = clause
                .get("type")
                .and_then(|v| v.as_str())
                .map(str::to_string);
            let binding = clause
                .get("binding")
                .and_then(|v| v.as_str())
                .map(str::to_string);
            catches.push(CatchClause {
                exception_type,
                binding,
                body: self.flow_ref(node, id, &format!("catch-{}", index)),
            });
        }
        Ok(catches)
    }
}
