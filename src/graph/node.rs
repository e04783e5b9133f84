use crate::graph::{FlowReference, NodeId};

/// Binary value operators available to `NodeKind::Operator`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Subtract,
    Multiply,
    Divide,
    Equal,
    NotEqual,
    GreaterThan,
    SmallerThan,
    GreaterThanOrEqual,
    SmallerThanOrEqual,
    And,
    Or,
    Xor,
}

impl BinaryOp {
    /// The operator's symbol in the generated host language.
    pub fn symbol(&self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Subtract => "-",
            BinaryOp::Multiply => "*",
            BinaryOp::Divide => "/",
            BinaryOp::Equal => "==",
            BinaryOp::NotEqual => "!=",
            BinaryOp::GreaterThan => ">",
            BinaryOp::SmallerThan => "<",
            BinaryOp::GreaterThanOrEqual => ">=",
            BinaryOp::SmallerThanOrEqual => "<=",
            BinaryOp::And => "&&",
            BinaryOp::Or => "||",
            BinaryOp::Xor => "^",
        }
    }
}

/// Unary value operators available to `NodeKind::UnaryOperator`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Not,
    Negate,
    Abs,
}

/// One case of a Switch node. Declaration order is the tie-break for
/// duplicate case values.
#[derive(Debug, Clone)]
pub struct SwitchCase {
    pub value: crate::value::Value,
    pub body: FlowReference,
}

/// One catch clause of a Try node. `exception_type: None` is an unfiltered
/// catch and matches every exception.
#[derive(Debug, Clone)]
pub struct CatchClause {
    pub exception_type: Option<String>,
    /// Host variable the caught exception payload is bound to, if any.
    pub binding: Option<String>,
    pub body: FlowReference,
}

/// The closed set of node kinds the engine dispatches over.
///
/// Each variant holds only the references relevant to it. The string-typed
/// definition layer resolves into this table once at graph-load time; both
/// backends pattern-match on it and never consult the definition again.
#[derive(Debug, Clone)]
pub enum NodeKind {
    /// Flow entry / function boundary. Consumes `Return` signals.
    Entry { body: FlowReference },

    If {
        condition: FlowReference,
        on_true: FlowReference,
        on_false: FlowReference,
        next: FlowReference,
    },

    Switch {
        target: FlowReference,
        cases: Vec<SwitchCase>,
        default: FlowReference,
        next: FlowReference,
    },

    For {
        variable: String,
        from: FlowReference,
        to: FlowReference,
        step: FlowReference,
        body: FlowReference,
        next: FlowReference,
    },

    Foreach {
        variable: String,
        source: FlowReference,
        body: FlowReference,
        next: FlowReference,
    },

    While {
        condition: FlowReference,
        body: FlowReference,
        next: FlowReference,
    },

    DoWhile {
        condition: FlowReference,
        body: FlowReference,
        next: FlowReference,
    },

    Try {
        body: FlowReference,
        catches: Vec<CatchClause>,
        finally: FlowReference,
        next: FlowReference,
    },

    Lock {
        target: FlowReference,
        body: FlowReference,
        next: FlowReference,
    },

    Using {
        binding: String,
        resource: FlowReference,
        body: FlowReference,
        next: FlowReference,
    },

    NullCheck {
        value: FlowReference,
        on_null: FlowReference,
        on_value: FlowReference,
        next: FlowReference,
    },

    /// Raises a typed exception and never continues.
    Throw {
        exception_type: String,
        message: FlowReference,
    },

    /// Cooperative suspension point yielding a value to the scheduler.
    YieldReturn {
        value: FlowReference,
        next: FlowReference,
    },

    /// Host-timed suspension.
    Wait {
        seconds: FlowReference,
        next: FlowReference,
    },

    Continue,
    Break,
    Return { value: FlowReference },

    SetVariable {
        variable: String,
        value: FlowReference,
        next: FlowReference,
    },

    /// Pure binary value operator. Not a flow node.
    Operator {
        op: BinaryOp,
        left: FlowReference,
        right: FlowReference,
    },

    /// Pure unary value operator. Not a flow node.
    UnaryOperator { op: UnaryOp, operand: FlowReference },
}

impl NodeKind {
    pub fn kind_name(&self) -> &'static str {
        match self {
            NodeKind::Entry { .. } => "Entry",
            NodeKind::If { .. } => "If",
            NodeKind::Switch { .. } => "Switch",
            NodeKind::For { .. } => "For",
            NodeKind::Foreach { .. } => "Foreach",
            NodeKind::While { .. } => "While",
            NodeKind::DoWhile { .. } => "DoWhile",
            NodeKind::Try { .. } => "Try",
            NodeKind::Lock { .. } => "Lock",
            NodeKind::Using { .. } => "Using",
            NodeKind::NullCheck { .. } => "NullCheck",
            NodeKind::Throw { .. } => "Throw",
            NodeKind::YieldReturn { .. } => "YieldReturn",
            NodeKind::Wait { .. } => "Wait",
            NodeKind::Continue => "Continue",
            NodeKind::Break => "Break",
            NodeKind::Return { .. } => "Return",
            NodeKind::SetVariable { .. } => "SetVariable",
            NodeKind::Operator { .. } => "Operator",
            NodeKind::UnaryOperator { .. } => "UnaryOperator",
        }
    }

    /// Whether this node participates in control flow (can be the target of
    /// a control edge).
    pub fn is_flow(&self) -> bool {
        !matches!(
            self,
            NodeKind::Operator { .. } | NodeKind::UnaryOperator { .. }
        )
    }

    /// Whether `get_value` is supported on this node.
    pub fn produces_value(&self) -> bool {
        matches!(
            self,
            NodeKind::Operator { .. } | NodeKind::UnaryOperator { .. }
        )
    }

    /// Whether executing this node alone requires cooperative suspension.
    pub fn is_self_suspending(&self) -> bool {
        matches!(self, NodeKind::YieldReturn { .. } | NodeKind::Wait { .. })
    }

    /// All outgoing flow references: nested bodies plus the continuation.
    /// This is the reachability set the coroutine classifier walks.
    pub fn nested_flows(&self) -> Vec<&FlowReference> {
        match self {
            NodeKind::Entry { body } => vec![body],
            NodeKind::If {
                on_true,
                on_false,
                next,
                ..
            } => vec![on_true, on_false, next],
            NodeKind::Switch {
                cases,
                default,
                next,
                ..
            } => {
                let mut flows: Vec<&FlowReference> = cases.iter().map(|c| &c.body).collect();
                flows.push(default);
                flows.push(next);
                flows
            }
            NodeKind::For { body, next, .. }
            | NodeKind::Foreach { body, next, .. }
            | NodeKind::While { body, next, .. }
            | NodeKind::DoWhile { body, next, .. }
            | NodeKind::Lock { body, next, .. }
            | NodeKind::Using { body, next, .. } => vec![body, next],
            NodeKind::Try {
                body,
                catches,
                finally,
                next,
            } => {
                let mut flows = vec![body];
                flows.extend(catches.iter().map(|c| &c.body));
                flows.push(finally);
                flows.push(next);
                flows
            }
            NodeKind::NullCheck {
                on_null,
                on_value,
                next,
                ..
            } => vec![on_null, on_value, next],
            NodeKind::YieldReturn { next, .. }
            | NodeKind::Wait { next, .. }
            | NodeKind::SetVariable { next, .. } => vec![next],
            NodeKind::Throw { .. }
            | NodeKind::Continue
            | NodeKind::Break
            | NodeKind::Return { .. }
            | NodeKind::Operator { .. }
            | NodeKind::UnaryOperator { .. } => vec![],
        }
    }

    /// The continuation reference finished by normal completion, if the
    /// kind has one.
    pub fn next(&self) -> Option<&FlowReference> {
        match self {
            NodeKind::If { next, .. }
            | NodeKind::Switch { next, .. }
            | NodeKind::For { next, .. }
            | NodeKind::Foreach { next, .. }
            | NodeKind::While { next, .. }
            | NodeKind::DoWhile { next, .. }
            | NodeKind::Try { next, .. }
            | NodeKind::Lock { next, .. }
            | NodeKind::Using { next, .. }
            | NodeKind::NullCheck { next, .. }
            | NodeKind::YieldReturn { next, .. }
            | NodeKind::Wait { next, .. }
            | NodeKind::SetVariable { next, .. } => Some(next),
            _ => None,
        }
    }
}

/// A node in the graph arena. Nodes hold only non-owning `NodeId` references
/// to other nodes through their flow references.
#[derive(Debug, Clone)]
pub struct Node {
    pub id: NodeId,
    pub name: String,
    pub kind: NodeKind,
}
