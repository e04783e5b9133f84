//! Common test utilities for building graphs and hosts.
use kairo::prelude::*;

/// `If(true) { x = 5 } else { wrong = true }` then `y = x + 1`.
///
/// The else branch is wired so tests can assert it never runs.
#[allow(dead_code)]
pub fn if_sets_x_then_y() -> (Graph, NodeId) {
    let mut graph = Graph::new();
    let set_x = graph.add_node(
        "set-x",
        NodeKind::SetVariable {
            variable: "x".to_string(),
            value: FlowReference::literal(Value::Number(5.0)),
            next: FlowReference::Unassigned,
        },
    );
    let set_wrong = graph.add_node(
        "set-wrong",
        NodeKind::SetVariable {
            variable: "wrong".to_string(),
            value: FlowReference::literal(Value::Bool(true)),
            next: FlowReference::Unassigned,
        },
    );
    let x_plus_one = graph.add_node(
        "x-plus-one",
        NodeKind::Operator {
            op: BinaryOp::Add,
            left: FlowReference::member("x"),
            right: FlowReference::literal(Value::Number(1.0)),
        },
    );
    let set_y = graph.add_node(
        "set-y",
        NodeKind::SetVariable {
            variable: "y".to_string(),
            value: FlowReference::node(x_plus_one),
            next: FlowReference::Unassigned,
        },
    );
    let branch = graph.add_node(
        "branch",
        NodeKind::If {
            condition: FlowReference::literal(Value::Bool(true)),
            on_true: FlowReference::node(set_x),
            on_false: FlowReference::node(set_wrong),
            next: FlowReference::node(set_y),
        },
    );
    (graph, branch)
}

/// `for (i = 0; i < 3; i += 1) { if (i == 1) continue; acc = acc + i }`.
#[allow(dead_code)]
pub fn for_with_continue() -> (Graph, NodeId) {
    let mut graph = Graph::new();
    let skip = graph.add_node("skip", NodeKind::Continue);
    let is_one = graph.add_node(
        "is-one",
        NodeKind::Operator {
            op: BinaryOp::Equal,
            left: FlowReference::member("i"),
            right: FlowReference::literal(Value::Number(1.0)),
        },
    );
    let acc_plus_i = graph.add_node(
        "acc-plus-i",
        NodeKind::Operator {
            op: BinaryOp::Add,
            left: FlowReference::member("acc"),
            right: FlowReference::member("i"),
        },
    );
    let accumulate = graph.add_node(
        "accumulate",
        NodeKind::SetVariable {
            variable: "acc".to_string(),
            value: FlowReference::node(acc_plus_i),
            next: FlowReference::Unassigned,
        },
    );
    let guard = graph.add_node(
        "guard",
        NodeKind::If {
            condition: FlowReference::node(is_one),
            on_true: FlowReference::node(skip),
            on_false: FlowReference::Unassigned,
            next: FlowReference::node(accumulate),
        },
    );
    let loop_node = graph.add_node(
        "loop",
        NodeKind::For {
            variable: "i".to_string(),
            from: FlowReference::literal(Value::Number(0.0)),
            to: FlowReference::literal(Value::Number(3.0)),
            step: FlowReference::literal(Value::Number(1.0)),
            body: FlowReference::node(guard),
            next: FlowReference::Unassigned,
        },
    );
    (graph, loop_node)
}

/// `try { throw TypeErrorX("boom") } catch (TypeErrorX) { caught = true }
/// finally { cleanup = true }`.
#[allow(dead_code)]
pub fn try_catch_finally() -> (Graph, NodeId) {
    let mut graph = Graph::new();
    let boom = graph.add_node(
        "boom",
        NodeKind::Throw {
            exception_type: "TypeErrorX".to_string(),
            message: FlowReference::literal(Value::Str("boom".to_string())),
        },
    );
    let mark_caught = graph.add_node(
        "mark-caught",
        NodeKind::SetVariable {
            variable: "caught".to_string(),
            value: FlowReference::literal(Value::Bool(true)),
            next: FlowReference::Unassigned,
        },
    );
    let mark_cleanup = graph.add_node(
        "mark-cleanup",
        NodeKind::SetVariable {
            variable: "cleanup".to_string(),
            value: FlowReference::literal(Value::Bool(true)),
            next: FlowReference::Unassigned,
        },
    );
    let try_node = graph.add_node(
        "guarded",
        NodeKind::Try {
            body: FlowReference::node(boom),
            catches: vec![CatchClause {
                exception_type: Some("TypeErrorX".to_string()),
                binding: Some("err".to_string()),
                body: FlowReference::node(mark_caught),
            }],
            finally: FlowReference::node(mark_cleanup),
            next: FlowReference::Unassigned,
        },
    );
    (graph, try_node)
}

/// Two nested For loops; the inner one breaks at `j == 1`. Counts inner
/// body completions in `acc` and outer iterations in `outer_acc`.
#[allow(dead_code)]
pub fn nested_loops_with_break() -> (Graph, NodeId) {
    let mut graph = Graph::new();
    let stop = graph.add_node("stop", NodeKind::Break);
    let j_is_one = graph.add_node(
        "j-is-one",
        NodeKind::Operator {
            op: BinaryOp::Equal,
            left: FlowReference::member("j"),
            right: FlowReference::literal(Value::Number(1.0)),
        },
    );
    let acc_plus_one = graph.add_node(
        "acc-plus-one",
        NodeKind::Operator {
            op: BinaryOp::Add,
            left: FlowReference::member("acc"),
            right: FlowReference::literal(Value::Number(1.0)),
        },
    );
    let accumulate = graph.add_node(
        "accumulate",
        NodeKind::SetVariable {
            variable: "acc".to_string(),
            value: FlowReference::node(acc_plus_one),
            next: FlowReference::Unassigned,
        },
    );
    let guard = graph.add_node(
        "guard",
        NodeKind::If {
            condition: FlowReference::node(j_is_one),
            on_true: FlowReference::node(stop),
            on_false: FlowReference::Unassigned,
            next: FlowReference::node(accumulate),
        },
    );
    let outer_plus_one = graph.add_node(
        "outer-plus-one",
        NodeKind::Operator {
            op: BinaryOp::Add,
            left: FlowReference::member("outer_acc"),
            right: FlowReference::literal(Value::Number(1.0)),
        },
    );
    let count_outer = graph.add_node(
        "count-outer",
        NodeKind::SetVariable {
            variable: "outer_acc".to_string(),
            value: FlowReference::node(outer_plus_one),
            next: FlowReference::Unassigned,
        },
    );
    let inner = graph.add_node(
        "inner",
        NodeKind::For {
            variable: "j".to_string(),
            from: FlowReference::literal(Value::Number(0.0)),
            to: FlowReference::literal(Value::Number(5.0)),
            step: FlowReference::literal(Value::Number(1.0)),
            body: FlowReference::node(guard),
            next: FlowReference::node(count_outer),
        },
    );
    let outer = graph.add_node(
        "outer",
        NodeKind::For {
            variable: "i".to_string(),
            from: FlowReference::literal(Value::Number(0.0)),
            to: FlowReference::literal(Value::Number(2.0)),
            step: FlowReference::literal(Value::Number(1.0)),
            body: FlowReference::node(inner),
            next: FlowReference::Unassigned,
        },
    );
    (graph, outer)
}

/// A Switch with duplicate case values; the earliest declared case must
/// win under both backends.
#[allow(dead_code)]
pub fn switch_with_duplicate_cases() -> (Graph, NodeId) {
    switch_graph(2.0)
}

/// Same switch shape with a configurable target value.
#[allow(dead_code)]
pub fn switch_graph(target: f64) -> (Graph, NodeId) {
    let mut graph = Graph::new();
    let set_a = graph.add_node(
        "set-a",
        NodeKind::SetVariable {
            variable: "hit".to_string(),
            value: FlowReference::literal(Value::Str("a".to_string())),
            next: FlowReference::Unassigned,
        },
    );
    let set_b = graph.add_node(
        "set-b",
        NodeKind::SetVariable {
            variable: "hit".to_string(),
            value: FlowReference::literal(Value::Str("b".to_string())),
            next: FlowReference::Unassigned,
        },
    );
    let set_c = graph.add_node(
        "set-c",
        NodeKind::SetVariable {
            variable: "hit".to_string(),
            value: FlowReference::literal(Value::Str("c".to_string())),
            next: FlowReference::Unassigned,
        },
    );
    let set_d = graph.add_node(
        "set-d",
        NodeKind::SetVariable {
            variable: "hit".to_string(),
            value: FlowReference::literal(Value::Str("default".to_string())),
            next: FlowReference::Unassigned,
        },
    );
    let switch = graph.add_node(
        "select",
        NodeKind::Switch {
            target: FlowReference::literal(Value::Number(target)),
            cases: vec![
                SwitchCase {
                    value: Value::Number(1.0),
                    body: FlowReference::node(set_a),
                },
                SwitchCase {
                    value: Value::Number(2.0),
                    body: FlowReference::node(set_b),
                },
                SwitchCase {
                    value: Value::Number(2.0),
                    body: FlowReference::node(set_c),
                },
            ],
            default: FlowReference::node(set_d),
            next: FlowReference::Unassigned,
        },
    );
    (graph, switch)
}

/// `lock ("door") { throw Boom() }` wrapped in a catch-all Try.
#[allow(dead_code)]
pub fn lock_released_on_throw() -> (Graph, NodeId) {
    let mut graph = Graph::new();
    let boom = graph.add_node(
        "boom",
        NodeKind::Throw {
            exception_type: "Boom".to_string(),
            message: FlowReference::Unassigned,
        },
    );
    let lock = graph.add_node(
        "lock",
        NodeKind::Lock {
            target: FlowReference::literal(Value::Str("door".to_string())),
            body: FlowReference::node(boom),
            next: FlowReference::Unassigned,
        },
    );
    let mark_caught = graph.add_node(
        "mark-caught",
        NodeKind::SetVariable {
            variable: "caught".to_string(),
            value: FlowReference::literal(Value::Bool(true)),
            next: FlowReference::Unassigned,
        },
    );
    let guarded = graph.add_node(
        "guarded",
        NodeKind::Try {
            body: FlowReference::node(lock),
            catches: vec![CatchClause {
                exception_type: None,
                binding: None,
                body: FlowReference::node(mark_caught),
            }],
            finally: FlowReference::Unassigned,
            next: FlowReference::Unassigned,
        },
    );
    (graph, guarded)
}

/// Three nested While loops with a Yield-Return at the innermost level,
/// for classifier propagation tests. Loops are condition-gated on members
/// so they are not unconditionally infinite.
#[allow(dead_code)]
pub fn yield_three_loops_deep() -> (Graph, NodeId) {
    let mut graph = Graph::new();
    let tick = graph.add_node(
        "tick",
        NodeKind::YieldReturn {
            value: FlowReference::literal(Value::Number(1.0)),
            next: FlowReference::Unassigned,
        },
    );
    let innermost = graph.add_node(
        "innermost",
        NodeKind::While {
            condition: FlowReference::member("run_inner"),
            body: FlowReference::node(tick),
            next: FlowReference::Unassigned,
        },
    );
    let middle = graph.add_node(
        "middle",
        NodeKind::While {
            condition: FlowReference::member("run_middle"),
            body: FlowReference::node(innermost),
            next: FlowReference::Unassigned,
        },
    );
    let outermost = graph.add_node(
        "outermost",
        NodeKind::While {
            condition: FlowReference::member("run_outer"),
            body: FlowReference::node(middle),
            next: FlowReference::Unassigned,
        },
    );
    (graph, outermost)
}

#[allow(dead_code)]
pub fn run_to_completion<'g>(graph: &'g Graph, entry: NodeId, host: &mut InMemoryHost) -> Task<'g> {
    let interpreter = Interpreter::new(graph);
    interpreter
        .run(entry, host)
        .expect("graph should interpret without errors")
}

#[allow(dead_code)]
pub fn number(host: &InMemoryHost, name: &str) -> f64 {
    match host.variable(name) {
        Some(Value::Number(n)) => *n,
        other => panic!("variable '{}' is not a number: {:?}", name, other),
    }
}
