//! Code-generator backend tests: emitted structure, memoization,
//! fail-fast behavior, and the generated artifact.
mod common;
use common::*;
use kairo::prelude::*;

fn generate(graph: &Graph, entry: NodeId) -> GeneratedSource {
    CodeGenerator::new(graph)
        .generate(entry)
        .expect("generation should succeed")
}

#[test]
fn if_emits_guarded_bodies_and_folds_the_continuation() {
    let (graph, entry) = if_sets_x_then_y();
    let artifact = generate(&graph, entry);
    let source = &artifact.source;

    assert!(source.contains("if (true)"));
    assert!(source.contains("x = 5;"));
    assert!(source.contains("else"));
    assert!(source.contains("wrong = true;"));
    // The shared continuation is emitted once, after both branches.
    assert_eq!(source.matches("y = (x + 1);").count(), 1);
    let else_pos = source.find("else").unwrap();
    let next_pos = source.find("y = (x + 1);").unwrap();
    assert!(next_pos > else_pos);
    assert!(!artifact.suspendable);
    assert!(source.contains("void branch()"));
}

#[test]
fn for_loop_emits_native_continue() {
    let (graph, entry) = for_with_continue();
    let artifact = generate(&graph, entry);
    let source = &artifact.source;

    assert!(source.contains("for (var i = 0; i < 3; i += 1)"));
    assert!(source.contains("if ((i == 1))"));
    assert!(source.contains("continue;"));
    assert!(source.contains("acc = (acc + i);"));
    assert!(artifact.variables.iter().any(|v| v.name == "i"));
    assert!(artifact.variables.iter().any(|v| v.name == "acc"));
}

#[test]
fn switch_preserves_declaration_order_for_duplicate_cases() {
    let (graph, entry) = switch_with_duplicate_cases();
    let artifact = generate(&graph, entry);
    let source = &artifact.source;

    // The scrutinee is evaluated once and compared in declaration order,
    // so the first duplicate wins exactly as under interpretation.
    assert!(source.contains("var sw = 2;"));
    assert!(source.contains("if (sw == 1)"));
    assert_eq!(source.matches("else if (sw == 2)").count(), 2);
    let first = source.find("hit = \"b\";").unwrap();
    let second = source.find("hit = \"c\";").unwrap();
    assert!(first < second);
    assert!(source.contains("hit = \"default\";"));
}

#[test]
fn try_catch_finally_emits_native_blocks() {
    let (graph, entry) = try_catch_finally();
    let artifact = generate(&graph, entry);
    let source = &artifact.source;

    assert!(source.contains("try {"));
    assert!(source.contains("throw new TypeErrorX(\"boom\");"));
    assert!(source.contains("catch (TypeErrorX err)"));
    assert!(source.contains("caught = true;"));
    assert!(source.contains("finally {"));
    assert!(source.contains("cleanup = true;"));
}

#[test]
fn lock_and_using_emit_scoped_blocks() {
    let (graph, entry) = lock_released_on_throw();
    let artifact = generate(&graph, entry);
    assert!(artifact.source.contains("lock (\"door\")"));

    let mut graph = Graph::new();
    let work = graph.add_node(
        "work",
        NodeKind::SetVariable {
            variable: "done".to_string(),
            value: FlowReference::literal(Value::Bool(true)),
            next: FlowReference::Unassigned,
        },
    );
    let scoped = graph.add_node(
        "scoped",
        NodeKind::Using {
            binding: "f".to_string(),
            resource: FlowReference::literal(Value::Str("file".to_string())),
            body: FlowReference::node(work),
            next: FlowReference::Unassigned,
        },
    );
    let artifact = generate(&graph, scoped);
    assert!(artifact.source.contains("using (var f = \"file\")"));
    assert!(artifact.source.contains("done = true;"));
}

#[test]
fn while_and_do_while_reevaluate_their_conditions() {
    let mut graph = Graph::new();
    let n_below_three = graph.add_node(
        "n-below-three",
        NodeKind::Operator {
            op: BinaryOp::SmallerThan,
            left: FlowReference::member("n"),
            right: FlowReference::literal(Value::Number(3.0)),
        },
    );
    let bump = graph.add_node(
        "bump",
        NodeKind::SetVariable {
            variable: "n".to_string(),
            value: FlowReference::member("n"),
            next: FlowReference::Unassigned,
        },
    );
    let do_loop = graph.add_node(
        "after",
        NodeKind::DoWhile {
            condition: FlowReference::node(n_below_three),
            body: FlowReference::node(bump),
            next: FlowReference::Unassigned,
        },
    );
    let while_loop = graph.add_node(
        "loop",
        NodeKind::While {
            condition: FlowReference::node(n_below_three),
            body: FlowReference::node(bump),
            next: FlowReference::node(do_loop),
        },
    );
    let artifact = generate(&graph, while_loop);
    let source = &artifact.source;

    // The condition is inlined (not hoisted), so both loops re-evaluate
    // it per iteration, matching the interpreter.
    assert!(source.contains("while ((n < 3))"));
    assert!(source.contains("do {"));
    assert!(source.contains("} while ((n < 3));"));
}

#[test]
fn expression_memo_reuses_generated_text() {
    let mut graph = Graph::new();
    let sum = graph.add_node(
        "sum",
        NodeKind::Operator {
            op: BinaryOp::Add,
            left: FlowReference::member("x"),
            right: FlowReference::literal(Value::Number(1.0)),
        },
    );
    let set_b = graph.add_node(
        "set-b",
        NodeKind::SetVariable {
            variable: "b".to_string(),
            value: FlowReference::node(sum),
            next: FlowReference::Unassigned,
        },
    );
    let set_a = graph.add_node(
        "set-a",
        NodeKind::SetVariable {
            variable: "a".to_string(),
            value: FlowReference::node(sum),
            next: FlowReference::node(set_b),
        },
    );
    let artifact = generate(&graph, set_a);
    assert!(artifact.source.contains("a = (x + 1);"));
    assert!(artifact.source.contains("b = (x + 1);"));
}

#[test]
fn suspendable_entry_emits_a_coroutine_routine() {
    let mut graph = Graph::new();
    let tick = graph.add_node(
        "tick",
        NodeKind::YieldReturn {
            value: FlowReference::literal(Value::Number(1.0)),
            next: FlowReference::Unassigned,
        },
    );
    let wait = graph.add_node(
        "wait",
        NodeKind::Wait {
            seconds: FlowReference::literal(Value::Number(2.0)),
            next: FlowReference::node(tick),
        },
    );
    let entry = graph.add_node(
        "patrol",
        NodeKind::Entry {
            body: FlowReference::node(wait),
        },
    );
    let artifact = generate(&graph, entry);

    assert!(artifact.suspendable);
    assert!(
        artifact
            .source
            .contains("System.Collections.IEnumerator patrol()")
    );
    assert!(artifact.source.contains("yield return new WaitForSeconds(2);"));
    assert!(artifact.source.contains("yield return 1;"));
    assert_eq!(artifact.helpers.len(), 1);
    assert!(artifact.helpers[0].contains("StartCoroutine(patrol())"));
}

#[test]
fn return_in_suspendable_routine_becomes_yield_break() {
    let mut graph = Graph::new();
    let ret = graph.add_node(
        "ret",
        NodeKind::Return {
            value: FlowReference::literal(Value::Number(5.0)),
        },
    );
    let pause = graph.add_node(
        "pause",
        NodeKind::YieldReturn {
            value: FlowReference::literal(Value::Number(0.0)),
            next: FlowReference::node(ret),
        },
    );
    let artifact = generate(&graph, pause);
    assert!(artifact.source.contains("yield break;"));
    assert!(!artifact.source.contains("return 5;"));
}

#[test]
fn generation_fails_fast_on_unassigned_required_input() {
    let mut graph = Graph::new();
    let branch = graph.add_node(
        "branch",
        NodeKind::If {
            condition: FlowReference::Unassigned,
            on_true: FlowReference::Unassigned,
            on_false: FlowReference::Unassigned,
            next: FlowReference::Unassigned,
        },
    );
    let error = CodeGenerator::new(&graph).generate(branch).unwrap_err();
    assert!(matches!(
        error,
        CodegenError::UnassignedInput {
            socket: "condition",
            ..
        }
    ));
}

#[test]
fn generation_rejects_mistyped_literals() {
    let mut graph = Graph::new();
    let branch = graph.add_node(
        "branch",
        NodeKind::If {
            condition: FlowReference::literal(Value::Number(1.0)),
            on_true: FlowReference::Unassigned,
            on_false: FlowReference::Unassigned,
            next: FlowReference::Unassigned,
        },
    );
    let error = CodeGenerator::new(&graph).generate(branch).unwrap_err();
    assert!(matches!(error, CodegenError::TypeMismatch { .. }));
}

#[test]
fn returned_value_changes_the_routine_signature() {
    let mut graph = Graph::new();
    let ret = graph.add_node(
        "ret",
        NodeKind::Return {
            value: FlowReference::literal(Value::Number(7.0)),
        },
    );
    let artifact = generate(&graph, ret);
    assert!(artifact.source.contains("object ret()"));
    assert!(artifact.source.contains("return 7;"));
}

#[test]
fn artifact_round_trips_through_bincode() {
    let (graph, entry) = if_sets_x_then_y();
    let artifact = generate(&graph, entry);

    let path = std::env::temp_dir().join("kairo_artifact_roundtrip.bin");
    let path = path.to_str().expect("temp path is valid UTF-8");
    artifact.save(path).expect("artifact should save");
    let loaded = GeneratedSource::from_file(path).expect("artifact should load");

    assert_eq!(loaded.routine, artifact.routine);
    assert_eq!(loaded.source, artifact.source);
    assert_eq!(loaded.variables, artifact.variables);
    assert_eq!(loaded.suspendable, artifact.suspendable);
    std::fs::remove_file(path).ok();
}
