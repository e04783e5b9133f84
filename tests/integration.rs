//! End-to-end tests: definition JSON through the builder into both
//! backends, scheduler behavior, and load-time validation.
mod common;
use common::*;
use kairo::prelude::*;
use serde_json::json;

fn branch_definition() -> GraphDefinition {
    GraphDefinition {
        nodes: vec![
            NodeDefinition {
                id: "set-x".to_string(),
                kind: "setVariable".to_string(),
                name: None,
                properties: [
                    ("variable".to_string(), json!("x")),
                    ("value".to_string(), json!(5.0)),
                ]
                .into_iter()
                .collect(),
            },
            NodeDefinition {
                id: "x-plus-one".to_string(),
                kind: "add".to_string(),
                name: None,
                properties: [
                    ("left".to_string(), json!("$x")),
                    ("right".to_string(), json!(1.0)),
                ]
                .into_iter()
                .collect(),
            },
            NodeDefinition {
                id: "set-y".to_string(),
                kind: "setVariable".to_string(),
                name: None,
                properties: [("variable".to_string(), json!("y"))].into_iter().collect(),
            },
            NodeDefinition {
                id: "branch".to_string(),
                kind: "if".to_string(),
                name: Some("branch".to_string()),
                properties: [("condition".to_string(), json!(true))]
                    .into_iter()
                    .collect(),
            },
        ],
        edges: vec![
            EdgeDefinition {
                source: "branch".to_string(),
                source_handle: "true".to_string(),
                target: "set-x".to_string(),
                target_handle: "flow-in".to_string(),
            },
            EdgeDefinition {
                source: "branch".to_string(),
                source_handle: "next".to_string(),
                target: "set-y".to_string(),
                target_handle: "flow-in".to_string(),
            },
            EdgeDefinition {
                source: "x-plus-one".to_string(),
                source_handle: "output".to_string(),
                target: "set-y".to_string(),
                target_handle: "value".to_string(),
            },
        ],
        entries: vec![EntryDefinition {
            event: "enable".to_string(),
            node: "branch".to_string(),
        }],
    }
}

#[test]
fn definition_builds_interprets_and_generates_equivalently() {
    let graph = GraphBuilder::new(branch_definition()).build().unwrap();
    let entries: Vec<_> = graph.entries_for(LifecycleEvent::Enable).collect();
    assert_eq!(entries.len(), 1);
    let entry = entries[0];

    // Interpret.
    let mut host = InMemoryHost::new();
    let interpreter = Interpreter::new(&graph);
    let task = interpreter.run(entry, &mut host).unwrap();
    assert_eq!(number(&host, "x"), 5.0);
    assert_eq!(number(&host, "y"), 6.0);

    // Generate, and check the emitted statements appear in the same order
    // as the interpreter's observable side effects.
    let artifact = CodeGenerator::new(&graph).generate(entry).unwrap();
    let source = &artifact.source;
    let x_stmt = source.find("x = 5;").expect("x assignment emitted");
    let y_stmt = source.find("y = (x + 1);").expect("y assignment emitted");
    assert!(x_stmt < y_stmt);

    let sets: Vec<&str> = task
        .events()
        .iter()
        .filter_map(|e| match e {
            ExecutionEvent::VariableSet { name, .. } => Some(name.as_str()),
            _ => None,
        })
        .collect();
    assert_eq!(sets, vec!["x", "y"]);
}

#[test]
fn kind_aliases_map_custom_names_onto_canonical_kinds() {
    let mut definition = branch_definition();
    definition.nodes[3].kind = "branchNode".to_string();
    let graph = GraphBuilder::new(definition)
        .with_kind_alias("branchNode", "if")
        .build()
        .unwrap();

    let mut host = InMemoryHost::new();
    let interpreter = Interpreter::new(&graph);
    let entry = graph.entries_for(LifecycleEvent::Enable).next().unwrap();
    interpreter.run(entry, &mut host).unwrap();
    assert_eq!(number(&host, "x"), 5.0);
}

#[test]
fn builder_rejects_unknown_kinds() {
    let mut definition = branch_definition();
    definition.nodes[3].kind = "mystery".to_string();
    let error = GraphBuilder::new(definition).build().unwrap_err();
    assert!(matches!(
        error,
        GraphError::UnknownKind { kind_name, .. } if kind_name == "mystery"
    ));
}

#[test]
fn builder_rejects_edges_to_missing_nodes() {
    let mut definition = branch_definition();
    definition.edges.push(EdgeDefinition {
        source: "branch".to_string(),
        source_handle: "false".to_string(),
        target: "ghost".to_string(),
        target_handle: "flow-in".to_string(),
    });
    let error = GraphBuilder::new(definition).build().unwrap_err();
    assert!(matches!(
        error,
        GraphError::NodeNotFound { missing_node_id, .. } if missing_node_id == "ghost"
    ));
}

#[test]
fn builder_rejects_mistyped_condition_literals_at_load_time() {
    let mut definition = branch_definition();
    definition.nodes[3]
        .properties
        .insert("condition".to_string(), json!(2.5));
    let error = GraphBuilder::new(definition).build().unwrap_err();
    assert!(matches!(
        error,
        GraphError::TypeMismatch { socket, .. } if socket == "condition"
    ));
}

#[test]
fn builder_rejects_value_sockets_wired_to_flow_nodes() {
    let mut definition = branch_definition();
    // Wire the If condition to a SetVariable node, which produces no value.
    definition.nodes[3].properties.remove("condition");
    definition.edges.push(EdgeDefinition {
        source: "set-x".to_string(),
        source_handle: "output".to_string(),
        target: "branch".to_string(),
        target_handle: "condition".to_string(),
    });
    let error = GraphBuilder::new(definition).build().unwrap_err();
    assert!(matches!(
        error,
        GraphError::Connection { socket, .. } if socket == "condition"
    ));
}

#[test]
fn builder_rejects_unknown_lifecycle_events() {
    let mut definition = branch_definition();
    definition.entries[0].event = "teleport".to_string();
    let error = GraphBuilder::new(definition).build().unwrap_err();
    assert!(matches!(error, GraphError::InvalidEntry { .. }));
}

#[test]
fn builder_requires_declared_loop_variables() {
    let definition = GraphDefinition {
        nodes: vec![NodeDefinition {
            id: "loop".to_string(),
            kind: "for".to_string(),
            name: None,
            properties: [
                ("from".to_string(), json!(0.0)),
                ("to".to_string(), json!(3.0)),
            ]
            .into_iter()
            .collect(),
        }],
        edges: vec![],
        entries: vec![],
    };
    let error = GraphBuilder::new(definition).build().unwrap_err();
    assert!(matches!(
        error,
        GraphError::Connection { socket, .. } if socket == "variable"
    ));
}

#[test]
fn from_json_surfaces_parse_errors() {
    let error = GraphBuilder::from_json("{ not json").unwrap_err();
    assert!(matches!(error, GraphError::JsonParse(_)));
}

#[test]
fn scheduler_honors_timed_waits() {
    let mut graph = Graph::new();
    let finish = graph.add_node(
        "finish",
        NodeKind::SetVariable {
            variable: "finished".to_string(),
            value: FlowReference::literal(Value::Bool(true)),
            next: FlowReference::Unassigned,
        },
    );
    let wait = graph.add_node(
        "wait",
        NodeKind::Wait {
            seconds: FlowReference::literal(Value::Number(3.0)),
            next: FlowReference::node(finish),
        },
    );
    let start = graph.add_node(
        "start",
        NodeKind::SetVariable {
            variable: "started".to_string(),
            value: FlowReference::literal(Value::Bool(true)),
            next: FlowReference::node(wait),
        },
    );

    let mut host = InMemoryHost::new();
    let interpreter = Interpreter::new(&graph);
    let mut scheduler = Scheduler::new();
    let handle = scheduler.spawn(interpreter.spawn(start).unwrap());

    scheduler.tick(&mut host);
    assert_eq!(host.variable("started"), Some(&Value::Bool(true)));
    assert_eq!(host.variable("finished"), None);

    // Two more ticks pass inside the wait window.
    scheduler.tick(&mut host);
    scheduler.tick(&mut host);
    assert_eq!(host.variable("finished"), None);

    // The wait elapses on the fourth tick.
    scheduler.tick(&mut host);
    assert_eq!(host.variable("finished"), Some(&Value::Bool(true)));
    assert!(scheduler.is_idle());
    assert_eq!(scheduler.outcome(handle), Some(&None));
}

#[test]
fn classified_loops_yield_at_iteration_boundaries() {
    let mut graph = Graph::new();
    let n_below_three = graph.add_node(
        "n-below-three",
        NodeKind::Operator {
            op: BinaryOp::SmallerThan,
            left: FlowReference::member("n"),
            right: FlowReference::literal(Value::Number(3.0)),
        },
    );
    let n_plus_one = graph.add_node(
        "n-plus-one",
        NodeKind::Operator {
            op: BinaryOp::Add,
            left: FlowReference::member("n"),
            right: FlowReference::literal(Value::Number(1.0)),
        },
    );
    let bump = graph.add_node(
        "bump",
        NodeKind::SetVariable {
            variable: "n".to_string(),
            value: FlowReference::node(n_plus_one),
            next: FlowReference::Unassigned,
        },
    );
    let pulse = graph.add_node(
        "pulse",
        NodeKind::YieldReturn {
            value: FlowReference::member("n"),
            next: FlowReference::node(bump),
        },
    );
    let loop_node = graph.add_node(
        "loop",
        NodeKind::While {
            condition: FlowReference::node(n_below_three),
            body: FlowReference::node(pulse),
            next: FlowReference::Unassigned,
        },
    );

    let mut host = InMemoryHost::new().with_variable("n", Value::Number(0.0));
    let interpreter = Interpreter::new(&graph);
    let mut scheduler = Scheduler::new();
    let handle = scheduler.spawn(interpreter.spawn(loop_node).unwrap());

    assert!(scheduler.run_until_idle(&mut host, 100).is_some());
    assert_eq!(number(&host, "n"), 3.0);
    let task = scheduler.task(handle).unwrap();
    assert_eq!(
        task.yielded_values(),
        vec![Value::Number(0.0), Value::Number(1.0), Value::Number(2.0)]
    );
}

#[test]
fn lifecycle_fire_spawns_only_matching_entries() {
    let mut graph = Graph::new();
    let on_enable = graph.add_node(
        "on-enable",
        NodeKind::SetVariable {
            variable: "enabled".to_string(),
            value: FlowReference::literal(Value::Bool(true)),
            next: FlowReference::Unassigned,
        },
    );
    let on_destroy = graph.add_node(
        "on-destroy",
        NodeKind::SetVariable {
            variable: "destroyed".to_string(),
            value: FlowReference::literal(Value::Bool(true)),
            next: FlowReference::Unassigned,
        },
    );
    graph.add_entry(LifecycleEvent::Enable, on_enable).unwrap();
    graph.add_entry(LifecycleEvent::Destroy, on_destroy).unwrap();

    let mut host = InMemoryHost::new();
    let interpreter = Interpreter::new(&graph);
    let mut scheduler = Scheduler::new();
    let handles = scheduler.fire(&interpreter, LifecycleEvent::Enable).unwrap();
    assert_eq!(handles.len(), 1);
    scheduler.run_until_idle(&mut host, 10).unwrap();

    assert_eq!(host.variable("enabled"), Some(&Value::Bool(true)));
    assert_eq!(host.variable("destroyed"), None);
}

#[test]
fn stopping_a_scheduled_task_cancels_it() {
    let mut graph = Graph::new();
    let after = graph.add_node(
        "after",
        NodeKind::SetVariable {
            variable: "after".to_string(),
            value: FlowReference::literal(Value::Bool(true)),
            next: FlowReference::Unassigned,
        },
    );
    let pause = graph.add_node(
        "pause",
        NodeKind::YieldReturn {
            value: FlowReference::literal(Value::Number(0.0)),
            next: FlowReference::node(after),
        },
    );

    let mut host = InMemoryHost::new();
    let interpreter = Interpreter::new(&graph);
    let mut scheduler = Scheduler::new();
    let handle = scheduler.spawn(interpreter.spawn(pause).unwrap());

    scheduler.tick(&mut host);
    scheduler.stop(handle, &mut host);
    assert!(scheduler.is_idle());

    // The continuation never ran; cancellation is not a normal completion.
    assert_eq!(host.variable("after"), None);
    let task = scheduler.task(handle).unwrap();
    assert_eq!(task.state(pause), RunState::Failure);
}
