//! End-to-end scenario tests driving whole workflows through `compile` +
//! `execute`/`resume`, one test per scenario (S1-S8).

use prana_engine::testing::fixture_registry;
use prana_engine::{compile, execute, resume, ExecutionContext, ExecutionResult, MiddlewareChain, RuntimeConfig};
use prana_workflow::{Connection, Node, OnErrorPolicy, Value, WorkflowBuilder};

fn ctx_with_var(key: &str, value: Value) -> ExecutionContext {
    ExecutionContext::new().with_var(key, value)
}

/// S1 — linear workflow: `t -> a -> b`, all pass-through.
#[tokio::test]
async fn s1_linear_workflow_completes_in_order() {
    let registry = fixture_registry();
    let wf = WorkflowBuilder::new("s1")
        .node(Node::new("t", "core.trigger"))
        .node(Node::new("a", "core.passThrough"))
        .node(Node::new("b", "core.passThrough"))
        .connect(Connection::main("t", "a"))
        .connect(Connection::main("a", "b"))
        .build()
        .unwrap();
    let graph = compile(&wf, &registry, None).unwrap();
    let config = RuntimeConfig::default();
    let middleware = MiddlewareChain::new();

    let context = ctx_with_var("x", Value::Integer(1));
    let result = execute(&graph, context, &registry, &config, &middleware).await;

    match result {
        ExecutionResult::Completed { execution, .. } => {
            assert_eq!(execution.runtime.executed_nodes, vec!["t", "a", "b"]);
            for (node, port) in [("t", "main"), ("a", "main"), ("b", "main")] {
                assert!(execution.runtime.active_paths.contains(&(node.to_string(), port.to_string())));
            }
        }
        _ => panic!("expected completed execution"),
    }
}

/// S2 — diamond: `t -> b1`, `t -> b2`, `b1`/`b2` -> `merge`. `merge` sees
/// both upstream outputs as a list.
#[tokio::test]
async fn s2_diamond_merge_sees_both_branches_as_a_list() {
    let registry = fixture_registry();
    let wf = WorkflowBuilder::new("s2")
        .node(Node::new("t", "core.trigger"))
        .node(Node::new("b1", "core.passThrough"))
        .node(Node::new("b2", "core.passThrough"))
        .node(Node::new("merge", "core.passThrough"))
        .connect(Connection::main("t", "b1"))
        .connect(Connection::main("t", "b2"))
        .connect(Connection::main("b1", "merge"))
        .connect(Connection::main("b2", "merge"))
        .build()
        .unwrap();
    let graph = compile(&wf, &registry, None).unwrap();
    let config = RuntimeConfig::default();
    let middleware = MiddlewareChain::new();

    let result = execute(&graph, ExecutionContext::new(), &registry, &config, &middleware).await;

    match result {
        ExecutionResult::Completed { execution, .. } => {
            let order = &execution.runtime.executed_nodes;
            assert_eq!(order[0], "t");
            assert_eq!(order[3], "merge");
            assert!(order[1..3].contains(&"b1".to_string()) && order[1..3].contains(&"b2".to_string()));
            assert_eq!(execution.node_executions["merge"].len(), 1);
        }
        _ => panic!("expected completed execution"),
    }
}

/// S3 — diamond with a failing branch: `b1` fails with `stop_workflow`.
/// `merge` never runs.
#[tokio::test]
async fn s3_diamond_with_failing_branch_fails_execution() {
    let registry = fixture_registry();
    let wf = WorkflowBuilder::new("s3")
        .node(Node::new("t", "core.trigger"))
        .node(Node::new("b1", "core.fail"))
        .node(Node::new("b2", "core.passThrough"))
        .node(Node::new("merge", "core.passThrough"))
        .connect(Connection::main("t", "b1"))
        .connect(Connection::main("t", "b2"))
        .connect(Connection::main("b1", "merge"))
        .connect(Connection::main("b2", "merge"))
        .build()
        .unwrap();
    let graph = compile(&wf, &registry, None).unwrap();
    let config = RuntimeConfig::default();
    let middleware = MiddlewareChain::new();

    let result = execute(&graph, ExecutionContext::new(), &registry, &config, &middleware).await;

    match result {
        ExecutionResult::Failed { execution } => {
            assert!(!execution.node_executions.contains_key("merge"));
        }
        _ => panic!("expected failed execution"),
    }
}

/// S4 — `continue_error_output`: node `n` fails, its `error` port is wired
/// to `h`, which receives the error payload.
#[tokio::test]
async fn s4_continue_error_output_routes_error_payload_downstream() {
    let registry = fixture_registry();
    let mut n = Node::new("n", "core.fail");
    n.settings.on_error = OnErrorPolicy::ContinueErrorOutput;
    let wf = WorkflowBuilder::new("s4")
        .node(Node::new("t", "core.trigger"))
        .node(n)
        .node(Node::new("h", "core.passThrough"))
        .connect(Connection::main("t", "n"))
        .connect(Connection::new("n", "error", "h", "main"))
        .build()
        .unwrap();
    let graph = compile(&wf, &registry, None).unwrap();
    let config = RuntimeConfig::default();
    let middleware = MiddlewareChain::new();

    let result = execute(&graph, ExecutionContext::new(), &registry, &config, &middleware).await;

    match result {
        ExecutionResult::Completed { execution, .. } => {
            let n_run = &execution.node_executions["n"][0];
            assert_eq!(n_run.output_port.as_deref(), Some("error"));
            let h_run = &execution.node_executions["h"][0];
            let h_output = h_run.output_data.as_ref().unwrap();
            assert!(matches!(h_output, Value::Object(obj) if obj.get("code").is_some()));
        }
        _ => panic!("expected completed execution"),
    }
}

/// S5 — conditional branching on `$input.main.age >= 18`: only the taken
/// side's nodes run.
#[tokio::test]
async fn s5_conditional_branching_takes_one_side_only() {
    async fn run_with_age(age: i64) -> prana_workflow::WorkflowExecution {
        let registry = fixture_registry();
        let wf = WorkflowBuilder::new("s5")
            .node(Node::new("t", "core.trigger"))
            .node(Node::new("age", "core.setValue").with_param("value", Value::Integer(age)))
            .node(
                Node::new("cond", "core.condition")
                    .with_param("result", Value::String("{{ $input.main >= 18 }}".to_string())),
            )
            .node(Node::new("adult", "core.passThrough"))
            .node(Node::new("minor", "core.passThrough"))
            .connect(Connection::main("t", "age"))
            .connect(Connection::main("age", "cond"))
            .connect(Connection::new("cond", "true", "adult", "main"))
            .connect(Connection::new("cond", "false", "minor", "main"))
            .build()
            .unwrap();
        let graph = compile(&wf, &registry, None).unwrap();
        let config = RuntimeConfig::default();
        let middleware = MiddlewareChain::new();

        match execute(&graph, ExecutionContext::new(), &registry, &config, &middleware).await {
            ExecutionResult::Completed { execution, .. } => execution,
            _ => panic!("expected completed execution"),
        }
    }

    let adult_run = run_with_age(25).await;
    assert!(adult_run.node_executions.contains_key("adult"));
    assert!(!adult_run.node_executions.contains_key("minor"));
    assert!(!adult_run.runtime.active_paths.contains(&("cond".to_string(), "false".to_string())));

    let minor_run = run_with_age(16).await;
    assert!(minor_run.node_executions.contains_key("minor"));
    assert!(!minor_run.node_executions.contains_key("adult"));
    assert!(!minor_run.runtime.active_paths.contains(&("cond".to_string(), "true".to_string())));
}

/// S6 — counter loop: `increment` loops back on `cond` until `run_index`
/// reaches 3, then exits to `complete`.
#[tokio::test]
async fn s6_counter_loop_runs_increment_four_times() {
    let registry = fixture_registry();
    let wf = WorkflowBuilder::new("s6")
        .node(Node::new("t", "core.trigger"))
        .node(Node::new("init", "core.setValue").with_param("value", Value::Integer(0)))
        .node(
            Node::new("increment", "core.setValue")
                .with_param("value", Value::String("{{ $execution.run_index + 1 }}".to_string())),
        )
        .node(
            Node::new("cond", "core.condition")
                .with_param("result", Value::String("{{ $execution.run_index < 3 }}".to_string())),
        )
        .node(Node::new("complete", "core.passThrough"))
        .connect(Connection::main("t", "init"))
        .connect(Connection::main("init", "increment"))
        .connect(Connection::main("increment", "cond"))
        .connect(Connection::new("cond", "true", "increment", "main"))
        .connect(Connection::new("cond", "false", "complete", "main"))
        .build_unchecked();
    let graph = compile(&wf, &registry, None).unwrap();
    let config = RuntimeConfig::default();
    let middleware = MiddlewareChain::new();

    let result = execute(&graph, ExecutionContext::new(), &registry, &config, &middleware).await;

    match result {
        ExecutionResult::Completed { execution, .. } => {
            let increment_runs = &execution.node_executions["increment"];
            assert_eq!(increment_runs.len(), 4);
            let run_indices: Vec<u32> = increment_runs.iter().map(|r| r.run_index).collect();
            assert_eq!(run_indices, vec![0, 1, 2, 3]);
            assert_eq!(execution.node_executions["complete"].len(), 1);
        }
        _ => panic!("expected completed execution"),
    }
}

/// S7 — sub-workflow suspend/resume: `sub` suspends on its first run; a
/// follow-up `Resume` carries `{result: 42}` through to `out`.
#[tokio::test]
async fn s7_suspend_then_resume_carries_resume_data_downstream() {
    let registry = fixture_registry();
    let wf = WorkflowBuilder::new("s7")
        .node(Node::new("t", "core.trigger"))
        .node(Node::new("sub", "core.suspend"))
        .node(Node::new("out", "core.passThrough"))
        .connect(Connection::main("t", "sub"))
        .connect(Connection::main("sub", "out"))
        .build()
        .unwrap();
    let graph = compile(&wf, &registry, None).unwrap();
    let config = RuntimeConfig::default();
    let middleware = MiddlewareChain::new();

    let suspended = match execute(&graph, ExecutionContext::new(), &registry, &config, &middleware).await {
        ExecutionResult::Suspended { execution } => execution,
        _ => panic!("expected suspended execution"),
    };
    assert_eq!(suspended.suspended_node_key.as_deref(), Some("sub"));

    let mut resume_data = prana_workflow::ValueMap::new();
    resume_data.insert("result".to_string(), Value::Integer(42));

    let resumed = resume(
        &graph,
        suspended,
        Value::Object(resume_data),
        None,
        ExecutionContext::new(),
        &registry,
        &config,
        &middleware,
    )
    .await
    .unwrap();

    match resumed {
        ExecutionResult::Completed { execution, .. } => {
            let out_run = &execution.node_executions["out"][0];
            let out_data = out_run.output_data.as_ref().unwrap();
            assert!(matches!(out_data, Value::Object(obj) if obj.get("result") == Some(&Value::Integer(42))));
        }
        _ => panic!("expected completed execution after resume"),
    }
}

/// S8 — a template exceeding the configured size limit fails the node and,
/// under the default `stop_workflow` policy, the execution.
#[tokio::test]
async fn s8_oversized_template_fails_under_stop_workflow() {
    let registry = fixture_registry();
    let huge_literal = format!("{{{{ \"{}\" }}}}", "a".repeat(2_000_000));
    let wf = WorkflowBuilder::new("s8")
        .node(Node::new("t", "core.trigger"))
        .node(Node::new("n", "core.setValue").with_param("value", Value::String(huge_literal)))
        .connect(Connection::main("t", "n"))
        .build()
        .unwrap();
    let graph = compile(&wf, &registry, None).unwrap();
    let config = RuntimeConfig::default();
    let middleware = MiddlewareChain::new();

    let result = execute(&graph, ExecutionContext::new(), &registry, &config, &middleware).await;

    match result {
        ExecutionResult::Failed { execution } => {
            let n_run = &execution.node_executions["n"][0];
            let error = n_run.error_data.as_ref().unwrap();
            assert_eq!(error.kind, prana_workflow::ErrorKind::TemplateLimit);
        }
        _ => panic!("expected failed execution"),
    }
}
