//! The graph executor's main loop (spec §4.2): `SelectReady`, `PickOne`,
//! `RouteOutput`, suspension and on-error handling. Grounded on the teacher's
//! `engine::execute_with_events`'s node-processing loop (started/ran/
//! finished/errored event shape), but the loop itself is new control flow —
//! the teacher pops a linear stack of pending node invocations, while spec.md
//! requires active-path gated readiness and branch-following node selection.

use std::collections::HashMap;

use prana_workflow::{ExecutionGraph, ExecutionStatus, OnErrorPolicy, Value, WorkflowExecution};
use tracing::{debug, info};

use crate::action::{action_error_payload, ActionRegistry};
use crate::config::RuntimeConfig;
use crate::error::EngineError;
use crate::middleware::MiddlewareChain;
use crate::node_executor::{self, NodeOutcome};

/// The 3-state triad every `Execute`/`Resume` call resolves to (spec §6,
/// §9 Open Question 1 — a single `WorkflowExecution` record, not the
/// source's overlapping `Execution`/`WorkflowExecution` pair).
pub enum ExecutionResult {
    Completed { execution: WorkflowExecution, output: Value },
    Suspended { execution: WorkflowExecution },
    Failed { execution: WorkflowExecution },
}

/// Run `execution` from a fresh (pending) state until it reaches a terminal
/// or suspended state (spec §4.2).
pub async fn run(
    graph: &ExecutionGraph,
    mut execution: WorkflowExecution,
    env: &HashMap<String, String>,
    registry: &dyn ActionRegistry,
    config: &RuntimeConfig,
    middleware: &MiddlewareChain,
) -> ExecutionResult {
    execution.status = ExecutionStatus::Running;
    execution.runtime.env = env.clone();
    if execution.runtime.active_nodes.is_empty() {
        execution.runtime.active_nodes.insert(graph.trigger_node_key.clone());
    }
    middleware.execution_started(&execution);
    main_loop(graph, execution, registry, config, middleware).await
}

/// Resume a suspended `execution` with `resume_data` (spec §4.6).
pub async fn resume(
    graph: &ExecutionGraph,
    mut execution: WorkflowExecution,
    resume_data: Value,
    resume_port: Option<String>,
    env: &HashMap<String, String>,
    registry: &dyn ActionRegistry,
    config: &RuntimeConfig,
    middleware: &MiddlewareChain,
) -> Result<ExecutionResult, EngineError> {
    if execution.status != ExecutionStatus::Suspended {
        return Err(EngineError::InvalidExecutionStatus(execution.status));
    }
    let Some(node_key) = execution.suspended_node_key.clone() else {
        return Err(EngineError::InvalidSuspendedExecution);
    };

    execution.rebuild_runtime();
    execution.runtime.env = env.clone();

    let action = registry
        .lookup(&graph.node(&node_key).expect("suspended node exists in graph").node_type)
        .ok_or_else(|| EngineError::ActionNotFound(node_key.clone()))?;
    let port = resume_port.unwrap_or_else(|| action.default_success_port.clone());

    let records = execution.node_executions.get_mut(&node_key).expect("suspended node has a record");
    let record = records.last_mut().expect("suspended node has at least one run");
    record.finish_completed(resume_data.clone(), port.clone());

    execution.status = ExecutionStatus::Running;
    execution.suspended_node_key = None;
    execution.resume_token = None;

    route_output(graph, &mut execution, &node_key, &port, &resume_data);
    middleware.node_completed(&execution, &node_key, &port, &resume_data);

    Ok(main_loop(graph, execution, registry, config, middleware).await)
}

async fn main_loop(
    graph: &ExecutionGraph,
    mut execution: WorkflowExecution,
    registry: &dyn ActionRegistry,
    config: &RuntimeConfig,
    middleware: &MiddlewareChain,
) -> ExecutionResult {
    loop {
        if execution.status.is_terminal() {
            let output = last_output(&execution);
            match execution.status {
                ExecutionStatus::Completed => middleware.execution_completed(&execution, &output),
                ExecutionStatus::Failed => middleware.execution_failed(&execution),
                _ => unreachable!("is_terminal() only matches Completed/Failed"),
            }
            return match execution.status {
                ExecutionStatus::Completed => ExecutionResult::Completed { execution, output },
                _ => ExecutionResult::Failed { execution },
            };
        }

        let ready = select_ready(graph, &execution);
        if ready.is_empty() {
            if execution.runtime.active_nodes.is_empty() {
                execution.status = ExecutionStatus::Completed;
            } else {
                // Every remaining active node is gated on a source that is
                // itself still alive (not dead per `can_still_fire`) but
                // none of them can satisfy each other — a genuine scheduler
                // deadlock rather than "nothing left to do" (spec §4.2 "if
                // any upstream still pending"). Fail rather than silently
                // reporting success with unrun active nodes.
                tracing::error!(
                    active_nodes = ?execution.runtime.active_nodes,
                    "scheduler stalled: active nodes remain but none are ready"
                );
                execution.status = ExecutionStatus::Failed;
            }
            continue;
        }

        let next_key = pick_one(graph, &execution, &ready);
        let node = graph.node(&next_key).expect("ready node exists in graph");
        let run_index = execution.node_executions.get(&next_key).map(|v| v.len() as u32).unwrap_or(0);

        execution.runtime.active_nodes.remove(&next_key);
        execution.start_node_execution(&next_key);
        middleware.node_starting(&execution, &next_key);
        debug!(node_key = %next_key, run_index, "running node");

        let outcome = node_executor::run(node, run_index, graph, &execution, registry, config).await;

        match outcome {
            Err(fatal) => {
                let error = fatal.to_error_data();
                let record = last_record_mut(&mut execution, &next_key);
                record.finish_failed(error.clone());
                middleware.node_failed(&execution, &next_key, &error);
                execution.status = ExecutionStatus::Failed;
                continue;
            }
            Ok(NodeOutcome::Completed { data, port, attempt }) => {
                let record = last_record_mut(&mut execution, &next_key);
                record.finish_completed(data.clone(), port.clone());
                record.attempt_count = attempt;
                middleware.node_completed(&execution, &next_key, &port, &data);
                route_output(graph, &mut execution, &next_key, &port, &data);
            }
            Ok(NodeOutcome::Suspended { kind, data, attempt }) => {
                let record = last_record_mut(&mut execution, &next_key);
                record.finish_suspended(kind.as_str(), data);
                record.attempt_count = attempt;
                middleware.node_suspended(&execution, &next_key);
                execution.status = ExecutionStatus::Suspended;
                execution.suspended_node_key = Some(next_key.clone());
                execution.resume_token = Some(uuid::Uuid::new_v4().to_string());
                middleware.execution_suspended(&execution);
                return ExecutionResult::Suspended { execution };
            }
            Ok(NodeOutcome::Failed {
                error,
                default_success_port,
                default_error_port,
                attempt,
            }) => {
                let record = last_record_mut(&mut execution, &next_key);
                record.finish_failed(error.clone());
                record.attempt_count = attempt;
                middleware.node_failed(&execution, &next_key, &error);

                match node.settings.on_error {
                    OnErrorPolicy::StopWorkflow => {
                        execution.status = ExecutionStatus::Failed;
                        continue;
                    }
                    OnErrorPolicy::Continue => {
                        let payload = error_payload(&error);
                        route_output(graph, &mut execution, &next_key, &default_success_port, &payload);
                    }
                    OnErrorPolicy::ContinueErrorOutput => {
                        let payload = error_payload(&error);
                        route_output(graph, &mut execution, &next_key, &default_error_port, &payload);
                    }
                }
            }
        }
    }
}

fn error_payload(error: &prana_workflow::ErrorData) -> Value {
    error
        .details
        .clone()
        .unwrap_or_else(|| action_error_payload(error.kind.as_str(), &error.message, None))
}

fn last_record_mut<'a>(
    execution: &'a mut WorkflowExecution,
    node_key: &str,
) -> &'a mut prana_workflow::NodeExecution {
    execution
        .node_executions
        .get_mut(node_key)
        .and_then(|runs| runs.last_mut())
        .expect("node execution record was just started")
}

/// The natural "final answer" of a completed run: the most recent output of
/// the last node to actually execute (spec §6 leaves `output`'s exact shape
/// open; this engine treats it as the terminal node's result).
fn last_output(execution: &WorkflowExecution) -> Value {
    execution
        .runtime
        .executed_nodes
        .last()
        .and_then(|key| execution.runtime.nodes.get(key))
        .cloned()
        .unwrap_or(Value::Null)
}

/// `SelectReady` (spec §4.2): nodes in `active_nodes` where every *relevant*
/// incoming connection is satisfied. An incoming connection `(s,p)->(n,q)`
/// is relevant unless `s` has already completed on a different port, or `s`
/// can never fire at all (spec §4.2 "dead branches do not block") — a source
/// that isn't itself active and isn't reachable from anything still active
/// has been permanently skipped (e.g. the untaken side of a conditional) and
/// stops gating readiness, same as a source that fired elsewhere.
fn select_ready(graph: &ExecutionGraph, execution: &WorkflowExecution) -> Vec<String> {
    let runtime = &execution.runtime;
    let mut ready = Vec::new();

    for node_key in &runtime.active_nodes {
        let incoming = graph.incoming(node_key);
        let all_satisfied = incoming.iter().all(|conn| {
            let active = (conn.from_node.clone(), conn.from_port.clone());
            if runtime.active_paths.contains(&active) {
                return true;
            }
            let source_has_fired = runtime.active_paths.iter().any(|(n, _)| n == &conn.from_node);
            let source_is_dead = !source_has_fired && !can_still_fire(graph, execution, &conn.from_node);
            source_has_fired || source_is_dead
        });
        if all_satisfied {
            ready.push(node_key.clone());
        }
    }
    ready
}

/// Whether `target` might still become active: it already is, or it's
/// forward-reachable (via any output port) from a node that's currently
/// active. Used to tell "still waiting on a pending upstream branch" apart
/// from "that upstream branch was never taken and never will be."
fn can_still_fire(graph: &ExecutionGraph, execution: &WorkflowExecution, target: &str) -> bool {
    execution.runtime.active_nodes.iter().any(|active_key| {
        active_key == target
            || prana_workflow::connection::graph::reachable_from(active_key, &graph.connection_map)
                .contains(target)
    })
}

/// `PickOne` (spec §4.2 "branch-following"): prefer the ready node whose
/// triggering upstream completed most recently, then the fewest upstream
/// dependencies, then earliest authoring position.
fn pick_one(graph: &ExecutionGraph, execution: &WorkflowExecution, ready: &[String]) -> String {
    let executed = &execution.runtime.executed_nodes;

    let recency = |key: &str| -> i64 {
        graph
            .incoming(key)
            .iter()
            .filter_map(|conn| executed.iter().rposition(|k| k == &conn.from_node))
            .max()
            .map(|p| p as i64)
            .unwrap_or(-1)
    };
    let unsatisfied_deps = |key: &str| -> usize {
        graph
            .dependency_graph
            .get(key)
            .map(|deps| deps.iter().filter(|d| !execution.runtime.nodes.contains_key(*d)).count())
            .unwrap_or(0)
    };
    let author_position = |key: &str| -> usize {
        graph.node_order.iter().position(|k| k == key).unwrap_or(usize::MAX)
    };

    ready
        .iter()
        .min_by_key(|key| (-recency(key), unsatisfied_deps(key), author_position(key)))
        .cloned()
        .expect("ready is non-empty")
}

/// `RouteOutput` (spec §4.2): store the node's output, assert the active
/// path, append to execution history, and activate every downstream target
/// in authoring order. A target revisited after already having run once is a
/// loop-back (spec §4.5) — its next run gets `loopback = true`.
fn route_output(graph: &ExecutionGraph, execution: &mut WorkflowExecution, node_key: &str, port: &str, data: &Value) {
    execution.runtime.nodes.insert(node_key.to_string(), data.clone());
    execution
        .runtime
        .active_paths
        .insert((node_key.to_string(), port.to_string()));
    execution.runtime.executed_nodes.push(node_key.to_string());

    for conn in graph.outgoing(node_key, port) {
        let already_ran = execution
            .node_executions
            .get(&conn.to_node)
            .map(|runs| !runs.is_empty())
            .unwrap_or(false);
        if already_ran {
            execution.runtime.loopback.insert(conn.to_node.clone(), true);
            info!(node_key = %conn.to_node, "loop-back re-activation");
        }
        execution.runtime.active_nodes.insert(conn.to_node.clone());
    }
}
