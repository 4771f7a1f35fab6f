//! The Node Executor (spec §4.3): routes a node's inputs, renders its
//! params, dispatches to its action with retry, and classifies the result
//! for the scheduler. Grounded on the teacher's `engine::{execute_node,
//! resolve_node_parameters, build_node_data_for_expressions}`, replacing the
//! n8n-specific `$json`/`$binary` context construction with the spec's
//! `$input`/`$nodes`/`$variables`/`$execution` shape and the teacher's fixed
//! node-type dispatch with the `ActionRegistry` lookup.

use std::panic::AssertUnwindSafe;
use std::time::Duration;

use futures::FutureExt;
use prana_workflow::{
    ErrorData, ErrorKind, ExecutionGraph, LoopRole, Node, Runtime, Value, ValueMap, WorkflowExecution,
};
use tracing::{instrument, warn};

use crate::action::{action_error_payload, ActionRegistry, ActionResult, SuspensionType};
use crate::config::RuntimeConfig;
use crate::error::EngineError;
use crate::expression::{render_params, EvalContext};

/// A node run's classified outcome (spec §4.3 step 4), used by the
/// scheduler's `RouteOutput`/on-error handling (spec §4.2).
pub enum NodeOutcome {
    Completed {
        data: Value,
        port: String,
        attempt: u32,
    },
    Failed {
        error: ErrorData,
        default_success_port: String,
        default_error_port: String,
        attempt: u32,
    },
    Suspended {
        kind: SuspensionType,
        data: Value,
        attempt: u32,
    },
}

/// Step 1: build `routed_input` from the node's active incoming connections,
/// grouped by `to_port`, ordered by when each source actually completed
/// (spec §4.3 step 1 "ordered list in arrival order").
pub fn route_inputs(node_key: &str, graph: &ExecutionGraph, runtime: &Runtime) -> ValueMap {
    let mut by_port: std::collections::HashMap<String, Vec<(usize, Value)>> = std::collections::HashMap::new();

    for conn in graph.incoming(node_key) {
        let active = (conn.from_node.clone(), conn.from_port.clone());
        if !runtime.active_paths.contains(&active) {
            continue;
        }
        let Some(value) = runtime.nodes.get(&conn.from_node) else {
            continue;
        };
        let arrival = runtime
            .executed_nodes
            .iter()
            .rposition(|k| k == &conn.from_node)
            .unwrap_or(usize::MAX);
        by_port.entry(conn.to_port.clone()).or_default().push((arrival, value.clone()));
    }

    let mut routed = ValueMap::new();
    for (port, mut values) in by_port {
        values.sort_by_key(|(arrival, _)| *arrival);
        let values: Vec<Value> = values.into_iter().map(|(_, v)| v).collect();
        let value = if values.len() == 1 {
            values.into_iter().next().unwrap()
        } else {
            Value::Array(values)
        };
        routed.insert(port, value);
    }
    routed
}

/// Step 2 context: `{$input, $nodes, $variables, $execution}` (spec §4.3
/// step 2, §4.5 "the executor exposes this as `$execution.loop`").
fn build_eval_context(
    node_key: &str,
    routed_input: &ValueMap,
    graph: &ExecutionGraph,
    execution: &WorkflowExecution,
    run_index: u32,
) -> EvalContext {
    let nodes_value = Value::Object(execution.runtime.nodes.clone());
    let variables_value = Value::Object(execution.vars.clone());

    let loopback = execution.runtime.loopback.get(node_key).copied().unwrap_or(false);
    let loop_meta = graph.loop_metadata.get(node_key);
    let loop_value = Value::Object(ValueMap::from_iter([
        (
            "loop_level".to_string(),
            Value::Integer(loop_meta.map(|m| m.loop_level as i64).unwrap_or(0)),
        ),
        (
            "loop_role".to_string(),
            Value::String(loop_role_str(loop_meta.map(|m| m.loop_role).unwrap_or_default()).to_string()),
        ),
        (
            "loop_ids".to_string(),
            Value::Array(
                loop_meta
                    .map(|m| m.loop_ids.iter().cloned().map(Value::String).collect())
                    .unwrap_or_default(),
            ),
        ),
    ]));

    let execution_value = Value::Object(ValueMap::from_iter([
        ("run_index".to_string(), Value::Integer(run_index as i64)),
        (
            "execution_index".to_string(),
            Value::Integer(execution.current_execution_index as i64),
        ),
        ("loopback".to_string(), Value::Bool(loopback)),
        ("loop".to_string(), loop_value),
    ]));

    EvalContext::new(Value::Object(routed_input.clone()), nodes_value, variables_value, execution_value)
}

fn loop_role_str(role: LoopRole) -> &'static str {
    match role {
        LoopRole::NotInLoop => "not_in_loop",
        LoopRole::StartLoop => "start_loop",
        LoopRole::InLoop => "in_loop",
        LoopRole::EndLoop => "end_loop",
    }
}

/// Run one node to completion, failure or suspension (spec §4.3 steps 1-5).
/// Returns `Err(EngineError)` only for the two *fatal* conditions (spec §4.7
/// table: action not found, undeclared output port) — everything else comes
/// back as `NodeOutcome::Failed` for the scheduler to apply the node's
/// on-error policy to.
#[instrument(skip(node, graph, execution, registry, config), fields(node_key = %node.key))]
pub async fn run(
    node: &Node,
    run_index: u32,
    graph: &ExecutionGraph,
    execution: &WorkflowExecution,
    registry: &dyn ActionRegistry,
    config: &RuntimeConfig,
) -> Result<NodeOutcome, EngineError> {
    let action = registry
        .lookup(&node.node_type)
        .ok_or_else(|| EngineError::ActionNotFound(node.node_type.clone()))?;

    let routed_input = route_inputs(&node.key, graph, &execution.runtime);
    let eval_ctx = build_eval_context(&node.key, &routed_input, graph, execution, run_index);

    let rendered = match render_params(&Value::Object(node.params.clone()), &eval_ctx, config) {
        Ok(value) => value,
        Err(err) => {
            return Ok(NodeOutcome::Failed {
                error: ErrorData::new(err.kind(), err.to_string()),
                default_success_port: action.default_success_port.clone(),
                default_error_port: action.default_error_port.clone(),
                attempt: 1,
            });
        }
    };
    let rendered_params = rendered.as_object().cloned().unwrap_or_default();

    let timeout = node
        .settings
        .timeout_seconds
        .or(config.default_node_timeout_seconds)
        .map(Duration::from_secs);

    let mut attempt: u32 = 1;
    loop {
        let call = AssertUnwindSafe(action.handler.handle(&rendered_params, &routed_input, &execution.vars)).catch_unwind();

        let dispatched: Result<ActionResult, ErrorData> = match timeout {
            Some(duration) => match tokio::time::timeout(duration, call).await {
                Ok(Ok(result)) => Ok(result),
                Ok(Err(panic)) => Err(ErrorData::new(ErrorKind::ActionException, panic_message(panic))),
                Err(_) => Err(ErrorData::new(ErrorKind::Timeout, format!("node '{}' timed out", node.key))),
            },
            None => match call.await {
                Ok(result) => Ok(result),
                Err(panic) => Err(ErrorData::new(ErrorKind::ActionException, panic_message(panic))),
            },
        };

        let (error, kind) = match dispatched {
            Ok(ActionResult::Ok { data, port }) => {
                let port = port.unwrap_or_else(|| action.default_success_port.clone());
                if !action.has_output_port(&port) {
                    return Err(EngineError::InvalidOutputPort {
                        action: action.name.clone(),
                        port,
                    });
                }
                return Ok(NodeOutcome::Completed { data, port, attempt });
            }
            Ok(ActionResult::Suspend { kind, data }) => {
                return Ok(NodeOutcome::Suspended { kind, data, attempt })
            }
            Ok(ActionResult::Err { code, message, details }) => {
                let payload = action_error_payload(&code, &message, details.as_ref());
                (
                    ErrorData::new(ErrorKind::ActionError, message).with_details(payload),
                    ErrorKind::ActionError,
                )
            }
            Err(error) => {
                let kind = error.kind;
                (error, kind)
            }
        };

        if node.settings.retry.max_attempts > attempt && node.settings.retry.applies_to(kind) {
            let delay = node.settings.retry.backoff.delay_for(attempt);
            warn!(node_key = %node.key, attempt, delay_ms = delay, ?kind, "retrying failed action");
            tokio::time::sleep(Duration::from_millis(delay)).await;
            attempt += 1;
            continue;
        }

        return Ok(NodeOutcome::Failed {
            error,
            default_success_port: action.default_success_port.clone(),
            default_error_port: action.default_error_port.clone(),
            attempt,
        });
    }
}

fn panic_message(panic: Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "action handler panicked".to_string()
    }
}
