//! Public entry points (spec §6 "`compile`, `execute`, `resume`").
//! Grounded on the teacher's `WorkflowEngine::execute`/`execute_with_events`
//! pair, reshaped around `ExecutionContext` and the synchronous
//! `MiddlewareChain` rather than an `mpsc` event channel.

use prana_workflow::{ExecutionGraph, ExecutionMode, Value, ValueMap, Workflow, WorkflowExecution};

use crate::action::ActionRegistry;
use crate::config::RuntimeConfig;
use crate::context::ExecutionContext;
use crate::error::{CompileError, EngineError};
use crate::middleware::MiddlewareChain;
use crate::scheduler::{self, ExecutionResult};

/// Compile `workflow` into a runnable `ExecutionGraph` (spec §4.1).
pub fn compile(
    workflow: &Workflow,
    registry: &dyn ActionRegistry,
    trigger_key: Option<&str>,
) -> Result<ExecutionGraph, CompileError> {
    crate::compiler::compile(workflow, registry, trigger_key)
}

/// Start a fresh execution of `graph` (spec §6 "`execute(graph, context) ->
/// ExecutionResult`"). `context.vars` are merged over `graph.variables`
/// (trigger input, when present among `context.vars`, wins over a workflow
/// variable of the same name).
pub async fn execute(
    graph: &ExecutionGraph,
    context: ExecutionContext,
    registry: &dyn ActionRegistry,
    config: &RuntimeConfig,
    middleware: &MiddlewareChain,
) -> ExecutionResult {
    let mut vars: ValueMap = graph.variables.clone();
    vars.extend(context.vars);

    let execution = WorkflowExecution::new(graph.workflow_id.clone(), 1, ExecutionMode::Trigger, vars);

    scheduler::run(graph, execution, &context.env, registry, config, middleware).await
}

/// Resume a suspended `execution` with `resume_data` on `resume_port` (spec
/// §4.6); `resume_port` defaults to the suspended node's declared default
/// success port when omitted.
pub async fn resume(
    graph: &ExecutionGraph,
    execution: WorkflowExecution,
    resume_data: Value,
    resume_port: Option<String>,
    context: ExecutionContext,
    registry: &dyn ActionRegistry,
    config: &RuntimeConfig,
    middleware: &MiddlewareChain,
) -> Result<ExecutionResult, EngineError> {
    scheduler::resume(graph, execution, resume_data, resume_port, &context.env, registry, config, middleware).await
}
