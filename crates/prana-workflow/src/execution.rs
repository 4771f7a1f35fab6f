//! Mutable execution state (spec §3 "WorkflowExecution", "NodeExecution").

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use uuid::Uuid;

use crate::error::ErrorData;
use crate::value::{Value, ValueMap};

/// How an execution was triggered. Carried through for audit/telemetry
/// purposes; the engine itself treats all modes alike.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionMode {
    #[default]
    Manual,
    Trigger,
    Retry,
}

/// Execution status machine (spec §4.2): `pending -> running -> {completed,
/// failed, suspended}`; `suspended -> running` on `Resume`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    #[default]
    Pending,
    Running,
    Completed,
    Failed,
    Suspended,
}

impl ExecutionStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, ExecutionStatus::Completed | ExecutionStatus::Failed)
    }
}

/// Status of a single node run.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum NodeExecutionStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Suspended,
}

/// One run of one node within an execution (spec §3 "NodeExecution",
/// immutable once recorded — a new record is appended for loop-backs and
/// retries are folded into a single record via `attempt_count`).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeExecution {
    pub node_key: String,
    pub execution_index: u64,
    pub run_index: u32,
    pub status: NodeExecutionStatus,
    pub started_at: chrono::DateTime<chrono::Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<chrono::DateTime<chrono::Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_data: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_port: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_data: Option<ErrorData>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suspension_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suspension_data: Option<Value>,
    /// Number of attempts the node executor made before this record was
    /// finalized (retry policy, spec §4.3 step 5). Not in spec.md's field
    /// list verbatim but needed to surface retry counts, as spec.md
    /// requires ("Retry count is recorded").
    #[serde(default = "one")]
    pub attempt_count: u32,
}

fn one() -> u32 {
    1
}

impl NodeExecution {
    pub fn new_pending(node_key: impl Into<String>, execution_index: u64, run_index: u32) -> Self {
        Self {
            node_key: node_key.into(),
            execution_index,
            run_index,
            status: NodeExecutionStatus::Running,
            started_at: chrono::Utc::now(),
            completed_at: None,
            duration_ms: None,
            output_data: None,
            output_port: None,
            error_data: None,
            suspension_type: None,
            suspension_data: None,
            attempt_count: 1,
        }
    }

    pub fn finish_completed(&mut self, output_data: Value, output_port: impl Into<String>) {
        self.status = NodeExecutionStatus::Completed;
        self.output_data = Some(output_data);
        self.output_port = Some(output_port.into());
        self.finish();
    }

    pub fn finish_failed(&mut self, error_data: ErrorData) {
        self.status = NodeExecutionStatus::Failed;
        self.error_data = Some(error_data);
        self.finish();
    }

    pub fn finish_suspended(&mut self, suspension_type: impl Into<String>, data: Value) {
        self.status = NodeExecutionStatus::Suspended;
        self.suspension_type = Some(suspension_type.into());
        self.suspension_data = Some(data);
        self.finish();
    }

    fn finish(&mut self) {
        let now = chrono::Utc::now();
        self.completed_at = Some(now);
        self.duration_ms = Some((now - self.started_at).num_milliseconds());
    }
}

/// Transient, derived state rebuilt from `node_executions` on load; never
/// persisted (spec §3 "A transient `runtime` sub-record").
#[derive(Debug, Clone, Default)]
pub struct Runtime {
    /// Most-recent output per node key.
    pub nodes: HashMap<String, Value>,
    pub executed_nodes: Vec<String>,
    pub active_paths: HashSet<(String, String)>,
    pub active_nodes: HashSet<String>,
    pub env: HashMap<String, String>,
    /// True for a node's current run iff it was reached via a loop-back
    /// (spec §4.2 step 5, §4.5).
    pub loopback: HashMap<String, bool>,
}

impl Runtime {
    /// Rebuild from a `WorkflowExecution`'s persisted `node_executions`,
    /// used on `Resume` (spec §4.6 step 1) and whenever state is loaded.
    pub fn rebuild(node_executions: &HashMap<String, Vec<NodeExecution>>) -> Self {
        let mut runtime = Runtime::default();
        let mut all: Vec<&NodeExecution> = node_executions.values().flatten().collect();
        all.sort_by_key(|ne| ne.execution_index);

        for ne in all {
            runtime.executed_nodes.push(ne.node_key.clone());
            if ne.status == NodeExecutionStatus::Completed {
                if let (Some(data), Some(port)) = (&ne.output_data, &ne.output_port) {
                    runtime.nodes.insert(ne.node_key.clone(), data.clone());
                    runtime
                        .active_paths
                        .insert((ne.node_key.clone(), port.clone()));
                }
            }
            runtime
                .loopback
                .insert(ne.node_key.clone(), ne.run_index > 0);
        }
        runtime
    }
}

/// Mutable state for one workflow run (spec §3 "WorkflowExecution").
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowExecution {
    pub id: String,
    pub workflow_id: String,
    pub workflow_version: u32,
    pub execution_mode: ExecutionMode,
    pub status: ExecutionStatus,
    pub vars: ValueMap,
    pub current_execution_index: u64,
    pub node_executions: HashMap<String, Vec<NodeExecution>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suspended_node_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resume_token: Option<String>,

    /// Rebuilt on load, excluded from serialization (spec §3, §6
    /// "Persisted execution layout").
    #[serde(skip, default)]
    pub runtime: Runtime,
}

impl WorkflowExecution {
    pub fn new(workflow_id: impl Into<String>, workflow_version: u32, mode: ExecutionMode, vars: ValueMap) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            workflow_id: workflow_id.into(),
            workflow_version,
            execution_mode: mode,
            status: ExecutionStatus::Pending,
            vars,
            current_execution_index: 0,
            node_executions: HashMap::new(),
            suspended_node_key: None,
            resume_token: None,
            runtime: Runtime::default(),
        }
    }

    /// Rebuild `runtime` from `node_executions`, used after deserializing a
    /// persisted execution (spec §4.6 step 1).
    pub fn rebuild_runtime(&mut self) {
        self.runtime = Runtime::rebuild(&self.node_executions);
    }

    /// Allocate the next `execution_index` and `run_index` for `node_key`
    /// and append a fresh pending `NodeExecution`.
    pub fn start_node_execution(&mut self, node_key: &str) -> &mut NodeExecution {
        let execution_index = self.current_execution_index;
        self.current_execution_index += 1;
        let run_index = self
            .node_executions
            .get(node_key)
            .map(|v| v.len() as u32)
            .unwrap_or(0);

        let ne = NodeExecution::new_pending(node_key, execution_index, run_index);
        let entries = self.node_executions.entry(node_key.to_string()).or_default();
        entries.push(ne);
        entries.last_mut().unwrap()
    }

    /// All recorded node executions, sorted by `execution_index`
    /// (spec §8 "sorting `node_executions` by `execution_index`").
    pub fn ordered_executions(&self) -> Vec<&NodeExecution> {
        let mut all: Vec<&NodeExecution> = self.node_executions.values().flatten().collect();
        all.sort_by_key(|ne| ne.execution_index);
        all
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_index_increments_per_node() {
        let mut exec = WorkflowExecution::new("wf", 1, ExecutionMode::Manual, ValueMap::new());
        exec.start_node_execution("a").finish_completed(Value::Null, "main");
        exec.start_node_execution("a").finish_completed(Value::Null, "main");
        let runs = &exec.node_executions["a"];
        assert_eq!(runs[0].run_index, 0);
        assert_eq!(runs[1].run_index, 1);
    }

    #[test]
    fn execution_index_strictly_increases() {
        let mut exec = WorkflowExecution::new("wf", 1, ExecutionMode::Manual, ValueMap::new());
        exec.start_node_execution("a").finish_completed(Value::Null, "main");
        exec.start_node_execution("b").finish_completed(Value::Null, "main");
        let ordered = exec.ordered_executions();
        assert!(ordered[0].execution_index < ordered[1].execution_index);
    }

    #[test]
    fn runtime_rebuild_recovers_active_paths() {
        let mut exec = WorkflowExecution::new("wf", 1, ExecutionMode::Manual, ValueMap::new());
        exec.start_node_execution("a").finish_completed(Value::Integer(1), "main");
        exec.rebuild_runtime();
        assert!(exec
            .runtime
            .active_paths
            .contains(&("a".to_string(), "main".to_string())));
    }
}
