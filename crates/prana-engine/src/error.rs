//! Error types for the compiler and the graph/node executors.

use prana_workflow::{ErrorData, ErrorKind, WorkflowError};
use thiserror::Error;

/// Failures from the workflow compiler (spec §4.1, §7 `compile_error`).
#[derive(Error, Debug, Clone)]
pub enum CompileError {
    #[error("workflow error: {0}")]
    Workflow(#[from] WorkflowError),

    #[error("no trigger nodes found")]
    NoTriggerNodes,

    #[error("multiple trigger nodes found, specify one")]
    MultipleTriggersFound,

    #[error("trigger node not found: {0}")]
    TriggerNodeNotFound(String),

    #[error("node is not a trigger: {0}")]
    NodeNotTrigger(String),
}

impl CompileError {
    pub fn kind(&self) -> ErrorKind {
        ErrorKind::CompileError
    }
}

/// Fatal engine failures: conditions §4.7 classifies as "fatal" rather than
/// subject to a node's on-error policy. These terminate the execution with
/// `Failed`, never propagate as a Rust panic.
#[derive(Error, Debug, Clone)]
pub enum EngineError {
    #[error("action not found: {0}")]
    ActionNotFound(String),

    #[error("action '{action}' returned undeclared output port '{port}'")]
    InvalidOutputPort { action: String, port: String },

    #[error("{0}")]
    Compile(#[from] CompileError),

    #[error("resume called on execution in status {0:?}, expected suspended")]
    InvalidExecutionStatus(prana_workflow::ExecutionStatus),

    #[error("suspended execution is missing suspended_node_key")]
    InvalidSuspendedExecution,
}

impl EngineError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            EngineError::ActionNotFound(_) => ErrorKind::ActionNotFound,
            EngineError::InvalidOutputPort { .. } => ErrorKind::InvalidOutputPort,
            EngineError::Compile(e) => e.kind(),
            EngineError::InvalidExecutionStatus(_) => ErrorKind::InvalidExecutionStatus,
            EngineError::InvalidSuspendedExecution => ErrorKind::InvalidSuspendedExecution,
        }
    }

    pub fn to_error_data(&self) -> ErrorData {
        ErrorData::new(self.kind(), self.to_string())
    }
}
