//! Error types for the workflow data model.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised while building or validating a [`crate::Workflow`].
#[derive(Error, Debug, Clone)]
pub enum WorkflowError {
    #[error("node not found: {0}")]
    NodeNotFound(String),

    #[error("duplicate node key: {0}")]
    DuplicateNodeKey(String),

    #[error("invalid workflow: {0}")]
    InvalidWorkflow(String),
}

/// The closed set of error kinds an action or the engine can classify a
/// failure as (spec §7). Carried on [`crate::NodeExecution::error_data`]
/// and on synthesized on-error-policy outputs.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    CompileError,
    ActionNotFound,
    InvalidOutputPort,
    ActionError,
    ActionException,
    TemplateError,
    TemplateLimit,
    Timeout,
    InvalidExecutionStatus,
    InvalidSuspendedExecution,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::CompileError => "compile_error",
            ErrorKind::ActionNotFound => "action_not_found",
            ErrorKind::InvalidOutputPort => "invalid_output_port",
            ErrorKind::ActionError => "action_error",
            ErrorKind::ActionException => "action_exception",
            ErrorKind::TemplateError => "template_error",
            ErrorKind::TemplateLimit => "template_limit",
            ErrorKind::Timeout => "timeout",
            ErrorKind::InvalidExecutionStatus => "invalid_execution_status",
            ErrorKind::InvalidSuspendedExecution => "invalid_suspended_execution",
        }
    }
}

/// The `{code, message, details?}` payload shape spec §7 assigns to
/// `action_error` and the data every on-error-policy synthetic completion
/// carries so downstream nodes can read `$input.main.code` etc.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorData {
    pub kind: ErrorKind,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<crate::Value>,
}

impl ErrorData {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: crate::Value) -> Self {
        self.details = Some(details);
        self
    }
}
