//! The caller-supplied context threaded through `Execute`/`Resume` (spec §6
//! "`context` carries: `vars`, `env`, optional `workflow_loader`").

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use prana_workflow::{Value, ValueMap, Workflow};

/// Looks up a sub-workflow by id, used by sub-workflow actions (spec §1
/// "the set of concrete integrations ... only the action *contract* is
/// specified"; loading itself is a host concern).
#[async_trait]
pub trait WorkflowLoader: Send + Sync {
    async fn load(&self, workflow_id: &str) -> Option<Workflow>;
}

/// Execution context passed to `Execute`/`Resume` (spec §6).
#[derive(Clone, Default)]
pub struct ExecutionContext {
    /// Merged with workflow `variables` and trigger input at start (spec §3
    /// "`vars` (workflow variables merged with trigger input)").
    pub vars: ValueMap,
    pub env: HashMap<String, String>,
    pub workflow_loader: Option<Arc<dyn WorkflowLoader>>,
}

impl ExecutionContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_var(mut self, key: impl Into<String>, value: Value) -> Self {
        self.vars.insert(key.into(), value);
        self
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    pub fn with_workflow_loader(mut self, loader: Arc<dyn WorkflowLoader>) -> Self {
        self.workflow_loader = Some(loader);
        self
    }
}
