//! Execution middleware: side-effect-only hooks over the 8 named execution
//! events (spec §5 "a chain of call-through hooks invoked around execution
//! and node-level events"). Grounded on the teacher's `engine::ExecutionEvent`
//! (same 8-ish event set), reshaped from an `mpsc::Sender<ExecutionEvent>`
//! fan-out into a synchronous `Vec<Box<dyn Middleware>>` chain since spec.md
//! §9 resolves the duplication in favor of direct call-through hooks rather
//! than a channel.

use prana_workflow::{ErrorData, Value, WorkflowExecution};

/// One hook interface, invoked in registration order around every execution
/// and node-level transition (spec §5). All methods default to a no-op so a
/// middleware only needs to implement the events it cares about.
pub trait Middleware: Send + Sync {
    fn execution_started(&self, _execution: &WorkflowExecution) {}
    fn node_starting(&self, _execution: &WorkflowExecution, _node_key: &str) {}
    fn node_completed(&self, _execution: &WorkflowExecution, _node_key: &str, _port: &str, _data: &Value) {}
    fn node_suspended(&self, _execution: &WorkflowExecution, _node_key: &str) {}
    fn node_failed(&self, _execution: &WorkflowExecution, _node_key: &str, _error: &ErrorData) {}
    fn execution_suspended(&self, _execution: &WorkflowExecution) {}
    fn execution_completed(&self, _execution: &WorkflowExecution, _output: &Value) {}
    fn execution_failed(&self, _execution: &WorkflowExecution) {}
}

/// A registration-ordered chain of hooks; the scheduler holds one of these
/// and calls every event method on every middleware in order.
#[derive(Default)]
pub struct MiddlewareChain {
    hooks: Vec<Box<dyn Middleware>>,
}

impl MiddlewareChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(mut self, middleware: impl Middleware + 'static) -> Self {
        self.hooks.push(Box::new(middleware));
        self
    }

    pub fn execution_started(&self, execution: &WorkflowExecution) {
        for hook in &self.hooks {
            hook.execution_started(execution);
        }
    }

    pub fn node_starting(&self, execution: &WorkflowExecution, node_key: &str) {
        for hook in &self.hooks {
            hook.node_starting(execution, node_key);
        }
    }

    pub fn node_completed(&self, execution: &WorkflowExecution, node_key: &str, port: &str, data: &Value) {
        for hook in &self.hooks {
            hook.node_completed(execution, node_key, port, data);
        }
    }

    pub fn node_suspended(&self, execution: &WorkflowExecution, node_key: &str) {
        for hook in &self.hooks {
            hook.node_suspended(execution, node_key);
        }
    }

    pub fn node_failed(&self, execution: &WorkflowExecution, node_key: &str, error: &ErrorData) {
        for hook in &self.hooks {
            hook.node_failed(execution, node_key, error);
        }
    }

    pub fn execution_suspended(&self, execution: &WorkflowExecution) {
        for hook in &self.hooks {
            hook.execution_suspended(execution);
        }
    }

    pub fn execution_completed(&self, execution: &WorkflowExecution, output: &Value) {
        for hook in &self.hooks {
            hook.execution_completed(execution, output);
        }
    }

    pub fn execution_failed(&self, execution: &WorkflowExecution) {
        for hook in &self.hooks {
            hook.execution_failed(execution);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct CountingMiddleware(Arc<AtomicUsize>);

    impl Middleware for CountingMiddleware {
        fn node_starting(&self, _execution: &WorkflowExecution, _node_key: &str) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn hooks_run_in_registration_order() {
        let counter = Arc::new(AtomicUsize::new(0));
        let chain = MiddlewareChain::new()
            .push(CountingMiddleware(counter.clone()))
            .push(CountingMiddleware(counter.clone()));

        let execution = WorkflowExecution::new("wf", 1, Default::default(), Default::default());
        chain.node_starting(&execution, "a");
        assert_eq!(counter.load(Ordering::SeqCst), 2);
    }
}
