//! The authoring-time workflow definition (spec §3 "Workflow").

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::connection::Connection;
use crate::node::Node;
use crate::value::ValueMap;
use crate::WorkflowError;

/// A declarative workflow: nodes, connections in authoring order, and
/// workflow-scoped constants. This is the compiler's input; its output is
/// [`crate::ExecutionGraph`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Workflow {
    pub id: String,
    pub version: u32,
    pub nodes: Vec<Node>,
    /// Authoring-order connection list; the compiler normalizes this into
    /// the canonical `(from_node, from_port) -> [Connection]` map.
    pub connections: Vec<Connection>,
    #[serde(default)]
    pub variables: ValueMap,
    #[serde(default)]
    pub metadata: ValueMap,
}

impl Workflow {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            version: 1,
            nodes: Vec::new(),
            connections: Vec::new(),
            variables: ValueMap::new(),
            metadata: ValueMap::new(),
        }
    }

    pub fn add_node(&mut self, node: Node) {
        self.nodes.push(node);
    }

    pub fn connect(&mut self, connection: Connection) {
        self.connections.push(connection);
    }

    pub fn get_node(&self, key: &str) -> Option<&Node> {
        self.nodes.iter().find(|n| n.key == key)
    }

    pub fn node_keys(&self) -> Vec<String> {
        self.nodes.iter().map(|n| n.key.clone()).collect()
    }

    /// Structural validation: unique keys, non-empty, connections reference
    /// existing nodes. Cycles are *not* rejected here — loop-back
    /// connections are a supported feature (spec §4.5), not a defect.
    pub fn validate(&self) -> Result<(), WorkflowError> {
        if self.nodes.is_empty() {
            return Err(WorkflowError::InvalidWorkflow(
                "workflow has no nodes".to_string(),
            ));
        }

        let mut seen = HashSet::new();
        for node in &self.nodes {
            if !seen.insert(node.key.as_str()) {
                return Err(WorkflowError::DuplicateNodeKey(node.key.clone()));
            }
        }

        for conn in &self.connections {
            if self.get_node(&conn.from_node).is_none() {
                return Err(WorkflowError::NodeNotFound(conn.from_node.clone()));
            }
            if self.get_node(&conn.to_node).is_none() {
                return Err(WorkflowError::NodeNotFound(conn.to_node.clone()));
            }
        }

        Ok(())
    }
}

/// Builder mirroring the teacher's `WorkflowBuilder`, convenient for tests
/// and programmatic workflow construction.
pub struct WorkflowBuilder {
    workflow: Workflow,
}

impl WorkflowBuilder {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            workflow: Workflow::new(id),
        }
    }

    pub fn node(mut self, node: Node) -> Self {
        self.workflow.add_node(node);
        self
    }

    pub fn connect(mut self, connection: Connection) -> Self {
        self.workflow.connect(connection);
        self
    }

    pub fn variable(mut self, key: impl Into<String>, value: crate::Value) -> Self {
        self.workflow.variables.insert(key.into(), value);
        self
    }

    pub fn build(self) -> Result<Workflow, WorkflowError> {
        self.workflow.validate()?;
        Ok(self.workflow)
    }

    /// Build without structural validation — used by tests that
    /// intentionally exercise loop-back edges or other constructs that are
    /// valid at runtime but awkward to hand-assemble incrementally.
    pub fn build_unchecked(self) -> Workflow {
        self.workflow
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::Node;

    #[test]
    fn validate_rejects_duplicate_keys() {
        let wf = WorkflowBuilder::new("wf")
            .node(Node::new("a", "core.noop"))
            .node(Node::new("a", "core.noop"))
            .build_unchecked();
        assert!(matches!(wf.validate(), Err(WorkflowError::DuplicateNodeKey(_))));
    }

    #[test]
    fn validate_rejects_dangling_connection() {
        let wf = WorkflowBuilder::new("wf")
            .node(Node::new("a", "core.noop"))
            .connect(Connection::main("a", "missing"))
            .build_unchecked();
        assert!(matches!(wf.validate(), Err(WorkflowError::NodeNotFound(_))));
    }

    #[test]
    fn validate_allows_cycles() {
        let wf = WorkflowBuilder::new("wf")
            .node(Node::new("a", "core.noop"))
            .node(Node::new("b", "core.noop"))
            .connect(Connection::main("a", "b"))
            .connect(Connection::main("b", "a"))
            .build();
        assert!(wf.is_ok());
    }
}
