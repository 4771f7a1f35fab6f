//! `compile()`: turn an authoring-time `Workflow` into an `ExecutionGraph`
//! (spec §4.1). Grounded on the teacher's `Workflow::validate` +
//! `connection::graph::{topological_sort, get_child_nodes}` (same
//! normalize/prune/index shape), generalized from n8n's single implicit
//! trigger node to an explicit trigger-discovery step driven by the action
//! registry's `is_trigger` flag.

use std::collections::{HashMap, HashSet};

use prana_workflow::{connection, ExecutionGraph, LoopMetadata, LoopRole, Workflow};
use tracing::debug;

use crate::action::ActionRegistry;
use crate::error::CompileError;

/// Compile `workflow` into an `ExecutionGraph` ready for execution (spec
/// §4.1 steps 1-7). `trigger_key`, when given, selects which trigger node to
/// start from in a workflow with more than one; when `None`, exactly one
/// trigger node must exist.
pub fn compile(
    workflow: &Workflow,
    registry: &dyn ActionRegistry,
    trigger_key: Option<&str>,
) -> Result<ExecutionGraph, CompileError> {
    workflow.validate()?;

    let trigger_node_key = select_trigger(workflow, registry, trigger_key)?;
    debug!(workflow_id = %workflow.id, trigger = %trigger_node_key, "compiling workflow");

    // Step: normalize authoring-order connections into the canonical map.
    let full_connection_map = connection::normalize(&workflow.connections);

    // Step: forward-reachability prune from the trigger (spec §4.1 "nodes
    // unreachable from the trigger are dropped").
    let reachable = connection::graph::reachable_from(&trigger_node_key, &full_connection_map);

    let connection_map: prana_workflow::ConnectionMap = full_connection_map
        .into_iter()
        .filter(|((from, _), conns)| {
            reachable.contains(from) && conns.iter().any(|c| reachable.contains(&c.to_node))
        })
        .map(|(key, conns)| {
            let pruned: Vec<_> = conns.into_iter().filter(|c| reachable.contains(&c.to_node)).collect();
            (key, pruned)
        })
        .collect();

    let reverse_connection_map = connection::reverse(&connection_map);

    let node_map: HashMap<String, prana_workflow::Node> = workflow
        .nodes
        .iter()
        .filter(|n| reachable.contains(&n.key))
        .map(|n| (n.key.clone(), n.clone()))
        .collect();

    let node_order: Vec<String> = workflow
        .nodes
        .iter()
        .filter(|n| reachable.contains(&n.key))
        .map(|n| n.key.clone())
        .collect();

    // Step: dependency graph is an upper bound — the scheduler narrows it
    // per run using `active_paths` (spec §4.1 step 5).
    let dependency_graph: HashMap<String, Vec<String>> = node_map
        .keys()
        .map(|key| {
            let mut deps: Vec<String> = reverse_connection_map
                .get(key)
                .map(|conns| conns.iter().map(|c| c.from_node.clone()).collect())
                .unwrap_or_default();
            deps.sort();
            deps.dedup();
            (key.clone(), deps)
        })
        .collect();

    let loop_metadata = compute_loop_metadata(&trigger_node_key, &connection_map, &reachable);

    Ok(ExecutionGraph {
        workflow_id: workflow.id.clone(),
        trigger_node_key,
        node_map,
        node_order,
        connection_map,
        reverse_connection_map,
        dependency_graph,
        variables: workflow.variables.clone(),
        loop_metadata,
    })
}

fn select_trigger(
    workflow: &Workflow,
    registry: &dyn ActionRegistry,
    trigger_key: Option<&str>,
) -> Result<String, CompileError> {
    if let Some(key) = trigger_key {
        let node = workflow
            .get_node(key)
            .ok_or_else(|| CompileError::TriggerNodeNotFound(key.to_string()))?;
        if !registry.is_trigger(&node.node_type) {
            return Err(CompileError::NodeNotTrigger(key.to_string()));
        }
        return Ok(key.to_string());
    }

    let triggers: Vec<&str> = workflow
        .nodes
        .iter()
        .filter(|n| registry.is_trigger(&n.node_type))
        .map(|n| n.key.as_str())
        .collect();

    match triggers.as_slice() {
        [] => Err(CompileError::NoTriggerNodes),
        [only] => Ok(only.to_string()),
        _ => Err(CompileError::MultipleTriggersFound),
    }
}

/// One DFS pass from the trigger over `connection_map`, classifying any
/// edge into an already-open ancestor as a loop-back edge (spec §9 Open
/// Question 3: "a standard Tarjan/DFS back-edge pass"). For each back edge
/// `end -> start`, every node on a forward path from `start` to `end` is
/// tagged as belonging to that loop; `start` becomes `StartLoop`, `end`
/// becomes `EndLoop`, everything strictly between is `InLoop`.
fn compute_loop_metadata(
    trigger: &str,
    connection_map: &prana_workflow::ConnectionMap,
    node_keys: &HashSet<String>,
) -> HashMap<String, LoopMetadata> {
    let back_edges = find_back_edges(trigger, connection_map);
    let reverse_map = connection::reverse(connection_map);

    let mut metadata: HashMap<String, LoopMetadata> = HashMap::new();
    for key in node_keys {
        metadata.insert(key.clone(), LoopMetadata::default());
    }

    for (end, start) in back_edges {
        let forward = connection::graph::reachable_from(&start, connection_map);
        let backward = reachable_backward(&end, &reverse_map);
        let loop_members: HashSet<&String> = forward.intersection(&backward).collect();

        for member in &loop_members {
            let entry = metadata.entry((*member).clone()).or_default();
            entry.loop_ids.push(start.clone());
            entry.loop_level = entry.loop_ids.len() as u32;
            if **member == start {
                entry.loop_role = LoopRole::StartLoop;
            } else if **member == end {
                entry.loop_role = LoopRole::EndLoop;
            } else if entry.loop_role == LoopRole::NotInLoop {
                entry.loop_role = LoopRole::InLoop;
            }
        }
    }

    metadata
}

/// BFS over `reverse_map` from `start`: every node that can reach `start`
/// by following forward edges.
fn reachable_backward(start: &str, reverse_map: &prana_workflow::ReverseConnectionMap) -> HashSet<String> {
    use std::collections::VecDeque;

    let mut visited = HashSet::new();
    let mut queue = VecDeque::new();
    visited.insert(start.to_string());
    queue.push_back(start.to_string());

    while let Some(node) = queue.pop_front() {
        if let Some(incoming) = reverse_map.get(&node) {
            for conn in incoming {
                if visited.insert(conn.from_node.clone()) {
                    queue.push_back(conn.from_node.clone());
                }
            }
        }
    }
    visited
}

/// Returns `(source, target)` pairs for every edge the DFS found pointing
/// back into an ancestor already on its current stack.
fn find_back_edges(trigger: &str, connection_map: &prana_workflow::ConnectionMap) -> Vec<(String, String)> {
    let mut back_edges = Vec::new();
    let mut on_stack: HashSet<String> = HashSet::new();
    let mut visited: HashSet<String> = HashSet::new();

    fn visit(
        node: &str,
        connection_map: &prana_workflow::ConnectionMap,
        visited: &mut HashSet<String>,
        on_stack: &mut HashSet<String>,
        back_edges: &mut Vec<(String, String)>,
    ) {
        visited.insert(node.to_string());
        on_stack.insert(node.to_string());

        let mut children: Vec<String> = connection_map
            .iter()
            .filter(|((from, _), _)| from == node)
            .flat_map(|(_, conns)| conns.iter().map(|c| c.to_node.clone()))
            .collect();
        children.sort();
        children.dedup();

        for child in children {
            if on_stack.contains(&child) {
                back_edges.push((node.to_string(), child));
            } else if !visited.contains(&child) {
                visit(&child, connection_map, visited, on_stack, back_edges);
            }
        }

        on_stack.remove(node);
    }

    visit(trigger, connection_map, &mut visited, &mut on_stack, &mut back_edges);
    back_edges
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::{Action, ActionHandler, ActionResult, InMemoryActionRegistry};
    use async_trait::async_trait;
    use prana_workflow::{Connection, Node, ValueMap, WorkflowBuilder};

    struct NoopHandler;

    #[async_trait]
    impl ActionHandler for NoopHandler {
        async fn handle(&self, _params: &ValueMap, _routed_input: &ValueMap, _vars: &ValueMap) -> ActionResult {
            ActionResult::ok(prana_workflow::Value::Null)
        }
    }

    fn registry_with_trigger() -> InMemoryActionRegistry {
        let registry = InMemoryActionRegistry::new();
        registry.register(Action::new("core.trigger", NoopHandler).as_trigger());
        registry.register(Action::new("core.passThrough", NoopHandler));
        registry
    }

    #[test]
    fn compiles_linear_workflow() {
        let registry = registry_with_trigger();
        let wf = WorkflowBuilder::new("wf")
            .node(Node::new("start", "core.trigger"))
            .node(Node::new("a", "core.passThrough"))
            .connect(Connection::main("start", "a"))
            .build()
            .unwrap();

        let graph = compile(&wf, &registry, None).unwrap();
        assert_eq!(graph.trigger_node_key, "start");
        assert_eq!(graph.node_map.len(), 2);
    }

    #[test]
    fn prunes_unreachable_nodes() {
        let registry = registry_with_trigger();
        let wf = WorkflowBuilder::new("wf")
            .node(Node::new("start", "core.trigger"))
            .node(Node::new("a", "core.passThrough"))
            .node(Node::new("orphan", "core.passThrough"))
            .connect(Connection::main("start", "a"))
            .build()
            .unwrap();

        let graph = compile(&wf, &registry, None).unwrap();
        assert!(!graph.node_map.contains_key("orphan"));
    }

    #[test]
    fn rejects_missing_trigger() {
        let registry = InMemoryActionRegistry::new();
        registry.register(Action::new("core.passThrough", NoopHandler));
        let wf = WorkflowBuilder::new("wf")
            .node(Node::new("a", "core.passThrough"))
            .build()
            .unwrap();

        assert!(matches!(compile(&wf, &registry, None), Err(CompileError::NoTriggerNodes)));
    }

    #[test]
    fn rejects_multiple_triggers_without_explicit_choice() {
        let registry = registry_with_trigger();
        let wf = WorkflowBuilder::new("wf")
            .node(Node::new("start1", "core.trigger"))
            .node(Node::new("start2", "core.trigger"))
            .build()
            .unwrap();

        assert!(matches!(
            compile(&wf, &registry, None),
            Err(CompileError::MultipleTriggersFound)
        ));
    }

    #[test]
    fn loop_back_edge_is_annotated() {
        let registry = registry_with_trigger();
        let wf = WorkflowBuilder::new("wf")
            .node(Node::new("start", "core.trigger"))
            .node(Node::new("loop_body", "core.passThrough"))
            .connect(Connection::main("start", "loop_body"))
            .connect(Connection::main("loop_body", "loop_body"))
            .build_unchecked();

        let graph = compile(&wf, &registry, None).unwrap();
        let meta = &graph.loop_metadata["loop_body"];
        assert_eq!(meta.loop_role, LoopRole::StartLoop);
    }
}
