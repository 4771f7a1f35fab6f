//! Connections and the graph utilities shared by the workflow compiler.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

pub const PORT_MAIN: &str = "main";
pub const PORT_TRUE: &str = "true";
pub const PORT_FALSE: &str = "false";
pub const PORT_ERROR: &str = "error";

/// A directed edge `(from_node, from_port) -> (to_node, to_port)` (spec §3
/// "Connection"). Uniquely identified by the 4-tuple.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "camelCase")]
pub struct Connection {
    pub from_node: String,
    pub from_port: String,
    pub to_node: String,
    pub to_port: String,
}

impl Connection {
    pub fn new(
        from_node: impl Into<String>,
        from_port: impl Into<String>,
        to_node: impl Into<String>,
        to_port: impl Into<String>,
    ) -> Self {
        Self {
            from_node: from_node.into(),
            from_port: from_port.into(),
            to_node: to_node.into(),
            to_port: to_port.into(),
        }
    }

    /// Shorthand for a `main -> main` connection, the common case.
    pub fn main(from_node: impl Into<String>, to_node: impl Into<String>) -> Self {
        Self::new(from_node, PORT_MAIN, to_node, PORT_MAIN)
    }
}

/// Canonical form: `(from_node, from_port) -> ordered outgoing connections`,
/// authoring order preserved within each port list (spec §4.1 step 1 — this
/// order is the tie-break at routing time).
pub type ConnectionMap = HashMap<(String, String), Vec<Connection>>;

/// `to_node -> ordered incoming connections, all ports` (spec §3
/// `reverse_connection_map`).
pub type ReverseConnectionMap = HashMap<String, Vec<Connection>>;

/// Build the canonical `ConnectionMap` from the workflow's authoring-order
/// connection list, preserving relative order within each `(from, port)`
/// bucket.
pub fn normalize(connections: &[Connection]) -> ConnectionMap {
    let mut map: ConnectionMap = HashMap::new();
    for conn in connections {
        map.entry((conn.from_node.clone(), conn.from_port.clone()))
            .or_default()
            .push(conn.clone());
    }
    map
}

/// Build the reverse map over a (possibly already-pruned) `ConnectionMap`.
pub fn reverse(connection_map: &ConnectionMap) -> ReverseConnectionMap {
    let mut rev: ReverseConnectionMap = HashMap::new();
    for conns in connection_map.values() {
        for conn in conns {
            rev.entry(conn.to_node.clone()).or_default().push(conn.clone());
        }
    }
    rev
}

/// Graph traversal helpers used by the compiler (forward-reachability prune,
/// dependency graph, cycle/back-edge detection). Grounded on the teacher's
/// `connection::graph` module (BFS child/parent walks, Kahn's algorithm for
/// cycle detection), generalized from n8n's `(type, index)` addressing to
/// Prana's string ports.
pub mod graph {
    use super::*;
    use std::collections::{HashSet, VecDeque};

    /// BFS-reachable node keys from `start`, following `connection_map` in
    /// any port.
    pub fn reachable_from(start: &str, connection_map: &ConnectionMap) -> HashSet<String> {
        let mut visited = HashSet::new();
        let mut queue = VecDeque::new();
        visited.insert(start.to_string());
        queue.push_back(start.to_string());

        while let Some(node) = queue.pop_front() {
            for ((from, _port), conns) in connection_map {
                if from != &node {
                    continue;
                }
                for conn in conns {
                    if visited.insert(conn.to_node.clone()) {
                        queue.push_back(conn.to_node.clone());
                    }
                }
            }
        }
        visited
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_preserves_authoring_order() {
        let conns = vec![
            Connection::main("a", "b"),
            Connection::main("a", "c"),
        ];
        let map = normalize(&conns);
        let out = &map[&("a".to_string(), PORT_MAIN.to_string())];
        assert_eq!(out[0].to_node, "b");
        assert_eq!(out[1].to_node, "c");
    }

    #[test]
    fn reachable_from_follows_all_ports() {
        let conns = vec![Connection::new("a", "true", "b", "main")];
        let map = normalize(&conns);
        let reached = graph::reachable_from("a", &map);
        assert!(reached.contains("b"));
    }

    #[test]
    fn reachable_from_includes_loopback_targets() {
        let conns = vec![Connection::main("a", "b"), Connection::main("b", "a")];
        let map = normalize(&conns);
        let reached = graph::reachable_from("a", &map);
        assert!(reached.contains("a") && reached.contains("b"));
    }
}
