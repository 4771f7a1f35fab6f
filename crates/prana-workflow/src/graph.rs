//! The compiler's output: an immutable, read-only-during-execution graph
//! with O(1) routing tables (spec §3 "ExecutionGraph").

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::connection::{ConnectionMap, ReverseConnectionMap};
use crate::node::Node;
use crate::value::ValueMap;

/// A node's role within a detected loop (spec §4.5, §9 Open Question 3).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum LoopRole {
    #[default]
    NotInLoop,
    StartLoop,
    InLoop,
    EndLoop,
}

/// Loop annotation the compiler stamps onto nodes that participate in a
/// detected back-edge cycle.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct LoopMetadata {
    pub loop_level: u32,
    pub loop_role: LoopRole,
    /// Keys of the `StartLoop` nodes this node's loop(s) are anchored on.
    pub loop_ids: Vec<String>,
}

/// The compiled, immutable execution graph (spec §3 "ExecutionGraph").
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionGraph {
    pub workflow_id: String,
    pub trigger_node_key: String,
    pub node_map: HashMap<String, Node>,
    /// Node keys in authoring order, reachable nodes only. Used as the
    /// `PickOne` final tie-break (spec §4.2 "earliest author-order
    /// position") since `node_map` itself is unordered.
    pub node_order: Vec<String>,
    #[serde(with = "connection_map_serde")]
    pub connection_map: ConnectionMap,
    pub reverse_connection_map: ReverseConnectionMap,
    /// Upper-bound dependency set per node; refined at runtime by the
    /// active-path check in `SelectReady` (spec §4.1 step 5).
    pub dependency_graph: HashMap<String, Vec<String>>,
    pub variables: ValueMap,
    #[serde(default)]
    pub loop_metadata: HashMap<String, LoopMetadata>,
}

impl ExecutionGraph {
    pub fn node(&self, key: &str) -> Option<&Node> {
        self.node_map.get(key)
    }

    pub fn outgoing(&self, node_key: &str, port: &str) -> &[crate::Connection] {
        self.connection_map
            .get(&(node_key.to_string(), port.to_string()))
            .map(|v| v.as_slice())
            .unwrap_or(&[])
    }

    pub fn incoming(&self, node_key: &str) -> &[crate::Connection] {
        self.reverse_connection_map
            .get(node_key)
            .map(|v| v.as_slice())
            .unwrap_or(&[])
    }
}

/// `ConnectionMap` keys are tuples, which serde_json can't use as object
/// keys directly; serialize as a flat list of connections and rebuild the
/// map on load so round-tripping through canonical JSON (spec §8
/// "Round-trip" property) is order-insensitive per bucket but lossless.
mod connection_map_serde {
    use super::ConnectionMap;
    use crate::Connection;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(map: &ConnectionMap, serializer: S) -> Result<S::Ok, S::Error> {
        let mut all: Vec<&Connection> = map.values().flatten().collect();
        all.sort_by(|a, b| {
            (&a.from_node, &a.from_port, &a.to_node, &a.to_port)
                .cmp(&(&b.from_node, &b.from_port, &b.to_node, &b.to_port))
        });
        all.serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<ConnectionMap, D::Error> {
        let conns: Vec<Connection> = Vec::deserialize(deserializer)?;
        Ok(crate::connection::normalize(&conns))
    }
}
