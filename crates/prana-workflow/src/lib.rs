//! # prana-workflow
//!
//! The core data model for Prana workflows: nodes, connections, compiled
//! execution graphs and execution records. No async runtime, no I/O — the
//! types here are shared by the compiler, graph executor and node executor
//! in `prana-engine`.

pub mod connection;
pub mod error;
pub mod execution;
pub mod graph;
pub mod node;
pub mod value;
pub mod workflow;

pub use connection::{Connection, ConnectionMap, ReverseConnectionMap};
pub use error::{ErrorData, ErrorKind, WorkflowError};
pub use execution::{
    ExecutionMode, ExecutionStatus, NodeExecution, NodeExecutionStatus, Runtime, WorkflowExecution,
};
pub use graph::{ExecutionGraph, LoopMetadata, LoopRole};
pub use node::{Backoff, Node, NodeSettings, OnErrorPolicy, RetryPolicy};
pub use value::{Value, ValueMap};
pub use workflow::{Workflow, WorkflowBuilder};
