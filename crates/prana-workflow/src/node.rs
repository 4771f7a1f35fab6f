//! Node definitions: identity, parameters and per-node execution policy.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::value::{Value, ValueMap};

/// On-error policy for a node (spec §4.3 step 6). Defaults to
/// `StopWorkflow`, matching the teacher's `OnError::default()`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum OnErrorPolicy {
    #[default]
    StopWorkflow,
    Continue,
    ContinueErrorOutput,
}

/// Backoff strategy for node-level retries (spec §4.3 step 5).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "strategy", rename_all = "snake_case")]
pub enum Backoff {
    Fixed { delay_ms: u64 },
    Exponential { initial_ms: u64, multiplier: f64 },
}

impl Backoff {
    /// Delay before attempt number `attempt` (1-based: the delay before the
    /// *second* invocation is `delay_for(1)`).
    pub fn delay_for(&self, attempt: u32) -> u64 {
        match self {
            Backoff::Fixed { delay_ms } => *delay_ms,
            Backoff::Exponential {
                initial_ms,
                multiplier,
            } => (*initial_ms as f64 * multiplier.powi(attempt as i32 - 1)) as u64,
        }
    }
}

/// Retry policy for a node (spec §4.3 step 5). `max_attempts` counts the
/// initial attempt, so `max_attempts: 1` means no retry.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff: Backoff,
    /// Kinds this policy retries; empty means retry any kind.
    #[serde(default)]
    pub retry_on_errors: Vec<crate::ErrorKind>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 1,
            backoff: Backoff::Fixed { delay_ms: 0 },
            retry_on_errors: Vec::new(),
        }
    }
}

impl RetryPolicy {
    pub fn applies_to(&self, kind: crate::ErrorKind) -> bool {
        self.retry_on_errors.is_empty() || self.retry_on_errors.contains(&kind)
    }
}

/// Per-node execution settings (spec §3 `settings`).
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct NodeSettings {
    #[serde(default)]
    pub on_error: OnErrorPolicy,
    #[serde(default)]
    pub retry: RetryPolicy,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout_seconds: Option<u64>,
}

/// A workflow node (spec §3 "Node").
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Node {
    /// Unique identifier within the workflow.
    pub key: String,
    /// Human-readable display name.
    pub name: String,
    /// `"integration.action"` identifying the [`crate::Action`] to dispatch.
    #[serde(rename = "type")]
    pub node_type: String,
    /// Parameters, values of which may contain template expressions.
    #[serde(default)]
    pub params: ValueMap,
    #[serde(default)]
    pub settings: NodeSettings,
    /// Annotations populated by the compiler's loop-metadata pass (spec
    /// §4.5) and any author-supplied metadata.
    #[serde(default)]
    pub metadata: ValueMap,
}

impl Node {
    pub fn new(key: impl Into<String>, node_type: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            name: String::new(),
            node_type: node_type.into(),
            params: HashMap::new(),
            settings: NodeSettings::default(),
            metadata: HashMap::new(),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_param(mut self, key: impl Into<String>, value: Value) -> Self {
        self.params.insert(key.into(), value);
        self
    }

    pub fn with_on_error(mut self, policy: OnErrorPolicy) -> Self {
        self.settings.on_error = policy;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.settings.retry = retry;
        self
    }
}
