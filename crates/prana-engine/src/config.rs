//! Runtime configuration for the compiler and executor (spec §4.4 security
//! limits, §4.3 step 6 default policy). Grounded on the teacher's
//! `runtime::RuntimeConfig`, trimmed to the knobs this engine actually reads.

use prana_workflow::OnErrorPolicy;

/// Tunables shared by every `Execute`/`Resume` call against a given host.
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    /// Node-level timeout applied when a node doesn't declare its own
    /// `timeout_seconds` (spec §5 "a node may declare a `timeout_seconds`").
    pub default_node_timeout_seconds: Option<u64>,
    /// Max template source size in bytes (spec §4.4 "max template size 1 MiB").
    pub max_template_size: usize,
    /// Max `{% if %}`/`{% for %}` nesting depth (spec §4.4 "max nesting depth 50").
    pub max_template_depth: u32,
    /// Max iterations across all `{% for %}` loops in one render (spec §4.4
    /// "max loop iterations 10,000").
    pub max_loop_iterations: u64,
    /// On-error policy applied when a node doesn't set one explicitly. Nodes
    /// always carry their own `NodeSettings.on_error`, so this only matters
    /// for hosts that build nodes without setting it (same default).
    pub default_on_error: OnErrorPolicy,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            default_node_timeout_seconds: None,
            max_template_size: 1024 * 1024,
            max_template_depth: 50,
            max_loop_iterations: 10_000,
            default_on_error: OnErrorPolicy::StopWorkflow,
        }
    }
}
