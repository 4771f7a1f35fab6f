//! The action contract (spec §6 "Action handler contract") and a process-wide
//! registry (spec §5 "The action registry is process-wide, read-mostly; a
//! lookup must be safe for concurrent callers"). Grounded on the teacher's
//! `executor::NodeExecutor` trait + `NodeExecutorRegistry`, replacing the
//! teacher's fixed n8n node catalog with the spec's `(params, routed_input,
//! vars) -> Result` handler shape and closed `Suspend` type tag set.

use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use prana_workflow::{Value, ValueMap};

/// The tag drawn from the closed set an action's `Suspend` result may use
/// (spec §4.3 step 4).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SuspensionType {
    SubWorkflowSync,
    SubWorkflowAsync,
    SubWorkflowFireForget,
    ExternalEvent,
    Delay,
    PollUntil,
}

impl SuspensionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SuspensionType::SubWorkflowSync => "sub_workflow_sync",
            SuspensionType::SubWorkflowAsync => "sub_workflow_async",
            SuspensionType::SubWorkflowFireForget => "sub_workflow_fire_forget",
            SuspensionType::ExternalEvent => "external_event",
            SuspensionType::Delay => "delay",
            SuspensionType::PollUntil => "poll_until",
        }
    }
}

/// What an action handler returns (spec §6 `Result`, §9 "Model `Result` as a
/// sum type: three variants").
#[derive(Debug, Clone)]
pub enum ActionResult {
    /// Success. `port` defaults to the action's `default_success_port` when
    /// `None` (spec §4.3 step 4).
    Ok { data: Value, port: Option<String> },
    /// Action-level failure (spec §7 `action_error`).
    Err {
        code: String,
        message: String,
        details: Option<Value>,
    },
    /// Suspension (spec §4.3 step 4, §4.6).
    Suspend { kind: SuspensionType, data: Value },
}

impl ActionResult {
    pub fn ok(data: Value) -> Self {
        ActionResult::Ok { data, port: None }
    }

    pub fn ok_on(data: Value, port: impl Into<String>) -> Self {
        ActionResult::Ok {
            data,
            port: Some(port.into()),
        }
    }

    pub fn err(code: impl Into<String>, message: impl Into<String>) -> Self {
        ActionResult::Err {
            code: code.into(),
            message: message.into(),
            details: None,
        }
    }
}

/// The `{code, message, details?}` shape spec §7 assigns to `action_error`
/// payloads, readable by downstream nodes through `$input.main.code` etc.
pub fn action_error_payload(code: &str, message: &str, details: Option<&Value>) -> Value {
    let mut map = ValueMap::new();
    map.insert("code".to_string(), Value::String(code.to_string()));
    map.insert("message".to_string(), Value::String(message.to_string()));
    if let Some(details) = details {
        map.insert("details".to_string(), details.clone());
    }
    Value::Object(map)
}

/// An executable action handler (spec §6 "Action handler contract").
#[async_trait]
pub trait ActionHandler: Send + Sync {
    async fn handle(&self, params: &ValueMap, routed_input: &ValueMap, vars: &ValueMap) -> ActionResult;
}

/// An action's declared shape plus its handler (spec §3 "Action").
pub struct Action {
    pub name: String,
    pub input_ports: Vec<String>,
    pub output_ports: Vec<String>,
    pub default_success_port: String,
    pub default_error_port: String,
    pub is_trigger: bool,
    pub handler: Arc<dyn ActionHandler>,
}

impl Action {
    pub fn new(name: impl Into<String>, handler: impl ActionHandler + 'static) -> Self {
        Self {
            name: name.into(),
            input_ports: vec!["main".to_string()],
            output_ports: vec!["main".to_string(), "error".to_string()],
            default_success_port: "main".to_string(),
            default_error_port: "error".to_string(),
            is_trigger: false,
            handler: Arc::new(handler),
        }
    }

    pub fn with_ports(mut self, input_ports: Vec<String>, output_ports: Vec<String>) -> Self {
        self.input_ports = input_ports;
        self.output_ports = output_ports;
        self
    }

    pub fn as_trigger(mut self) -> Self {
        self.is_trigger = true;
        self
    }

    pub fn has_output_port(&self, port: &str) -> bool {
        self.output_ports.iter().any(|p| p == port)
    }
}

/// `Lookup(type) -> Action | NotFound` (spec §6 "Registry contract").
pub trait ActionRegistry: Send + Sync {
    fn lookup(&self, node_type: &str) -> Option<Arc<Action>>;
    fn is_trigger(&self, node_type: &str) -> bool {
        self.lookup(node_type).map(|a| a.is_trigger).unwrap_or(false)
    }
}

/// A concurrent-map-backed registry a host populates at startup and shares
/// read-only across many executions (spec §5 "a lookup must be safe for
/// concurrent callers; many executions may share one registry").
#[derive(Default)]
pub struct InMemoryActionRegistry {
    actions: DashMap<String, Arc<Action>>,
}

impl InMemoryActionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, action: Action) {
        self.actions.insert(action.name.clone(), Arc::new(action));
    }
}

impl ActionRegistry for InMemoryActionRegistry {
    fn lookup(&self, node_type: &str) -> Option<Arc<Action>> {
        self.actions.get(node_type).map(|entry| entry.clone())
    }
}
