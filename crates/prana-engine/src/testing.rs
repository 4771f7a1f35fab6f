//! Trivial fixture actions for exercising the graph executor (SPEC_FULL.md
//! §2 "a minimal built-in action set for testing"). Not integrations — spec
//! §1 explicitly scopes concrete integrations out of the core; these exist
//! only so tests can build a workflow without a host-supplied action set.

use async_trait::async_trait;
use prana_workflow::Value;

use crate::action::{Action, ActionHandler, ActionRegistry, ActionResult, InMemoryActionRegistry, SuspensionType};

/// Fires once per `execute` call; carries no input of its own.
pub struct TriggerHandler;

#[async_trait]
impl ActionHandler for TriggerHandler {
    async fn handle(&self, _params: &prana_workflow::ValueMap, _routed_input: &prana_workflow::ValueMap, _vars: &prana_workflow::ValueMap) -> ActionResult {
        ActionResult::ok(Value::Null)
    }
}

/// Echoes its routed input back out on the `main` port, unchanged.
pub struct PassThroughHandler;

#[async_trait]
impl ActionHandler for PassThroughHandler {
    async fn handle(&self, _params: &prana_workflow::ValueMap, routed_input: &prana_workflow::ValueMap, _vars: &prana_workflow::ValueMap) -> ActionResult {
        ActionResult::ok(
            routed_input
                .get("main")
                .cloned()
                .unwrap_or(Value::Object(Default::default())),
        )
    }
}

/// Emits its rendered `value` param as output, ignoring routed input —
/// used to seed deterministic payloads into a workflow under test.
pub struct SetValueHandler;

#[async_trait]
impl ActionHandler for SetValueHandler {
    async fn handle(&self, params: &prana_workflow::ValueMap, _routed_input: &prana_workflow::ValueMap, _vars: &prana_workflow::ValueMap) -> ActionResult {
        ActionResult::ok(params.get("value").cloned().unwrap_or(Value::Null))
    }
}

/// Always fails with a fixed `{code, message}`, for on-error-policy and
/// retry tests.
pub struct FailHandler;

#[async_trait]
impl ActionHandler for FailHandler {
    async fn handle(&self, params: &prana_workflow::ValueMap, _routed_input: &prana_workflow::ValueMap, _vars: &prana_workflow::ValueMap) -> ActionResult {
        let code = params
            .get("code")
            .and_then(|v| v.as_str())
            .unwrap_or("fixture_failure")
            .to_string();
        let message = params
            .get("message")
            .and_then(|v| v.as_str())
            .unwrap_or("fixture action always fails")
            .to_string();
        ActionResult::err(code, message)
    }
}

/// Branches on its rendered `result` param (expected to template-evaluate to
/// a boolean) onto the `true`/`false` ports — used for conditional branching
/// and loop-exit tests without a dedicated expression-evaluating action.
pub struct ConditionHandler;

#[async_trait]
impl ActionHandler for ConditionHandler {
    async fn handle(&self, params: &prana_workflow::ValueMap, _routed_input: &prana_workflow::ValueMap, _vars: &prana_workflow::ValueMap) -> ActionResult {
        let taken = params.get("result").map(|v| v.is_truthy()).unwrap_or(false);
        let port = if taken { "true" } else { "false" };
        ActionResult::ok_on(Value::Bool(taken), port)
    }
}

/// Always suspends with its rendered `data` param, for suspend/resume tests —
/// the handler never runs again after `Resume`, so it needs no other state.
pub struct SuspendHandler;

#[async_trait]
impl ActionHandler for SuspendHandler {
    async fn handle(&self, params: &prana_workflow::ValueMap, _routed_input: &prana_workflow::ValueMap, _vars: &prana_workflow::ValueMap) -> ActionResult {
        let data = params.get("data").cloned().unwrap_or(Value::Null);
        ActionResult::Suspend {
            kind: SuspensionType::SubWorkflowSync,
            data,
        }
    }
}

/// A registry pre-populated with `core.trigger`, `core.passThrough`,
/// `core.setValue`, `core.condition`, `core.suspend` and `core.fail`, for
/// tests that don't need a custom action set.
pub fn fixture_registry() -> InMemoryActionRegistry {
    let registry = InMemoryActionRegistry::new();
    registry.register(Action::new("core.trigger", TriggerHandler).as_trigger());
    registry.register(Action::new("core.passThrough", PassThroughHandler));
    registry.register(Action::new("core.setValue", SetValueHandler));
    registry.register(
        Action::new("core.condition", ConditionHandler)
            .with_ports(vec!["main".to_string()], vec!["true".to_string(), "false".to_string()]),
    );
    registry.register(Action::new("core.suspend", SuspendHandler));
    registry.register(Action::new("core.fail", FailHandler));
    registry
}

#[cfg(test)]
mod tests {
    use super::*;
    use prana_workflow::ValueMap;

    #[tokio::test]
    async fn pass_through_echoes_main_input() {
        let handler = PassThroughHandler;
        let mut input = ValueMap::new();
        input.insert("main".to_string(), Value::String("hi".to_string()));
        let result = handler.handle(&ValueMap::new(), &input, &ValueMap::new()).await;
        match result {
            ActionResult::Ok { data, .. } => assert_eq!(data, Value::String("hi".to_string())),
            _ => panic!("expected Ok"),
        }
    }

    #[tokio::test]
    async fn fail_handler_returns_action_error() {
        let handler = FailHandler;
        let result = handler.handle(&ValueMap::new(), &ValueMap::new(), &ValueMap::new()).await;
        assert!(matches!(result, ActionResult::Err { .. }));
    }

    #[test]
    fn fixture_registry_has_all_fixture_actions() {
        let registry = fixture_registry();
        assert!(registry.lookup("core.trigger").is_some());
        assert!(registry.lookup("core.passThrough").is_some());
        assert!(registry.lookup("core.setValue").is_some());
        assert!(registry.lookup("core.condition").is_some());
        assert!(registry.lookup("core.suspend").is_some());
        assert!(registry.lookup("core.fail").is_some());
        assert!(registry.is_trigger("core.trigger"));
    }
}
