//! Actions every agent gets for free.

use std::sync::Arc;

use rustedloop_config::DEFAULT_COMPLETION_ACTION;
use rustedloop_core::action::{Action, ActionParams, FnAction};
use serde_json::Value;

pub const NO_ACTION: &str = "no_action";

/// `no_action()`: lets the model pass a turn without side effects.
pub fn no_action() -> FnAction {
    FnAction::new(NO_ACTION, "No action.", |_params| Ok("No action.".to_string())).lenient()
}

/// `submit_completed_task(...)`: hands the result back to the user.
///
/// Accepts any arguments. The completion detector, not this action,
/// marks the task complete.
pub fn submit_completed_task() -> FnAction {
    FnAction::new(
        DEFAULT_COMPLETION_ACTION,
        "Submit completed task to the user.",
        |params| Ok(render_submission(params)),
    )
    .lenient()
}

fn render_submission(params: &ActionParams) -> String {
    if params.is_empty() {
        return "Task submitted.".to_string();
    }
    let fields: Vec<String> = params
        .iter()
        .map(|(k, v)| match v {
            Value::String(s) => format!("{k}={s}"),
            other => format!("{k}={other}"),
        })
        .collect();
    format!("Task submitted: {}", fields.join(", "))
}

/// Both built-ins, ready for [`rustedloop_core::ActionRegistry::from_actions`].
pub fn builtin_actions() -> Vec<Arc<dyn Action>> {
    vec![Arc::new(no_action()), Arc::new(submit_completed_task())]
}

#[cfg(test)]
mod tests {
    use super::*;
    use rustedloop_core::action::{ActionCall, ActionRegistry};
    use serde_json::json;

    #[tokio::test]
    async fn no_action_ignores_arguments() {
        let registry = ActionRegistry::from_actions(builtin_actions());
        let call = ActionCall::new("no_action").with_parameters(json!({"reason": "thinking"}));
        let feedback = registry.invoke(&call).await;
        assert!(feedback.success);
        assert_eq!(feedback.output, "No action.");
    }

    #[tokio::test]
    async fn submission_echoes_arguments() {
        let registry = ActionRegistry::from_actions(builtin_actions());
        let call = ActionCall::new("submit_completed_task")
            .with_parameters(json!({"summary": "done"}));
        let feedback = registry.invoke(&call).await;
        assert_eq!(feedback.output, "Task submitted: summary=done");
    }

    #[test]
    fn builtins_are_described() {
        let registry = ActionRegistry::from_actions(builtin_actions());
        assert_eq!(
            registry.describe(),
            "no_action(): No action.\nsubmit_completed_task(): Submit completed task to the user."
        );
    }
}
