//! Built-in response schemas.
//!
//! Both schemas ask the model to narrate its reasoning (goal, progress,
//! reflections, plan, explanation) before naming the action(s) to run.

use rustedloop_core::action::ActionCall;
use rustedloop_core::schema::StructuredResponse;
use serde::{Deserialize, Serialize};
use serde_json::json;

/// A response that calls exactly one action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SingleActionResponse {
    pub goal: String,
    pub completed_tasks: Vec<String>,
    pub reflections: Vec<String>,
    pub plan: Vec<String>,
    pub explain: Vec<String>,
    pub action: ActionCall,
}

/// A response that calls any number of actions, run in order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MultiActionResponse {
    pub goal: String,
    pub completed_tasks: Vec<String>,
    pub reflections: Vec<String>,
    pub plan: Vec<String>,
    pub explain: Vec<String>,
    pub actions: Vec<ActionCall>,
}

fn placeholder_call(command: &str, arg: &str, input: &str) -> ActionCall {
    ActionCall::new(command).with_parameters(json!({ arg: input }))
}

impl StructuredResponse for SingleActionResponse {
    fn example() -> Self {
        Self {
            goal: "<I must...>".into(),
            completed_tasks: vec!["<I have...>".into()],
            reflections: vec!["<My last action succeeded/failed because...>".into()],
            plan: vec!["<I will...>".into(), "<I will...>".into()],
            explain: vec!["<This will help...>".into()],
            action: placeholder_call("<command>", "<arg1>", "<input1>"),
        }
    }

    fn validate(&self) -> Result<(), String> {
        if self.action.name.trim().is_empty() {
            return Err("action name must not be empty".into());
        }
        Ok(())
    }
}

impl StructuredResponse for MultiActionResponse {
    fn example() -> Self {
        Self {
            goal: "<I must...>".into(),
            completed_tasks: vec!["<I have...>".into()],
            reflections: vec!["<My last action succeeded/failed because...>".into()],
            plan: vec!["<I will...>".into(), "<I will...>".into()],
            explain: vec!["<This will help...>".into()],
            actions: vec![
                placeholder_call("<command1>", "<arg1>", "<input1>"),
                placeholder_call("<command2>", "<arg2>", "<input2>"),
            ],
        }
    }

    fn validate(&self) -> Result<(), String> {
        if let Some(blank) = self.actions.iter().position(|a| a.name.trim().is_empty()) {
            return Err(format!("actions[{blank}] has an empty name"));
        }
        Ok(())
    }
}
