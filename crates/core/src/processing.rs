//! Response processing output types.

use serde::{Deserialize, Serialize};

use crate::action::{ActionCall, ActionFeedback};
use crate::state::TaskStatus;

/// Outcome of a single processor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProcessorStatus {
    Success,
    /// Ran, but something deserves attention
    Warning,
    Error,
}

/// Record of one processor's run over a response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessorOutput {
    pub processor_name: String,
    pub status: ProcessorStatus,
    /// Diagnostic detail for logs, not shown to the model
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// A completion as it moves through the response pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessedOutput {
    pub raw_response: String,

    /// Structured payload, once a parser has accepted the response
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parsed_response: Option<serde_json::Value>,

    pub task_status: TaskStatus,

    pub processor_success: bool,

    /// Corrective feedback for the model, in the order it was produced
    #[serde(default)]
    pub processor_feedback: Vec<String>,

    #[serde(default)]
    pub processor_outputs: Vec<ProcessorOutput>,

    #[serde(default)]
    pub called_actions: Vec<ActionCall>,

    #[serde(default)]
    pub action_feedback: Vec<ActionFeedback>,

    /// Non-fatal notices about how the pipeline was configured or used
    #[serde(default)]
    pub advisories: Vec<String>,
}

impl ProcessedOutput {
    pub fn new(raw_response: impl Into<String>) -> Self {
        Self {
            raw_response: raw_response.into(),
            parsed_response: None,
            task_status: TaskStatus::Undefined,
            processor_success: true,
            processor_feedback: Vec::new(),
            processor_outputs: Vec::new(),
            called_actions: Vec::new(),
            action_feedback: Vec::new(),
            advisories: Vec::new(),
        }
    }

    /// Record a successful processor run.
    pub fn succeed(mut self, processor: &str) -> Self {
        self.processor_outputs.push(ProcessorOutput {
            processor_name: processor.to_string(),
            status: ProcessorStatus::Success,
            message: None,
        });
        self
    }

    /// Record a failed processor run and queue feedback for the model.
    pub fn fail(mut self, processor: &str, message: impl Into<String>, feedback: impl Into<String>) -> Self {
        self.processor_success = false;
        self.processor_feedback.push(feedback.into());
        self.processor_outputs.push(ProcessorOutput {
            processor_name: processor.to_string(),
            status: ProcessorStatus::Error,
            message: Some(message.into()),
        });
        self
    }

    /// Render everything the model should see about this response on its
    /// next turn: processor feedback first, then each action's output.
    /// Returns `None` when there is nothing to report.
    pub fn feedback_text(&self) -> Option<String> {
        let mut parts: Vec<String> = self.processor_feedback.clone();
        for fb in &self.action_feedback {
            parts.push(format!("Action `{}` output:\n{}", fb.call.name, fb.output));
        }
        if parts.is_empty() {
            None
        } else {
            Some(parts.join("\n\n"))
        }
    }
}
