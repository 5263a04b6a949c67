//! Processors that read action calls and the task verdict.

use rustedloop_core::action::ActionCall;
use rustedloop_core::processing::{ProcessedOutput, ProcessorOutput, ProcessorStatus};
use rustedloop_core::state::TaskStatus;
use serde_json::Value;
use tracing::debug;

use super::ResponseProcessor;

/// Reads `action` (one call) or `actions` (a list) from the parsed response.
#[derive(Debug, Clone, Copy, Default)]
pub struct ActionCallExtractor;

impl ActionCallExtractor {
    fn extract(parsed: &Value) -> Result<Vec<ActionCall>, String> {
        if let Some(action) = parsed.get("action") {
            let call: ActionCall =
                serde_json::from_value(action.clone()).map_err(|e| format!("action: {e}"))?;
            return Ok(vec![call]);
        }
        if let Some(actions) = parsed.get("actions") {
            return serde_json::from_value(actions.clone()).map_err(|e| format!("actions: {e}"));
        }
        Ok(Vec::new())
    }
}

impl ResponseProcessor for ActionCallExtractor {
    fn name(&self) -> &str {
        "action_call_extractor"
    }

    fn process(&self, mut output: ProcessedOutput) -> ProcessedOutput {
        let Some(parsed) = &output.parsed_response else {
            output.processor_outputs.push(ProcessorOutput {
                processor_name: self.name().to_string(),
                status: ProcessorStatus::Warning,
                message: Some("no parsed response to read actions from".into()),
            });
            return output;
        };

        match Self::extract(parsed) {
            Ok(calls) => {
                debug!(count = calls.len(), "Extracted action calls");
                output.called_actions.extend(calls);
                output.succeed(self.name())
            }
            Err(reason) => {
                let feedback = format!(
                    "Could not read the requested action ({reason}). Name an action and its parameters, \
                     e.g. {{\"name\": \"no_action\", \"parameters\": {{}}}}"
                );
                output.fail(self.name(), reason, feedback)
            }
        }
    }
}

/// Sets the task verdict: complete once the completion action is called.
#[derive(Debug, Clone)]
pub struct CompletionDetector {
    completion_action: String,
}

impl CompletionDetector {
    pub fn new(completion_action: impl Into<String>) -> Self {
        Self {
            completion_action: completion_action.into(),
        }
    }
}

impl ResponseProcessor for CompletionDetector {
    fn name(&self) -> &str {
        "completion_detector"
    }

    fn process(&self, output: ProcessedOutput) -> ProcessedOutput {
        let complete = output
            .called_actions
            .iter()
            .any(|call| call.name == self.completion_action);
        let task_status = if complete {
            debug!(action = %self.completion_action, "Completion action called");
            TaskStatus::Complete
        } else {
            TaskStatus::Incomplete
        };
        ProcessedOutput {
            task_status,
            ..output
        }
        .succeed(self.name())
    }
}
