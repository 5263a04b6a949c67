//! Response processing pipeline.
//!
//! A completion runs through an ordered chain of processors. Each
//! processor is a pure `ProcessedOutput -> ProcessedOutput` transform that
//! may parse the payload, extract action calls, set the task verdict, or
//! fail the response with feedback for the model. With `fail_fast` the
//! first failure stops the chain and no actions are dispatched.

pub mod actions;
pub mod parsers;

use rustedloop_config::{AppConfig, ResponseFormat};
use rustedloop_core::action::ActionRegistry;
use rustedloop_core::processing::ProcessedOutput;
use tracing::{debug, warn};

use crate::schemas::{MultiActionResponse, SingleActionResponse};

pub use actions::{ActionCallExtractor, CompletionDetector};
pub use parsers::{JsonParser, YamlParser};

/// Advisory recorded when actions were available but none was called.
pub const NO_ACTION_CALLED: &str =
    "Actions were available but the response called none. Is an action extractor configured?";

/// A single step of response processing.
pub trait ResponseProcessor: Send + Sync {
    /// Name recorded in [`rustedloop_core::ProcessorOutput`] entries and logs.
    fn name(&self) -> &str;

    fn process(&self, output: ProcessedOutput) -> ProcessedOutput;
}

/// Ordered processor chain plus action dispatch.
pub struct ResponsePipeline {
    processors: Vec<Box<dyn ResponseProcessor>>,
    fail_fast: bool,
}

impl ResponsePipeline {
    pub fn new() -> Self {
        Self {
            processors: Vec::new(),
            fail_fast: true,
        }
    }

    /// The standard chain for a config: parse, extract actions, detect completion.
    pub fn from_config(config: &AppConfig) -> Self {
        let parser: Box<dyn ResponseProcessor> =
            match (config.response.format, config.response.multi_action) {
                (ResponseFormat::Json, false) => Box::new(JsonParser::<SingleActionResponse>::new()),
                (ResponseFormat::Json, true) => Box::new(JsonParser::<MultiActionResponse>::new()),
                (ResponseFormat::Yaml, false) => Box::new(YamlParser::<SingleActionResponse>::new()),
                (ResponseFormat::Yaml, true) => Box::new(YamlParser::<MultiActionResponse>::new()),
            };

        let mut pipeline = Self::new().with_fail_fast(config.response.fail_fast);
        pipeline.processors.push(parser);
        pipeline
            .with_processor(ActionCallExtractor)
            .with_processor(CompletionDetector::new(&config.task.completion_action))
    }

    pub fn with_processor(mut self, processor: impl ResponseProcessor + 'static) -> Self {
        self.processors.push(Box::new(processor));
        self
    }

    pub fn with_fail_fast(mut self, fail_fast: bool) -> Self {
        self.fail_fast = fail_fast;
        self
    }

    pub fn fail_fast(&self) -> bool {
        self.fail_fast
    }

    /// Processor names in execution order.
    pub fn processor_names(&self) -> Vec<&str> {
        self.processors.iter().map(|p| p.name()).collect()
    }

    /// Run the processor chain over a raw completion.
    pub fn process(&self, raw_response: &str) -> ProcessedOutput {
        let mut output = ProcessedOutput::new(raw_response);
        for processor in &self.processors {
            output = processor.process(output);
            if self.fail_fast && !output.processor_success {
                debug!(processor = processor.name(), "Processor failed, skipping the rest of the chain");
                break;
            }
        }
        output
    }

    /// Whether the chain result allows actions to run.
    pub fn should_dispatch(&self, output: &ProcessedOutput) -> bool {
        output.processor_success || !self.fail_fast
    }

    /// Invoke every called action in order and record its feedback.
    pub async fn dispatch(&self, mut output: ProcessedOutput, actions: &ActionRegistry) -> ProcessedOutput {
        if !self.should_dispatch(&output) {
            return output;
        }

        if !actions.is_empty() && output.called_actions.is_empty() {
            warn!("{NO_ACTION_CALLED}");
            output.advisories.push(NO_ACTION_CALLED.to_string());
        }

        for call in &output.called_actions {
            let feedback = actions.invoke(call).await;
            output.action_feedback.push(feedback);
        }
        output
    }

    /// Process a completion and run the actions it calls.
    pub async fn handle(&self, raw_response: &str, actions: &ActionRegistry) -> ProcessedOutput {
        let output = self.process(raw_response);
        self.dispatch(output, actions).await
    }
}

impl Default for ResponsePipeline {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ResponsePipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResponsePipeline")
            .field("processors", &self.processor_names())
            .field("fail_fast", &self.fail_fast)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rustedloop_core::action::{ActionCall, FnAction, ParamSpec};
    use rustedloop_core::state::TaskStatus;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Fails every response.
    struct Reject;

    impl ResponseProcessor for Reject {
        fn name(&self) -> &str {
            "reject"
        }

        fn process(&self, output: ProcessedOutput) -> ProcessedOutput {
            output.fail(self.name(), "rejected", "Try again.")
        }
    }

    /// Counts its invocations and calls `echo`.
    struct CountingCaller(Arc<AtomicUsize>);

    impl ResponseProcessor for CountingCaller {
        fn name(&self) -> &str {
            "counting_caller"
        }

        fn process(&self, mut output: ProcessedOutput) -> ProcessedOutput {
            self.0.fetch_add(1, Ordering::SeqCst);
            output.called_actions.push(
                ActionCall::new("echo").with_parameters(serde_json::json!({"text": "hi"})),
            );
            output.succeed(self.name())
        }
    }

    fn echo_registry() -> ActionRegistry {
        ActionRegistry::from_actions([Arc::new(
            FnAction::new("echo", "Echo text back.", |p| {
                Ok(p["text"].as_str().unwrap_or_default().to_string())
            })
            .with_param(ParamSpec::required("text", "str")),
        ) as Arc<dyn rustedloop_core::Action>])
    }

    #[tokio::test]
    async fn fail_fast_skips_later_processors() {
        let calls = Arc::new(AtomicUsize::new(0));
        let pipeline = ResponsePipeline::new()
            .with_processor(Reject)
            .with_processor(CountingCaller(calls.clone()));

        let out = pipeline.handle("anything", &echo_registry()).await;
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert!(!out.processor_success);
        assert!(out.called_actions.is_empty());
        assert!(out.action_feedback.is_empty());
        assert_eq!(out.processor_feedback, vec!["Try again."]);
    }

    #[tokio::test]
    async fn without_fail_fast_every_processor_runs() {
        let calls = Arc::new(AtomicUsize::new(0));
        let pipeline = ResponsePipeline::new()
            .with_fail_fast(false)
            .with_processor(Reject)
            .with_processor(CountingCaller(calls.clone()));

        let out = pipeline.handle("anything", &echo_registry()).await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(!out.processor_success);
        assert_eq!(out.action_feedback.len(), 1);
        assert_eq!(out.action_feedback[0].output, "hi");
    }

    #[tokio::test]
    async fn advisory_when_no_action_called() {
        let pipeline = ResponsePipeline::new();
        let out = pipeline.handle("plain text", &echo_registry()).await;
        assert!(out.processor_success);
        assert_eq!(out.advisories, vec![NO_ACTION_CALLED]);
    }

    #[tokio::test]
    async fn no_advisory_without_actions() {
        let out = ResponsePipeline::new().handle("plain text", &ActionRegistry::new()).await;
        assert!(out.advisories.is_empty());
    }

    #[tokio::test]
    async fn standard_chain_runs_end_to_end() {
        let config = AppConfig::default();
        let pipeline = ResponsePipeline::from_config(&config);
        assert_eq!(
            pipeline.processor_names(),
            vec!["json_parser", "action_call_extractor", "completion_detector"]
        );

        let raw = r#"{"goal": "g", "completed_tasks": [], "reflections": [], "plan": [],
            "explain": [], "action": {"name": "echo", "parameters": {"text": "hi"}}}"#;
        let out = pipeline.handle(raw, &echo_registry()).await;
        assert!(out.processor_success);
        assert_eq!(out.task_status, TaskStatus::Incomplete);
        assert_eq!(out.action_feedback[0].output, "hi");
    }
}
