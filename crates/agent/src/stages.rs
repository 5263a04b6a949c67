//! Cycle stages.
//!
//! A stage is one `SystemState -> SystemState` step of a cycle. The
//! standard cycle is: prompt, memory fold, completion, response
//! processing, action execution, memory fold.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use rustedloop_core::error::{Error, MemoryError, Result};
use rustedloop_core::event::{DomainEvent, EventBus};
use rustedloop_core::message::Message;
use rustedloop_core::processing::ProcessorStatus;
use rustedloop_core::provider::{CompletionRequest, Provider};
use rustedloop_core::state::{SystemState, TaskState, TaskStatus};
use rustedloop_memory::ConversationMemory;
use tracing::{debug, info};

use crate::pipeline::ResponsePipeline;

/// Fraction of the remaining token budget requested for a completion,
/// in percent. The rest is headroom for the provider's own accounting.
const COMPLETION_BUDGET_PERCENT: usize = 95;

/// One step of an orchestration cycle.
#[async_trait]
pub trait Stage: Send + Sync {
    fn name(&self) -> &str;

    /// Produce the next state from `state`.
    async fn apply(&self, state: SystemState, events: &EventBus) -> Result<SystemState>;
}

/// Buffers the messages the model should see this cycle.
///
/// On the first cycle that is the system prompt (unless memory already
/// holds a system message) and the user query. Afterwards it is the
/// feedback from the previous cycle's processors and actions, or a
/// continuation nudge when there was none.
#[derive(Debug, Clone, Default)]
pub struct PromptStage {
    system_prompt: Option<String>,
    continue_prompt: Option<String>,
}

impl PromptStage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        let prompt = prompt.into();
        if !prompt.trim().is_empty() {
            self.system_prompt = Some(prompt);
        }
        self
    }

    /// Message sent on cycles that produced no feedback.
    pub fn with_continue_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.continue_prompt = Some(prompt.into());
        self
    }
}

#[async_trait]
impl Stage for PromptStage {
    fn name(&self) -> &str {
        "prompt"
    }

    async fn apply(&self, state: SystemState, _events: &EventBus) -> Result<SystemState> {
        let mut memory = state.memory.clone();

        if let Some(prompt) = &self.system_prompt
            && !memory.has_system_message()
        {
            memory = ConversationMemory::append(memory, Message::system(prompt.clone()));
        }

        let next = if let Some(query) = &state.user_query {
            memory = ConversationMemory::append(memory, Message::user(query.clone()));
            SystemState {
                user_query: None,
                ..state
            }
        } else {
            let feedback = state
                .processed_output
                .as_ref()
                .and_then(|output| output.feedback_text());
            match (feedback, &self.continue_prompt) {
                (Some(feedback), _) => {
                    memory = ConversationMemory::append(memory, Message::user(feedback));
                }
                (None, Some(nudge)) if state.task.current_cycle > 0 => {
                    memory = ConversationMemory::append(memory, Message::user(nudge.clone()));
                }
                _ => {}
            }
            state
        };

        debug!(
            run_id = %next.run_id,
            buffered = memory.conversation_buffer.len(),
            "Prompt prepared"
        );
        Ok(next.with_memory(memory))
    }
}

/// Folds the buffer into history and enforces the history bounds.
#[derive(Debug, Clone, Default)]
pub struct MemoryStage {
    memory: ConversationMemory,
}

impl MemoryStage {
    pub fn new(memory: ConversationMemory) -> Self {
        Self { memory }
    }
}

#[async_trait]
impl Stage for MemoryStage {
    fn name(&self) -> &str {
        "memory"
    }

    async fn apply(&self, state: SystemState, events: &EventBus) -> Result<SystemState> {
        let outcome = self.memory.fold(state.memory.clone(), &state.model.name)?;
        if outcome.evicted > 0 {
            events.publish(DomainEvent::HistoryEvicted {
                run_id: state.run_id.clone(),
                evicted: outcome.evicted,
                remaining: outcome.memory.message_count,
                timestamp: Utc::now(),
            });
        }
        Ok(state.with_memory(outcome.memory))
    }
}

/// Requests a completion for the current history.
pub struct CompletionStage {
    provider: Arc<dyn Provider>,
}

impl CompletionStage {
    pub fn new(provider: Arc<dyn Provider>) -> Self {
        Self { provider }
    }
}

/// Tokens to request: 95% of what the history leaves free, capped at the
/// model's `max_tokens`.
pub fn completion_budget(state: &SystemState) -> std::result::Result<u32, MemoryError> {
    let memory = &state.memory;
    let available = memory
        .max_history_token_count
        .saturating_sub(memory.token_count);
    let budget = available * COMPLETION_BUDGET_PERCENT / 100;
    let budget = u32::try_from(budget)
        .unwrap_or(u32::MAX)
        .min(state.model.max_tokens);

    if budget == 0 {
        return Err(MemoryError::CompletionBudgetExhausted {
            token_count: memory.token_count,
            max_tokens: memory.max_history_token_count,
        });
    }
    Ok(budget)
}

#[async_trait]
impl Stage for CompletionStage {
    fn name(&self) -> &str {
        "completion"
    }

    async fn apply(&self, state: SystemState, events: &EventBus) -> Result<SystemState> {
        let max_tokens = completion_budget(&state)?;
        let request = CompletionRequest::from_model(
            &state.model,
            state.memory.conversation_history.clone(),
            max_tokens,
        );

        debug!(
            run_id = %state.run_id,
            provider = self.provider.name(),
            model = %state.model.name,
            messages = request.messages.len(),
            max_tokens,
            "Requesting completion"
        );

        let response = self.provider.complete(request).await?;

        events.publish(DomainEvent::ResponseGenerated {
            run_id: state.run_id.clone(),
            model: state.model.name.clone(),
            max_tokens,
            response_chars: response.len(),
            timestamp: Utc::now(),
        });

        let memory = ConversationMemory::append(state.memory.clone(), Message::assistant(response.clone()));
        Ok(state.with_memory(memory).with_agent_response(response))
    }
}

/// Runs the processor chain and applies the task verdict.
pub struct ResponseStage {
    pipeline: Arc<ResponsePipeline>,
}

impl ResponseStage {
    pub fn new(pipeline: Arc<ResponsePipeline>) -> Self {
        Self { pipeline }
    }
}

#[async_trait]
impl Stage for ResponseStage {
    fn name(&self) -> &str {
        "response"
    }

    async fn apply(&self, state: SystemState, events: &EventBus) -> Result<SystemState> {
        let raw = state
            .agent_response
            .as_deref()
            .ok_or_else(|| Error::Internal("no agent response to process".into()))?;
        let output = self.pipeline.process(raw);

        for failed in output
            .processor_outputs
            .iter()
            .filter(|p| p.status == ProcessorStatus::Error)
        {
            info!(run_id = %state.run_id, processor = %failed.processor_name, "Processor rejected response");
            events.publish(DomainEvent::ProcessorFailed {
                run_id: state.run_id.clone(),
                processor: failed.processor_name.clone(),
                timestamp: Utc::now(),
            });
        }

        let task = match output.task_status {
            TaskStatus::Undefined => state.task.clone(),
            status => TaskState {
                status,
                ..state.task.clone()
            },
        };
        Ok(state.with_task(task).with_processed_output(output))
    }
}

/// Invokes the actions called in the processed response.
pub struct ActionStage {
    pipeline: Arc<ResponsePipeline>,
}

impl ActionStage {
    pub fn new(pipeline: Arc<ResponsePipeline>) -> Self {
        Self { pipeline }
    }
}

#[async_trait]
impl Stage for ActionStage {
    fn name(&self) -> &str {
        "action"
    }

    async fn apply(&self, state: SystemState, events: &EventBus) -> Result<SystemState> {
        let Some(output) = state.processed_output.clone() else {
            return Ok(state);
        };

        let already = output.action_feedback.len();
        let output = self.pipeline.dispatch(output, &state.available_actions).await;

        for feedback in &output.action_feedback[already..] {
            events.publish(DomainEvent::ActionExecuted {
                run_id: state.run_id.clone(),
                action: feedback.call.name.clone(),
                success: feedback.success,
                timestamp: Utc::now(),
            });
        }
        Ok(state.with_processed_output(output))
    }
}

/// The standard six-stage cycle.
pub fn standard_cycle(
    provider: Arc<dyn Provider>,
    pipeline: ResponsePipeline,
    memory: ConversationMemory,
    prompt: PromptStage,
) -> Vec<Box<dyn Stage>> {
    let pipeline = Arc::new(pipeline);
    vec![
        Box::new(prompt),
        Box::new(MemoryStage::new(memory.clone())),
        Box::new(CompletionStage::new(provider)),
        Box::new(ResponseStage::new(pipeline.clone())),
        Box::new(ActionStage::new(pipeline)),
        Box::new(MemoryStage::new(memory)),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::ScriptedProvider;
    use rustedloop_core::processing::ProcessedOutput;
    use rustedloop_core::state::{MemoryState, ModelState};

    fn state_with_memory(max_tokens: usize, token_count: usize) -> SystemState {
        let mut memory = MemoryState::new(10, max_tokens);
        memory.token_count = token_count;
        SystemState::default().with_memory(memory)
    }

    #[test]
    fn budget_is_95_percent_of_remaining() {
        let state = state_with_memory(1000, 600);
        assert_eq!(completion_budget(&state).unwrap(), 380);
    }

    #[test]
    fn budget_capped_at_model_max_tokens() {
        let mut state = state_with_memory(8192, 0);
        state.model = ModelState {
            max_tokens: 500,
            ..ModelState::default()
        };
        assert_eq!(completion_budget(&state).unwrap(), 500);
    }

    #[test]
    fn exhausted_budget_is_an_error() {
        let state = state_with_memory(1000, 1000);
        assert_eq!(
            completion_budget(&state).unwrap_err(),
            MemoryError::CompletionBudgetExhausted {
                token_count: 1000,
                max_tokens: 1000,
            }
        );
    }

    #[tokio::test]
    async fn first_prompt_buffers_system_and_query() {
        let stage = PromptStage::new().with_system_prompt("Be terse.");
        let state = SystemState::default().with_user_query("What is 2+2?");
        let next = stage.apply(state, &EventBus::default()).await.unwrap();

        assert!(next.user_query.is_none());
        let buffer = &next.memory.conversation_buffer;
        assert_eq!(buffer.len(), 2);
        assert!(buffer[0].is_system());
        assert_eq!(buffer[1].content, "What is 2+2?");
    }

    #[tokio::test]
    async fn later_prompt_feeds_back_previous_output() {
        let stage = PromptStage::new().with_system_prompt("Be terse.");
        let mut output = ProcessedOutput::new("raw");
        output.processor_feedback.push("Bad response.".into());
        let mut state = SystemState::default().with_processed_output(output);
        state.memory.conversation_history.push(Message::system("Be terse."));

        let next = stage.apply(state, &EventBus::default()).await.unwrap();
        let buffer = &next.memory.conversation_buffer;
        assert_eq!(buffer.len(), 1);
        assert_eq!(buffer[0].content, "Bad response.");
    }

    #[tokio::test]
    async fn continue_prompt_only_after_first_cycle() {
        let stage = PromptStage::new().with_continue_prompt("Continue.");
        let state = SystemState::default();
        let next = stage.apply(state, &EventBus::default()).await.unwrap();
        assert!(next.memory.conversation_buffer.is_empty());

        let next = stage.apply(next.next_cycle(), &EventBus::default()).await.unwrap();
        assert_eq!(next.memory.conversation_buffer[0].content, "Continue.");
    }

    #[tokio::test]
    async fn completion_buffers_assistant_reply() {
        let provider = Arc::new(ScriptedProvider::new(["4"]));
        let stage = CompletionStage::new(provider.clone());
        let mut state = SystemState::default();
        state.memory.conversation_history.push(Message::user("What is 2+2?"));

        let next = stage.apply(state, &EventBus::default()).await.unwrap();
        assert_eq!(next.agent_response.as_deref(), Some("4"));
        assert_eq!(next.memory.conversation_buffer, vec![Message::assistant("4")]);

        let requests = provider.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].messages.len(), 1);
        assert_eq!(requests[0].max_tokens, 950);
    }

    #[tokio::test]
    async fn response_stage_requires_a_response() {
        let stage = ResponseStage::new(Arc::new(ResponsePipeline::new()));
        let err = stage.apply(SystemState::default(), &EventBus::default()).await;
        assert!(matches!(err, Err(Error::Internal(_))));
    }

    #[tokio::test]
    async fn memory_stage_publishes_evictions() {
        let bus = EventBus::default();
        let mut rx = bus.subscribe();
        let mut state = SystemState::default().with_memory(MemoryState::new(1, 1000));
        for text in ["a", "b", "c"] {
            state.memory.conversation_buffer.push(Message::user(text));
        }

        let next = MemoryStage::default().apply(state, &bus).await.unwrap();
        assert_eq!(next.memory.conversation_history.len(), 1);

        let event = rx.recv().await.unwrap();
        assert!(matches!(
            event.as_ref(),
            DomainEvent::HistoryEvicted { evicted: 2, remaining: 1, .. }
        ));
    }
}
