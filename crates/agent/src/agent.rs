//! Single-turn agents.
//!
//! A [`Responder`] answers one prompt at a time while keeping its own
//! conversation. It is the primitive the refinement loops are built on.

use std::sync::Arc;

use async_trait::async_trait;
use rustedloop_core::error::{Error, Result};
use rustedloop_core::message::{Message, Role};
use rustedloop_core::provider::Provider;
use rustedloop_core::state::SystemState;
use rustedloop_memory::ConversationMemory;
use tracing::debug;

use crate::scheduler::AgentSystem;
use crate::stages::{CompletionStage, MemoryStage};

/// Generates a response to a prompt, remembering the exchange.
#[async_trait]
pub trait Responder: Send {
    async fn respond(&mut self, prompt: &str, role: Role) -> Result<String>;
}

/// A conversational agent: each turn folds the prompt into memory,
/// requests a completion and folds the reply back in.
pub struct ChatAgent {
    system: AgentSystem,
    state: SystemState,
}

impl ChatAgent {
    pub fn new(provider: Arc<dyn Provider>, state: SystemState) -> Self {
        Self::with_memory_policy(provider, state, ConversationMemory::default())
    }

    pub fn with_memory_policy(
        provider: Arc<dyn Provider>,
        state: SystemState,
        memory: ConversationMemory,
    ) -> Self {
        let system = AgentSystem::new(vec![
            Box::new(MemoryStage::new(memory.clone())),
            Box::new(CompletionStage::new(provider)),
            Box::new(MemoryStage::new(memory)),
        ]);
        Self { system, state }
    }

    /// Open the conversation with a system message.
    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        let memory = ConversationMemory::append(self.state.memory.clone(), Message::system(prompt));
        self.state = self.state.with_memory(memory);
        self
    }

    /// The state after the most recent turn.
    pub fn state(&self) -> &SystemState {
        &self.state
    }

    /// Task description, if the agent was given one.
    pub fn task(&self) -> Option<&str> {
        self.state.task.description.as_deref()
    }

    pub fn history(&self) -> &[Message] {
        &self.state.memory.conversation_history
    }
}

#[async_trait]
impl Responder for ChatAgent {
    async fn respond(&mut self, prompt: &str, role: Role) -> Result<String> {
        let mut state = self.state.clone();
        if !prompt.is_empty() {
            let memory = ConversationMemory::append(state.memory, Message::new(role, prompt));
            state = SystemState { memory, ..state };
        }

        let next = self.system.run_cycle(state).await?;
        let response = next
            .agent_response
            .clone()
            .ok_or_else(|| Error::Internal("completion produced no response".into()))?;

        debug!(run_id = %next.run_id, turn = next.task.current_cycle, "Agent responded");
        self.state = next;
        Ok(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::ScriptedProvider;
    use rustedloop_core::state::{MemoryState, ModelState, TaskState};

    fn agent(provider: Arc<ScriptedProvider>) -> ChatAgent {
        let state = SystemState::new(
            TaskState::new("greeter", "Greet the user."),
            ModelState::default(),
            MemoryState::new(10, 4097),
        );
        ChatAgent::new(provider, state).with_system_prompt("You are friendly.")
    }

    #[tokio::test]
    async fn respond_records_both_sides() {
        let provider = Arc::new(ScriptedProvider::new(["Hello!", "Bye!"]));
        let mut agent = agent(provider.clone());

        assert_eq!(agent.respond("Hi", Role::User).await.unwrap(), "Hello!");
        assert_eq!(agent.respond("Leaving", Role::User).await.unwrap(), "Bye!");

        let roles: Vec<Role> = agent.history().iter().map(|m| m.role).collect();
        assert_eq!(
            roles,
            vec![Role::System, Role::User, Role::Assistant, Role::User, Role::Assistant]
        );
        assert_eq!(agent.state().task.current_cycle, 2);

        // The second request carries the whole conversation so far.
        let requests = provider.requests();
        assert_eq!(requests[1].messages.len(), 4);
        assert_eq!(requests[1].messages[3].content, "Leaving");
    }

    #[tokio::test]
    async fn empty_prompt_adds_no_message() {
        let provider = Arc::new(ScriptedProvider::new(["Anything else?"]));
        let mut agent = agent(provider.clone());
        agent.respond("", Role::User).await.unwrap();
        assert_eq!(provider.requests()[0].messages.len(), 1);
    }

    #[tokio::test]
    async fn failed_turn_leaves_state_unchanged() {
        let provider = Arc::new(ScriptedProvider::new(Vec::<String>::new()));
        let mut agent = agent(provider);
        let before = agent.state().clone();

        assert!(agent.respond("Hi", Role::User).await.is_err());
        assert_eq!(agent.state().memory, before.memory);
        assert_eq!(agent.task(), Some("Greet the user."));
    }
}
