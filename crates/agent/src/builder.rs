//! Assembles a runnable system from configuration.

use std::sync::Arc;

use rustedloop_config::AppConfig;
use rustedloop_core::action::{Action, ActionRegistry};
use rustedloop_core::error::Result;
use rustedloop_core::event::EventBus;
use rustedloop_core::provider::Provider;
use rustedloop_core::state::SystemState;
use rustedloop_core::token::TokenCounter;
use rustedloop_memory::ConversationMemory;

use crate::builtin::builtin_actions;
use crate::pipeline::ResponsePipeline;
use crate::prompt::SystemPrompt;
use crate::scheduler::AgentSystem;
use crate::stages::{PromptStage, standard_cycle};

/// Builds an [`AgentSystem`] and its initial [`SystemState`].
///
/// The registry always starts with the built-in actions; actions added
/// here are registered after them and replace built-ins of the same name.
pub struct AgentBuilder {
    config: AppConfig,
    provider: Arc<dyn Provider>,
    actions: Vec<Arc<dyn Action>>,
    role: Option<String>,
    continue_prompt: Option<String>,
    memory: ConversationMemory,
    events: Option<Arc<EventBus>>,
}

impl AgentBuilder {
    pub fn new(config: AppConfig, provider: Arc<dyn Provider>) -> Self {
        Self {
            config,
            provider,
            actions: Vec::new(),
            role: None,
            continue_prompt: None,
            memory: ConversationMemory::default(),
            events: None,
        }
    }

    pub fn with_action(mut self, action: impl Action + 'static) -> Self {
        self.actions.push(Arc::new(action));
        self
    }

    /// Role text that opens the system prompt.
    pub fn with_role(mut self, role: impl Into<String>) -> Self {
        self.role = Some(role.into());
        self
    }

    pub fn with_continue_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.continue_prompt = Some(prompt.into());
        self
    }

    pub fn with_token_counter(mut self, counter: Arc<dyn TokenCounter>) -> Self {
        self.memory = ConversationMemory::new(counter);
        self
    }

    pub fn with_events(mut self, events: Arc<EventBus>) -> Self {
        self.events = Some(events);
        self
    }

    fn registry(&self) -> ActionRegistry {
        let registry =
            ActionRegistry::from_actions(builtin_actions().into_iter().chain(self.actions.iter().cloned()));
        match self.config.response.action_output_limit {
            Some(limit) => registry.with_output_limit(limit),
            None => registry,
        }
    }

    fn system_prompt(&self, registry: &ActionRegistry) -> String {
        let mut prompt = SystemPrompt::from_config(&self.config, registry);
        if let Some(role) = &self.role {
            prompt = prompt.with_role(role.clone());
        }
        prompt.render()
    }

    /// The system and the state to start it from, seeded with `query`.
    pub fn build(self, query: impl Into<String>) -> Result<(AgentSystem, SystemState)> {
        let memory_state = self.config.memory_state()?;
        let registry = self.registry();

        let mut prompt_stage = PromptStage::new().with_system_prompt(self.system_prompt(&registry));
        if let Some(nudge) = &self.continue_prompt {
            prompt_stage = prompt_stage.with_continue_prompt(nudge.clone());
        }

        let stages = standard_cycle(
            self.provider.clone(),
            ResponsePipeline::from_config(&self.config),
            self.memory.clone(),
            prompt_stage,
        );
        let mut system = AgentSystem::new(stages);
        if let Some(events) = self.events {
            system = system.with_events(events);
        }

        let state = SystemState::new(
            self.config.task_state(),
            self.config.model_state(),
            memory_state,
        )
        .with_actions(Arc::new(registry))
        .with_user_query(query);

        Ok((system, state))
    }
}
