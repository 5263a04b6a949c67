//! Immutable orchestration state.
//!
//! [`SystemState`] is the aggregate root. Each transition consumes a state
//! and returns a new one through the `with_*` methods; stages never hold
//! on to the value they were given.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use crate::action::ActionRegistry;
use crate::message::Message;
use crate::processing::ProcessedOutput;

/// Status of the task the agent was given.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskStatus {
    #[default]
    Undefined,
    Incomplete,
    Complete,
}

/// The task being worked on and how far the run has progressed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskState {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(default)]
    pub status: TaskStatus,

    /// Upper bound on executed cycles. `None` runs until completion.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_cycles: Option<u32>,

    /// Number of cycles executed so far. Only ever increases.
    #[serde(default)]
    pub current_cycle: u32,
}

impl TaskState {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            description: Some(description.into()),
            ..Self::default()
        }
    }

    pub fn with_max_cycles(mut self, max_cycles: u32) -> Self {
        self.max_cycles = Some(max_cycles);
        self
    }

    pub fn with_status(mut self, status: TaskStatus) -> Self {
        self.status = status;
        self
    }

    /// Whether the cycle bound (if any) has been reached.
    pub fn cycles_exhausted(&self) -> bool {
        self.max_cycles
            .is_some_and(|max| self.current_cycle >= max)
    }
}

/// Completion parameters. Fixed for the lifetime of a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelState {
    pub name: String,
    pub temperature: f32,
    /// Number of samples to request
    pub n: u32,
    /// Upper bound on tokens requested per completion
    pub max_tokens: u32,
    pub frequency_penalty: f32,
    pub presence_penalty: f32,
}

impl Default for ModelState {
    fn default() -> Self {
        Self {
            name: "gpt-3.5-turbo".into(),
            temperature: 0.2,
            n: 1,
            max_tokens: 2000,
            frequency_penalty: 0.0,
            presence_penalty: 0.0,
        }
    }
}

/// Bounded conversation memory.
///
/// `conversation_buffer` holds messages produced during a cycle that have
/// not yet been folded into `conversation_history`. `message_count` and
/// `token_count` describe the history as of the last fold.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoryState {
    pub max_history_message_count: usize,
    pub max_history_token_count: usize,
    #[serde(default)]
    pub conversation_history: Vec<Message>,
    #[serde(default)]
    pub conversation_buffer: Vec<Message>,
    #[serde(default)]
    pub message_count: usize,
    #[serde(default)]
    pub token_count: usize,
}

impl MemoryState {
    pub fn new(max_history_message_count: usize, max_history_token_count: usize) -> Self {
        Self {
            max_history_message_count,
            max_history_token_count,
            conversation_history: Vec::new(),
            conversation_buffer: Vec::new(),
            message_count: 0,
            token_count: 0,
        }
    }

    /// Whether the history already carries a system message.
    pub fn has_system_message(&self) -> bool {
        self.conversation_history
            .iter()
            .chain(self.conversation_buffer.iter())
            .any(Message::is_system)
    }
}

impl Default for MemoryState {
    fn default() -> Self {
        Self::new(100, 1000)
    }
}

/// Aggregate state for one run of the orchestration engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemState {
    /// Correlates log lines and events belonging to the same run.
    pub run_id: String,

    pub task: TaskState,

    pub model: ModelState,

    pub memory: MemoryState,

    /// The request that started the run, consumed by the first prompt stage.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_query: Option<String>,

    /// Actions the model may call. Not serialized: the registry holds
    /// executable code, and a restored state is given a registry again
    /// through [`SystemState::with_actions`].
    #[serde(skip)]
    pub available_actions: Arc<ActionRegistry>,

    /// Raw text of the most recent completion.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_response: Option<String>,

    /// Processing result for the most recent completion.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub processed_output: Option<ProcessedOutput>,
}

impl SystemState {
    pub fn new(task: TaskState, model: ModelState, memory: MemoryState) -> Self {
        Self {
            run_id: Uuid::new_v4().to_string(),
            task,
            model,
            memory,
            user_query: None,
            available_actions: Arc::new(ActionRegistry::new()),
            agent_response: None,
            processed_output: None,
        }
    }

    pub fn with_user_query(mut self, query: impl Into<String>) -> Self {
        self.user_query = Some(query.into());
        self
    }

    pub fn with_actions(mut self, actions: Arc<ActionRegistry>) -> Self {
        self.available_actions = actions;
        self
    }

    pub fn with_task(mut self, task: TaskState) -> Self {
        self.task = task;
        self
    }

    pub fn with_memory(mut self, memory: MemoryState) -> Self {
        self.memory = memory;
        self
    }

    pub fn with_agent_response(mut self, response: impl Into<String>) -> Self {
        self.agent_response = Some(response.into());
        self
    }

    pub fn with_processed_output(mut self, output: ProcessedOutput) -> Self {
        self.processed_output = Some(output);
        self
    }

    /// Advance the cycle counter by exactly one.
    pub fn next_cycle(self) -> Self {
        let task = TaskState {
            current_cycle: self.task.current_cycle + 1,
            ..self.task.clone()
        };
        self.with_task(task)
    }
}

impl Default for SystemState {
    fn default() -> Self {
        Self::new(
            TaskState::default(),
            ModelState::default(),
            MemoryState::default(),
        )
    }
}
