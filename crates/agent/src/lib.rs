//! The orchestration engine of RustedLoop.
//!
//! A run is a sequence of **cycles** over an immutable
//! [`SystemState`](rustedloop_core::state::SystemState). Each cycle applies
//! the configured [`Stage`]s in order:
//!
//! 1. **Prompt**: buffer the system prompt and user query, or last cycle's feedback
//! 2. **Memory**: fold the buffer into history and enforce the history bounds
//! 3. **Completion**: ask the provider for a response within the token budget
//! 4. **Response**: run the processor chain (parse, extract calls, detect completion)
//! 5. **Action**: invoke the requested actions
//! 6. **Memory**: fold the assistant message back in
//!
//! The [`AgentSystem`] repeats cycles until the task completes, the cycle
//! bound is reached or a stop is requested.

pub mod agent;
pub mod builder;
pub mod builtin;
pub mod pipeline;
pub mod prompt;
pub mod refine;
pub mod scheduler;
pub mod schemas;
pub mod stages;

#[cfg(test)]
mod test_helpers;

pub use agent::{ChatAgent, Responder};
pub use builder::AgentBuilder;
pub use builtin::{NO_ACTION, builtin_actions};
pub use pipeline::{ResponsePipeline, ResponseProcessor};
pub use prompt::SystemPrompt;
pub use refine::{CommandValidator, CritiqueLoop, CritiqueOutcome, FencedBlock, RepairLoop, Validator};
pub use scheduler::{AgentSystem, CycleStatus, StopHandle};
pub use schemas::{MultiActionResponse, SingleActionResponse};
pub use stages::{
    ActionStage, CompletionStage, MemoryStage, PromptStage, ResponseStage, Stage, completion_budget,
    standard_cycle,
};
