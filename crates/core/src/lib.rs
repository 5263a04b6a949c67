//! # RustedLoop Core
//!
//! Domain types, traits, and error definitions for the RustedLoop agent
//! orchestration engine. It holds no engine logic of its own; it defines
//! the domain model that all other crates implement against.
//!
//! ## Design Philosophy
//!
//! State is a value. Every stage of an orchestration cycle receives one
//! [`SystemState`] and returns a new one; nothing is mutated in place and
//! nothing keeps a reference to a previous state.
//!
//! External collaborators (the completion service, token counting,
//! structured-response schemas, actions) are traits defined here so the
//! engine can be driven by real backends or by scripted test doubles.

pub mod action;
pub mod error;
pub mod event;
pub mod message;
pub mod processing;
pub mod provider;
pub mod schema;
pub mod state;
pub mod token;

// Re-export key types at crate root for ergonomics
pub use action::{Action, ActionCall, ActionFeedback, ActionRegistry, FnAction, ParamSpec};
pub use error::{Error, Result};
pub use event::{DomainEvent, EventBus};
pub use message::{Message, Role};
pub use processing::{ProcessedOutput, ProcessorOutput, ProcessorStatus};
pub use provider::{CompletionRequest, Provider};
pub use schema::StructuredResponse;
pub use state::{MemoryState, ModelState, SystemState, TaskState, TaskStatus};
pub use token::TokenCounter;
