//! Conversation memory for RustedLoop.
//!
//! Token estimation and the bounded-history eviction policy applied by the
//! memory stage of every cycle.

pub mod conversation;
pub mod token;

pub use conversation::{ConversationMemory, FoldOutcome};
pub use token::{EstimatingTokenCounter, MessageFraming, estimate_tokens};
