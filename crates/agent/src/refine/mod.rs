//! Refinement loops layered over a [`Responder`](crate::agent::Responder).
//!
//! Both loops are responders themselves, so they nest.

pub mod critic;
pub mod repair;

pub use critic::{CritiqueLoop, CritiqueOutcome, accepts};
pub use repair::{CommandValidator, DEFAULT_MAX_ATTEMPTS, FencedBlock, RepairLoop, Validator};
