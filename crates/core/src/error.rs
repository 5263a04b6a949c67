//! Error types for the RustedLoop domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each bounded context has its own error variant.
//!
//! Only some of these ever reach the caller of the scheduler. Action
//! failures and parse failures are recovered inside a cycle and turned
//! into conversational feedback; the variants exist so the recovering
//! component has something typed to format.

use thiserror::Error;

/// The top-level error type for all RustedLoop operations.
#[derive(Debug, Error)]
pub enum Error {
    // --- Provider errors ---
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    // --- Memory errors ---
    #[error("Memory error: {0}")]
    Memory(#[from] MemoryError),

    // --- Action errors ---
    #[error("Action error: {0}")]
    Action(#[from] ActionError),

    // --- Response processing errors ---
    #[error("Processing error: {0}")]
    Processing(#[from] ProcessingError),

    // --- Refinement loop errors ---
    #[error("Refinement error: {0}")]
    Refinement(#[from] RefinementError),

    // --- Configuration errors ---
    #[error("Configuration error: {message}")]
    Config { message: String },

    // --- Generic ---
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

// --- Bounded context errors ---

/// Failures a completion service reports through `Provider::complete`.
#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    #[error("Provider returned no choices")]
    EmptyResponse,

    #[error("Completion request failed: {0}")]
    RequestFailed(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MemoryError {
    /// Eviction removed every non-system message and the history is still
    /// over one of its bounds.
    #[error(
        "History bound unsatisfiable: {message_count} messages / {token_count} tokens \
         remain after evicting all non-system messages (limits: {max_messages} messages / {max_tokens} tokens)"
    )]
    HistoryBoundUnsatisfiable {
        message_count: usize,
        token_count: usize,
        max_messages: usize,
        max_tokens: usize,
    },

    #[error("No completion budget left: history uses {token_count} of {max_tokens} tokens")]
    CompletionBudgetExhausted { token_count: usize, max_tokens: usize },
}

#[derive(Debug, Clone, Error)]
pub enum ActionError {
    #[error("Action not available: {0}")]
    NotFound(String),

    #[error("{action}() {reason}")]
    InvalidArguments { action: String, reason: String },

    #[error("{action} failed: {reason}")]
    ExecutionFailed { action: String, reason: String },

    #[error("{action} panicked: {reason}")]
    Panicked { action: String, reason: String },
}

impl ActionError {
    /// Short label for the kind of failure, surfaced to the model as
    /// `"<kind>: <message>"`.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "NotFound",
            Self::InvalidArguments { .. } => "InvalidArguments",
            Self::ExecutionFailed { .. } => "ExecutionFailed",
            Self::Panicked { .. } => "Panic",
        }
    }
}

#[derive(Debug, Clone, Error)]
pub enum ProcessingError {
    #[error("No {format} payload found in response")]
    PayloadNotFound { format: &'static str },

    #[error("Invalid {format} payload: {reason}")]
    InvalidPayload { format: &'static str, reason: String },

    #[error("Payload failed validation: {0}")]
    Validation(String),
}

#[derive(Debug, Clone, Error)]
pub enum RefinementError {
    #[error("Could not converge after {attempts} revision attempts; last problems: {last_problems}")]
    NoConvergence { attempts: u32, last_problems: String },

    #[error("Validator failed to run: {0}")]
    ValidatorFailed(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_error_displays_correctly() {
        let err: Error = ProviderError::RequestFailed("connection reset".into()).into();
        assert_eq!(err.to_string(), "Provider error: Completion request failed: connection reset");
        assert_eq!(
            Error::from(ProviderError::EmptyResponse).to_string(),
            "Provider error: Provider returned no choices"
        );
    }

    #[test]
    fn unsatisfiable_history_reports_limits() {
        let err = Error::Memory(MemoryError::HistoryBoundUnsatisfiable {
            message_count: 1,
            token_count: 900,
            max_messages: 10,
            max_tokens: 500,
        });
        let text = err.to_string();
        assert!(text.contains("unsatisfiable"));
        assert!(text.contains("900"));
        assert!(text.contains("500"));
    }

    #[test]
    fn action_error_kinds() {
        assert_eq!(ActionError::NotFound("x".into()).kind(), "NotFound");
        let err = ActionError::InvalidArguments {
            action: "echo".into(),
            reason: "missing required parameter 'text'".into(),
        };
        assert_eq!(err.kind(), "InvalidArguments");
        assert_eq!(err.to_string(), "echo() missing required parameter 'text'");
    }

    #[test]
    fn no_convergence_mentions_attempts() {
        let err = RefinementError::NoConvergence {
            attempts: 3,
            last_problems: "E501 line too long".into(),
        };
        assert!(err.to_string().contains("3"));
        assert!(err.to_string().contains("E501"));
    }
}
