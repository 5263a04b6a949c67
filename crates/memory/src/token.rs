//! Token estimation utilities.
//!
//! Uses a character-based heuristic: ~4 characters per token.
//! This approximation is accurate within ~10% for BPE tokenizers
//! on English text, and it keeps eviction tests predictable.
//!
//! On top of the text cost, chat models charge a fixed framing overhead
//! per message and per named author, plus a few tokens to prime the
//! reply. The overhead differs between model families.

use rustedloop_core::message::Message;
use rustedloop_core::token::TokenCounter;
use tracing::debug;

/// Tokens every reply is primed with.
const REPLY_PRIMING_TOKENS: i64 = 3;

/// Estimate the token count for a string.
///
/// Heuristic: 1 token ≈ 4 characters. Rounds up.
pub fn estimate_tokens(text: &str) -> usize {
    if text.is_empty() {
        return 0;
    }
    text.len().div_ceil(4)
}

/// Per-message framing overhead for a model family.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MessageFraming {
    pub tokens_per_message: i64,
    /// Added when a message carries a name (negative when the name replaces the role)
    pub tokens_per_name: i64,
}

impl MessageFraming {
    pub const GPT_35: Self = Self { tokens_per_message: 4, tokens_per_name: -1 };
    pub const GPT_4: Self = Self { tokens_per_message: 3, tokens_per_name: 1 };
    pub const DEFAULT: Self = Self::GPT_4;

    /// Framing for `model`, falling back to [`MessageFraming::DEFAULT`].
    pub fn for_model(model: &str) -> Self {
        if model.starts_with("gpt-3.5") {
            Self::GPT_35
        } else if model.starts_with("gpt-4") {
            Self::GPT_4
        } else {
            debug!(model, "Unknown model, using default message framing");
            Self::DEFAULT
        }
    }
}

/// Estimate tokens for a single message including framing overhead.
pub fn estimate_message_tokens(message: &Message, framing: MessageFraming) -> i64 {
    let mut tokens = framing.tokens_per_message
        + estimate_tokens(message.role.as_str()) as i64
        + estimate_tokens(&message.content) as i64;
    if let Some(name) = &message.name {
        tokens += estimate_tokens(name) as i64 + framing.tokens_per_name;
    }
    tokens
}

/// The default [`TokenCounter`]: heuristic text cost plus model framing.
#[derive(Debug, Clone, Copy, Default)]
pub struct EstimatingTokenCounter;

impl TokenCounter for EstimatingTokenCounter {
    fn count_tokens(&self, messages: &[Message], model: &str) -> usize {
        let framing = MessageFraming::for_model(model);
        let total: i64 = messages
            .iter()
            .map(|m| estimate_message_tokens(m, framing))
            .sum::<i64>()
            + REPLY_PRIMING_TOKENS;
        total.max(0) as usize
    }
}
