//! Bounded conversation memory.
//!
//! Messages produced during a cycle are appended to the buffer. Folding
//! moves the buffer into history and then evicts the earliest non-system
//! messages until the history fits both the message-count and the
//! token-count bound. System messages are never evicted and do not count
//! against the message bound, which limits conversational turns only.

use std::sync::Arc;

use rustedloop_core::error::MemoryError;
use rustedloop_core::message::Message;
use rustedloop_core::state::MemoryState;
use rustedloop_core::token::TokenCounter;
use tracing::{debug, info};

use crate::token::EstimatingTokenCounter;

/// Result of a fold: the new memory and how many messages were evicted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FoldOutcome {
    pub memory: MemoryState,
    pub evicted: usize,
}

/// The eviction policy, parameterised by a token counter.
#[derive(Clone)]
pub struct ConversationMemory {
    counter: Arc<dyn TokenCounter>,
}

impl ConversationMemory {
    pub fn new(counter: Arc<dyn TokenCounter>) -> Self {
        Self { counter }
    }

    /// Count the tokens `messages` cost for `model`.
    pub fn count_tokens(&self, messages: &[Message], model: &str) -> usize {
        self.counter.count_tokens(messages, model)
    }

    /// Append a message to the pending buffer. History is untouched.
    pub fn append(memory: MemoryState, message: Message) -> MemoryState {
        let mut conversation_buffer = memory.conversation_buffer;
        conversation_buffer.push(message);
        MemoryState {
            conversation_buffer,
            ..memory
        }
    }

    /// Fold the buffer into history and evict down to the configured bounds.
    pub fn fold(&self, memory: MemoryState, model: &str) -> Result<FoldOutcome, MemoryError> {
        let MemoryState {
            max_history_message_count,
            max_history_token_count,
            conversation_history,
            conversation_buffer,
            ..
        } = memory;

        let mut history = conversation_history;
        history.extend(conversation_buffer);
        let before = history.len();

        while turn_count(&history) > max_history_message_count {
            self.evict_earliest(&mut history, model, max_history_message_count, max_history_token_count)?;
        }

        let mut token_count = self.counter.count_tokens(&history, model);
        while token_count > max_history_token_count {
            self.evict_earliest(&mut history, model, max_history_message_count, max_history_token_count)?;
            token_count = self.counter.count_tokens(&history, model);
        }

        let evicted = before - history.len();
        if evicted > 0 {
            info!(evicted, remaining = history.len(), token_count, "Evicted messages from history");
        } else {
            debug!(messages = history.len(), token_count, "Folded buffer into history");
        }

        Ok(FoldOutcome {
            memory: MemoryState {
                max_history_message_count,
                max_history_token_count,
                message_count: history.len(),
                token_count,
                conversation_history: history,
                conversation_buffer: Vec::new(),
            },
            evicted,
        })
    }

    fn evict_earliest(
        &self,
        history: &mut Vec<Message>,
        model: &str,
        max_messages: usize,
        max_tokens: usize,
    ) -> Result<(), MemoryError> {
        match history.iter().position(|m| !m.is_system()) {
            Some(index) => {
                history.remove(index);
                Ok(())
            }
            None => Err(MemoryError::HistoryBoundUnsatisfiable {
                message_count: history.len(),
                token_count: self.counter.count_tokens(history, model),
                max_messages,
                max_tokens,
            }),
        }
    }
}

fn turn_count(history: &[Message]) -> usize {
    history.iter().filter(|m| !m.is_system()).count()
}

impl Default for ConversationMemory {
    fn default() -> Self {
        Self::new(Arc::new(EstimatingTokenCounter))
    }
}

impl std::fmt::Debug for ConversationMemory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConversationMemory").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn one_token_per_message() -> ConversationMemory {
        ConversationMemory::new(Arc::new(|messages: &[Message], _model: &str| messages.len()))
    }

    fn fill(memory: MemoryState, messages: impl IntoIterator<Item = Message>) -> MemoryState {
        messages.into_iter().fold(memory, ConversationMemory::append)
    }

    #[test]
    fn append_only_touches_buffer() {
        let memory = ConversationMemory::append(MemoryState::default(), Message::user("hi"));
        assert!(memory.conversation_history.is_empty());
        assert_eq!(memory.conversation_buffer.len(), 1);
        assert_eq!(memory.message_count, 0);
    }

    #[test]
    fn fold_without_pressure_keeps_everything() {
        let memory = fill(
            MemoryState::new(10, 100),
            [Message::system("rules"), Message::user("a"), Message::assistant("b")],
        );
        let outcome = one_token_per_message().fold(memory, "gpt-4").unwrap();
        assert_eq!(outcome.evicted, 0);
        assert_eq!(outcome.memory.message_count, 3);
        assert_eq!(outcome.memory.token_count, 3);
        assert!(outcome.memory.conversation_buffer.is_empty());
    }

    #[test]
    fn message_limit_keeps_system_and_most_recent() {
        let memory = fill(
            MemoryState::new(3, 1000),
            [
                Message::system("rules"),
                Message::user("u1"),
                Message::assistant("a1"),
                Message::user("u2"),
                Message::assistant("a2"),
                Message::user("u3"),
            ],
        );
        let outcome = one_token_per_message().fold(memory, "gpt-4").unwrap();
        let contents: Vec<&str> = outcome
            .memory
            .conversation_history
            .iter()
            .map(|m| m.content.as_str())
            .collect();
        assert_eq!(contents, vec!["rules", "u2", "a2", "u3"]);
        assert_eq!(outcome.evicted, 2);
        assert_eq!(outcome.memory.message_count, 4);
    }

    #[test]
    fn token_limit_evicts_oldest_first() {
        let memory = fill(
            MemoryState::new(100, 3),
            [
                Message::user("u1"),
                Message::system("rules"),
                Message::assistant("a1"),
                Message::user("u2"),
            ],
        );
        let outcome = one_token_per_message().fold(memory, "gpt-4").unwrap();
        let contents: Vec<&str> = outcome
            .memory
            .conversation_history
            .iter()
            .map(|m| m.content.as_str())
            .collect();
        assert_eq!(contents, vec!["rules", "a1", "u2"]);
        assert_eq!(outcome.memory.token_count, 3);
    }

    #[test]
    fn history_and_buffer_fold_in_order() {
        let memory = fill(MemoryState::new(10, 100), [Message::user("first")]);
        let memory = one_token_per_message().fold(memory, "gpt-4").unwrap().memory;
        let memory = fill(memory, [Message::assistant("second"), Message::user("third")]);
        let memory = one_token_per_message().fold(memory, "gpt-4").unwrap().memory;
        let contents: Vec<&str> = memory
            .conversation_history
            .iter()
            .map(|m| m.content.as_str())
            .collect();
        assert_eq!(contents, vec!["first", "second", "third"]);
    }

    #[test]
    fn system_messages_do_not_count_against_message_limit() {
        let memory = fill(
            MemoryState::new(1, 100),
            [Message::system("a"), Message::system("b"), Message::user("c")],
        );
        let outcome = one_token_per_message().fold(memory, "gpt-4").unwrap();
        assert_eq!(outcome.evicted, 0);
        assert_eq!(outcome.memory.message_count, 3);
    }

    #[test]
    fn system_messages_alone_over_token_bound_is_an_error() {
        let memory = fill(
            MemoryState::new(10, 1),
            [Message::system("a"), Message::system("b"), Message::user("c")],
        );
        let err = one_token_per_message().fold(memory, "gpt-4").unwrap_err();
        assert_eq!(
            err,
            MemoryError::HistoryBoundUnsatisfiable {
                message_count: 2,
                token_count: 2,
                max_messages: 10,
                max_tokens: 1,
            }
        );
    }

    #[test]
    fn eviction_invariant_holds_across_folds() {
        let memory_policy = one_token_per_message();
        let mut memory = fill(MemoryState::new(4, 6), [Message::system("rules")]);
        for i in 0..20 {
            memory = ConversationMemory::append(memory, Message::user(format!("u{i}")));
            memory = memory_policy.fold(memory, "gpt-4").unwrap().memory;
            assert!(turn_count(&memory.conversation_history) <= 4);
            assert!(memory.token_count <= 6);
            assert!(memory.conversation_history[0].is_system());
        }
        assert_eq!(memory.conversation_history.last().unwrap().content, "u19");
    }

    #[test]
    fn oversized_system_prompt_is_an_error() {
        let memory = fill(
            MemoryState::new(10, 5),
            [Message::system("x".repeat(400)), Message::user("hello")],
        );
        let err = ConversationMemory::default().fold(memory, "gpt-4").unwrap_err();
        assert!(matches!(err, MemoryError::HistoryBoundUnsatisfiable { message_count: 1, .. }));
    }

    #[test]
    fn estimating_counter_is_the_default() {
        let memory = fill(MemoryState::new(10, 1000), [Message::user("hello")]);
        let outcome = ConversationMemory::default().fold(memory, "gpt-4").unwrap();
        // 3 framing + 1 role + 2 content + 3 priming
        assert_eq!(outcome.memory.token_count, 9);
    }
}
