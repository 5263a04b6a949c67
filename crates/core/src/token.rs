//! Token counting boundary.

use crate::message::Message;

/// Counts the tokens a list of messages costs when sent to `model`.
///
/// Encodings are model-specific; implementations fall back to a default
/// encoding for models they do not recognise rather than failing.
pub trait TokenCounter: Send + Sync {
    fn count_tokens(&self, messages: &[Message], model: &str) -> usize;
}

impl<F> TokenCounter for F
where
    F: Fn(&[Message], &str) -> usize + Send + Sync,
{
    fn count_tokens(&self, messages: &[Message], model: &str) -> usize {
        self(messages, model)
    }
}
