//! Actor/critic refinement.
//!
//! The actor answers, a critic reviews the answer against the task, and
//! unless the critic says no changes are required the actor revises once.
//! The revision is returned without a second review.

use async_trait::async_trait;
use regex_lite::Regex;
use rustedloop_core::error::Result;
use rustedloop_core::message::Role;
use tracing::info;

use crate::agent::Responder;

/// Critic replies matching this (case-insensitively) accept the response.
const ACCEPTANCE_PATTERN: &str = r"(?i)no changes? required";

/// What came out of one critique pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CritiqueOutcome {
    /// The response to use: the original, or the revision
    pub response: String,
    pub criticism: String,
    pub revised: bool,
}

/// Whether a critic reply accepts the response as-is.
pub fn accepts(criticism: &str) -> bool {
    Regex::new(ACCEPTANCE_PATTERN).is_ok_and(|re| re.is_match(criticism))
}

/// Wraps an actor with a critic.
pub struct CritiqueLoop<A, C> {
    actor: A,
    critic: C,
    task: String,
}

impl<A: Responder, C: Responder> CritiqueLoop<A, C> {
    pub fn new(actor: A, critic: C, task: impl Into<String>) -> Self {
        Self {
            actor,
            critic,
            task: task.into(),
        }
    }

    pub fn actor(&self) -> &A {
        &self.actor
    }

    pub fn critic(&self) -> &C {
        &self.critic
    }

    pub fn into_parts(self) -> (A, C) {
        (self.actor, self.critic)
    }

    /// Answer `prompt`, then review and revise at most once.
    pub async fn generate(&mut self, prompt: &str, role: Role) -> Result<CritiqueOutcome> {
        let response = self.actor.respond(prompt, role).await?;

        let review = format!(
            "TASK:\n{}\nQUERY:\n{}\nRESPONSE:\n{}\n",
            self.task,
            prompt.trim(),
            response.trim()
        );
        let criticism = self.critic.respond(&review, Role::User).await?;

        if accepts(&criticism) {
            info!("Critic accepted the response");
            return Ok(CritiqueOutcome {
                response,
                criticism,
                revised: false,
            });
        }

        info!("Critic requested changes, revising");
        let revision_prompt =
            format!("Revise your last response considering the following feedback:\n{criticism}");
        let revised = self.actor.respond(&revision_prompt, Role::User).await?;
        Ok(CritiqueOutcome {
            response: revised,
            criticism,
            revised: true,
        })
    }
}

#[async_trait]
impl<A: Responder, C: Responder> Responder for CritiqueLoop<A, C> {
    async fn respond(&mut self, prompt: &str, role: Role) -> Result<String> {
        Ok(self.generate(prompt, role).await?.response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::ScriptedResponder;

    #[test]
    fn acceptance_phrase_variants() {
        assert!(accepts("No changes required."));
        assert!(accepts("Looks good, NO CHANGE REQUIRED"));
        assert!(!accepts("Fix the indentation."));
        assert!(!accepts("Changes are required"));
    }

    #[tokio::test]
    async fn accepted_response_is_returned_unchanged() {
        let actor = ScriptedResponder::new(["def add(a, b): return a + b"]);
        let critic = ScriptedResponder::new(["No changes required."]);
        let mut critique = CritiqueLoop::new(actor, critic, "Write an add function.");

        let outcome = critique.generate("Write add()", Role::User).await.unwrap();
        assert_eq!(outcome.response, "def add(a, b): return a + b");
        assert!(!outcome.revised);
        assert_eq!(critique.actor().prompts.len(), 1);
    }

    #[tokio::test]
    async fn criticism_triggers_exactly_one_revision() {
        let actor = ScriptedResponder::new(["draft", "revised draft", "never used"]);
        let critic = ScriptedResponder::new(["Fix the indentation.", "Still wrong."]);
        let mut critique = CritiqueLoop::new(actor, critic, "Write code.");

        let outcome = critique.generate("  Write it  ", Role::User).await.unwrap();
        assert_eq!(outcome.response, "revised draft");
        assert_eq!(outcome.criticism, "Fix the indentation.");
        assert!(outcome.revised);

        let (actor, critic) = critique.into_parts();
        assert_eq!(critic.prompts.len(), 1);
        assert_eq!(
            critic.prompts[0].0,
            "TASK:\nWrite code.\nQUERY:\nWrite it\nRESPONSE:\ndraft\n"
        );
        assert_eq!(actor.prompts.len(), 2);
        assert_eq!(
            actor.prompts[1].0,
            "Revise your last response considering the following feedback:\nFix the indentation."
        );
    }

    #[tokio::test]
    async fn loops_compose_as_responders() {
        let inner = CritiqueLoop::new(
            ScriptedResponder::new(["a"]),
            ScriptedResponder::new(["no change required"]),
            "t",
        );
        let mut outer = CritiqueLoop::new(inner, ScriptedResponder::new(["No changes required"]), "t");
        assert_eq!(outer.respond("q", Role::User).await.unwrap(), "a");
    }
}
