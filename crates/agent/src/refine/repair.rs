//! Validate-and-repair refinement.
//!
//! The actor must answer with a fenced code block. The largest block is
//! handed to a [`Validator`]; reported problems go back to the actor until
//! the validator is satisfied or the attempt budget runs out.

use std::process::Stdio;

use async_trait::async_trait;
use regex_lite::Regex;
use rustedloop_config::{RefinementConfig, ValidatorConfig};
use rustedloop_core::error::{RefinementError, Result};
use rustedloop_core::message::Role;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::agent::Responder;

const CODE_BLOCK_PATTERN: &str = r"(?s)```(?:\w+\n)?(.*?)```";

pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;

const MISSING_BLOCK_PROMPT: &str = "Provide completed code in a code block.";

/// Markdown fenced code blocks.
#[derive(Debug, Clone, Copy, Default)]
pub struct FencedBlock;

impl FencedBlock {
    /// Contents of every fenced block, in order of appearance.
    pub fn find_all(text: &str) -> Vec<&str> {
        match Regex::new(CODE_BLOCK_PATTERN) {
            Ok(re) => re
                .captures_iter(text)
                .filter_map(|c| c.get(1).map(|m| m.as_str()))
                .collect(),
            Err(_) => Vec::new(),
        }
    }

    pub fn is_present(text: &str) -> bool {
        !Self::find_all(text).is_empty()
    }

    /// The longest block, trimmed.
    pub fn largest(text: &str) -> Option<String> {
        Self::find_all(text)
            .into_iter()
            .max_by_key(|block| block.len())
            .map(|block| block.trim().to_string())
    }
}

/// Checks extracted content and reports problems.
#[async_trait]
pub trait Validator: Send + Sync {
    /// `Ok(None)` when the content is clean, `Ok(Some(problems))` otherwise.
    async fn validate(&self, content: &str) -> std::result::Result<Option<String>, RefinementError>;
}

/// Runs an external command with the content on stdin.
///
/// Anything the command prints (stdout then stderr) counts as problems;
/// silence means clean. The exit status is ignored.
#[derive(Debug, Clone)]
pub struct CommandValidator {
    program: String,
    args: Vec<String>,
}

impl CommandValidator {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn from_config(config: &ValidatorConfig) -> Self {
        Self {
            program: config.command.clone(),
            args: config.args.clone(),
        }
    }
}

#[async_trait]
impl Validator for CommandValidator {
    async fn validate(&self, content: &str) -> std::result::Result<Option<String>, RefinementError> {
        let failed = |e: std::io::Error| RefinementError::ValidatorFailed(format!("{}: {e}", self.program));

        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(failed)?;

        // Stdin is fed while the output pipes drain.
        let stdin = child.stdin.take();
        let feed = async move {
            if let Some(mut stdin) = stdin {
                stdin.write_all(content.as_bytes()).await?;
                stdin.shutdown().await?;
            }
            Ok::<(), std::io::Error>(())
        };
        let (fed, output) = tokio::join!(feed, child.wait_with_output());

        // A validator may exit without reading everything.
        if let Err(e) = fed
            && e.kind() != std::io::ErrorKind::BrokenPipe
        {
            return Err(failed(e));
        }
        let output = output.map_err(failed)?;
        let mut report = String::from_utf8_lossy(&output.stdout).into_owned();
        report.push_str(&String::from_utf8_lossy(&output.stderr));
        let report = report.trim();

        debug!(program = %self.program, clean = report.is_empty(), "Validator finished");
        Ok((!report.is_empty()).then(|| report.to_string()))
    }
}

/// Wraps an actor with a validator.
pub struct RepairLoop<A, V> {
    actor: A,
    validator: V,
    max_attempts: u32,
}

impl<A: Responder, V: Validator> RepairLoop<A, V> {
    pub fn new(actor: A, validator: V) -> Self {
        Self {
            actor,
            validator,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }

    /// Re-prompts allowed before giving up (at least one).
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    /// Takes the attempt budget from `[refinement]`.
    pub fn with_config(self, config: &RefinementConfig) -> Self {
        self.with_max_attempts(config.max_repair_attempts)
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn actor(&self) -> &A {
        &self.actor
    }

    pub fn into_actor(self) -> A {
        self.actor
    }

    /// Answer `prompt` and repair until the validator is satisfied.
    ///
    /// Returns the full response whose largest code block validated clean.
    pub async fn generate(&mut self, prompt: &str, role: Role) -> Result<String> {
        let mut response = self.actor.respond(prompt, role).await?;
        let mut attempts = 0u32;

        loop {
            let code = loop {
                if let Some(block) = FencedBlock::largest(&response) {
                    break block;
                }
                self.spend_attempt(&mut attempts, "response contained no code block")?;
                debug!(attempts, "No code block, asking again");
                response = self.actor.respond(MISSING_BLOCK_PROMPT, Role::User).await?;
            };

            let Some(problems) = self.validator.validate(&code).await? else {
                info!(attempts, "Validator satisfied");
                return Ok(response);
            };

            self.spend_attempt(&mut attempts, &problems)?;
            info!(attempts, "Validator reported problems, asking for a revision");
            let prompt = format!(
                "There are errors in your response. Return a revised version with the errors fixed.\n{problems}"
            );
            response = self.actor.respond(&prompt, Role::User).await?;
        }
    }

    fn spend_attempt(&self, attempts: &mut u32, problems: &str) -> std::result::Result<(), RefinementError> {
        if *attempts >= self.max_attempts {
            warn!(attempts = *attempts, "Repair loop did not converge");
            return Err(RefinementError::NoConvergence {
                attempts: *attempts,
                last_problems: problems.to_string(),
            });
        }
        *attempts += 1;
        Ok(())
    }
}

impl<A: Responder> RepairLoop<A, CommandValidator> {
    /// A loop around the configured validator command, or `None` when
    /// `[refinement.validator]` is not set.
    pub fn from_config(actor: A, config: &RefinementConfig) -> Option<Self> {
        let validator = CommandValidator::from_config(config.validator.as_ref()?);
        Some(Self::new(actor, validator).with_config(config))
    }
}

#[async_trait]
impl<A: Responder, V: Validator> Responder for RepairLoop<A, V> {
    async fn respond(&mut self, prompt: &str, role: Role) -> Result<String> {
        self.generate(prompt, role).await
    }
}
