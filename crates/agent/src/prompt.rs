//! System prompt construction.

use rustedloop_config::{AppConfig, ResponseFormat};
use rustedloop_core::action::ActionRegistry;
use rustedloop_core::schema::StructuredResponse;

use crate::schemas::{MultiActionResponse, SingleActionResponse};

/// Builder for the system message that opens every run.
///
/// Components are optional; empty ones are skipped and the rest are
/// joined by a blank line in a fixed order: role, instructions, action
/// reference, response format.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SystemPrompt {
    role: Option<String>,
    instructions: Option<String>,
    action_reference: Option<String>,
    response_format: Option<String>,
}

impl SystemPrompt {
    pub fn new() -> Self {
        Self::default()
    }

    /// Instructions from the task description, the action reference and
    /// the response schema the configured pipeline parses.
    pub fn from_config(config: &AppConfig, actions: &ActionRegistry) -> Self {
        let mut prompt = Self::new().with_actions(actions);
        if let Some(description) = &config.task.description {
            prompt = prompt.with_instructions(description.clone());
        }
        let format = config.response.format;
        if config.response.multi_action {
            prompt.with_response_schema::<MultiActionResponse>(format)
        } else {
            prompt.with_response_schema::<SingleActionResponse>(format)
        }
    }

    pub fn with_role(mut self, role: impl Into<String>) -> Self {
        self.role = Some(role.into());
        self
    }

    pub fn with_instructions(mut self, instructions: impl Into<String>) -> Self {
        self.instructions = Some(instructions.into());
        self
    }

    pub fn with_actions(mut self, actions: &ActionRegistry) -> Self {
        if !actions.is_empty() {
            self.action_reference = Some(actions.describe());
        }
        self
    }

    /// Show the model an example of `S` in the given format.
    pub fn with_response_schema<S: StructuredResponse>(mut self, format: ResponseFormat) -> Self {
        let example = S::example();
        self.response_format = Some(match format {
            ResponseFormat::Json => example.to_json(),
            ResponseFormat::Yaml => example.to_yaml(),
        });
        self
    }

    /// Show the model a free-form example response.
    pub fn with_response_example(mut self, example: impl Into<String>) -> Self {
        self.response_format = Some(example.into());
        self
    }

    pub fn render(&self) -> String {
        let components = [
            self.role.clone(),
            self.instructions.as_ref().map(|i| format!("Instructions:\n{i}")),
            self.action_reference
                .as_ref()
                .map(|a| format!("Action API reference:\n{a}")),
            self.response_format
                .as_ref()
                .map(|f| format!("Use the following schema to format your response:\n{f}")),
        ];

        components
            .into_iter()
            .flatten()
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty())
            .collect::<Vec<_>>()
            .join("\n\n")
    }

    pub fn is_empty(&self) -> bool {
        self.render().is_empty()
    }
}

impl std::fmt::Display for SystemPrompt {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.render())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builtin::builtin_actions;
    use crate::schemas::SingleActionResponse;

    #[test]
    fn empty_prompt_renders_nothing() {
        assert!(SystemPrompt::new().is_empty());
    }

    #[test]
    fn components_joined_in_order() {
        let registry = ActionRegistry::from_actions(builtin_actions());
        let prompt = SystemPrompt::new()
            .with_role("You are a careful engineer.\n")
            .with_instructions("Fix the failing test.")
            .with_actions(&registry)
            .with_response_example("{\"ok\": true}")
            .render();

        let sections: Vec<&str> = prompt.split("\n\n").collect();
        assert_eq!(sections.len(), 4);
        assert_eq!(sections[0], "You are a careful engineer.");
        assert_eq!(sections[1], "Instructions:\nFix the failing test.");
        assert!(sections[2].starts_with("Action API reference:\nno_action()"));
        assert_eq!(
            sections[3],
            "Use the following schema to format your response:\n{\"ok\": true}"
        );
    }

    #[test]
    fn missing_components_are_skipped() {
        let prompt = SystemPrompt::new().with_instructions("Answer briefly.").render();
        assert_eq!(prompt, "Instructions:\nAnswer briefly.");
    }

    #[test]
    fn schema_example_in_requested_format() {
        let prompt = SystemPrompt::new()
            .with_response_schema::<SingleActionResponse>(ResponseFormat::Yaml)
            .render();
        assert!(prompt.starts_with("Use the following schema to format your response:\ngoal:"));
        assert!(prompt.contains("I must"));
    }

    #[test]
    fn from_config_uses_task_and_format() {
        let mut config = AppConfig::default();
        config.task.description = Some("Sort the list.".into());
        config.response.multi_action = true;
        let registry = ActionRegistry::from_actions(builtin_actions());

        let prompt = SystemPrompt::from_config(&config, &registry).render();
        assert!(prompt.starts_with("Instructions:\nSort the list.\n\nAction API reference:\n"));
        assert!(prompt.contains("\"actions\""));
    }
}
