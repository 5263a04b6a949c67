//! `rustedloop prompt`: Render the opening system prompt.

use rustedloop_agent::{SystemPrompt, builtin_actions};
use rustedloop_config::AppConfig;
use rustedloop_core::action::ActionRegistry;

pub async fn run(role: Option<String>) -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;
    let registry = ActionRegistry::from_actions(builtin_actions());

    let mut prompt = SystemPrompt::from_config(&config, &registry);
    if let Some(role) = role {
        prompt = prompt.with_role(role);
    }

    println!("{prompt}");
    Ok(())
}
