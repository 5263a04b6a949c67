//! `rustedloop tokens`: Token estimate for a message under the configured limits.

use rustedloop_agent::completion_budget;
use rustedloop_config::AppConfig;
use rustedloop_core::message::Message;
use rustedloop_core::state::SystemState;
use rustedloop_core::token::TokenCounter;
use rustedloop_memory::EstimatingTokenCounter;

pub async fn run(text: &str, json: bool) -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;
    let mut memory = config.memory_state()?;

    let tokens = EstimatingTokenCounter.count_tokens(&[Message::user(text)], &config.model.name);
    memory.token_count = tokens;
    let max_history_tokens = memory.max_history_token_count;

    let state = SystemState::new(config.task_state(), config.model_state(), memory);
    let budget = completion_budget(&state).ok();

    if json {
        let report = serde_json::json!({
            "model": config.model.name,
            "tokens": tokens,
            "max_history_tokens": max_history_tokens,
            "completion_budget": budget,
        });
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!("Model:              {}", config.model.name);
    println!("Message tokens:     {tokens}");
    println!("History limit:      {max_history_tokens}");
    match budget {
        Some(budget) => println!("Completion budget:  {budget}"),
        None => println!("Completion budget:  exhausted"),
    }
    Ok(())
}
