//! `rustedloop doctor`: Diagnose configuration health.

use rustedloop_config::{AppConfig, context_window};

pub async fn run() -> Result<(), Box<dyn std::error::Error>> {
    println!("🩺 RustedLoop Doctor — Configuration Diagnostics");
    println!("===============================================\n");

    let mut issues = 0;

    let config_path = AppConfig::config_path();
    if config_path.exists() {
        println!("  ✅ Config file found at {}", config_path.display());
    } else {
        println!("  ⚠️  No config file, using defaults — run `rustedloop config init`");
    }

    match AppConfig::load() {
        Ok(config) => {
            println!("  ✅ Configuration valid");

            match config.history_token_limit() {
                Ok(limit) if context_window(&config.model.name).is_some() => {
                    println!("  ✅ Model profile: {} ({limit} token history)", config.model.name);
                }
                Ok(limit) => {
                    println!(
                        "  ✅ Unknown model {} with explicit {limit} token history",
                        config.model.name
                    );
                }
                Err(e) => {
                    println!("  ❌ {e} — set memory.max_history_token_count");
                    issues += 1;
                }
            }

            if let Some(validator) = &config.refinement.validator {
                println!("  ℹ️  Repair validator: {}", validator.command);
            }
        }
        Err(e) => {
            println!("  ❌ Configuration invalid: {e}");
            issues += 1;
        }
    }

    println!();
    if issues == 0 {
        println!("  🎉 All checks passed!");
    } else {
        println!("  ⚠️  {issues} issue(s) found. See above for details.");
    }

    Ok(())
}
