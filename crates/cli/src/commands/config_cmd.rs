//! `rustedloop config`: Configuration management commands.

use rustedloop_config::{AppConfig, ResponseFormat, context_window};

pub async fn validate() -> Result<(), Box<dyn std::error::Error>> {
    println!("🔍 Validating configuration...");

    match AppConfig::load() {
        Ok(config) => {
            println!("   ✅ Config parsed successfully");

            let mut warnings = Vec::new();

            if config.task.description.is_none() {
                warnings.push("No task description; the system prompt will carry no instructions");
            }

            if config.task.max_cycles.is_none() {
                warnings.push("No max_cycles set; runs continue until the task is submitted");
            }

            if config.response.multi_action && config.response.format == ResponseFormat::Yaml {
                warnings.push("Multi-action YAML responses are harder for models to format");
            }

            if warnings.is_empty() {
                println!("   ✅ All checks passed");
            } else {
                println!();
                for w in &warnings {
                    println!("   ⚠️  {w}");
                }
            }

            println!();
            println!("   Model:       {}", config.model.name);
            println!(
                "   History:     {} messages, {} tokens",
                config.memory.max_history_message_count,
                config
                    .history_token_limit()
                    .map(|limit| limit.to_string())
                    .unwrap_or_else(|_| "?".into())
            );
            println!(
                "   Cycles:      {}",
                config
                    .task
                    .max_cycles
                    .map(|max| max.to_string())
                    .unwrap_or_else(|| "unbounded".into())
            );
            println!("   Response:    {}", config.response.format);
            println!("   Completion:  {}", config.task.completion_action);
        }
        Err(e) => {
            println!("   ❌ Config error: {e}");
            return Err(e.into());
        }
    }

    Ok(())
}

pub async fn show() -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    if config.memory.max_history_token_count.is_none()
        && let Some(window) = context_window(&config.model.name)
    {
        println!("# max_history_token_count defaults to {window} for {}", config.model.name);
    }
    Ok(())
}

pub async fn path() -> Result<(), Box<dyn std::error::Error>> {
    println!("{}", AppConfig::config_path().display());
    Ok(())
}

pub async fn init(force: bool) -> Result<(), Box<dyn std::error::Error>> {
    let path = AppConfig::config_path();
    if path.exists() && !force {
        return Err(format!("{} already exists (use --force to overwrite)", path.display()).into());
    }

    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir)?;
    }
    std::fs::write(&path, AppConfig::default_toml())?;
    tracing::info!(path = %path.display(), "Wrote default configuration");
    println!("✅ Wrote {}", path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use rustedloop_config::AppConfig;

    #[test]
    fn config_path_is_valid() {
        let path = AppConfig::config_path();
        assert!(path.to_str().unwrap().contains("config.toml"));
    }
}
