//! RustedLoop CLI.
//!
//! Commands:
//! - `doctor` : Check the configuration and model profile
//! - `config` : Show, locate, validate or initialise the config file
//! - `tokens` : Estimate the token cost of a message
//! - `prompt` : Render the system prompt for the configured task

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(
    name = "rustedloop",
    about = "RustedLoop — cyclic agent orchestration engine",
    version,
    author
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    json_logs: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Diagnose configuration health
    Doctor,

    /// Manage the configuration file
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },

    /// Estimate the token cost of a user message
    Tokens {
        /// Message text
        text: String,

        /// Print the estimate as JSON
        #[arg(long)]
        json: bool,
    },

    /// Render the system prompt the configured task would start with
    Prompt {
        /// Role text that opens the prompt
        #[arg(short, long)]
        role: Option<String>,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Print the effective configuration
    Show,
    /// Print the config file location
    Path,
    /// Validate the configuration
    Validate,
    /// Write a default config file
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

fn init_tracing(verbose: bool, json: bool) {
    let filter = if verbose { "debug" } else { "info" };
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .with_target(false);

    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.json_logs);

    match cli.command {
        Commands::Doctor => commands::doctor::run().await?,
        Commands::Config { action } => match action {
            ConfigAction::Show => commands::config_cmd::show().await?,
            ConfigAction::Path => commands::config_cmd::path().await?,
            ConfigAction::Validate => commands::config_cmd::validate().await?,
            ConfigAction::Init { force } => commands::config_cmd::init(force).await?,
        },
        Commands::Tokens { text, json } => commands::tokens::run(&text, json).await?,
        Commands::Prompt { role } => commands::prompt::run(role).await?,
    }

    Ok(())
}
