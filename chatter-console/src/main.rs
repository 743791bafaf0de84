//! Main entry point for the chatter console CLI.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use dotenv::dotenv;
use shared::{
    config::{Config, ConfigOverrides},
    models::{ConversationId, FanId},
};
use std::path::PathBuf;

mod commands;

/// Chatter console
#[derive(Parser, Debug)]
#[command(name = "chatter")]
#[command(about = "Operator console for fan conversations", long_about = None)]
struct Cli {
    /// Path to the configuration file (config.yaml or config.json)
    #[arg(long, short, global = true)]
    config: Option<PathBuf>,

    /// Base URL of the chatter API (e.g. <http://127.0.0.1:8000/api>)
    #[arg(long, global = true)]
    api_url: Option<String>,

    /// Base URL of the push relay
    #[arg(long, global = true)]
    push_url: Option<String>,

    /// Bearer token sent with every request
    #[arg(long, global = true)]
    token: Option<String>,

    /// Messages per page
    #[arg(long, global = true)]
    page_size: Option<usize>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// List conversations the way the sidebar orders them
    Conversations {
        /// Only show conversations whose fan name contains this text
        #[arg(long, short)]
        search: Option<String>,
    },

    /// Show a fan profile
    Fan {
        /// Fan identifier
        id: FanId,
    },

    /// Open a conversation and chat interactively
    Open {
        /// Conversation identifier
        conversation: ConversationId,
    },

    /// Generate shell completion scripts for the CLI
    Completion {
        /// The shell type for which to generate the completion script
        #[arg(long, short, value_enum)]
        shell: clap_complete::Shell,
    },

    /// Generate a configuration file with default values
    Config {
        /// Format of the configuration file to generate
        #[arg(long, short, value_enum, default_value_t = commands::config::ConfigFormat::Yaml)]
        format: commands::config::ConfigFormat,
    },
}

impl Cli {
    fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            api_base_url: self.api_url.clone(),
            push_base_url: self.push_url.clone(),
            api_token: self.token.clone(),
            page_size: self.page_size,
            log_level: self.log_level.clone(),
        }
    }

    fn load_config(&self) -> Result<Config> {
        let path = self
            .config
            .clone()
            .or_else(commands::config::default_config_path);
        let config = Config::load_config(path, self.overrides())
            .context("failed to load configuration")?;
        console::logging::initialize_tracing(&config);
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();
    let cli = Cli::parse();

    match &cli.command {
        Commands::Conversations { search } => {
            let config = cli.load_config()?;
            commands::conversations::list_conversations(&config, search.as_deref()).await?;
        }
        Commands::Fan { id } => {
            let config = cli.load_config()?;
            commands::conversations::show_fan(&config, *id).await?;
        }
        Commands::Open { conversation } => {
            let config = cli.load_config()?;
            commands::open::run(&config, *conversation).await?;
        }
        Commands::Completion { shell } => {
            commands::completion::generate_completion(*shell);
        }
        Commands::Config { format } => {
            commands::config::generate_config(*format)?;
        }
    }

    Ok(())
}
