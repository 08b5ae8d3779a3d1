//! chatrelay - streaming chat relay for LLM providers
//!
//! Serves a WebSocket endpoint that relays chat messages to groq, openai or
//! gemini and streams the reply back chunk by chunk.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use chatrelay::config::Config;

#[derive(Parser)]
#[command(name = "chatrelay")]
#[command(about = "Streaming chat relay for LLM providers")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the relay server
    Serve {
        /// Path to configuration file (built-in defaults when omitted)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Override listen address
        #[arg(short, long)]
        listen: Option<String>,
    },

    /// Validate configuration file
    Check {
        /// Path to configuration file
        #[arg(short, long, default_value = "chatrelay.toml")]
        config: PathBuf,
    },

    /// Show configured providers and where their credentials come from
    Providers {
        /// Path to configuration file (built-in defaults when omitted)
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
}

fn load_config(path: Option<&PathBuf>) -> anyhow::Result<Config> {
    match path {
        Some(path) => Ok(Config::from_file(path)?),
        None => Ok(Config::default()),
    }
}

fn init_tracing(level: &str) {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("chatrelay={},tower_http=info", level).into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Provider keys are commonly kept in a local .env file
    let dotenv = dotenvy::dotenv();

    match cli.command {
        Commands::Serve { config, listen } => {
            let mut config = load_config(config.as_ref())?;
            init_tracing(&config.logging.level);
            if let Ok(path) = dotenv {
                tracing::info!(path = %path.display(), "Loaded environment file");
            }

            if let Some(addr) = listen {
                tracing::info!(listen = %addr, "Override listen address");
                config.server.listen = addr;
            }

            chatrelay::api::run_server(config).await
        }

        Commands::Check { config } => {
            init_tracing("info");
            tracing::info!(config = %config.display(), "Checking configuration");
            let config = Config::from_file(&config)?;
            tracing::info!(
                listen = %config.server.listen,
                default_provider = %config.server.default_provider,
                "Configuration is valid"
            );
            Ok(())
        }

        Commands::Providers { config } => {
            let config = load_config(config.as_ref())?;
            println!(
                "{:<8} {:<26} {:<9} {:<8} {}",
                "NAME", "MODEL", "STREAMING", "ENABLED", "CREDENTIAL"
            );
            for provider in &config.providers {
                println!(
                    "{:<8} {:<26} {:<9} {:<8} {}",
                    provider.name(),
                    provider.model,
                    provider.streaming(),
                    provider.enabled,
                    provider.key_source()
                );
            }
            Ok(())
        }
    }
}
