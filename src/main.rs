//! relaybot CLI
//!
//! Commands:
//!   console - Chat with the bot from the terminal (stdin/stdout transport)
//!   usage   - Show today's token usage and remaining budget
//!   init    - Write the default config file
//!   config  - Print the effective configuration

use anyhow::{Context, Result};
use async_trait::async_trait;
use clap::{Parser, Subcommand};
use colored::*;
use relaybot::{ChatPlatform, Config, InboundMessage, RelayService, UsageLedger};
use std::path::PathBuf;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser)]
#[command(name = "relaybot")]
#[command(about = "Chat relay bot for OpenAI-compatible completion APIs")]
#[command(version)]
struct Cli {
    /// Config file (defaults to ~/.relaybot/config.toml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Chat from the terminal; every line is one inbound message
    Console {
        /// Channel ID the conversation is stored under
        #[arg(long, default_value = "console")]
        channel: String,

        /// Sender ID and display name
        #[arg(long, default_value = "local")]
        user: String,
    },

    /// Show today's token usage
    Usage,

    /// Write the default config file
    Init {
        /// Overwrite an existing config file
        #[arg(long)]
        force: bool,
    },

    /// Print the effective configuration
    Config,
}

/// Terminal transport: replies go to stdout.
struct ConsolePlatform;

#[async_trait]
impl ChatPlatform for ConsolePlatform {
    async fn send(&self, _channel_id: &str, text: &str) -> Result<()> {
        println!("{} {}", "bot>".green().bold(), text);
        Ok(())
    }
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().with_target(true).with_writer(std::io::stderr))
        .init();
}

fn load_config(path: Option<&PathBuf>) -> Result<Config> {
    match path {
        Some(path) => Config::load_from(path),
        None => match Config::load()? {
            Some(config) => Ok(config),
            None => {
                tracing::warn!("No config file found, using defaults");
                Ok(Config::default())
            }
        },
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();

    match cli.command {
        Commands::Console { channel, user } => {
            let config = load_config(cli.config.as_ref())?;
            let service = RelayService::from_config(config)?;
            let platform = ConsolePlatform;

            println!(
                "{} Chatting on channel {} as {}. Ctrl-D to quit.",
                "relaybot".cyan().bold(),
                channel.yellow(),
                user.yellow()
            );

            let mut lines = BufReader::new(tokio::io::stdin()).lines();
            while let Some(line) = lines.next_line().await.context("Failed to read stdin")? {
                let msg = InboundMessage {
                    sender_id: user.clone(),
                    sender_name: user.clone(),
                    channel_id: channel.clone(),
                    content: line,
                };
                // Failures were already reported to the user by the relay.
                let _ = service.handle_message(&msg, &platform).await;
            }
        }

        Commands::Usage => {
            let config = load_config(cli.config.as_ref())?;
            let ledger = UsageLedger::open(config.usage_file()?);
            let counter = ledger.load();
            let budget = ledger.remaining_budget(config.limits.daily_token_cap);

            println!("Token usage for {}", counter.date.to_string().cyan());
            println!("  Used:      {}", counter.usage);
            println!("  Remaining: {}", budget);
            println!("  File:      {}", ledger.path().display());
        }

        Commands::Init { force } => {
            let path = match cli.config {
                Some(path) => path,
                None => Config::path()?,
            };
            if path.exists() && !force {
                println!(
                    "Config already exists at {} (use --force to overwrite)",
                    path.display()
                );
                return Ok(());
            }
            Config::default().save_to(&path)?;
            println!("{} Wrote default config to {}", "✓".green(), path.display());
        }

        Commands::Config => {
            let config = load_config(cli.config.as_ref())?;
            if let Err(e) = config.validate() {
                eprintln!("{} {}", "warning:".yellow(), e);
            }
            print!("{}", toml::to_string_pretty(&config).context("Failed to serialize config")?);
        }
    }

    Ok(())
}
