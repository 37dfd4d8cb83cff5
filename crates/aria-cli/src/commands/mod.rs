use clap::{Parser, Subcommand};
use std::path::PathBuf;

use aria_config::{AriaConfig, ConfigLoader};
use aria_core::{AriaError, Personality};

mod chat;
mod history;
mod ingest;
mod profile;
mod wiring;

/// Aria, a personality-driven assistant with long-term memory
#[derive(Parser)]
#[command(name = "aria", version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to aria.toml config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Log level override (e.g. debug, info, warn, error)
    #[arg(short, long, global = true)]
    log_level: Option<String>,

    /// Enable verbose output (debug logging)
    #[arg(short, long, global = true, conflicts_with = "quiet")]
    verbose: bool,

    /// Suppress all log output (errors only)
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a user, or change the personality of an existing one
    Profile {
        /// Username (1-256 characters)
        username: String,
        /// Personality tag: Neutral, Charlie, Tolkien or Stewie
        #[arg(short, long, default_value = "Neutral")]
        personality: String,
    },
    /// Talk to the assistant as a user
    Chat {
        /// Username or user id
        #[arg(short, long)]
        user: String,
        /// Send a single message instead of starting an interactive session
        #[arg(short, long)]
        message: Option<String>,
    },
    /// Add a file to a user's memory and summarise it
    Ingest {
        /// Username or user id
        #[arg(short, long)]
        user: String,
        /// File to upload
        path: PathBuf,
        /// MIME type (guessed from the extension when omitted)
        #[arg(long)]
        mime: Option<String>,
    },
    /// Show a user's visible history
    History {
        /// Username or user id
        #[arg(short, long)]
        user: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// List the available personalities
    Personalities,
    /// Show current configuration (API keys redacted)
    Config {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

impl Cli {
    pub async fn run(self) -> aria_core::Result<()> {
        // Load config first so we can use it for log format
        let config_loader = ConfigLoader::load(self.config.as_deref())?;
        let config = config_loader.get();

        // Resolve log level: --verbose > --quiet > --log-level > config default
        let log_level = if self.verbose {
            "debug"
        } else if self.quiet {
            "error"
        } else {
            self.log_level.as_deref().unwrap_or(&config.logging.level)
        };

        // Initialize tracing with appropriate format
        if config.logging.format == "json" {
            tracing_subscriber::fmt()
                .with_env_filter(
                    tracing_subscriber::EnvFilter::try_from_default_env()
                        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level)),
                )
                .json()
                .with_target(true)
                .with_writer(std::io::stderr)
                .init();
        } else {
            tracing_subscriber::fmt()
                .with_env_filter(
                    tracing_subscriber::EnvFilter::try_from_default_env()
                        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level)),
                )
                .with_target(false)
                .with_writer(std::io::stderr)
                .init();
        }

        match self.command {
            Commands::Profile {
                username,
                personality,
            } => profile::cmd_profile(config, &username, &personality),
            Commands::Chat { user, message } => chat::cmd_chat(config, &user, message).await,
            Commands::Ingest { user, path, mime } => {
                ingest::cmd_ingest(config, &user, &path, mime).await
            }
            Commands::History { user, json } => history::cmd_history(config, &user, json).await,
            Commands::Personalities => Self::cmd_personalities(),
            Commands::Config { json } => Self::cmd_config(config, json),
        }
    }

    fn cmd_personalities() -> aria_core::Result<()> {
        for p in Personality::ALL {
            let marker = if p == Personality::default() { " (default)" } else { "" };
            println!("{:<8} {}{}", p.tag(), p.display_name(), marker);
        }
        Ok(())
    }

    fn cmd_config(config: AriaConfig, json: bool) -> aria_core::Result<()> {
        let config = redacted(config);
        if json {
            println!("{}", serde_json::to_string_pretty(&config)?);
        } else {
            println!(
                "{}",
                toml::to_string_pretty(&config).map_err(|e| AriaError::Config(e.to_string()))?
            );
        }
        Ok(())
    }
}

fn redacted(mut config: AriaConfig) -> AriaConfig {
    for key in [
        &mut config.services.gemini_api_key,
        &mut config.services.openai_api_key,
        &mut config.services.serpapi_api_key,
    ] {
        if key.is_some() {
            *key = Some("********".into());
        }
    }
    config
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_chat_with_global_flags() {
        let cli = Cli::try_parse_from(["aria", "-v", "chat", "--user", "frodo", "-m", "hi"]).unwrap();
        assert!(cli.verbose);
        match cli.command {
            Commands::Chat { user, message } => {
                assert_eq!(user, "frodo");
                assert_eq!(message.as_deref(), Some("hi"));
            }
            _ => panic!("expected chat"),
        }
    }

    #[test]
    fn test_verbose_conflicts_with_quiet() {
        assert!(Cli::try_parse_from(["aria", "-v", "-q", "personalities"]).is_err());
    }

    #[test]
    fn test_profile_default_personality() {
        let cli = Cli::try_parse_from(["aria", "profile", "sam"]).unwrap();
        match cli.command {
            Commands::Profile { username, personality } => {
                assert_eq!(username, "sam");
                assert_eq!(personality, "Neutral");
            }
            _ => panic!("expected profile"),
        }
    }

    #[test]
    fn test_redacted_hides_keys() {
        let mut config = AriaConfig::default();
        config.services.gemini_api_key = Some("secret".into());
        let config = redacted(config);
        assert_eq!(config.services.gemini_api_key.as_deref(), Some("********"));
        assert!(config.services.openai_api_key.is_none());
    }
}
