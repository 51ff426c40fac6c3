use std::path::PathBuf;
use std::time::Duration;

use anyhow::anyhow;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use lumen_agent::{
    AgentConfig,
    livekit::{DEFAULT_TOKEN_TTL, generate_access_token},
    worker,
};

/// Lumen - realtime assistant agent for LiveKit rooms
#[derive(Parser, Debug)]
#[command(name = "lumen-agent")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Path to configuration file (YAML)
    #[arg(short = 'c', long = "config", value_name = "FILE")]
    config: Option<PathBuf>,

    /// Subcommand to run (defaults to `run`)
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Join the configured room and run the assistant session
    Run,

    /// Mint a room access token for a participant
    Token {
        /// Room to grant access to (defaults to LIVEKIT_ROOM)
        #[arg(short = 'r', long = "room")]
        room: Option<String>,

        /// Participant identity
        #[arg(short = 'i', long = "identity")]
        identity: String,

        /// Display name (defaults to the identity)
        #[arg(short = 'n', long = "name")]
        name: Option<String>,

        /// Token lifetime in seconds
        #[arg(long = "ttl", default_value_t = DEFAULT_TOKEN_TTL.as_secs())]
        ttl_seconds: u64,
    },

    /// List the tools exposed by the configured tool servers
    Tools {
        /// Print the catalog as JSON
        #[arg(long = "json")]
        json: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if it exists (must be done before config loading)
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let cli = Cli::parse();

    let config = if let Some(config_path) = cli.config {
        println!("Loading configuration from {}", config_path.display());
        AgentConfig::from_file(&config_path).map_err(|e| anyhow!(e.to_string()))?
    } else {
        AgentConfig::from_env().map_err(|e| anyhow!(e.to_string()))?
    };

    match cli.command.unwrap_or(Commands::Run) {
        Commands::Run => {
            let reason = worker::run(config).await?;
            println!("Agent stopped: {reason:?}");
        }
        Commands::Token {
            room,
            identity,
            name,
            ttl_seconds,
        } => {
            let room = room
                .or_else(|| config.livekit_room.clone())
                .ok_or_else(|| anyhow!("No room given and LIVEKIT_ROOM is not set"))?;
            let (api_key, api_secret) = config.livekit_credentials()?;
            let token = generate_access_token(
                api_key,
                api_secret,
                &room,
                &identity,
                name.as_deref(),
                Duration::from_secs(ttl_seconds),
            )?;
            println!("{token}");
        }
        Commands::Tools { json } => {
            let tools = worker::discover_tools(&config).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&tools)?);
            } else if tools.is_empty() {
                println!("No tools available");
            } else {
                for tool in &tools {
                    println!("{:<32} {}", tool.name, tool.description);
                }
            }
        }
    }

    Ok(())
}
