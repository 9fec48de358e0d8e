/// Main entry point for the MCP labs
///
/// This file sets up logging, parses command line arguments, and either runs
/// one of the tool servers on stdin/stdout or starts an interactive chat that
/// connects to a tool server subprocess.

use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use mcp_labs::config::{self, ModelConfig, SessionConfig, SqlConfig, WeatherConfig};
use mcp_labs::{AnthropicModel, ChatSession, ConfigError, LabError, McpClient, ServerCommand};

/// Command line arguments for the MCP labs
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,

    /// Enable verbose output (implies debug)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Chat with a language model that can call the server's tools
    Chat(ChatArgs),

    /// Run a tool server over stdin/stdout
    Serve {
        #[command(subcommand)]
        pack: Pack,
    },
}

#[derive(clap::Args, Debug)]
struct ChatArgs {
    /// Server to connect to: `weather`, `sql`, a .py/.js script, or an executable
    #[arg(long, default_value = "weather")]
    server: String,

    /// Extra argument passed to the server (repeatable)
    #[arg(long = "server-arg", allow_hyphen_values = true)]
    server_args: Vec<String>,

    /// Maximum model round-trips per query
    #[arg(long)]
    max_rounds: Option<usize>,

    /// Maximum tokens per model response
    #[arg(long)]
    max_tokens: Option<u32>,

    /// System prompt for the conversation
    #[arg(long)]
    system: Option<String>,
}

#[derive(Subcommand, Debug)]
enum Pack {
    /// NWS weather alerts and forecasts
    Weather,

    /// Read-only SQL exploration of a SQLite database
    Sql {
        /// Path to the SQLite database file (falls back to MCP_SQLITE_DATABASE)
        #[arg(long)]
        database: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    // Set up logging based on command line flags
    let log_level = if args.verbose {
        "debug"
    } else if args.debug {
        "info"
    } else {
        "warn"
    };

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("mcp_labs={}", log_level)));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr) // stdout carries MCP frames or the chat transcript
        .init();

    config::load_dotenv();

    match args.command {
        Command::Chat(chat) => run_chat(chat).await?,
        Command::Serve { pack: Pack::Weather } => {
            info!("Starting weather MCP server");
            mcp_labs::serve_weather(&WeatherConfig::from_env()).await?;
        }
        Command::Serve {
            pack: Pack::Sql { database },
        } => {
            let sql_config = SqlConfig::resolve(database)?;
            info!("Starting SQL MCP server with database at: {}", sql_config.database.display());
            mcp_labs::serve_sql(&sql_config).await?;
        }
    }

    info!("Shutdown complete");
    Ok(())
}

fn session_config(args: &ChatArgs) -> Result<SessionConfig, ConfigError> {
    let mut config = SessionConfig::from_env()?;

    if let Some(max_rounds) = args.max_rounds {
        if max_rounds == 0 {
            return Err(ConfigError::Invalid {
                key: "--max-rounds",
                value: max_rounds.to_string(),
                reason: "must be at least 1".to_string(),
            });
        }
        config.max_rounds = max_rounds;
    }
    if let Some(max_tokens) = args.max_tokens {
        config.max_tokens = max_tokens;
    }
    if let Some(system) = &args.system {
        config.system_prompt = Some(system.clone());
    }
    Ok(config)
}

async fn run_chat(args: ChatArgs) -> Result<(), LabError> {
    let model_config = ModelConfig::from_env()?;
    let session_config = session_config(&args)?;
    let command = ServerCommand::from_target(&args.server, &args.server_args)?;

    let client = Arc::new(McpClient::spawn(&command).await?);
    let model = Arc::new(AnthropicModel::new(&model_config));
    info!(model = %model.model(), server = %client.server_info().name, "Chat starting");

    let result = chat_loop(model, Arc::clone(&client), session_config).await;

    if let Err(e) = client.shutdown().await {
        warn!("Failed to stop server process: {}", e);
    }
    result
}

async fn chat_loop(
    model: Arc<AnthropicModel>,
    client: Arc<McpClient>,
    config: SessionConfig,
) -> Result<(), LabError> {
    let mut session = ChatSession::start(model, client, config).await?;

    let names: Vec<&str> = session.tools().iter().map(|t| t.name.as_str()).collect();
    println!("\nConnected to server with tools: {:?}", names);
    println!("\nMCP Client Started!");
    println!("Type your queries or 'quit' to exit.");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("\nQuery: ");
        std::io::stdout().flush()?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let query = line.trim();
        if query.is_empty() {
            continue;
        }
        if query.eq_ignore_ascii_case("quit") {
            break;
        }

        match session.ask(query).await {
            Ok(outcome) => {
                for call in &outcome.tool_calls {
                    println!(
                        "[Calling tool {} with args {}]",
                        call.name,
                        serde_json::Value::Object(call.arguments.clone())
                    );
                }
                println!("\n{}", outcome.text);
            }
            Err(e) if e.is_fatal() => return Err(e.into()),
            Err(e) => {
                if let Some(partial) = e.partial_answer() {
                    println!("\n{}", partial);
                }
                println!("\nError: {}", e);
            }
        }

        println!("\n[Memory: {} messages]", session.history().len());
    }

    Ok(())
}
