/// Public library interface for the MCP labs
///
/// This crate provides a tool-calling chat session that drives a language
/// model against an MCP tool server, plus the weather and SQL tool servers it
/// is usually paired with.

use std::sync::Arc;

use thiserror::Error;

pub mod config;
pub mod mcp;
pub mod model;
pub mod provider;
pub mod session;
pub mod tools;

// Re-export public modules and types
pub use config::{ConfigError, ModelConfig, SessionConfig, SqlConfig, WeatherConfig};
pub use mcp::{McpClient, McpError, McpServer, ServerCommand};
pub use model::{AnthropicModel, LanguageModel, ModelError};
pub use provider::{
    ProviderError, RegistryError, ToolDefinition, ToolHandler, ToolOutput, ToolProvider, ToolRegistry,
};
pub use session::{
    ChatSession, ContentBlock, ConversationHistory, Message, SessionError, SessionLoop,
    ToolInvocationRequest, ToolResult, TurnOutcome,
};
pub use tools::{SqlDatabase, ToolPackError};

/// Name the SQL pack announces during the MCP handshake
pub const SQL_SERVER_NAME: &str = "sql-dba";
/// Name the weather pack announces during the MCP handshake
pub const WEATHER_SERVER_NAME: &str = "weather";

/// Errors that can occur while running the labs
#[derive(Error, Debug)]
pub enum LabError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Session error: {0}")]
    Session(#[from] SessionError),

    #[error("MCP error: {0}")]
    Mcp(#[from] McpError),

    #[error("Tool setup error: {0}")]
    ToolPack(#[from] ToolPackError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<RegistryError> for LabError {
    fn from(err: RegistryError) -> Self {
        LabError::ToolPack(err.into())
    }
}

/// Run the weather tool server over stdin/stdout until the client disconnects
pub async fn serve_weather(config: &WeatherConfig) -> Result<(), LabError> {
    let registry = tools::weather_registry(config)?;
    tracing::info!("Weather server using NWS API at {}", config.api_base);

    let mut server = McpServer::new(WEATHER_SERVER_NAME, registry);
    server.run_stdio().await?;
    Ok(())
}

/// Run the SQL tool server over stdin/stdout until the client disconnects
pub async fn serve_sql(config: &SqlConfig) -> Result<(), LabError> {
    let db = SqlDatabase::open(&config.database).map_err(ToolPackError::from)?;
    let registry = tools::sql_registry(Arc::new(db))?;

    let mut server = McpServer::new(SQL_SERVER_NAME, registry);
    server.run_stdio().await?;
    Ok(())
}
