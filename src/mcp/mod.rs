/// MCP protocol implementation
///
/// This module handles the Model Context Protocol communication in both
/// directions: a stdio server that exposes a tool registry, and a client that
/// drives a server subprocess and acts as a tool provider.

pub mod client;
pub mod protocol;
pub mod server;

// Re-export main types
pub use client::{McpClient, ServerCommand};
pub use server::McpServer;

use thiserror::Error;

use crate::provider::ProviderError;

/// Errors on an MCP connection
#[derive(Error, Debug)]
pub enum McpError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Server closed the connection")]
    Closed,

    #[error("Server returned error {code}: {message}")]
    Rpc { code: i32, message: String },

    #[error("Protocol error: {0}")]
    Protocol(String),
}

impl From<McpError> for ProviderError {
    fn from(err: McpError) -> Self {
        match err {
            McpError::Io(_) | McpError::Closed => ProviderError::Unavailable(err.to_string()),
            McpError::Rpc { .. } => ProviderError::ToolFailed(err.to_string()),
            McpError::Json(_) | McpError::Protocol(_) => ProviderError::Protocol(err.to_string()),
        }
    }
}
