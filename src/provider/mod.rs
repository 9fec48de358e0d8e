/// Tool provider layer
///
/// A tool provider exposes a discoverable set of named tools and executes them
/// on request. The session loop only ever talks to this trait, so an in-process
/// registry and a remote MCP server are interchangeable.

pub mod registry;

pub use registry::*;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

/// Arguments passed to a tool: a JSON object mapping
pub type ToolArguments = Map<String, Value>;

/// Description of a tool as presented to the language model
///
/// Fetched once per session and shared read-only afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    /// Tool name (e.g., "get_forecast")
    pub name: String,
    /// Human-readable description
    pub description: String,
    /// JSON schema for the tool's input parameters
    pub input_schema: Value,
}

/// Payload produced by executing a tool
///
/// An `is_error` output is still a successful provider call: the text is
/// relayed to the model so it can react to the failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolOutput {
    pub content: String,
    pub is_error: bool,
}

impl ToolOutput {
    /// Create a successful output
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            is_error: false,
        }
    }

    /// Create an error output
    pub fn error(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            is_error: true,
        }
    }
}

/// Errors that can occur while talking to a tool provider
#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("Tool provider unavailable: {0}")]
    Unavailable(String),

    #[error("Unknown tool: {0}")]
    UnknownTool(String),

    #[error("Tool failed: {0}")]
    ToolFailed(String),

    #[error("Protocol error: {0}")]
    Protocol(String),
}

impl ProviderError {
    /// Whether the provider itself could not be reached
    ///
    /// Everything else is a per-call failure the model can be told about.
    pub fn is_unavailable(&self) -> bool {
        matches!(self, ProviderError::Unavailable(_))
    }
}

/// Interface of anything that can list and execute tools
#[async_trait]
pub trait ToolProvider: Send + Sync {
    /// List the tools this provider currently offers
    async fn list_tools(&self) -> Result<Vec<ToolDefinition>, ProviderError>;

    /// Execute a tool by name with the given arguments
    async fn call_tool(
        &self,
        name: &str,
        arguments: &ToolArguments,
    ) -> Result<ToolOutput, ProviderError>;
}
