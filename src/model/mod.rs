/// Language model interface
///
/// The session loop hands the model the whole conversation plus the tool
/// definitions and gets back an ordered list of content blocks: text, tool
/// requests, or both.

pub mod anthropic;

pub use anthropic::AnthropicModel;

use async_trait::async_trait;
use thiserror::Error;

use crate::provider::ToolDefinition;
use crate::session::{ContentBlock, ConversationHistory};

/// Errors that can occur during a model call
#[derive(Error, Debug)]
pub enum ModelError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error: {status} - {body}")]
    Api { status: u16, body: String },

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Model call timed out after {0:?}")]
    Timeout(std::time::Duration),
}

/// A model that can answer or request tools
#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Produce the next assistant response for `history`
    async fn complete(
        &self,
        history: &ConversationHistory,
        tools: &[ToolDefinition],
        max_tokens: u32,
    ) -> Result<Vec<ContentBlock>, ModelError>;
}
