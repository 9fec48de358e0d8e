/// Conversation message types
///
/// Every entry in a conversation is one of three explicit variants instead of
/// a loosely typed role/content map.

use serde::{Deserialize, Serialize};

use crate::provider::ToolArguments;

/// A tool invocation the model asked for
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolInvocationRequest {
    /// Opaque call identifier, echoed back in the matching result
    pub id: String,
    /// Name of the tool to run
    pub name: String,
    /// Arguments, passed to the provider verbatim
    pub arguments: ToolArguments,
}

/// Outcome of one tool invocation, correlated by call id
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolResult {
    pub call_id: String,
    pub content: String,
    pub is_error: bool,
}

/// One block of model output
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    Text { text: String },
    ToolRequest(ToolInvocationRequest),
}

impl ContentBlock {
    /// Convenience constructor for a text block
    pub fn text(text: impl Into<String>) -> Self {
        ContentBlock::Text { text: text.into() }
    }

    /// Convenience constructor for a tool request block
    pub fn tool_request(
        id: impl Into<String>,
        name: impl Into<String>,
        arguments: ToolArguments,
    ) -> Self {
        ContentBlock::ToolRequest(ToolInvocationRequest {
            id: id.into(),
            name: name.into(),
            arguments,
        })
    }
}

/// A single conversation entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "role", rename_all = "snake_case")]
pub enum Message {
    User { content: String },
    Assistant { blocks: Vec<ContentBlock> },
    ToolResult(ToolResult),
}

impl Message {
    /// Tool requests carried by this message (empty for non-assistant messages)
    pub fn tool_requests(&self) -> impl Iterator<Item = &ToolInvocationRequest> {
        let blocks: &[ContentBlock] = match self {
            Message::Assistant { blocks } => blocks,
            _ => &[],
        };
        blocks.iter().filter_map(|block| match block {
            ContentBlock::ToolRequest(request) => Some(request),
            ContentBlock::Text { .. } => None,
        })
    }

    /// Concatenated text blocks of an assistant message, or the user text
    pub fn text(&self) -> Option<String> {
        match self {
            Message::User { content } => Some(content.clone()),
            Message::Assistant { blocks } => {
                let text: Vec<&str> = blocks
                    .iter()
                    .filter_map(|block| match block {
                        ContentBlock::Text { text } => Some(text.as_str()),
                        ContentBlock::ToolRequest(_) => None,
                    })
                    .collect();
                if text.is_empty() {
                    None
                } else {
                    Some(text.join(""))
                }
            }
            Message::ToolResult(_) => None,
        }
    }

    pub fn is_tool_result(&self) -> bool {
        matches!(self, Message::ToolResult(_))
    }
}
