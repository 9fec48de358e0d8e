/// Anthropic Messages API client
///
/// Translates the conversation history into the Messages API format, sends a
/// single non-streaming request, and parses the returned content blocks.

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::{debug, trace};

use super::{LanguageModel, ModelError};
use crate::config::ModelConfig;
use crate::provider::ToolDefinition;
use crate::session::{ContentBlock, ConversationHistory, Message};

const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Language model backed by the Anthropic Messages API
pub struct AnthropicModel {
    client: reqwest::Client,
    api_key: String,
    model: String,
    base_url: String,
}

impl AnthropicModel {
    pub fn new(config: &ModelConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key: config.api_key.clone(),
            model: config.model.clone(),
            base_url: config.base_url.clone(),
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Build the request body for one round-trip
    pub fn request_body(
        &self,
        history: &ConversationHistory,
        tools: &[ToolDefinition],
        max_tokens: u32,
    ) -> Value {
        let mut body = json!({
            "model": self.model,
            "max_tokens": max_tokens,
            "messages": history_to_api(history),
        });

        if !tools.is_empty() {
            body["tools"] = Value::Array(tools.iter().map(tool_definition_to_api).collect());
        }
        if let Some(system) = history.system_prompt() {
            body["system"] = json!(system);
        }
        body
    }
}

fn tool_definition_to_api(tool: &ToolDefinition) -> Value {
    json!({
        "name": tool.name,
        "description": tool.description,
        "input_schema": tool.input_schema,
    })
}

fn message_role_and_blocks(message: &Message) -> (&'static str, Vec<Value>) {
    match message {
        Message::User { content } => ("user", vec![json!({"type": "text", "text": content})]),
        Message::Assistant { blocks } => {
            let blocks = blocks
                .iter()
                .filter_map(|block| match block {
                    ContentBlock::Text { text } if text.is_empty() => None,
                    ContentBlock::Text { text } => Some(json!({"type": "text", "text": text})),
                    ContentBlock::ToolRequest(request) => Some(json!({
                        "type": "tool_use",
                        "id": request.id,
                        "name": request.name,
                        "input": request.arguments,
                    })),
                })
                .collect();
            ("assistant", blocks)
        }
        Message::ToolResult(result) => (
            "user",
            vec![json!({
                "type": "tool_result",
                "tool_use_id": result.call_id,
                "content": result.content,
                "is_error": result.is_error,
            })],
        ),
    }
}

/// Map history to API messages, merging consecutive messages of the same role
///
/// Tool results travel as user content, so a round's results and a following
/// user question end up in one message as the API requires.
pub fn history_to_api(history: &ConversationHistory) -> Vec<Value> {
    let mut merged: Vec<(&'static str, Vec<Value>)> = Vec::new();

    for message in history.messages() {
        let (role, blocks) = message_role_and_blocks(message);
        if blocks.is_empty() {
            continue;
        }
        if let Some((last_role, last_blocks)) = merged.last_mut() {
            if *last_role == role {
                last_blocks.extend(blocks);
                continue;
            }
        }
        merged.push((role, blocks));
    }

    merged
        .into_iter()
        .map(|(role, content)| json!({"role": role, "content": content}))
        .collect()
}

/// Parse the `content` array of a Messages API response
pub fn parse_content(response: &Value) -> Result<Vec<ContentBlock>, ModelError> {
    let content = response["content"]
        .as_array()
        .ok_or_else(|| ModelError::InvalidResponse("missing content array".to_string()))?;

    let mut blocks = Vec::with_capacity(content.len());
    for block in content {
        match block["type"].as_str() {
            Some("text") => {
                let text = block["text"].as_str().unwrap_or_default();
                blocks.push(ContentBlock::text(text));
            }
            Some("tool_use") => {
                let id = block["id"]
                    .as_str()
                    .ok_or_else(|| ModelError::InvalidResponse("tool_use block without id".to_string()))?;
                let name = block["name"]
                    .as_str()
                    .ok_or_else(|| ModelError::InvalidResponse("tool_use block without name".to_string()))?;
                let arguments = block["input"].as_object().cloned().ok_or_else(|| {
                    ModelError::InvalidResponse(format!("tool_use '{}' input is not an object", name))
                })?;
                blocks.push(ContentBlock::tool_request(id, name, arguments));
            }
            other => {
                trace!(block_type = ?other, "ignoring content block");
            }
        }
    }
    Ok(blocks)
}

#[async_trait]
impl LanguageModel for AnthropicModel {
    async fn complete(
        &self,
        history: &ConversationHistory,
        tools: &[ToolDefinition],
        max_tokens: u32,
    ) -> Result<Vec<ContentBlock>, ModelError> {
        let url = format!("{}/v1/messages", self.base_url);
        let body = self.request_body(history, tools, max_tokens);

        debug!(model = %self.model, messages = history.len(), "Anthropic request to {}", url);

        let response = self
            .client
            .post(&url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("content-type", "application/json")
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ModelError::Api {
                status: status.as_u16(),
                body,
            });
        }

        let payload: Value = response
            .json()
            .await
            .map_err(|e| ModelError::InvalidResponse(e.to_string()))?;
        parse_content(&payload)
    }
}
