/// Integration tests: the session loop against scripted collaborators, and
/// the MCP client talking to the MCP server over an in-memory pipe.
use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};

use mcp_labs::provider::ToolArguments;
use mcp_labs::*;

mod session_loop;

/// One scripted model response
pub enum Step {
    Reply(Vec<ContentBlock>),
    Fail(String),
    Stall(Duration),
}

/// Language model that plays back a fixed script
///
/// With `repeat_last`, the final step is replayed forever.
pub struct ScriptedModel {
    steps: Mutex<VecDeque<Step>>,
    repeat_last: Option<Vec<ContentBlock>>,
    calls: Mutex<Vec<usize>>,
}

impl ScriptedModel {
    pub fn new(steps: Vec<Step>) -> Self {
        Self {
            steps: Mutex::new(steps.into()),
            repeat_last: None,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn replies(replies: Vec<Vec<ContentBlock>>) -> Self {
        Self::new(replies.into_iter().map(Step::Reply).collect())
    }

    pub fn always(blocks: Vec<ContentBlock>) -> Self {
        Self {
            steps: Mutex::new(VecDeque::new()),
            repeat_last: Some(blocks),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Number of model calls so far
    pub fn calls(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    /// History length seen by each call
    pub fn history_lengths(&self) -> Vec<usize> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl LanguageModel for ScriptedModel {
    async fn complete(
        &self,
        history: &ConversationHistory,
        _tools: &[ToolDefinition],
        _max_tokens: u32,
    ) -> Result<Vec<ContentBlock>, ModelError> {
        self.calls.lock().unwrap().push(history.len());

        let step = self.steps.lock().unwrap().pop_front();
        match step {
            Some(Step::Reply(blocks)) => Ok(blocks),
            Some(Step::Fail(message)) => Err(ModelError::InvalidResponse(message)),
            Some(Step::Stall(duration)) => {
                tokio::time::sleep(duration).await;
                Ok(vec![ContentBlock::text("too late")])
            }
            None => match &self.repeat_last {
                Some(blocks) => Ok(blocks.clone()),
                None => Err(ModelError::InvalidResponse("script exhausted".to_string())),
            },
        }
    }
}

/// How the recording provider answers a call
#[derive(Clone)]
pub enum Answer {
    Echo,
    ToolError(String),
    Unavailable,
}

/// Tool provider that records every call in order
pub struct RecordingProvider {
    tools: Vec<ToolDefinition>,
    answer: Answer,
    calls: Mutex<Vec<(String, ToolArguments)>>,
}

impl RecordingProvider {
    pub fn new(tool_names: &[&str], answer: Answer) -> Self {
        Self {
            tools: tool_names
                .iter()
                .map(|name| ToolDefinition {
                    name: name.to_string(),
                    description: format!("The {} tool", name),
                    input_schema: json!({"type": "object", "properties": {}}),
                })
                .collect(),
            answer,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn call_names(&self) -> Vec<String> {
        self.calls.lock().unwrap().iter().map(|(name, _)| name.clone()).collect()
    }
}

#[async_trait]
impl ToolProvider for RecordingProvider {
    async fn list_tools(&self) -> Result<Vec<ToolDefinition>, ProviderError> {
        if matches!(self.answer, Answer::Unavailable) && self.tools.is_empty() {
            return Err(ProviderError::Unavailable("connection refused".to_string()));
        }
        Ok(self.tools.clone())
    }

    async fn call_tool(&self, name: &str, arguments: &ToolArguments) -> Result<ToolOutput, ProviderError> {
        self.calls.lock().unwrap().push((name.to_string(), arguments.clone()));
        match &self.answer {
            Answer::Echo => Ok(ToolOutput::text(format!(
                "{}:{}",
                name,
                Value::Object(arguments.clone())
            ))),
            Answer::ToolError(message) => Ok(ToolOutput::error(message.clone())),
            Answer::Unavailable => Err(ProviderError::Unavailable("server exited".to_string())),
        }
    }
}

pub fn args(value: Value) -> ToolArguments {
    value.as_object().cloned().unwrap()
}

pub fn tool_call(id: &str, name: &str, arguments: Value) -> ContentBlock {
    ContentBlock::tool_request(id, name, args(arguments))
}
