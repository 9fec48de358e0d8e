/// Tool-use resolution loop
///
/// One user turn may take several model round-trips: each time the model asks
/// for tools, the loop runs them in the order requested, appends the results,
/// and asks again. The turn ends when a round contains no tool requests.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use super::history::ConversationHistory;
use super::message::{ContentBlock, ToolInvocationRequest, ToolResult};
use super::SessionError;
use crate::config::SessionConfig;
use crate::model::{LanguageModel, ModelError};
use crate::provider::{ToolDefinition, ToolOutput, ToolProvider};

/// Result of a completed user turn
#[derive(Debug, Clone, PartialEq)]
pub struct TurnOutcome {
    /// Final answer: the text of every round, one line per round
    pub text: String,
    /// Number of model round-trips used
    pub rounds: usize,
    /// Tool calls executed during the turn, in execution order
    pub tool_calls: Vec<ToolInvocationRequest>,
}

/// Coordinates a language model with a tool provider
pub struct SessionLoop {
    model: Arc<dyn LanguageModel>,
    provider: Arc<dyn ToolProvider>,
    config: SessionConfig,
}

impl SessionLoop {
    pub fn new(
        model: Arc<dyn LanguageModel>,
        provider: Arc<dyn ToolProvider>,
        config: SessionConfig,
    ) -> Self {
        Self {
            model,
            provider,
            config,
        }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Fetch the provider's tool list; called once per session
    pub async fn initialize(&self) -> Result<Vec<ToolDefinition>, SessionError> {
        let tools = with_deadline(self.config.round_timeout, self.provider.list_tools())
            .await
            .ok_or_else(|| SessionError::ProviderUnavailable("tool discovery timed out".to_string()))?
            .map_err(|e| SessionError::ProviderUnavailable(e.to_string()))?;

        info!(
            count = tools.len(),
            "Discovered tools: {:?}",
            tools.iter().map(|t| t.name.as_str()).collect::<Vec<_>>()
        );
        Ok(tools)
    }

    /// Run one user turn to completion
    ///
    /// The user message is always appended. Each model round is committed to
    /// the history only once all of its tool results exist, so a failure in
    /// the middle of a round leaves no trace of that round.
    pub async fn submit_user_turn(
        &self,
        history: &mut ConversationHistory,
        user_text: &str,
        tools: &[ToolDefinition],
    ) -> Result<TurnOutcome, SessionError> {
        history.push_user(user_text);

        let mut answer: Vec<String> = Vec::new();
        let mut executed: Vec<ToolInvocationRequest> = Vec::new();

        for round in 1..=self.config.max_rounds {
            history.ensure_resolved()?;
            debug!(round, messages = history.len(), "Requesting model response");

            let blocks = self.request_model(history, tools).await?;

            let mut round_text = String::new();
            let mut results = Vec::new();
            for block in &blocks {
                match block {
                    ContentBlock::Text { text } => round_text.push_str(text),
                    ContentBlock::ToolRequest(request) => {
                        results.push(self.execute(request).await?);
                        executed.push(request.clone());
                    }
                }
            }

            if !round_text.trim().is_empty() {
                answer.push(round_text);
            }

            let invoked_tools = !results.is_empty();
            history.commit_round(blocks, results)?;

            if !invoked_tools {
                info!(round, tool_calls = executed.len(), "Turn complete");
                return Ok(TurnOutcome {
                    text: answer.join("\n"),
                    rounds: round,
                    tool_calls: executed,
                });
            }
        }

        warn!(
            max_rounds = self.config.max_rounds,
            "Model kept requesting tools, giving up on this turn"
        );
        Err(SessionError::ToolLoopExceeded {
            rounds: self.config.max_rounds,
            partial: answer.join("\n"),
        })
    }

    async fn request_model(
        &self,
        history: &ConversationHistory,
        tools: &[ToolDefinition],
    ) -> Result<Vec<ContentBlock>, SessionError> {
        let call = self.model.complete(history, tools, self.config.max_tokens);
        match with_deadline(self.config.round_timeout, call).await {
            Some(Ok(blocks)) => Ok(blocks),
            Some(Err(e)) => {
                warn!("Model call failed: {}", e);
                Err(SessionError::Model(e))
            }
            None => {
                let limit = self.config.round_timeout.unwrap_or_default();
                warn!("Model call timed out after {:?}", limit);
                Err(SessionError::Model(ModelError::Timeout(limit)))
            }
        }
    }

    /// Run one tool request; tool-level failures become error results
    async fn execute(&self, request: &ToolInvocationRequest) -> Result<ToolResult, SessionError> {
        info!(tool = %request.name, call_id = %request.id, "Calling tool with args {}", serde_json::Value::Object(request.arguments.clone()));

        let call = self.provider.call_tool(&request.name, &request.arguments);
        let output = match with_deadline(self.config.round_timeout, call).await {
            Some(Ok(output)) => output,
            Some(Err(e)) if e.is_unavailable() => {
                return Err(SessionError::ProviderUnavailable(e.to_string()));
            }
            Some(Err(e)) => ToolOutput::error(e.to_string()),
            None => {
                return Err(SessionError::ProviderUnavailable(format!(
                    "tool '{}' timed out",
                    request.name
                )));
            }
        };

        if output.is_error {
            warn!(tool = %request.name, "Tool reported an error: {}", output.content);
        }

        Ok(ToolResult {
            call_id: request.id.clone(),
            content: output.content,
            is_error: output.is_error,
        })
    }
}

/// Await `future`, giving up after `limit` when one is set
///
/// Returns `None` on timeout.
async fn with_deadline<F: Future>(limit: Option<Duration>, future: F) -> Option<F::Output> {
    match limit {
        Some(limit) => tokio::time::timeout(limit, future).await.ok(),
        None => Some(future.await),
    }
}
