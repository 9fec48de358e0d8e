/// Interactive session entry point
///
/// Bundles the loop, the discovered tools and the history of one chat so a
/// host program only has to feed it lines of user text.

use std::sync::Arc;

use tracing::Instrument;
use uuid::Uuid;

use super::engine::{SessionLoop, TurnOutcome};
use super::history::ConversationHistory;
use super::SessionError;
use crate::config::SessionConfig;
use crate::model::LanguageModel;
use crate::provider::{ToolDefinition, ToolProvider};

/// One interactive conversation with a fixed tool set
pub struct ChatSession {
    id: Uuid,
    engine: SessionLoop,
    tools: Vec<ToolDefinition>,
    history: ConversationHistory,
}

impl ChatSession {
    /// Discover the provider's tools and start with an empty history
    pub async fn start(
        model: Arc<dyn LanguageModel>,
        provider: Arc<dyn ToolProvider>,
        config: SessionConfig,
    ) -> Result<Self, SessionError> {
        let id = Uuid::new_v4();
        let mut history = ConversationHistory::new();
        if let Some(prompt) = &config.system_prompt {
            history = history.with_system_prompt(prompt.clone());
        }

        let engine = SessionLoop::new(model, provider, config);
        let tools = engine
            .initialize()
            .instrument(tracing::info_span!("session", id = %id))
            .await?;

        Ok(Self {
            id,
            engine,
            tools,
            history,
        })
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn tools(&self) -> &[ToolDefinition] {
        &self.tools
    }

    pub fn history(&self) -> &ConversationHistory {
        &self.history
    }

    /// Submit one line of user text and wait for the final answer
    ///
    /// Taking `&mut self` keeps turns on one history strictly sequential.
    pub async fn ask(&mut self, line: &str) -> Result<TurnOutcome, SessionError> {
        let span = tracing::info_span!("session", id = %self.id, turn = self.history.len());
        self.engine
            .submit_user_turn(&mut self.history, line, &self.tools)
            .instrument(span)
            .await
    }
}
