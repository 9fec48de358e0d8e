/// Tool-calling conversation session
///
/// The session owns the conversation history, asks the language model for the
/// next step, runs the tool calls it requests against a tool provider, and
/// repeats until the model answers in plain text.

pub mod chat;
pub mod engine;
pub mod history;
pub mod message;

pub use chat::ChatSession;
pub use engine::{SessionLoop, TurnOutcome};
pub use history::ConversationHistory;
pub use message::{ContentBlock, Message, ToolInvocationRequest, ToolResult};

use thiserror::Error;

use crate::model::ModelError;

/// Errors that end a user turn
///
/// Only `InvariantViolation` leaves the session unusable; after any other
/// error the next turn can be submitted on the same history.
#[derive(Error, Debug)]
pub enum SessionError {
    #[error("Tool provider unavailable: {0}")]
    ProviderUnavailable(String),

    #[error("Model error: {0}")]
    Model(#[from] ModelError),

    #[error("Tool loop exceeded {rounds} rounds without a final answer")]
    ToolLoopExceeded { rounds: usize, partial: String },

    #[error("Conversation invariant violated: {0}")]
    InvariantViolation(String),
}

impl SessionError {
    /// Whether the history can no longer be trusted
    pub fn is_fatal(&self) -> bool {
        matches!(self, SessionError::InvariantViolation(_))
    }

    /// Text gathered before the turn failed, if any
    pub fn partial_answer(&self) -> Option<&str> {
        match self {
            SessionError::ToolLoopExceeded { partial, .. } if !partial.is_empty() => Some(partial.as_str()),
            _ => None,
        }
    }
}
