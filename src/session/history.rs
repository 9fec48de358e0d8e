/// Append-only conversation history
///
/// The history is owned by a single session. Entries are only ever appended;
/// a model round (assistant message plus its tool results) is committed in one
/// step so a failed round never leaves half of itself behind.

use serde::Serialize;

use super::message::{ContentBlock, Message, ToolResult};
use super::SessionError;

/// Ordered conversation context handed to the language model
#[derive(Debug, Clone, Default, Serialize)]
pub struct ConversationHistory {
    system_prompt: Option<String>,
    messages: Vec<Message>,
}

impl ConversationHistory {
    /// Create an empty history
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the history with a system instruction
    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(prompt.into());
        self
    }

    pub fn system_prompt(&self) -> Option<&str> {
        self.system_prompt.as_deref()
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Append a user message
    pub fn push_user(&mut self, text: impl Into<String>) {
        self.messages.push(Message::User {
            content: text.into(),
        });
    }

    /// Append one model round: the assistant message and one result per tool request
    ///
    /// Nothing is appended unless the results answer exactly the requests in
    /// `blocks`.
    pub fn commit_round(
        &mut self,
        blocks: Vec<ContentBlock>,
        results: Vec<ToolResult>,
    ) -> Result<(), SessionError> {
        let assistant = Message::Assistant { blocks };
        let requested: Vec<&str> = assistant.tool_requests().map(|r| r.id.as_str()).collect();
        let answered: Vec<&str> = results.iter().map(|r| r.call_id.as_str()).collect();
        check_ids_match(&requested, &answered)?;

        self.messages.push(assistant);
        self.messages
            .extend(results.into_iter().map(Message::ToolResult));
        Ok(())
    }

    /// Fail if the most recent assistant message has requests without results
    ///
    /// Must hold before every model call.
    pub fn ensure_resolved(&self) -> Result<(), SessionError> {
        let Some(position) = self
            .messages
            .iter()
            .rposition(|m| matches!(m, Message::Assistant { .. }))
        else {
            return Ok(());
        };

        let requested: Vec<&str> = self.messages[position]
            .tool_requests()
            .map(|r| r.id.as_str())
            .collect();
        let answered = self.results_following(position);
        check_ids_match(&requested, &answered)
    }

    /// Check the request/result pairing over the whole history
    pub fn verify(&self) -> Result<(), SessionError> {
        let mut index = 0;
        while index < self.messages.len() {
            match &self.messages[index] {
                Message::Assistant { .. } => {
                    let requested: Vec<&str> = self.messages[index]
                        .tool_requests()
                        .map(|r| r.id.as_str())
                        .collect();
                    let answered = self.results_following(index);
                    check_ids_match(&requested, &answered)?;
                    index += 1 + answered.len();
                }
                Message::ToolResult(result) => {
                    return Err(SessionError::InvariantViolation(format!(
                        "tool result '{}' does not follow an assistant message",
                        result.call_id
                    )));
                }
                Message::User { .. } => index += 1,
            }
        }
        Ok(())
    }

    fn results_following(&self, position: usize) -> Vec<&str> {
        self.messages[position + 1..]
            .iter()
            .map_while(|m| match m {
                Message::ToolResult(result) => Some(result.call_id.as_str()),
                _ => None,
            })
            .collect()
    }
}

/// Requested and answered call ids must be the same multiset
fn check_ids_match(requested: &[&str], answered: &[&str]) -> Result<(), SessionError> {
    let mut requested = requested.to_vec();
    let mut answered = answered.to_vec();
    requested.sort_unstable();
    answered.sort_unstable();

    if requested != answered {
        return Err(SessionError::InvariantViolation(format!(
            "tool requests {:?} answered by results {:?}",
            requested, answered
        )));
    }
    Ok(())
}
