use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::openai_client::{CompletionClient, CompletionError};

/// Model requested when none is configured
pub const DEFAULT_MODEL: &str = "gpt-4o";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// One turn of the conversation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// A single linear chat session with a completion service.
///
/// Every `send` appends the user turn and forwards the whole history; the
/// returned candidates are not recorded until one is passed to
/// `pick_response`. Turn order is never enforced.
pub struct Conversation<C> {
    model: String,
    messages: Vec<Message>,
    client: C,
}

impl<C: CompletionClient> Conversation<C> {
    pub fn new(client: C) -> Self {
        Self::with_model(client, DEFAULT_MODEL)
    }

    pub fn with_model(client: C, model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            messages: Vec::new(),
            client,
        }
    }

    /// Records `message` as a user turn and asks the service for candidates.
    ///
    /// The user turn stays in history even when the request fails.
    pub async fn send(&mut self, message: &str) -> Result<Vec<String>, CompletionError> {
        self.messages.push(Message::user(message));
        debug!(turns = self.messages.len(), model = %self.model, "Sending conversation");

        let choices = self.client.complete(&self.model, &self.messages).await?;
        Ok(choices
            .into_iter()
            .map(|c| {
                debug!(index = c.index, finish_reason = ?c.finish_reason, "Received candidate");
                c.content
            })
            .collect())
    }

    /// Records `choice` as the assistant turn. It need not be one of the
    /// candidates returned by the last `send`.
    pub fn pick_response(&mut self, choice: &str) {
        self.messages.push(Message::assistant(choice));
        debug!(turns = self.messages.len(), "Picked response");
    }

    pub fn clear(&mut self) {
        self.messages.clear();
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}
