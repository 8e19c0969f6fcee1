//! Multi-turn chat sessions.

use crate::error::Result;
use crate::model::{ChatMessage, Model, Role};
use std::sync::Arc;
use tracing::{debug, info};

/// A conversation with a model.
///
/// History is append-only and always starts with the system message. It is
/// kept in memory only.
pub struct ChatSession {
    model: Arc<dyn Model>,
    history: Vec<ChatMessage>,
}

impl ChatSession {
    pub fn new(model: Arc<dyn Model>, system_prompt: impl Into<String>) -> Self {
        Self {
            model,
            history: vec![ChatMessage::system(system_prompt)],
        }
    }

    /// Sends `message` with the whole history and records both turns.
    ///
    /// On failure the human turn is withdrawn so a retry does not send it
    /// twice.
    pub async fn chat(&mut self, message: &str) -> Result<String> {
        self.history.push(ChatMessage::human(message));
        debug!("Chat request with {} message(s)", self.history.len());

        match self.model.chat(&self.history).await {
            Ok(reply) => {
                self.history.push(ChatMessage::ai(reply.clone()));
                Ok(reply)
            }
            Err(e) => {
                self.history.pop();
                Err(e)
            }
        }
    }

    pub fn set_system_prompt(&mut self, prompt: impl Into<String>) {
        self.history[0] = ChatMessage::system(prompt);
    }

    pub fn system_prompt(&self) -> &str {
        &self.history[0].content
    }

    /// Forgets every turn except the system prompt.
    pub fn reset(&mut self) {
        self.history.truncate(1);
        info!("Chat history cleared");
    }

    pub fn history(&self) -> &[ChatMessage] {
        &self.history
    }

    /// Number of completed human/AI exchanges.
    pub fn turns(&self) -> usize {
        self.history.iter().filter(|m| m.role == Role::Ai).count()
    }
}
