//! The capability every LLM backend provides.

use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    Human,
    Ai,
}

/// One role-tagged turn in a conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn human(content: impl Into<String>) -> Self {
        Self {
            role: Role::Human,
            content: content.into(),
        }
    }

    pub fn ai(content: impl Into<String>) -> Self {
        Self {
            role: Role::Ai,
            content: content.into(),
        }
    }
}

/// A large-language-model provider.
///
/// Implementations are stateless with respect to conversations: multi-turn
/// state lives in [`ChatSession`](crate::chat::ChatSession), which hands the
/// full history to [`chat`](Self::chat) on every turn.
#[async_trait]
pub trait Model: Send + Sync {
    /// Single-shot generation from one prompt.
    async fn generate(&self, prompt: &str) -> Result<String> {
        self.chat(&[ChatMessage::human(prompt)]).await
    }

    /// Generates the next AI turn for `messages`. A leading
    /// [`Role::System`] message is the system prompt.
    async fn chat(&self, messages: &[ChatMessage]) -> Result<String>;

    /// Short provider name for logs.
    fn name(&self) -> &str;

    /// Releases backend resources.
    async fn close(&self) -> Result<()> {
        Ok(())
    }
}
