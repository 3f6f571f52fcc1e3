use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConversationMessage {
    pub role: Role,
    pub content: String,
}

impl ConversationMessage {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }
}

/// Split a conversation into the active question and the turns before it.
///
/// The active question is the last `user` message; everything earlier is
/// history. Returns `None` when there is no user message at all.
pub fn split_active_question(
    messages: &[ConversationMessage],
) -> Option<(&ConversationMessage, &[ConversationMessage])> {
    let position = messages.iter().rposition(|m| m.role == Role::User)?;
    Some((&messages[position], &messages[..position]))
}
