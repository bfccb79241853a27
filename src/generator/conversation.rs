use std::fmt;

use serde::{Deserialize, Serialize};

/// Role name of turns produced by the model.
pub const ASSISTANT_ROLE: &str = "assistant";

/// Role name of turns written by the user.
pub const USER_ROLE: &str = "user";

/// Cue appended to a serialized transcript so the model answers as the assistant.
pub const ASSISTANT_CUE: &str = "assistant:";

/// One role-tagged message in a conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    pub role: String,
    pub content: String,
    /// Set on assistant turns recorded in place of a failed generation.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub error: bool,
}

impl Turn {
    /// Creates a turn with an arbitrary role.
    pub fn new(role: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            content: content.into(),
            error: false,
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(USER_ROLE, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(ASSISTANT_ROLE, content)
    }

    /// Creates an error-flagged assistant turn whose content is `Error: <error>`.
    pub fn error(error: impl fmt::Display) -> Self {
        Self {
            role: ASSISTANT_ROLE.to_string(),
            content: format!("Error: {error}"),
            error: true,
        }
    }

    /// Returns true if this turn stands in for a failed generation.
    pub fn is_error(&self) -> bool {
        self.error
    }

    /// Serializes the turn as a single `role: content` transcript line.
    pub fn to_prompt_line(&self) -> String {
        format!("{}: {}\n", self.role, self.content)
    }
}

/// Ordered, append-only sequence of turns.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Conversation {
    turns: Vec<Turn>,
}

impl Conversation {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a turn to the end of the conversation.
    pub fn push(&mut self, turn: Turn) {
        self.turns.push(turn);
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    pub fn last(&self) -> Option<&Turn> {
        self.turns.last()
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    /// Serializes the whole transcript followed by the assistant cue.
    ///
    /// ```
    /// use papertrail::generator::{Conversation, Turn};
    ///
    /// let conversation = Conversation::from(vec![Turn::user("Hi")]);
    /// assert_eq!(conversation.to_prompt(), "user: Hi\nassistant:");
    /// ```
    pub fn to_prompt(&self) -> String {
        let mut prompt: String = self.turns.iter().map(Turn::to_prompt_line).collect();
        prompt.push_str(ASSISTANT_CUE);
        prompt
    }
}

impl From<Vec<Turn>> for Conversation {
    fn from(turns: Vec<Turn>) -> Self {
        Self { turns }
    }
}
