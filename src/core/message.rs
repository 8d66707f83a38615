use serde::{Deserialize, Serialize};

/// Speaker of a conversation turn fed back into prompts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum TurnRole {
    User,
    Assistant,
}

impl TurnRole {
    pub fn as_str(self) -> &'static str {
        match self {
            TurnRole::User => "user",
            TurnRole::Assistant => "assistant",
        }
    }

    /// Label used when the turn is embedded in a prompt.
    pub fn prompt_label(self) -> &'static str {
        match self {
            TurnRole::User => "User",
            TurnRole::Assistant => "Assistant",
        }
    }
}

impl TryFrom<&str> for TurnRole {
    type Error = String;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "user" => Ok(TurnRole::User),
            "assistant" => Ok(TurnRole::Assistant),
            _ => Err(format!("invalid turn role: {value}")),
        }
    }
}

impl TryFrom<String> for TurnRole {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::try_from(value.as_str())
    }
}

impl From<TurnRole> for String {
    fn from(value: TurnRole) -> Self {
        value.as_str().to_string()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub role: TurnRole,
    pub content: String,
}

impl ConversationTurn {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: TurnRole::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: TurnRole::Assistant,
            content: content.into(),
        }
    }
}

/// Append-only list of conversation turns.
#[derive(Debug, Clone, Default)]
pub struct ConversationHistory {
    turns: Vec<ConversationTurn>,
}

impl ConversationHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, turn: ConversationTurn) {
        self.turns.push(turn);
    }

    /// The last `limit` turns, oldest first.
    pub fn recent(&self, limit: usize) -> &[ConversationTurn] {
        let start = self.turns.len().saturating_sub(limit);
        &self.turns[start..]
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    pub fn clear(&mut self) {
        self.turns.clear();
    }
}

/// Who a transcript line is attributed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TranscriptRole {
    User,
    Assistant,
    Terminal,
    System,
}

impl TranscriptRole {
    pub fn as_str(self) -> &'static str {
        match self {
            TranscriptRole::User => "user",
            TranscriptRole::Assistant => "assistant",
            TranscriptRole::Terminal => "terminal",
            TranscriptRole::System => "system",
        }
    }
}

/// Display category of a transcript line, used for colouring.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageCategory {
    User,
    Assistant,
    /// The command line about to run, annotated with its directory.
    Command,
    Output,
    System,
    Error,
}

impl MessageCategory {
    pub fn as_str(self) -> &'static str {
        match self {
            MessageCategory::User => "user",
            MessageCategory::Assistant => "assistant",
            MessageCategory::Command => "command",
            MessageCategory::Output => "output",
            MessageCategory::System => "system",
            MessageCategory::Error => "error",
        }
    }

    pub fn role(self) -> TranscriptRole {
        match self {
            MessageCategory::User => TranscriptRole::User,
            MessageCategory::Assistant => TranscriptRole::Assistant,
            MessageCategory::Command | MessageCategory::Output => TranscriptRole::Terminal,
            MessageCategory::System | MessageCategory::Error => TranscriptRole::System,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranscriptMessage {
    pub role: TranscriptRole,
    pub category: MessageCategory,
    pub text: String,
}

impl TranscriptMessage {
    pub fn new(category: MessageCategory, text: impl Into<String>) -> Self {
        Self {
            role: category.role(),
            category,
            text: text.into(),
        }
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self::new(MessageCategory::User, text)
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self::new(MessageCategory::Assistant, text)
    }

    pub fn command(text: impl Into<String>) -> Self {
        Self::new(MessageCategory::Command, text)
    }

    pub fn output(text: impl Into<String>) -> Self {
        Self::new(MessageCategory::Output, text)
    }

    pub fn system(text: impl Into<String>) -> Self {
        Self::new(MessageCategory::System, text)
    }

    pub fn error(text: impl Into<String>) -> Self {
        Self::new(MessageCategory::Error, text)
    }
}
