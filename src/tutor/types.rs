//! Core types for tutoring conversations and study notes.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Speaker of a conversation turn.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnRole {
    /// The student.
    User,
    /// The tutoring agent.
    Assistant,
}

impl TurnRole {
    /// Resolve a vendor role label.
    ///
    /// `agent` is a synonym for the assistant; anything unrecognized is the user.
    #[must_use]
    pub fn from_label(label: &str) -> Self {
        match label {
            "assistant" | "agent" => Self::Assistant,
            _ => Self::User,
        }
    }

    /// Stable string form.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }

    /// Label used when rendering a dialogue for the notes model.
    #[must_use]
    pub const fn speaker_label(self) -> &'static str {
        match self {
            Self::User => "Student",
            Self::Assistant => "Tutor",
        }
    }
}

impl fmt::Display for TurnRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One role-tagged utterance of a past conversation.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct ConversationTurn {
    role: TurnRole,
    text: String,
}

impl ConversationTurn {
    /// Build a turn, or `None` when the text is empty.
    #[must_use]
    pub fn new(role: TurnRole, text: impl Into<String>) -> Option<Self> {
        let text = text.into();
        if text.is_empty() {
            return None;
        }
        Some(Self { role, text })
    }

    /// Speaker of the turn.
    #[must_use]
    pub const fn role(&self) -> TurnRole {
        self.role
    }

    /// Utterance text, never empty.
    #[must_use]
    pub fn text(&self) -> &str {
        &self.text
    }
}

/// Ordered turns of a single conversation, in vendor order.
pub type Transcript = Vec<ConversationTurn>;

/// Reply of the voice agent to one relayed utterance.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct AgentReply {
    /// Reply text.
    pub text: String,
    /// Vendor conversation id, when one was announced.
    pub conversation_id: Option<String>,
}

/// Where a notes body came from.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotesSource {
    /// Written by the generative-text backend.
    Generated,
    /// Produced by the local heuristic summarizer.
    Fallback,
}

impl NotesSource {
    /// Stable string form.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Generated => "generated",
            Self::Fallback => "fallback",
        }
    }
}

/// Study notes produced from a transcript.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct NotesDocument {
    /// Markdown body.
    pub body: String,
    /// Producer of the body.
    pub source: NotesSource,
    /// Number of turns the notes were built from.
    pub message_count: usize,
}
