//! Error types for the tutor integration layer.

use std::time::Duration;

use thiserror::Error;

/// Errors that can occur while talking to the voice agent or the notes backend.
#[derive(Debug, Error)]
pub enum TutorError {
    /// Vendor credentials are missing.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// No agent reply arrived before the relay deadline.
    #[error("timed out after {}s waiting for agent response", .0.as_secs_f32())]
    Timeout(Duration),

    /// The agent socket closed before any reply was captured.
    #[error("websocket closed before response")]
    ConnectionClosed,

    /// The agent socket reported a transport failure.
    #[error("websocket transport error: {0}")]
    Transport(String),

    /// A vendor REST call returned a non-success status.
    #[error("upstream returned status {status}: {body}")]
    Upstream {
        /// HTTP status code.
        status: u16,
        /// Response body, as text.
        body: String,
    },

    /// A vendor answered successfully but without usable content.
    #[error("empty response from {0}")]
    EmptyResponse(&'static str),

    /// Malformed client input.
    #[error("invalid request: {0}")]
    Validation(String),

    /// HTTP request failed.
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON encoding error.
    #[error("JSON error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// URL parsing error.
    #[error("invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
}

impl TutorError {
    /// HTTP status the facade should answer with.
    #[must_use]
    pub const fn status_code(&self) -> u16 {
        match self {
            Self::Validation(_) => 400,
            _ => 500,
        }
    }

    /// Whether the error came from the realtime relay.
    #[must_use]
    pub const fn is_relay_error(&self) -> bool {
        matches!(
            self,
            Self::Timeout(_) | Self::ConnectionClosed | Self::Transport(_)
        )
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for TutorError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        Self::Transport(err.to_string())
    }
}

/// Convenience result alias for tutor operations.
pub type TutorResult<T> = Result<T, TutorError>;
