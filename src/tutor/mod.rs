//! Tutor integration layer.
//!
//! Wraps the two vendor backends the tutoring flow depends on:
//! - ElevenLabs ConvAI, for relaying a student utterance to the voice agent
//!   and for reading back the latest conversation transcript
//! - Google Gemini, for turning that transcript into study notes
//!
//! The HTTP facade only sees the [`TutorBackend`] trait; [`TutorService`] is
//! the production implementation.

pub mod config;
pub mod error;
pub mod extract;
pub mod notes;
pub mod relay;
pub mod transcript;
pub mod types;

pub use config::TutorConfig;
pub use error::{TutorError, TutorResult};
pub use notes::synthesize_notes;
pub use relay::relay;
pub use transcript::fetch_latest_transcript;
pub use types::{AgentReply, ConversationTurn, NotesDocument, NotesSource, Transcript, TurnRole};

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use tracing::info;

/// Boxed future type for backend operations.
pub type TutorFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Operations the HTTP facade needs from the tutoring backends.
pub trait TutorBackend: Send + Sync {
    /// Relay one student utterance and wait for the agent's reply.
    ///
    /// # Errors
    /// Returns an error if credentials are missing, the socket fails, or no
    /// reply arrives in time.
    fn relay<'a>(
        &'a self,
        user_text: &'a str,
        prompt_override: Option<&'a str>,
    ) -> TutorFuture<'a, TutorResult<AgentReply>>;

    /// Fetch the most recent conversation as normalized turns.
    ///
    /// # Errors
    /// Returns an error if credentials are missing or the vendor rejects a request.
    fn latest_transcript(&self) -> TutorFuture<'_, TutorResult<Transcript>>;

    /// Summarize a transcript. Never fails.
    fn synthesize_notes<'a>(&'a self, turns: &'a [ConversationTurn]) -> TutorFuture<'a, NotesDocument>;
}

/// Production backend sharing one HTTP client across requests.
#[derive(Clone)]
pub struct TutorService {
    config: Arc<TutorConfig>,
    client: reqwest::Client,
}

impl TutorService {
    /// Build the service and its HTTP client.
    ///
    /// # Errors
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(config: Arc<TutorConfig>) -> TutorResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .connect_timeout(config.connect_timeout)
            .user_agent(concat!("teachback/", env!("CARGO_PKG_VERSION")))
            .build()?;

        info!(
            "Tutor service ready (relay timeout {}s, request timeout {}s)",
            config.relay_timeout.as_secs(),
            config.request_timeout.as_secs()
        );
        Ok(Self { config, client })
    }

    /// Shared configuration.
    #[must_use]
    pub fn config(&self) -> &TutorConfig {
        &self.config
    }
}

impl TutorBackend for TutorService {
    fn relay<'a>(
        &'a self,
        user_text: &'a str,
        prompt_override: Option<&'a str>,
    ) -> TutorFuture<'a, TutorResult<AgentReply>> {
        Box::pin(relay::relay(&self.config, user_text, prompt_override))
    }

    fn latest_transcript(&self) -> TutorFuture<'_, TutorResult<Transcript>> {
        Box::pin(transcript::fetch_latest_transcript(&self.client, &self.config))
    }

    fn synthesize_notes<'a>(&'a self, turns: &'a [ConversationTurn]) -> TutorFuture<'a, NotesDocument> {
        Box::pin(notes::synthesize_notes(&self.client, &self.config, turns))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_service_without_credentials() {
        let service = TutorService::new(Arc::new(TutorConfig::new())).expect("client");

        let reply = service.relay("Hello", None).await;
        assert!(matches!(reply, Err(TutorError::Configuration(_))));

        let transcript = service.latest_transcript().await;
        assert!(matches!(transcript, Err(TutorError::Configuration(_))));
    }

    #[tokio::test]
    async fn test_service_notes_without_gemini_key() {
        let service = TutorService::new(Arc::new(TutorConfig::new())).expect("client");
        let turns = vec![ConversationTurn::new(TurnRole::User, "What is a ratio?").expect("text")];

        let notes = service.synthesize_notes(&turns).await;
        assert_eq!(notes.source, NotesSource::Fallback);
        assert_eq!(notes.message_count, 1);
        assert_eq!(service.config().language, "en");
    }
}
