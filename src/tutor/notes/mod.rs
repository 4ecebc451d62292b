//! Study notes synthesis.
//!
//! Notes come from Gemini when a key is configured. Any failure on that path
//! degrades to [`heuristic::heuristic_notes`], so a caller always gets a
//! three-section document back.

pub mod gemini;
pub mod heuristic;

use tracing::{info, warn};

use super::config::TutorConfig;
use super::types::{ConversationTurn, NotesDocument, NotesSource};

/// Body returned when there is nothing to summarize.
pub const EMPTY_TRANSCRIPT_NOTES: &str = "No conversation messages were found to summarize.";

/// Produce structured notes for a transcript.
///
/// Never fails: backend errors are logged and answered with the heuristic notes.
pub async fn synthesize_notes(
    client: &reqwest::Client,
    config: &TutorConfig,
    turns: &[ConversationTurn],
) -> NotesDocument {
    if turns.is_empty() {
        return NotesDocument {
            body: EMPTY_TRANSCRIPT_NOTES.to_string(),
            source: NotesSource::Fallback,
            message_count: 0,
        };
    }

    let generated = match config.gemini_key() {
        Some(api_key) => match gemini::generate_notes(client, config, api_key, turns).await {
            Ok(body) => Some(body),
            Err(e) => {
                warn!("Gemini notes failed, using fallback summary: {e}");
                None
            }
        },
        None => {
            info!("GEMINI_API_KEY not set, using fallback summary");
            None
        }
    };

    let (body, source) = generated.map_or_else(
        || (heuristic::heuristic_notes(turns), NotesSource::Fallback),
        |body| (body, NotesSource::Generated),
    );

    NotesDocument {
        body,
        source,
        message_count: turns.len(),
    }
}
