//! Gemini `generateContent` client for study notes.

use serde::{Deserialize, Serialize};
use tracing::{debug, error};
use url::Url;

use crate::tutor::config::TutorConfig;
use crate::tutor::error::{TutorError, TutorResult};
use crate::tutor::types::ConversationTurn;

/// Sampling temperature for notes; low to keep the structure stable.
const NOTES_TEMPERATURE: f32 = 0.4;

/// Instructions placed ahead of the transcript.
const NOTES_SYSTEM_PROMPT: &str = "You are an expert educational note-taking assistant for 6th–10th grade tutoring sessions. \
Given a full dialogue between a student and a tutoring AI, you write clear, concise study notes.

Your notes must be structured into three sections with markdown headings:
1. Main Topics
2. Key Explanations & Insights
3. Action Items & Next Steps

Guidelines:
- Use bullet points, not paragraphs.
- Be concrete and specific (formulas, definitions, examples).
- If a section has no content, include the heading and write a single bullet like '- None discussed'.
- Do NOT add extra commentary or chatty language. Just the notes.";

#[derive(Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Serialize)]
struct Content<'a> {
    role: &'a str,
    parts: Vec<Part<'a>>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f32,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest<'a> {
    contents: Vec<Content<'a>>,
    generation_config: GenerationConfig,
}

#[derive(Debug, Default, Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    #[serde(default)]
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Debug, Deserialize)]
struct CandidatePart {
    #[serde(default)]
    text: Option<String>,
}

impl GenerateContentResponse {
    /// All text fragments of the first candidate, joined and trimmed.
    fn first_candidate_text(&self) -> String {
        self.candidates
            .first()
            .and_then(|candidate| candidate.content.as_ref())
            .map(|content| {
                content
                    .parts
                    .iter()
                    .filter_map(|part| part.text.as_deref())
                    .collect::<String>()
            })
            .unwrap_or_default()
            .trim()
            .to_string()
    }
}

/// Render turns as a `Tutor:` / `Student:` dialogue.
#[must_use]
pub fn format_dialogue(turns: &[ConversationTurn]) -> String {
    turns
        .iter()
        .map(|turn| format!("{}: {}", turn.role().speaker_label(), turn.text()))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Full prompt sent to the model for a transcript.
#[must_use]
pub fn build_prompt(turns: &[ConversationTurn]) -> String {
    format!(
        "{NOTES_SYSTEM_PROMPT}\n\n---\n\nTranscript:\n\n{}\n\nWrite the structured notes now.",
        format_dialogue(turns)
    )
}

fn generate_url(config: &TutorConfig, api_key: &str) -> TutorResult<Url> {
    let mut url = Url::parse(&format!(
        "{}/{}:generateContent",
        config.gemini_api_base.trim_end_matches('/'),
        config.gemini_model.trim_start_matches('/')
    ))?;
    url.query_pairs_mut().append_pair("key", api_key);
    Ok(url)
}

/// Ask Gemini for structured notes.
///
/// # Errors
/// Returns [`TutorError::Upstream`] on a non-success status and
/// [`TutorError::EmptyResponse`] when the model returned no text.
pub async fn generate_notes(
    client: &reqwest::Client,
    config: &TutorConfig,
    api_key: &str,
    turns: &[ConversationTurn],
) -> TutorResult<String> {
    let prompt = build_prompt(turns);
    let request = GenerateContentRequest {
        contents: vec![Content {
            role: "user",
            parts: vec![Part { text: &prompt }],
        }],
        generation_config: GenerationConfig {
            temperature: NOTES_TEMPERATURE,
        },
    };

    debug!("Calling Gemini model {} for notes", config.gemini_model);
    let response = client
        .post(generate_url(config, api_key)?)
        .json(&request)
        .send()
        .await?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        error!("Gemini API error: {status} {body}");
        return Err(TutorError::Upstream {
            status: status.as_u16(),
            body,
        });
    }

    let body = response.text().await?;
    let parsed: GenerateContentResponse = serde_json::from_str(&body).unwrap_or_default();
    let text = parsed.first_candidate_text();
    if text.is_empty() {
        return Err(TutorError::EmptyResponse("Gemini"));
    }
    Ok(text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tutor::types::TurnRole;

    fn turn(role: TurnRole, text: &str) -> ConversationTurn {
        ConversationTurn::new(role, text).expect("non-empty text")
    }

    #[test]
    fn test_format_dialogue() {
        let turns = vec![
            turn(TurnRole::User, "What is a prime?"),
            turn(TurnRole::Assistant, "A number with exactly two divisors."),
        ];
        assert_eq!(
            format_dialogue(&turns),
            "Student: What is a prime?\nTutor: A number with exactly two divisors."
        );
    }

    #[test]
    fn test_prompt_embeds_dialogue() {
        let turns = vec![turn(TurnRole::User, "Hi")];
        let prompt = build_prompt(&turns);
        assert!(prompt.starts_with("You are an expert educational note-taking assistant"));
        assert!(prompt.contains("3. Action Items & Next Steps"));
        assert!(prompt.contains("---\n\nTranscript:\n\nStudent: Hi\n\nWrite the structured notes now."));
    }

    #[test]
    fn test_request_shape() {
        let request = GenerateContentRequest {
            contents: vec![Content {
                role: "user",
                parts: vec![Part { text: "p" }],
            }],
            generation_config: GenerationConfig { temperature: 0.4 },
        };
        let json = serde_json::to_value(&request).expect("serializable");
        assert_eq!(json["contents"][0]["role"], "user");
        assert_eq!(json["contents"][0]["parts"][0]["text"], "p");
        let temperature = json["generationConfig"]["temperature"].as_f64().expect("number");
        assert!((temperature - 0.4).abs() < 1e-6);
    }

    #[test]
    fn test_first_candidate_text_joins_parts() {
        let body = serde_json::json!({
            "candidates": [
                { "content": { "parts": [ { "text": "## Main Topics\n" }, { "inlineData": {} }, { "text": "- Fractions \n" } ] } },
                { "content": { "parts": [ { "text": "ignored" } ] } }
            ]
        });
        let parsed: GenerateContentResponse = serde_json::from_value(body).expect("valid body");
        assert_eq!(parsed.first_candidate_text(), "## Main Topics\n- Fractions");
    }

    #[test]
    fn test_missing_candidates_is_empty() {
        let parsed: GenerateContentResponse =
            serde_json::from_str(r#"{ "promptFeedback": { "blockReason": "SAFETY" } }"#).expect("valid body");
        assert!(parsed.first_candidate_text().is_empty());
    }

    #[test]
    fn test_generate_url() {
        let config = TutorConfig::new();
        let url = generate_url(&config, "k&y").expect("url");
        assert_eq!(
            url.as_str(),
            "https://generativelanguage.googleapis.com/v1beta/models/gemini-1.5-flash:generateContent?key=k%26y"
        );
    }
}
