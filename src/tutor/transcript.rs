//! Retrieval of the latest ConvAI conversation transcript.

use reqwest::header::ACCEPT;
use serde_json::Value;
use tracing::{debug, error, info, warn};
use url::Url;

use super::config::{ConvaiCredentials, TutorConfig};
use super::error::{TutorError, TutorResult};
use super::extract::{conversation_id, conversation_list, message_list, normalize_messages, select_latest};
use super::types::Transcript;

/// Fetch and normalize the most recent conversation of the configured agent.
///
/// An empty transcript means there is nothing to summarize yet, not a failure.
///
/// # Errors
/// Returns [`TutorError::Configuration`] when credentials are missing and
/// [`TutorError::Upstream`] when the list or detail request is rejected.
pub async fn fetch_latest_transcript(
    client: &reqwest::Client,
    config: &TutorConfig,
) -> TutorResult<Transcript> {
    let credentials = config.convai_credentials()?;
    info!("Fetching conversations for agent {}", credentials.agent_id);

    let mut list_url = endpoint(config, &["convai", "conversations"])?;
    list_url
        .query_pairs_mut()
        .append_pair("agent_id", credentials.agent_id);

    let listing = get_json(client, list_url, credentials, "list conversations").await?;
    let conversations = conversation_list(&listing);
    info!("Found {} conversation(s)", conversations.len());

    if conversations.is_empty() {
        warn!("No conversations found for this agent");
        return Ok(Transcript::new());
    }

    for (idx, entry) in conversations.iter().enumerate() {
        let field = |name: &str| entry.get(name).map_or_else(|| "unknown".to_string(), Value::to_string);
        debug!(
            "  [{idx}] id: {}, created_at: {}, updated_at: {}",
            conversation_id(entry).as_deref().unwrap_or("unknown"),
            field("created_at"),
            field("updated_at"),
        );
    }

    let Some(id) = select_latest(conversations).and_then(conversation_id) else {
        error!("Cannot identify the latest conversation");
        return Ok(Transcript::new());
    };
    info!("Selected most recent conversation {id}");

    let detail_url = endpoint(config, &["convai", "conversations", id.as_str()])?;
    let detail = get_json(client, detail_url, credentials, "fetch conversation").await?;

    let Some(records) = message_list(&detail) else {
        warn!("Conversation {id} has no message list");
        return Ok(Transcript::new());
    };

    let transcript = normalize_messages(records);
    info!(
        "Normalized {} message(s) from conversation {id}",
        transcript.len()
    );
    Ok(transcript)
}

/// Build `{convai_api_base}/<segments...>` with each segment percent-encoded.
fn endpoint(config: &TutorConfig, segments: &[&str]) -> TutorResult<Url> {
    let mut url = Url::parse(&config.convai_api_base)?;
    url.path_segments_mut()
        .map_err(|()| {
            TutorError::Configuration(format!(
                "ElevenLabs API base cannot be a base URL: {}",
                config.convai_api_base
            ))
        })?
        .pop_if_empty()
        .extend(segments);
    Ok(url)
}

/// GET a JSON document. Bodies that are not JSON read as `null`.
async fn get_json(
    client: &reqwest::Client,
    url: Url,
    credentials: ConvaiCredentials<'_>,
    what: &str,
) -> TutorResult<Value> {
    debug!("Requesting {url}");
    let response = client
        .get(url)
        .header("xi-api-key", credentials.api_key)
        .header(ACCEPT, "application/json")
        .send()
        .await?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        error!("Failed to {what}: {status} {body}");
        return Err(TutorError::Upstream {
            status: status.as_u16(),
            body,
        });
    }

    let body = response.text().await?;
    Ok(serde_json::from_str(&body).unwrap_or_default())
}
