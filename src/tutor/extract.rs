//! Shape extractors for vendor payloads.
//!
//! The ConvAI protocol and REST API do not promise a single shape for the
//! values we need, so every lookup is an ordered list of extractors and the
//! first one that returns `Some` wins. Each extractor handles exactly one shape.

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde_json::Value;
use tracing::{debug, warn};

use super::types::{ConversationTurn, Transcript, TurnRole};

/// Tries one known payload shape.
pub type Extractor<T> = fn(&Value) -> Option<T>;

/// Run extractors in order and keep the first match.
#[must_use]
pub fn first_match<T>(value: &Value, extractors: &[Extractor<T>]) -> Option<T> {
    extractors.iter().find_map(|extract| extract(value))
}

/// Non-empty string at a nested path.
fn str_at<'a>(value: &'a Value, path: &[&str]) -> Option<&'a str> {
    path.iter()
        .try_fold(value, |node, key| node.get(key))
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
}

fn is_agent_response(frame: &Value) -> bool {
    frame.get("type").and_then(Value::as_str) == Some("agent_response")
}

// --- Relay frames ---------------------------------------------------------

fn nested_agent_response(frame: &Value) -> Option<String> {
    if !is_agent_response(frame) {
        return None;
    }
    str_at(frame, &["agent_response_event", "agent_response"]).map(str::to_string)
}

fn direct_agent_response(frame: &Value) -> Option<String> {
    if !is_agent_response(frame) {
        return None;
    }
    str_at(frame, &["agent_response"]).map(str::to_string)
}

fn generic_response(frame: &Value) -> Option<String> {
    str_at(frame, &["response"]).map(str::to_string)
}

fn generic_text(frame: &Value) -> Option<String> {
    str_at(frame, &["text"]).map(str::to_string)
}

fn tentative_agent_response(frame: &Value) -> Option<String> {
    str_at(
        frame,
        &["tentative_agent_response_internal_event", "tentative_agent_response"],
    )
    .map(str::to_string)
}

/// Shapes of a frame carrying the agent's final reply.
pub const REPLY_EXTRACTORS: &[Extractor<String>] = &[
    nested_agent_response,
    direct_agent_response,
    generic_response,
    generic_text,
];

/// Shapes of a frame carrying a not-yet-final reply.
pub const PARTIAL_REPLY_EXTRACTORS: &[Extractor<String>] = &[tentative_agent_response];

fn top_level_conversation_id(frame: &Value) -> Option<String> {
    str_at(frame, &["conversation_id"]).map(str::to_string)
}

fn nested_conversation_id(frame: &Value) -> Option<String> {
    str_at(frame, &["conversation", "conversation_id"]).map(str::to_string)
}

fn initiation_conversation_id(frame: &Value) -> Option<String> {
    str_at(
        frame,
        &["conversation_initiation_server_data", "conversation_id"],
    )
    .map(str::to_string)
}

/// Places a conversation id may be announced in.
pub const CONVERSATION_ID_EXTRACTORS: &[Extractor<String>] = &[
    top_level_conversation_id,
    nested_conversation_id,
    initiation_conversation_id,
];

/// What a single inbound relay frame means.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum FrameKind {
    /// The agent's final reply.
    Reply(String),
    /// A tentative reply that may still be replaced.
    Partial(String),
    /// Vendor keep-alive that expects a pong with the same event id.
    Ping(u64),
    /// Nothing we act on.
    Other,
}

/// Classify an inbound relay frame.
#[must_use]
pub fn classify_frame(frame: &Value) -> FrameKind {
    let ping_id = frame
        .get("type")
        .and_then(Value::as_str)
        .filter(|kind| *kind == "ping")
        .and_then(|_| frame.pointer("/ping_event/event_id"))
        .and_then(Value::as_u64);
    if let Some(event_id) = ping_id {
        return FrameKind::Ping(event_id);
    }

    if let Some(text) = first_match(frame, REPLY_EXTRACTORS) {
        return FrameKind::Reply(text);
    }

    first_match(frame, PARTIAL_REPLY_EXTRACTORS).map_or(FrameKind::Other, FrameKind::Partial)
}

// --- Conversation list ----------------------------------------------------

/// Fields that may hold the conversation list when the body is an object.
const LIST_FIELDS: &[&str] = &["conversations", "items"];

/// Fields that may hold the message list of a conversation detail.
const MESSAGE_FIELDS: &[&str] = &["messages", "history", "turns", "conversation", "transcript"];

/// Timestamp fields of a listed conversation, most authoritative first.
const TIMESTAMP_FIELDS: &[&str] = &["created_at", "updated_at"];

/// Identifier fields of a listed conversation.
const ID_FIELDS: &[&str] = &["conversation_id", "id"];

fn first_present<'a>(value: &'a Value, fields: &[&str]) -> Option<&'a Value> {
    fields
        .iter()
        .find_map(|field| value.get(field).filter(|v| !v.is_null()))
}

/// Conversation entries from a list response: a bare array, or an object
/// exposing the array under one of the known fields.
#[must_use]
pub fn conversation_list(body: &Value) -> &[Value] {
    if let Some(entries) = body.as_array() {
        return entries;
    }
    first_present(body, LIST_FIELDS)
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default()
}

/// Raw message records of a conversation detail, or `None` when no known
/// field holds a sequence.
#[must_use]
pub fn message_list(detail: &Value) -> Option<&[Value]> {
    first_present(detail, MESSAGE_FIELDS)
        .and_then(Value::as_array)
        .map(Vec::as_slice)
}

/// Offset-less datetime layouts, read as UTC.
const NAIVE_DATETIME_FORMATS: &[&str] = &["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"];

fn parse_timestamp_str(raw: &str) -> Option<i64> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.timestamp_millis());
    }
    NAIVE_DATETIME_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(raw, format).ok())
        .or_else(|| {
            NaiveDate::parse_from_str(raw, "%Y-%m-%d")
                .ok()
                .and_then(|date| date.and_hms_opt(0, 0, 0))
        })
        .map(|dt| dt.and_utc().timestamp_millis())
}

#[allow(clippy::cast_possible_truncation)]
fn parse_timestamp(value: &Value) -> Option<i64> {
    match value {
        Value::String(raw) => parse_timestamp_str(raw),
        Value::Number(n) => n
            .as_i64()
            .map(|secs| secs.saturating_mul(1000))
            .or_else(|| n.as_f64().map(|secs| (secs * 1000.0) as i64)),
        _ => None,
    }
}

/// Resolved creation time of a listed conversation in unix millis; entries
/// without a usable timestamp count as the epoch.
#[must_use]
pub fn resolved_timestamp(entry: &Value) -> i64 {
    TIMESTAMP_FIELDS
        .iter()
        .filter_map(|field| entry.get(field))
        .find_map(parse_timestamp)
        .unwrap_or(0)
}

/// The most recent entry. Ties keep the earlier entry.
#[must_use]
pub fn select_latest(entries: &[Value]) -> Option<&Value> {
    let mut latest: Option<(&Value, i64)> = None;
    for entry in entries {
        let ts = resolved_timestamp(entry);
        match latest {
            Some((_, best)) if ts <= best => {}
            _ => latest = Some((entry, ts)),
        }
    }
    latest.map(|(entry, _)| entry)
}

/// Usable identifier of a listed conversation.
#[must_use]
pub fn conversation_id(entry: &Value) -> Option<String> {
    ID_FIELDS.iter().find_map(|field| match entry.get(field)? {
        Value::String(id) if !id.is_empty() => Some(id.clone()),
        Value::Number(id) => Some(id.to_string()),
        _ => None,
    })
}

// --- Message records ------------------------------------------------------

fn explicit_role(record: &Value) -> Option<TurnRole> {
    str_at(record, &["role"]).map(TurnRole::from_label)
}

fn speaker_role(record: &Value) -> Option<TurnRole> {
    str_at(record, &["speaker"]).map(TurnRole::from_label)
}

fn is_user_flag(record: &Value) -> Option<TurnRole> {
    record.get("is_user").and_then(Value::as_bool).map(|is_user| {
        if is_user {
            TurnRole::User
        } else {
            TurnRole::Assistant
        }
    })
}

/// Places a message record may state its speaker in.
pub const ROLE_EXTRACTORS: &[Extractor<TurnRole>] = &[explicit_role, speaker_role, is_user_flag];

fn text_field(record: &Value) -> Option<String> {
    str_at(record, &["text"]).map(str::to_string)
}

fn message_field(record: &Value) -> Option<String> {
    str_at(record, &["message"]).map(str::to_string)
}

fn content_field(record: &Value) -> Option<String> {
    str_at(record, &["content"]).map(str::to_string)
}

fn plain_string(record: &Value) -> Option<String> {
    record.as_str().filter(|s| !s.is_empty()).map(str::to_string)
}

/// Places a message record may carry its text in.
pub const TEXT_EXTRACTORS: &[Extractor<String>] =
    &[text_field, message_field, content_field, plain_string];

/// Speaker of a raw record; missing or unknown roles resolve to the user.
#[must_use]
pub fn resolve_role(record: &Value) -> TurnRole {
    first_match(record, ROLE_EXTRACTORS).unwrap_or(TurnRole::User)
}

/// Normalize raw message records into turns, dropping records without text.
#[must_use]
pub fn normalize_messages(records: &[Value]) -> Transcript {
    let transcript: Transcript = records
        .iter()
        .enumerate()
        .filter_map(|(idx, record)| {
            let turn = first_match(record, TEXT_EXTRACTORS)
                .and_then(|text| ConversationTurn::new(resolve_role(record), text));
            if turn.is_none() {
                let preview: String = record.to_string().chars().take(100).collect();
                warn!("Message {idx} has no text content: {preview}");
            }
            turn
        })
        .collect();

    debug!(
        "Normalized {} of {} raw message(s)",
        transcript.len(),
        records.len()
    );
    transcript
}
