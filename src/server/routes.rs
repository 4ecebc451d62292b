//! HTTP route handlers for the TeachBack API.

use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, Request, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tower::ServiceExt;
use tower_http::services::{ServeDir, ServeFile};
use tracing::{debug, error, info, warn};

use crate::tutor::TutorError;

use super::state::{AppState, FirebaseClientConfig};

/// Page served for `/` and for unknown paths.
pub const LANDING_PAGE: &str = "pages/landing.html";

/// Create the API router with all routes.
pub fn create_router(state: Arc<AppState>) -> Router {
    let landing = state.client_dir.join(LANDING_PAGE);
    let static_files = ServeDir::new(&state.client_dir).fallback(ServeFile::new(&landing));

    Router::new()
        .route("/health", get(health_check))
        .route("/api/chat", post(chat))
        .route("/api/generate-notes", get(generate_notes))
        .route("/api/firebase-config", get(firebase_config))
        .route("/pages/{page}", get(page))
        .route_service("/", ServeFile::new(landing))
        .fallback_service(static_files)
        .with_state(state)
}

/// JSON error body `{message, details?}`.
#[derive(Debug, Serialize)]
pub struct ApiError {
    #[serde(skip)]
    status: StatusCode,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<String>,
}

impl ApiError {
    /// Client error without details.
    #[must_use]
    pub fn bad_request(message: &str) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.to_string(),
            details: None,
        }
    }

    /// Error carrying the underlying failure as `details`.
    #[must_use]
    pub fn from_tutor(message: &str, err: &TutorError) -> Self {
        Self {
            status: StatusCode::from_u16(err.status_code())
                .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
            message: message.to_string(),
            details: Some(err.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(self)).into_response()
    }
}

/// Health check endpoint.
async fn health_check() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "service": "teachback",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

/// One chat message from the browser client.
#[derive(Debug, Deserialize)]
pub struct ChatMessage {
    /// `system`, `user` or `assistant`.
    pub role: String,
    /// Message text.
    #[serde(default)]
    pub content: String,
}

/// Chat request body.
#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    /// Conversation so far; the latest user message is relayed.
    #[serde(default)]
    pub messages: Vec<ChatMessage>,
}

impl ChatRequest {
    /// Content of the most recent user message, unless that message is blank.
    fn latest_user_text(&self) -> Option<&str> {
        self.messages
            .iter()
            .rev()
            .find(|m| m.role == "user")
            .map(|m| m.content.as_str())
            .filter(|content| !content.trim().is_empty())
    }

    fn system_prompt(&self) -> Option<&str> {
        self.messages
            .iter()
            .find(|m| m.role == "system" && !m.content.trim().is_empty())
            .map(|m| m.content.as_str())
    }
}

/// Chat response body.
#[derive(Debug, Serialize)]
pub struct ChatResponse {
    /// The agent's reply.
    pub text: String,
}

/// Relay the latest user message to the voice agent.
async fn chat(
    State(state): State<Arc<AppState>>,
    request: Result<Json<ChatRequest>, JsonRejection>,
) -> Result<Json<ChatResponse>, ApiError> {
    let Ok(Json(request)) = request else {
        return Err(ApiError::bad_request("Invalid messages array"));
    };
    if request.messages.is_empty() {
        return Err(ApiError::bad_request("Invalid messages array"));
    }
    let Some(user_text) = request.latest_user_text() else {
        return Err(ApiError::bad_request("No user message found"));
    };

    let reply = state
        .backend
        .relay(user_text, request.system_prompt())
        .await
        .map_err(|e| {
            if e.is_relay_error() {
                warn!("Agent did not answer: {e}");
            } else {
                error!("Chat relay failed: {e}");
            }
            ApiError::from_tutor("Failed to get AI response", &e)
        })?;

    if let Some(id) = &reply.conversation_id {
        info!("Agent replied in conversation {id}");
    }
    Ok(Json(ChatResponse { text: reply.text }))
}

/// Notes response body.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NotesResponse {
    /// Markdown notes.
    pub notes: String,
    /// `generated` or `fallback`.
    pub source: &'static str,
    /// Number of turns summarized.
    pub message_count: usize,
}

/// Summarize the latest conversation of the configured agent.
async fn generate_notes(State(state): State<Arc<AppState>>) -> Result<Json<NotesResponse>, ApiError> {
    let transcript = state.backend.latest_transcript().await.map_err(|e| {
        error!("Fetching latest transcript failed: {e}");
        ApiError::from_tutor("Failed to generate notes from the latest conversation", &e)
    })?;

    if transcript.is_empty() {
        warn!("No recent conversation to summarize");
        return Err(ApiError::bad_request(
            "No recent conversation found. Teach the AI first to generate notes.",
        ));
    }

    let notes = state.backend.synthesize_notes(&transcript).await;
    info!(
        "Generated {} notes from {} message(s)",
        notes.source.as_str(),
        notes.message_count
    );
    Ok(Json(NotesResponse {
        notes: notes.body,
        source: notes.source.as_str(),
        message_count: notes.message_count,
    }))
}

/// Serve `pages/<page>`, or `pages/<page>.html` for extensionless names.
async fn page(State(state): State<Arc<AppState>>, Path(page): Path<String>, request: Request) -> Response {
    if page.is_empty() || page.starts_with('.') || page.contains(['/', '\\']) {
        return (StatusCode::NOT_FOUND, "Page not found").into_response();
    }

    let pages = state.client_dir.join("pages");
    for candidate in [pages.join(&page), pages.join(format!("{page}.html"))] {
        let is_file = tokio::fs::metadata(&candidate)
            .await
            .is_ok_and(|meta| meta.is_file());
        if is_file {
            return match ServeFile::new(candidate).oneshot(request).await {
                Ok(response) => response.into_response(),
                Err(never) => match never {},
            };
        }
    }

    debug!("Page not found: {page}");
    (StatusCode::NOT_FOUND, "Page not found").into_response()
}

/// Public client configuration.
async fn firebase_config(State(state): State<Arc<AppState>>) -> Json<FirebaseClientConfig> {
    Json(state.firebase.clone())
}
