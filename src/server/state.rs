//! Application state shared across all request handlers.

use std::path::PathBuf;
use std::sync::Arc;

use serde::Serialize;

use crate::tutor::config::env_var;
use crate::tutor::{TutorBackend, TutorConfig, TutorResult, TutorService};

/// Default directory of the static browser client.
pub const DEFAULT_CLIENT_DIR: &str = "client";

/// Public Firebase web settings handed to the browser client.
#[derive(Clone, Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FirebaseClientConfig {
    /// Web API key.
    pub api_key: String,
    /// Auth domain.
    pub auth_domain: String,
    /// Project id.
    pub project_id: String,
    /// Storage bucket.
    pub storage_bucket: String,
    /// Messaging sender id.
    pub messaging_sender_id: String,
    /// App id.
    pub app_id: String,
    /// ConvAI agent id used by the browser widget.
    pub eleven_labs_agent_id: String,
}

impl FirebaseClientConfig {
    /// Read the `FIREBASE_*` variables; unset ones stay empty.
    #[must_use]
    pub fn from_env(config: &TutorConfig) -> Self {
        let var = |name: &str| env_var(name).unwrap_or_default();
        Self {
            api_key: var("FIREBASE_API_KEY"),
            auth_domain: var("FIREBASE_AUTH_DOMAIN"),
            project_id: var("FIREBASE_PROJECT_ID"),
            storage_bucket: var("FIREBASE_STORAGE_BUCKET"),
            messaging_sender_id: var("FIREBASE_MESSAGING_SENDER_ID"),
            app_id: var("FIREBASE_APP_ID"),
            eleven_labs_agent_id: config.elevenlabs_agent_id.clone().unwrap_or_default(),
        }
    }
}

/// Shared application state.
pub struct AppState {
    /// Tutoring backends.
    pub backend: Arc<dyn TutorBackend>,
    /// Values served by `/api/firebase-config`.
    pub firebase: FirebaseClientConfig,
    /// Root of the static client files.
    pub client_dir: PathBuf,
}

impl AppState {
    /// Create the production state from a loaded config.
    ///
    /// # Errors
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(config: TutorConfig) -> TutorResult<Arc<Self>> {
        let firebase = FirebaseClientConfig::from_env(&config);
        let client_dir = env_var("TEACHBACK_CLIENT_DIR")
            .unwrap_or_else(|| DEFAULT_CLIENT_DIR.to_string())
            .into();
        let backend = TutorService::new(Arc::new(config))?;

        Ok(Arc::new(Self {
            backend: Arc::new(backend),
            firebase,
            client_dir,
        }))
    }

    /// Create state around any backend, e.g. a test double.
    #[must_use]
    pub fn with_backend(
        backend: Arc<dyn TutorBackend>,
        firebase: FirebaseClientConfig,
        client_dir: impl Into<PathBuf>,
    ) -> Arc<Self> {
        Arc::new(Self {
            backend,
            firebase,
            client_dir: client_dir.into(),
        })
    }
}
