//! Configuration for the tutor integration layer.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use super::error::{TutorError, TutorResult};

/// Default ElevenLabs REST base URL.
pub const DEFAULT_CONVAI_API_BASE: &str = "https://api.elevenlabs.io/v1";
/// Default ElevenLabs realtime base URL.
pub const DEFAULT_CONVAI_WS_BASE: &str = "wss://api.elevenlabs.io/v1";
/// Default Gemini REST base URL.
pub const DEFAULT_GEMINI_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";
/// Default Gemini model path.
pub const DEFAULT_GEMINI_MODEL: &str = "models/gemini-1.5-flash";

/// Persona used when the client does not send a system message.
pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a friendly educational AI learning companion for grades 6-10. \
Have a natural conversation. Ask short questions to clarify. \
When the student explains a concept, give feedback: praise 1 correct part, correct mistakes gently, then give 1-2 next steps. \
Keep responses short (2-5 sentences).";

/// Configuration for the voice agent and notes backends.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TutorConfig {
    /// ElevenLabs API key.
    pub elevenlabs_api_key: Option<String>,
    /// ElevenLabs ConvAI agent id.
    pub elevenlabs_agent_id: Option<String>,
    /// ElevenLabs REST base URL.
    pub convai_api_base: String,
    /// ElevenLabs realtime base URL.
    pub convai_ws_base: String,
    /// Gemini API key; notes fall back to the heuristic summary without it.
    pub gemini_api_key: Option<String>,
    /// Gemini REST base URL.
    pub gemini_api_base: String,
    /// Gemini model path, e.g. `models/gemini-1.5-flash`.
    pub gemini_model: String,
    /// Language tag sent with the conversation override.
    pub language: String,
    /// Persona prompt used when no override is supplied.
    pub default_prompt: String,
    /// Upper bound for one relayed utterance.
    #[serde(with = "duration_serde")]
    pub relay_timeout: Duration,
    /// Upper bound for one REST request.
    #[serde(with = "duration_serde")]
    pub request_timeout: Duration,
    /// Connection timeout for REST requests.
    #[serde(with = "duration_serde")]
    pub connect_timeout: Duration,
}

impl Default for TutorConfig {
    fn default() -> Self {
        Self {
            elevenlabs_api_key: None,
            elevenlabs_agent_id: None,
            convai_api_base: DEFAULT_CONVAI_API_BASE.to_string(),
            convai_ws_base: DEFAULT_CONVAI_WS_BASE.to_string(),
            gemini_api_key: None,
            gemini_api_base: DEFAULT_GEMINI_API_BASE.to_string(),
            gemini_model: DEFAULT_GEMINI_MODEL.to_string(),
            language: "en".to_string(),
            default_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            relay_timeout: Duration::from_secs(15),
            request_timeout: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(10),
        }
    }
}

/// Credentials needed by every ConvAI call.
#[derive(Clone, Copy, Debug)]
pub struct ConvaiCredentials<'a> {
    /// API key sent as `xi-api-key`.
    pub api_key: &'a str,
    /// Agent whose conversations are used.
    pub agent_id: &'a str,
}

impl TutorConfig {
    /// Create a new config with default settings.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the config from environment variables, keeping defaults for unset ones.
    #[must_use]
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            elevenlabs_api_key: env_var("ELEVENLABS_API_KEY"),
            elevenlabs_agent_id: env_var("ELEVENLABS_AGENT_ID"),
            convai_api_base: env_var("ELEVENLABS_API_BASE").unwrap_or(defaults.convai_api_base),
            convai_ws_base: env_var("ELEVENLABS_WS_BASE").unwrap_or(defaults.convai_ws_base),
            gemini_api_key: env_var("GEMINI_API_KEY"),
            gemini_api_base: env_var("GEMINI_API_BASE").unwrap_or(defaults.gemini_api_base),
            gemini_model: env_var("GEMINI_MODEL").unwrap_or(defaults.gemini_model),
            language: env_var("TEACHBACK_LANGUAGE").unwrap_or(defaults.language),
            default_prompt: defaults.default_prompt,
            relay_timeout: env_secs("TEACHBACK_RELAY_TIMEOUT_SECS").unwrap_or(defaults.relay_timeout),
            request_timeout: env_secs("TEACHBACK_REQUEST_TIMEOUT_SECS")
                .unwrap_or(defaults.request_timeout),
            connect_timeout: defaults.connect_timeout,
        }
    }

    /// Set ElevenLabs credentials.
    #[must_use]
    pub fn with_elevenlabs(mut self, api_key: impl Into<String>, agent_id: impl Into<String>) -> Self {
        self.elevenlabs_api_key = Some(api_key.into());
        self.elevenlabs_agent_id = Some(agent_id.into());
        self
    }

    /// Point both ElevenLabs endpoints at other base URLs.
    #[must_use]
    pub fn with_convai_bases(mut self, api_base: impl Into<String>, ws_base: impl Into<String>) -> Self {
        self.convai_api_base = api_base.into();
        self.convai_ws_base = ws_base.into();
        self
    }

    /// Set the Gemini API key.
    #[must_use]
    pub fn with_gemini_api_key(mut self, key: impl Into<String>) -> Self {
        self.gemini_api_key = Some(key.into());
        self
    }

    /// Point the Gemini endpoint at another base URL.
    #[must_use]
    pub fn with_gemini_api_base(mut self, base: impl Into<String>) -> Self {
        self.gemini_api_base = base.into();
        self
    }

    /// Set the relay timeout.
    #[must_use]
    pub const fn with_relay_timeout(mut self, timeout: Duration) -> Self {
        self.relay_timeout = timeout;
        self
    }

    /// ElevenLabs credentials, or a configuration error when either is missing.
    ///
    /// # Errors
    /// Returns [`TutorError::Configuration`] if the key or agent id is unset.
    pub fn convai_credentials(&self) -> TutorResult<ConvaiCredentials<'_>> {
        match (self.elevenlabs_api_key.as_deref(), self.elevenlabs_agent_id.as_deref()) {
            (Some(api_key), Some(agent_id)) if !api_key.is_empty() && !agent_id.is_empty() => {
                Ok(ConvaiCredentials { api_key, agent_id })
            }
            _ => Err(TutorError::Configuration(
                "ElevenLabs API credentials not configured. Please set ELEVENLABS_API_KEY and ELEVENLABS_AGENT_ID."
                    .to_string(),
            )),
        }
    }

    /// Gemini API key, when one is configured.
    #[must_use]
    pub fn gemini_key(&self) -> Option<&str> {
        self.gemini_api_key.as_deref().filter(|key| !key.is_empty())
    }

    /// Validate configuration invariants.
    ///
    /// # Errors
    /// Returns an error if a base URL does not parse or a timeout is zero.
    pub fn validate(&self) -> TutorResult<()> {
        Url::parse(&self.convai_api_base)?;
        Url::parse(&self.convai_ws_base)?;
        Url::parse(&self.gemini_api_base)?;

        if self.relay_timeout.is_zero() {
            return Err(TutorError::Configuration(
                "relay_timeout must be > 0".to_string(),
            ));
        }

        if self.request_timeout.is_zero() {
            return Err(TutorError::Configuration(
                "request_timeout must be > 0".to_string(),
            ));
        }

        Ok(())
    }
}

/// Read an environment variable, treating empty values as unset.
pub(crate) fn env_var(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn env_secs(name: &str) -> Option<Duration> {
    env_var(name)
        .and_then(|value| value.parse::<u64>().ok())
        .filter(|secs| *secs > 0)
        .map(Duration::from_secs)
}

/// Serde module for Duration serialization.
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        u64::try_from(duration.as_millis())
            .unwrap_or(u64::MAX)
            .serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = TutorConfig::default();
        assert_eq!(config.relay_timeout, Duration::from_secs(15));
        assert_eq!(config.gemini_model, "models/gemini-1.5-flash");
        assert_eq!(config.language, "en");
        assert!(config.gemini_key().is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_missing_credentials() {
        let config = TutorConfig::new();
        assert!(matches!(
            config.convai_credentials(),
            Err(TutorError::Configuration(_))
        ));

        let config = TutorConfig::new().with_elevenlabs("key", "");
        assert!(config.convai_credentials().is_err());
    }

    #[test]
    fn test_config_builder() {
        let config = TutorConfig::new()
            .with_elevenlabs("xi-key", "agent-1")
            .with_gemini_api_key("g-key")
            .with_relay_timeout(Duration::from_millis(250));

        let creds = config.convai_credentials().expect("credentials set");
        assert_eq!(creds.api_key, "xi-key");
        assert_eq!(creds.agent_id, "agent-1");
        assert_eq!(config.gemini_key(), Some("g-key"));
        assert_eq!(config.relay_timeout, Duration::from_millis(250));
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let config = TutorConfig::new().with_convai_bases("not a url", DEFAULT_CONVAI_WS_BASE);
        assert!(config.validate().is_err());

        let config = TutorConfig::new().with_relay_timeout(Duration::ZERO);
        assert!(matches!(config.validate(), Err(TutorError::Configuration(_))));
    }

    #[test]
    fn test_duration_serde_roundtrip() {
        let config = TutorConfig::new().with_relay_timeout(Duration::from_millis(1500));
        let json = serde_json::to_string(&config).expect("serializable");
        let back: TutorConfig = serde_json::from_str(&json).expect("deserializable");
        assert_eq!(back.relay_timeout, Duration::from_millis(1500));
    }
}
