//! Startup helpers for the TeachBack server.

use std::process::ExitCode;

use crate::server::{self, AppState};
use crate::tutor::TutorConfig;

/// Load configuration and run the server until Ctrl+C.
///
/// # Returns
/// `ExitCode::SUCCESS` on graceful shutdown, `1` on failure.
#[must_use]
pub fn run() -> ExitCode {
    let dotenv = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    tracing::info!("Starting TeachBack v{}", env!("CARGO_PKG_VERSION"));
    match dotenv {
        Ok(path) => tracing::info!("Loaded environment from {}", path.display()),
        Err(e) if e.not_found() => tracing::debug!("No .env file found"),
        Err(e) => tracing::warn!("Ignoring unreadable .env file: {e}"),
    }

    let config = TutorConfig::from_env();
    if let Err(e) = config.validate() {
        tracing::error!("Invalid configuration: {e}");
        return ExitCode::from(1);
    }
    log_credentials(&config);

    let state = match AppState::new(config) {
        Ok(s) => s,
        Err(e) => {
            tracing::error!("Failed to create state: {e}");
            return ExitCode::from(1);
        }
    };

    let rt = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            tracing::error!("Failed to create runtime: {e}");
            return ExitCode::from(1);
        }
    };

    let port = get_port();
    if let Err(e) = rt.block_on(server::run_server_with_shutdown(state, port, shutdown_signal())) {
        tracing::error!("Server error: {e}");
        return ExitCode::from(1);
    }

    tracing::info!("TeachBack stopped");
    ExitCode::SUCCESS
}

/// Report which credentials are present, never their values.
fn log_credentials(config: &TutorConfig) {
    let loaded = |present: bool| if present { "loaded" } else { "missing" };
    tracing::info!(
        "ElevenLabs API key: {}",
        loaded(config.elevenlabs_api_key.is_some())
    );
    tracing::info!(
        "ElevenLabs agent id: {}",
        loaded(config.elevenlabs_agent_id.is_some())
    );
    tracing::info!("Gemini API key: {}", loaded(config.gemini_key().is_some()));
}

/// Resolve once Ctrl+C is received.
async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for Ctrl+C: {e}");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown requested");
}

/// Get configured server port from `PORT`.
#[must_use]
pub fn get_port() -> u16 {
    std::env::var("PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(server::DEFAULT_PORT)
}
