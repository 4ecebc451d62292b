//! Realtime relay of one student utterance to the ConvAI voice agent.
//!
//! Each call owns a fresh WebSocket. The call sends the conversation override
//! and the user message, then waits for the first frame that carries a final
//! agent reply, racing the socket against a single deadline.

use futures::{SinkExt, StreamExt};
use serde::Serialize;
use serde_json::Value;
use tokio::net::TcpStream;
use tokio::time::{Instant, timeout_at};
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::protocol::Message;
use tokio_tungstenite::tungstenite::{self, error::ProtocolError};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::{debug, info, warn};
use url::Url;

use super::config::{ConvaiCredentials, TutorConfig};
use super::error::{TutorError, TutorResult};
use super::extract::{CONVERSATION_ID_EXTRACTORS, FrameKind, classify_frame, first_match};
use super::types::AgentReply;

type AgentSocket = WebSocketStream<MaybeTlsStream<TcpStream>>;

#[derive(Serialize)]
struct PromptOverride<'a> {
    prompt: &'a str,
}

#[derive(Serialize)]
struct AgentOverride<'a> {
    prompt: PromptOverride<'a>,
    language: &'a str,
}

#[derive(Serialize)]
struct ConversationConfigOverride<'a> {
    agent: AgentOverride<'a>,
}

/// Frames this client sends to the agent.
#[derive(Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ClientFrame<'a> {
    ConversationInitiationClientData {
        conversation_config_override: ConversationConfigOverride<'a>,
    },
    UserMessage {
        text: &'a str,
    },
    Pong {
        event_id: u64,
    },
}

/// Values picked up from frames while waiting for the final reply.
#[derive(Debug, Default)]
struct RelayCapture {
    conversation_id: Option<String>,
    partial: Option<String>,
}

impl RelayCapture {
    fn observe(&mut self, frame: &Value) -> FrameKind {
        if self.conversation_id.is_none() {
            self.conversation_id = first_match(frame, CONVERSATION_ID_EXTRACTORS);
            if let Some(id) = &self.conversation_id {
                info!("ConvAI conversation created: {id}");
            }
        }

        let kind = classify_frame(frame);
        if let FrameKind::Partial(text) = &kind {
            self.partial = Some(text.clone());
        }
        kind
    }

    /// Outcome when the agent hangs up before a final reply.
    fn into_close_outcome(self) -> TutorResult<AgentReply> {
        match self.partial {
            Some(text) => {
                warn!("Socket closed before final reply, using captured partial reply");
                Ok(AgentReply {
                    text,
                    conversation_id: self.conversation_id,
                })
            }
            None => Err(TutorError::ConnectionClosed),
        }
    }
}

/// Relay one utterance to the voice agent and wait for its reply.
///
/// `prompt_override` replaces the default persona for this conversation.
///
/// # Errors
/// Returns [`TutorError::Configuration`] without connecting when credentials are
/// missing, [`TutorError::Timeout`] when no reply arrives before
/// `config.relay_timeout`, [`TutorError::ConnectionClosed`] when the agent hangs
/// up without replying, and [`TutorError::Transport`] on socket failures.
pub async fn relay(
    config: &TutorConfig,
    user_text: &str,
    prompt_override: Option<&str>,
) -> TutorResult<AgentReply> {
    let credentials = config.convai_credentials()?;
    let deadline = Instant::now() + config.relay_timeout;

    info!("Starting ConvAI conversation with agent {}", credentials.agent_id);
    debug!("User message: {user_text}");

    let request = build_request(config, credentials)?;
    let mut socket = match timeout_at(deadline, connect_async(request)).await {
        Ok(connected) => connected?.0,
        Err(_) => return Err(TutorError::Timeout(config.relay_timeout)),
    };
    info!("ConvAI socket open");

    let prompt = prompt_override.unwrap_or(&config.default_prompt);
    send_frame(
        &mut socket,
        &ClientFrame::ConversationInitiationClientData {
            conversation_config_override: ConversationConfigOverride {
                agent: AgentOverride {
                    prompt: PromptOverride { prompt },
                    language: &config.language,
                },
            },
        },
    )
    .await?;
    send_frame(&mut socket, &ClientFrame::UserMessage { text: user_text }).await?;
    debug!("Sent conversation override and user message");

    let mut capture = RelayCapture::default();
    loop {
        let Ok(next) = timeout_at(deadline, socket.next()).await else {
            warn!("Timed out waiting for agent response");
            let _ = socket.close(None).await;
            return Err(TutorError::Timeout(config.relay_timeout));
        };

        match next {
            Some(Ok(Message::Text(raw))) => {
                let frame: Value = match serde_json::from_str(raw.as_str()) {
                    Ok(frame) => frame,
                    Err(_) => {
                        let preview: String = raw.as_str().chars().take(200).collect();
                        debug!("Skipping unparseable frame: {preview}");
                        continue;
                    }
                };
                let kind = frame.get("type").and_then(Value::as_str).unwrap_or("unknown");
                debug!("Received frame type: {kind}");

                match capture.observe(&frame) {
                    FrameKind::Reply(text) => {
                        info!("Got agent response");
                        let _ = socket.close(None).await;
                        return Ok(AgentReply {
                            text,
                            conversation_id: capture.conversation_id,
                        });
                    }
                    FrameKind::Ping(event_id) => {
                        send_frame(&mut socket, &ClientFrame::Pong { event_id }).await?;
                    }
                    FrameKind::Partial(_) | FrameKind::Other => {}
                }
            }
            Some(Ok(Message::Close(reason))) => {
                info!("ConvAI socket closed by agent: {reason:?}");
                return capture.into_close_outcome();
            }
            Some(Ok(_)) => {}
            Some(Err(
                tungstenite::Error::ConnectionClosed
                | tungstenite::Error::AlreadyClosed
                | tungstenite::Error::Protocol(ProtocolError::ResetWithoutClosingHandshake),
            ))
            | None => {
                info!("ConvAI socket closed");
                return capture.into_close_outcome();
            }
            Some(Err(err)) => {
                warn!("ConvAI socket error: {err}");
                return Err(err.into());
            }
        }
    }
}

fn build_request(
    config: &TutorConfig,
    credentials: ConvaiCredentials<'_>,
) -> TutorResult<tungstenite::handshake::client::Request> {
    let mut url = Url::parse(&format!(
        "{}/convai/conversation",
        config.convai_ws_base.trim_end_matches('/')
    ))?;
    url.query_pairs_mut()
        .append_pair("agent_id", credentials.agent_id);
    debug!("ConvAI socket URL: {url}");

    let mut request = url.as_str().into_client_request()?;
    let key = HeaderValue::from_str(credentials.api_key)
        .map_err(|e| TutorError::Configuration(format!("invalid ElevenLabs API key: {e}")))?;
    request.headers_mut().insert("xi-api-key", key);
    Ok(request)
}

async fn send_frame(socket: &mut AgentSocket, frame: &ClientFrame<'_>) -> TutorResult<()> {
    let payload = serde_json::to_string(frame)?;
    socket.send(Message::Text(payload.into())).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::future::Future;
    use std::time::Duration;

    use serde_json::json;
    use tokio::net::TcpListener;
    use tokio::sync::oneshot;
    use tokio_tungstenite::accept_hdr_async;
    use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};

    use super::*;

    type ServerSocket = WebSocketStream<TcpStream>;

    /// Request line and key header seen by the fake agent.
    struct Handshake {
        uri: String,
        api_key: Option<String>,
    }

    /// Serve one fake ConvAI connection driven by `script`.
    async fn spawn_agent<F, Fut>(script: F) -> (TutorConfig, oneshot::Receiver<Handshake>)
    where
        F: FnOnce(ServerSocket) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send,
    {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("local addr");
        let (handshake_tx, handshake_rx) = oneshot::channel();

        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.expect("accept");
            let callback = move |req: &Request, resp: Response| {
                let _ = handshake_tx.send(Handshake {
                    uri: req.uri().to_string(),
                    api_key: req
                        .headers()
                        .get("xi-api-key")
                        .and_then(|v| v.to_str().ok())
                        .map(str::to_string),
                });
                Ok::<_, ErrorResponse>(resp)
            };
            let socket = accept_hdr_async(stream, callback).await.expect("handshake");
            script(socket).await;
        });

        let config = TutorConfig::new()
            .with_elevenlabs("test-key", "agent-1")
            .with_convai_bases("http://127.0.0.1:9", format!("ws://{addr}/v1"))
            .with_relay_timeout(Duration::from_secs(5));
        (config, handshake_rx)
    }

    async fn read_json(socket: &mut ServerSocket) -> Value {
        loop {
            match socket.next().await.expect("frame").expect("frame ok") {
                Message::Text(raw) => return serde_json::from_str(raw.as_str()).expect("json frame"),
                _ => continue,
            }
        }
    }

    async fn send_json(socket: &mut ServerSocket, value: Value) {
        socket
            .send(Message::Text(value.to_string().into()))
            .await
            .expect("send");
    }

    #[tokio::test]
    async fn test_relay_returns_first_agent_response() {
        let (frames_tx, frames_rx) = oneshot::channel();
        let (config, handshake) = spawn_agent(|mut socket| async move {
            let init = read_json(&mut socket).await;
            let user = read_json(&mut socket).await;
            let _ = frames_tx.send((init, user));

            send_json(
                &mut socket,
                json!({
                    "type": "conversation_initiation_metadata",
                    "conversation_initiation_server_data": { "conversation_id": "conv-42" }
                }),
            )
            .await;
            send_json(&mut socket, json!({ "type": "audio", "audio_event": { "audio_base_64": "AAAA" } })).await;
            send_json(
                &mut socket,
                json!({
                    "type": "agent_response",
                    "agent_response_event": { "agent_response": "Plants turn light into sugar." }
                }),
            )
            .await;
            send_json(&mut socket, json!({ "text": "too late" })).await;
            let _ = socket.next().await;
        })
        .await;

        let reply = relay(&config, "What is photosynthesis?", None)
            .await
            .expect("reply");
        assert_eq!(reply.text, "Plants turn light into sugar.");
        assert_eq!(reply.conversation_id.as_deref(), Some("conv-42"));

        let handshake = handshake.await.expect("handshake seen");
        assert_eq!(handshake.uri, "/v1/convai/conversation?agent_id=agent-1");
        assert_eq!(handshake.api_key.as_deref(), Some("test-key"));

        let (init, user) = frames_rx.await.expect("frames seen");
        assert_eq!(init["type"], "conversation_initiation_client_data");
        assert_eq!(
            init["conversation_config_override"]["agent"]["prompt"]["prompt"],
            config.default_prompt.as_str()
        );
        assert_eq!(init["conversation_config_override"]["agent"]["language"], "en");
        assert_eq!(user, json!({ "type": "user_message", "text": "What is photosynthesis?" }));
    }

    #[tokio::test]
    async fn test_relay_sends_prompt_override_and_answers_ping() {
        let (pong_tx, pong_rx) = oneshot::channel();
        let (prompt_tx, prompt_rx) = oneshot::channel();
        let (config, _handshake) = spawn_agent(|mut socket| async move {
            let init = read_json(&mut socket).await;
            let _ = prompt_tx.send(init["conversation_config_override"]["agent"]["prompt"]["prompt"].clone());
            let _ = read_json(&mut socket).await;

            send_json(&mut socket, json!({ "type": "ping", "ping_event": { "event_id": 3 } })).await;
            let _ = pong_tx.send(read_json(&mut socket).await);
            send_json(&mut socket, json!({ "type": "agent_response", "agent_response": "Hello!" })).await;
            let _ = socket.next().await;
        })
        .await;

        let reply = relay(&config, "Hi", Some("You are a strict math coach."))
            .await
            .expect("reply");
        assert_eq!(reply.text, "Hello!");
        assert!(reply.conversation_id.is_none());

        assert_eq!(prompt_rx.await.expect("prompt"), "You are a strict math coach.");
        assert_eq!(pong_rx.await.expect("pong"), json!({ "type": "pong", "event_id": 3 }));
    }

    #[tokio::test]
    async fn test_relay_times_out_without_reply() {
        let (config, _handshake) = spawn_agent(|mut socket| async move {
            let _ = read_json(&mut socket).await;
            let _ = read_json(&mut socket).await;
            send_json(&mut socket, json!({ "type": "audio" })).await;
            tokio::time::sleep(Duration::from_secs(10)).await;
        })
        .await;
        let config = config.with_relay_timeout(Duration::from_millis(300));

        let result = relay(&config, "Hello?", None).await;
        assert!(matches!(result, Err(TutorError::Timeout(_))), "got {result:?}");
    }

    #[tokio::test]
    async fn test_relay_close_without_reply_fails() {
        let (config, _handshake) = spawn_agent(|mut socket| async move {
            let _ = read_json(&mut socket).await;
            let _ = read_json(&mut socket).await;
            let _ = socket.close(None).await;
        })
        .await;

        let result = relay(&config, "Hello?", None).await;
        assert!(matches!(result, Err(TutorError::ConnectionClosed)), "got {result:?}");
    }

    // A close after a tentative reply resolves with that tentative text, even
    // though it may be a truncated answer.
    #[tokio::test]
    async fn test_relay_close_after_partial_reply_resolves() {
        let (config, _handshake) = spawn_agent(|mut socket| async move {
            let _ = read_json(&mut socket).await;
            let _ = read_json(&mut socket).await;
            send_json(&mut socket, json!({ "conversation_id": "conv-7" })).await;
            send_json(
                &mut socket,
                json!({
                    "type": "internal_tentative_agent_response",
                    "tentative_agent_response_internal_event": { "tentative_agent_response": "Photosynthesis is" }
                }),
            )
            .await;
            let _ = socket.close(None).await;
        })
        .await;

        let reply = relay(&config, "Explain", None).await.expect("partial reply");
        assert_eq!(reply.text, "Photosynthesis is");
        assert_eq!(reply.conversation_id.as_deref(), Some("conv-7"));
    }

    #[tokio::test]
    async fn test_relay_requires_credentials() {
        let config = TutorConfig::new();
        let result = relay(&config, "Hi", None).await;
        assert!(matches!(result, Err(TutorError::Configuration(_))));
    }

    #[tokio::test]
    async fn test_relay_connect_failure_is_transport_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("local addr");
        drop(listener);

        let config = TutorConfig::new()
            .with_elevenlabs("test-key", "agent-1")
            .with_convai_bases("http://127.0.0.1:9", format!("ws://{addr}/v1"));
        let result = relay(&config, "Hi", None).await;
        assert!(matches!(result, Err(TutorError::Transport(_))), "got {result:?}");
    }
}
