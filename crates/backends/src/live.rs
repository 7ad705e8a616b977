//! Live backend: delegates turns to an external orchestration runtime.
//!
//! Wire format:
//! - `POST {base_url}/invoke` → `{"content": ..., "usage": {...}, "interrupt": {...}}`
//! - `POST {base_url}/stream` → server-sent events whose `data:` lines are
//!   JSON-encoded [`BackendEvent`]s, terminated by `data: [DONE]`
//! - `GET {base_url}/sessions/{id}/files` → workspace files
//!
//! The runtime keys its own checkpoint state by `session_id`, so a resumed
//! turn only needs the resolution payload.

use std::time::Duration;

use agentgate_core::error::BackendError;
use agentgate_core::{
    AgentBackend, BackendConfig, BackendEvent, BackendEventStream, BackendReply, Message,
    WorkspaceFile,
};
use async_trait::async_trait;
use futures::StreamExt;
use serde::Serialize;
use tracing::{debug, trace, warn};

pub struct LiveBackend {
    base_url: String,
    api_key: Option<String>,
    client: reqwest::Client,
}

impl std::fmt::Debug for LiveBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LiveBackend")
            .field("base_url", &self.base_url)
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

#[derive(Serialize)]
struct TurnBody<'a> {
    messages: Vec<WireMessage<'a>>,
    #[serde(flatten)]
    config: &'a BackendConfig,
    stream: bool,
}

#[derive(Serialize)]
struct WireMessage<'a> {
    role: &'a agentgate_core::Role,
    content: &'a str,
}

impl LiveBackend {
    /// Create a live backend. A missing key is allowed here; turns then
    /// fail with [`BackendError::NotConfigured`].
    pub fn new(
        base_url: impl Into<String>,
        api_key: Option<String>,
        timeout: Duration,
    ) -> Result<Self, BackendError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| BackendError::NotConfigured(format!("HTTP client: {e}")))?;

        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.filter(|k| !k.trim().is_empty()),
            client,
        })
    }

    fn api_key(&self) -> Result<&str, BackendError> {
        self.api_key.as_deref().ok_or_else(|| {
            BackendError::NotConfigured("no API key configured for the live backend".into())
        })
    }

    fn body<'a>(messages: &'a [Message], config: &'a BackendConfig, stream: bool) -> TurnBody<'a> {
        TurnBody {
            messages: messages
                .iter()
                .map(|m| WireMessage {
                    role: &m.role,
                    content: &m.content,
                })
                .collect(),
            config,
            stream,
        }
    }

    async fn post(
        &self,
        path: &str,
        body: &TurnBody<'_>,
        accept: &str,
    ) -> Result<reqwest::Response, BackendError> {
        let api_key = self.api_key()?;
        let url = format!("{}{path}", self.base_url);

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {api_key}"))
            .header("Accept", accept)
            .json(body)
            .send()
            .await
            .map_err(|e| BackendError::Network(e.to_string()))?;

        check_status(response).await
    }
}

async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, BackendError> {
    let status = response.status().as_u16();
    if status == 401 || status == 403 {
        return Err(BackendError::Api {
            status_code: status,
            message: "Invalid API key or insufficient permissions".into(),
        });
    }
    if !response.status().is_success() {
        let error_body = response.text().await.unwrap_or_default();
        warn!(status, body = %error_body, "Live backend returned error");
        return Err(BackendError::Api {
            status_code: status,
            message: error_body,
        });
    }
    Ok(response)
}

/// Splits an SSE byte stream into `data:` payloads.
#[derive(Debug, Default)]
pub struct SseLineBuffer {
    buffer: String,
}

impl SseLineBuffer {
    /// Feed a chunk and return the payloads of every completed `data:` line.
    pub fn push(&mut self, chunk: &str) -> Vec<String> {
        self.buffer.push_str(chunk);

        let mut payloads = Vec::new();
        while let Some(line_end) = self.buffer.find('\n') {
            let line: String = self.buffer.drain(..=line_end).collect();
            let line = line.trim_end_matches(['\n', '\r']);

            // blank lines and comments
            if line.is_empty() || line.starts_with(':') {
                continue;
            }
            if let Some(data) = line.strip_prefix("data:") {
                payloads.push(data.trim().to_string());
            }
        }
        payloads
    }
}

#[async_trait]
impl AgentBackend for LiveBackend {
    fn name(&self) -> &str {
        "live"
    }

    async fn invoke(
        &self,
        messages: Vec<Message>,
        config: BackendConfig,
    ) -> std::result::Result<BackendReply, BackendError> {
        debug!(session_id = %config.session_id, model = %config.model, "Live invoke");
        let body = Self::body(&messages, &config, false);
        let response = self.post("/invoke", &body, "application/json").await?;

        response
            .json::<BackendReply>()
            .await
            .map_err(|e| BackendError::InvalidEvent(format!("Failed to parse reply: {e}")))
    }

    async fn stream_events(
        &self,
        messages: Vec<Message>,
        config: BackendConfig,
    ) -> std::result::Result<BackendEventStream, BackendError> {
        debug!(session_id = %config.session_id, model = %config.model, "Live stream");
        let body = Self::body(&messages, &config, true);
        let response = self.post("/stream", &body, "text/event-stream").await?;

        let (tx, rx) = tokio::sync::mpsc::channel(64);

        tokio::spawn(async move {
            let mut byte_stream = response.bytes_stream();
            let mut lines = SseLineBuffer::default();

            while let Some(chunk_result) = byte_stream.next().await {
                let bytes = match chunk_result {
                    Ok(b) => b,
                    Err(e) => {
                        let _ = tx
                            .send(Err(BackendError::StreamInterrupted(e.to_string())))
                            .await;
                        return;
                    }
                };

                for data in lines.push(&String::from_utf8_lossy(&bytes)) {
                    if data == "[DONE]" {
                        return;
                    }

                    let value: serde_json::Value = match serde_json::from_str(&data) {
                        Ok(v) => v,
                        Err(e) => {
                            let _ = tx
                                .send(Err(BackendError::InvalidEvent(format!("{e}: {data}"))))
                                .await;
                            return;
                        }
                    };

                    match serde_json::from_value::<BackendEvent>(value) {
                        Ok(event) => {
                            if tx.send(Ok(event)).await.is_err() {
                                return; // receiver dropped
                            }
                        }
                        Err(e) => {
                            trace!(data = %data, error = %e, "Ignoring unknown backend event");
                        }
                    }
                }
            }

            // stream closed without [DONE]
            let _ = tx
                .send(Err(BackendError::StreamInterrupted(
                    "stream ended before [DONE]".into(),
                )))
                .await;
        });

        Ok(rx)
    }

    async fn workspace_files(
        &self,
        session_id: &str,
    ) -> std::result::Result<Vec<WorkspaceFile>, BackendError> {
        let api_key = self.api_key()?;
        let url = format!("{}/sessions/{session_id}/files", self.base_url);
        let response = self
            .client
            .get(&url)
            .header("Authorization", format!("Bearer {api_key}"))
            .send()
            .await
            .map_err(|e| BackendError::Network(e.to_string()))?;

        check_status(response)
            .await?
            .json::<Vec<WorkspaceFile>>()
            .await
            .map_err(|e| BackendError::InvalidEvent(format!("Failed to parse files: {e}")))
    }

    async fn health_check(&self) -> std::result::Result<bool, BackendError> {
        if self.api_key.is_none() {
            return Ok(false);
        }
        let url = format!("{}/health", self.base_url);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| BackendError::Network(e.to_string()))?;
        Ok(response.status().is_success())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::Router;
    use axum::http::{HeaderMap, StatusCode, header};
    use axum::response::IntoResponse;
    use axum::routing::{get, post};

    async fn spawn_runtime() -> String {
        async fn authorized(headers: &HeaderMap) -> bool {
            headers
                .get(header::AUTHORIZATION)
                .and_then(|v| v.to_str().ok())
                == Some("Bearer sk-test")
        }

        let app = Router::new()
            .route(
                "/invoke",
                post(|headers: HeaderMap, body: String| async move {
                    if !authorized(&headers).await {
                        return (StatusCode::UNAUTHORIZED, String::new()).into_response();
                    }
                    let request: serde_json::Value = serde_json::from_str(&body).unwrap();
                    let last = request["messages"][0]["content"].as_str().unwrap_or_default();
                    axum::Json(serde_json::json!({
                        "content": format!("echo: {last} ({})", request["session_id"].as_str().unwrap_or_default()),
                        "usage": {"input_tokens": 3, "output_tokens": 2},
                    }))
                    .into_response()
                }),
            )
            .route(
                "/stream",
                post(|| async {
                    let body = concat!(
                        ": keep-alive\n\n",
                        "data: {\"type\":\"message_delta\",\"text\":\"Hel\"}\n\n",
                        "data: {\"type\":\"future_event\",\"x\":1}\n\n",
                        "data: {\"type\":\"message_delta\",\"text\":\"lo\"}\n\n",
                        "data: {\"type\":\"interrupt\",\"tool\":\"shell\",\"input\":{},\"reason\":\"r\"}\n\n",
                        "data: [DONE]\n\n",
                    );
                    ([(header::CONTENT_TYPE, "text/event-stream")], body)
                }),
            )
            .route(
                "/sessions/{id}/files",
                get(|| async { axum::Json(vec![WorkspaceFile::new("a/b.md", "# hi")]) }),
            );

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}")
    }

    fn backend(base_url: &str, key: Option<&str>) -> LiveBackend {
        LiveBackend::new(base_url, key.map(String::from), Duration::from_secs(5)).unwrap()
    }

    #[test]
    fn sse_buffer_handles_split_lines() {
        let mut buf = SseLineBuffer::default();
        assert!(buf.push("data: {\"a\"").is_empty());
        assert_eq!(buf.push(":1}\r\n\n: comment\ndata:[DONE]\n"), vec![
            "{\"a\":1}".to_string(),
            "[DONE]".to_string()
        ]);
    }

    #[test]
    fn debug_redacts_key() {
        let b = backend("http://localhost:1/", Some("sk-secret"));
        let debug = format!("{b:?}");
        assert!(!debug.contains("sk-secret"));
        assert!(debug.contains("http://localhost:1\""));
    }

    #[tokio::test]
    async fn missing_key_is_not_configured() {
        let b = backend("http://127.0.0.1:9", None);
        let err = b
            .invoke(vec![Message::user("hi")], BackendConfig::new("s1", "m"))
            .await
            .unwrap_err();
        assert!(matches!(err, BackendError::NotConfigured(_)));

        let err = b
            .stream_events(vec![Message::user("hi")], BackendConfig::new("s1", "m"))
            .await
            .unwrap_err();
        assert!(matches!(err, BackendError::NotConfigured(_)));
        assert!(!b.health_check().await.unwrap());
    }

    #[tokio::test]
    async fn invoke_against_runtime() {
        let url = spawn_runtime().await;
        let reply = backend(&url, Some("sk-test"))
            .invoke(vec![Message::user("ping")], BackendConfig::new("s42", "m"))
            .await
            .unwrap();
        assert_eq!(reply.content, "echo: ping (s42)");
        assert_eq!(reply.usage.unwrap().total(), 5);
    }

    #[tokio::test]
    async fn wrong_key_is_api_error() {
        let url = spawn_runtime().await;
        let err = backend(&url, Some("sk-wrong"))
            .invoke(vec![Message::user("ping")], BackendConfig::new("s1", "m"))
            .await
            .unwrap_err();
        assert!(matches!(err, BackendError::Api { status_code: 401, .. }));
    }

    #[tokio::test]
    async fn stream_parses_events_and_skips_unknown() {
        let url = spawn_runtime().await;
        let mut rx = backend(&url, Some("sk-test"))
            .stream_events(vec![Message::user("hi")], BackendConfig::new("s1", "m"))
            .await
            .unwrap();

        let mut events = Vec::new();
        while let Some(event) = rx.recv().await {
            events.push(event.unwrap());
        }
        assert_eq!(events.len(), 3);
        assert_eq!(events[0], BackendEvent::MessageDelta { text: "Hel".into() });
        assert!(matches!(&events[2], BackendEvent::Interrupt { tool, .. } if tool == "shell"));
    }

    #[tokio::test]
    async fn workspace_files_from_runtime() {
        let url = spawn_runtime().await;
        let files = backend(&url, Some("sk-test")).workspace_files("s1").await.unwrap();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].name, "b.md");
    }
}
