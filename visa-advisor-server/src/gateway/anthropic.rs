//! Anthropic Messages API implementation of [`ModelGateway`].
//!
//! Both operations use the streaming endpoint.  `edit_prompt` drains the
//! stream into one string before returning, since long rewrites can exceed
//! what the provider allows for non-streaming requests.

use std::collections::VecDeque;

use bytes::Bytes;
use futures::StreamExt;
use futures::stream::BoxStream;
use reqwest::{Client, Response};
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};
use tracing::{Instrument, debug, error, info, warn};

use super::sse::SseDecoder;
use super::{
    ChatMessage, ChatSink, ChatStream, EDIT_META_PROMPT, GatewayError, GatewaySettings,
    ModelGateway, RetryPolicy, Role, TimeoutProfile, edit_request_message,
};

const MESSAGES_PATH: &str = "/v1/messages";
const API_VERSION: &str = "2023-06-01";
const CHAT_CHANNEL_CAPACITY: usize = 64;

/// Anthropic-backed gateway.  Holds one HTTP client per timeout profile.
pub struct AnthropicGateway {
    settings: GatewaySettings,
    chat_client: Client,
    edit_client: Client,
}

impl std::fmt::Debug for AnthropicGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnthropicGateway")
            .field("base_url", &self.settings.base_url)
            .field("model", &self.settings.model)
            .finish_non_exhaustive()
    }
}

impl AnthropicGateway {
    pub fn new(settings: GatewaySettings) -> Result<Self, GatewayError> {
        let chat_client = build_client(&settings.chat.timeouts)?;
        let edit_client = build_client(&settings.edit.timeouts)?;
        Ok(Self {
            settings,
            chat_client,
            edit_client,
        })
    }

    fn connection(&self, client: &Client) -> Result<Connection, GatewayError> {
        let api_key = self
            .settings
            .api_key
            .as_ref()
            .map(|k| k.expose_secret().to_owned())
            .ok_or(GatewayError::Configuration)?;
        Ok(Connection {
            client: client.clone(),
            url: format!(
                "{}{}",
                self.settings.base_url.trim_end_matches('/'),
                MESSAGES_PATH
            ),
            api_key,
        })
    }
}

fn build_client(timeouts: &TimeoutProfile) -> Result<Client, GatewayError> {
    Ok(Client::builder()
        .user_agent(concat!("visa-advisor-server/", env!("CARGO_PKG_VERSION")))
        .connect_timeout(timeouts.connect)
        .read_timeout(timeouts.read)
        .pool_idle_timeout(timeouts.pool_idle)
        .build()?)
}

#[async_trait::async_trait]
impl ModelGateway for AnthropicGateway {
    async fn edit_prompt(
        &self,
        current_prompt: &str,
        instruction: &str,
    ) -> Result<String, GatewayError> {
        let conn = self.connection(&self.edit_client)?;
        let request = MessagesRequest {
            model: self.settings.model.clone(),
            max_tokens: self.settings.edit.max_tokens,
            system: EDIT_META_PROMPT.to_owned(),
            messages: vec![ChatMessage {
                role: Role::User,
                content: edit_request_message(current_prompt, instruction),
            }],
            stream: true,
        };

        let response = conn.open(&request, &self.settings.edit.retry).await?;
        let mut reader = EventReader::new(response);
        let mut revised = String::new();
        while let Some(text) = reader.next_text().await? {
            revised.push_str(&text);
        }
        debug!(chars = revised.chars().count(), "edit response received");
        Ok(revised)
    }

    async fn stream_chat(
        &self,
        system_prompt: String,
        messages: Vec<ChatMessage>,
    ) -> Result<ChatStream, GatewayError> {
        let conn = self.connection(&self.chat_client)?;
        let request = MessagesRequest {
            model: self.settings.model.clone(),
            max_tokens: self.settings.chat.max_tokens,
            system: system_prompt,
            messages,
            stream: true,
        };
        let retry = self.settings.chat.retry.clone();

        let (sink, stream) = ChatStream::channel(CHAT_CHANNEL_CAPACITY);
        tokio::spawn(relay_chat(conn, request, retry, sink).in_current_span());
        Ok(stream)
    }
}

/// Producer task: opens the provider stream and forwards text fragments.
async fn relay_chat(
    conn: Connection,
    request: MessagesRequest,
    retry: RetryPolicy,
    sink: ChatSink,
) {
    let response = match conn.open(&request, &retry).await {
        Ok(response) => response,
        Err(e) => {
            error!(error = %e, messages = request.messages.len(), "failed to open chat stream");
            sink.fail(e.to_string()).await;
            return;
        }
    };

    let mut reader = EventReader::new(response);
    let mut fragments = 0usize;
    loop {
        match reader.next_text().await {
            Ok(Some(text)) => {
                fragments += 1;
                if !sink.fragment(text).await {
                    info!(fragments, "client went away; chat stream abandoned");
                    return;
                }
            }
            Ok(None) => {
                info!(fragments, "chat streaming completed");
                sink.done().await;
                return;
            }
            Err(e) => {
                error!(fragments, error = %e, "chat streaming failed");
                sink.fail(e.to_string()).await;
                return;
            }
        }
    }
}

// ── Wire types ─────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct MessagesRequest {
    model: String,
    max_tokens: u32,
    system: String,
    messages: Vec<ChatMessage>,
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct StreamMessage {
    #[serde(rename = "type")]
    event_type: String,
    delta: Option<StreamDelta>,
    error: Option<ProviderError>,
}

#[derive(Debug, Deserialize)]
struct StreamDelta {
    #[serde(rename = "type")]
    delta_type: Option<String>,
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ProviderError {
    #[serde(rename = "type")]
    error_type: Option<String>,
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ProviderError,
}

impl ProviderError {
    fn describe(&self) -> String {
        match (&self.error_type, &self.message) {
            (Some(t), Some(m)) => format!("{t}: {m}"),
            (None, Some(m)) => m.clone(),
            (Some(t), None) => t.clone(),
            (None, None) => "unknown provider error".to_owned(),
        }
    }
}

/// Pull the human-readable message out of an error response body.
fn provider_error_message(body: &str) -> String {
    match serde_json::from_str::<ErrorEnvelope>(body) {
        Ok(envelope) => envelope.error.describe(),
        Err(_) if body.trim().is_empty() => "empty response body".to_owned(),
        Err(_) => body.trim().to_owned(),
    }
}

enum StreamItem {
    Text(String),
    Stop,
    Ignore,
}

fn decode_event(payload: &str) -> Result<StreamItem, GatewayError> {
    if payload == "[DONE]" {
        return Ok(StreamItem::Stop);
    }
    let message: StreamMessage = serde_json::from_str(payload)
        .map_err(|e| GatewayError::Protocol(format!("invalid stream event: {e}")))?;

    match message.event_type.as_str() {
        "content_block_delta" => match message.delta {
            Some(StreamDelta {
                delta_type: Some(ref kind),
                text: Some(text),
            }) if kind == "text_delta" && !text.is_empty() => Ok(StreamItem::Text(text)),
            _ => Ok(StreamItem::Ignore),
        },
        "message_stop" => Ok(StreamItem::Stop),
        "error" => Err(GatewayError::Stream(
            message
                .error
                .map(|e| e.describe())
                .unwrap_or_else(|| "unknown provider error".to_owned()),
        )),
        _ => Ok(StreamItem::Ignore),
    }
}

// ── Connection ────────────────────────────────────────────────────────────────

#[derive(Clone)]
struct Connection {
    client: Client,
    url: String,
    api_key: String,
}

impl Connection {
    /// Send the request, retrying transient failures per `retry`.  Only the
    /// establishment of the response is retried, never a body in progress.
    async fn open(
        &self,
        request: &MessagesRequest,
        retry: &RetryPolicy,
    ) -> Result<Response, GatewayError> {
        let mut attempt = 0;
        loop {
            match self.send_once(request).await {
                Ok(response) => return Ok(response),
                Err(e) if e.is_transient() && attempt < retry.max_retries => {
                    let delay = retry.backoff(attempt);
                    attempt += 1;
                    warn!(
                        attempt,
                        max_retries = retry.max_retries,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "provider request failed; retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn send_once(&self, request: &MessagesRequest) -> Result<Response, GatewayError> {
        let response = self
            .client
            .post(&self.url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", API_VERSION)
            .json(request)
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(GatewayError::Provider {
            status: status.as_u16(),
            message: provider_error_message(&body),
        })
    }
}

/// Turns a streaming response body into text fragments.
struct EventReader {
    body: BoxStream<'static, reqwest::Result<Bytes>>,
    decoder: SseDecoder,
    pending: VecDeque<String>,
    ended: bool,
}

impl EventReader {
    fn new(response: Response) -> Self {
        Self {
            body: response.bytes_stream().boxed(),
            decoder: SseDecoder::new(),
            pending: VecDeque::new(),
            ended: false,
        }
    }

    /// Next text fragment; `Ok(None)` once the message is complete.
    async fn next_text(&mut self) -> Result<Option<String>, GatewayError> {
        loop {
            if let Some(payload) = self.pending.pop_front() {
                match decode_event(&payload)? {
                    StreamItem::Text(text) => return Ok(Some(text)),
                    StreamItem::Stop => {
                        self.pending.clear();
                        self.ended = true;
                        return Ok(None);
                    }
                    StreamItem::Ignore => continue,
                }
            }
            if self.ended {
                return Ok(None);
            }
            match self.body.next().await {
                Some(Ok(chunk)) => self.pending.extend(self.decoder.push(&chunk)),
                Some(Err(e)) => return Err(GatewayError::Http(e)),
                None => {
                    self.ended = true;
                    self.pending.extend(self.decoder.finish());
                }
            }
        }
    }
}

// ── Tests ──────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod test {
    use super::*;
    use crate::gateway::{CallProfile, ChatEvent};
    use axum::extract::State;
    use axum::http::{StatusCode, header};
    use axum::response::IntoResponse;
    use axum::routing::post;
    use axum::{Json, Router};
    use secrecy::SecretBox;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// Scripted stand-in for the provider's `/v1/messages` endpoint.
    #[derive(Clone)]
    struct FakeProvider {
        /// Responses served in order; the last one repeats.
        script: Arc<Vec<(StatusCode, String)>>,
        hits: Arc<AtomicUsize>,
        last_body: Arc<tokio::sync::Mutex<Option<serde_json::Value>>>,
    }

    async fn messages(
        State(fake): State<FakeProvider>,
        headers: axum::http::HeaderMap,
        Json(body): Json<serde_json::Value>,
    ) -> impl IntoResponse {
        assert_eq!(headers["x-api-key"], "test-key");
        assert_eq!(headers["anthropic-version"], API_VERSION);
        *fake.last_body.lock().await = Some(body);
        let n = fake.hits.fetch_add(1, Ordering::SeqCst);
        let (status, body) = fake.script[n.min(fake.script.len() - 1)].clone();
        (status, [(header::CONTENT_TYPE, "text/event-stream")], body)
    }

    async fn spawn_provider(script: Vec<(StatusCode, String)>) -> (String, FakeProvider) {
        let fake = FakeProvider {
            script: Arc::new(script),
            hits: Arc::new(AtomicUsize::new(0)),
            last_body: Arc::new(tokio::sync::Mutex::new(None)),
        };
        let app = Router::new()
            .route("/v1/messages", post(messages))
            .with_state(fake.clone());
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        (format!("http://{addr}"), fake)
    }

    fn fast_retry(max_retries: u32) -> RetryPolicy {
        RetryPolicy {
            max_retries,
            initial_backoff: Duration::from_millis(1),
            max_backoff: Duration::from_millis(5),
        }
    }

    fn gateway(base_url: &str, api_key: Option<&str>, chat_retries: u32) -> AnthropicGateway {
        let mut chat = CallProfile::chat();
        chat.retry = fast_retry(chat_retries);
        AnthropicGateway::new(GatewaySettings {
            api_key: api_key.map(|k| SecretBox::new(Box::new(k.to_owned()))),
            base_url: base_url.to_owned(),
            model: "test-model".to_owned(),
            chat,
            edit: CallProfile::edit(),
        })
        .unwrap()
    }

    fn sse(events: &[&str]) -> String {
        events
            .iter()
            .map(|e| format!("event: x\ndata: {e}\n\n"))
            .collect()
    }

    fn delta(text: &str) -> String {
        serde_json::json!({
            "type": "content_block_delta",
            "index": 0,
            "delta": { "type": "text_delta", "text": text }
        })
        .to_string()
    }

    const MESSAGE_START: &str = r#"{"type":"message_start","message":{"id":"msg_1"}}"#;
    const PING: &str = r#"{"type":"ping"}"#;
    const MESSAGE_STOP: &str = r#"{"type":"message_stop"}"#;

    async fn collect(stream: ChatStream) -> Vec<ChatEvent> {
        stream.into_stream().collect().await
    }

    fn user(content: &str) -> Vec<ChatMessage> {
        vec![ChatMessage { role: Role::User, content: content.to_owned() }]
    }

    #[test]
    fn error_message_is_extracted_from_envelope() {
        let body = r#"{"type":"error","error":{"type":"rate_limit_error","message":"slow down"}}"#;
        assert_eq!(provider_error_message(body), "rate_limit_error: slow down");
        assert_eq!(provider_error_message("  gateway timeout \n"), "gateway timeout");
        assert_eq!(provider_error_message(""), "empty response body");
    }

    #[test]
    fn decode_ignores_non_text_events() {
        assert!(matches!(decode_event(PING), Ok(StreamItem::Ignore)));
        assert!(matches!(decode_event(MESSAGE_START), Ok(StreamItem::Ignore)));
        assert!(matches!(decode_event(MESSAGE_STOP), Ok(StreamItem::Stop)));
        assert!(matches!(decode_event(delta("hi").as_str()), Ok(StreamItem::Text(t)) if t == "hi"));
        assert!(matches!(decode_event("not json"), Err(GatewayError::Protocol(_))));
    }

    #[tokio::test]
    async fn missing_api_key_is_a_configuration_error() {
        let gw = gateway("http://127.0.0.1:9", None, 0);
        assert!(matches!(
            gw.stream_chat("sys".into(), user("hi")).await,
            Err(GatewayError::Configuration)
        ));
        assert!(matches!(
            gw.edit_prompt("prompt", "instruction").await,
            Err(GatewayError::Configuration)
        ));
    }

    #[tokio::test]
    async fn chat_relays_fragments_then_done() {
        let body = sse(&[
            MESSAGE_START,
            PING,
            delta("こん").as_str(),
            delta("にちは").as_str(),
            MESSAGE_STOP,
        ]);
        let (url, fake) = spawn_provider(vec![(StatusCode::OK, body)]).await;
        let gw = gateway(&url, Some("test-key"), 0);

        let stream = gw.stream_chat("You advise on visas.".into(), user("hi")).await.unwrap();
        assert_eq!(
            collect(stream).await,
            vec![
                ChatEvent::Fragment("こん".into()),
                ChatEvent::Fragment("にちは".into()),
                ChatEvent::Done
            ]
        );

        let sent = fake.last_body.lock().await.clone().unwrap();
        assert_eq!(sent["model"], "test-model");
        assert_eq!(sent["system"], "You advise on visas.");
        assert_eq!(sent["stream"], true);
        assert_eq!(sent["max_tokens"], 1500);
        assert_eq!(sent["messages"][0]["role"], "user");
    }

    #[tokio::test]
    async fn chat_retries_transient_failures_before_streaming() {
        let overloaded =
            r#"{"type":"error","error":{"type":"overloaded_error","message":"Overloaded"}}"#;
        let ok = sse(&[delta("ok").as_str(), MESSAGE_STOP]);
        let (url, fake) = spawn_provider(vec![
            (StatusCode::SERVICE_UNAVAILABLE, overloaded.to_owned()),
            (StatusCode::OK, ok),
        ])
        .await;
        let gw = gateway(&url, Some("test-key"), 2);

        let events = collect(gw.stream_chat("sys".into(), user("hi")).await.unwrap()).await;
        assert_eq!(events, vec![ChatEvent::Fragment("ok".into()), ChatEvent::Done]);
        assert_eq!(fake.hits.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn chat_gives_up_after_max_retries() {
        let (url, fake) =
            spawn_provider(vec![(StatusCode::INTERNAL_SERVER_ERROR, "boom".to_owned())]).await;
        let gw = gateway(&url, Some("test-key"), 2);

        let events = collect(gw.stream_chat("sys".into(), user("hi")).await.unwrap()).await;
        assert_eq!(events.len(), 1);
        match &events[0] {
            ChatEvent::Error(msg) => assert!(msg.contains("boom"), "{msg}"),
            other => panic!("expected error, got {other:?}"),
        }
        assert_eq!(fake.hits.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn chat_does_not_retry_client_errors() {
        let invalid =
            r#"{"type":"error","error":{"type":"invalid_request_error","message":"bad"}}"#;
        let (url, fake) = spawn_provider(vec![(StatusCode::BAD_REQUEST, invalid.to_owned())]).await;
        let gw = gateway(&url, Some("test-key"), 2);

        let events = collect(gw.stream_chat("sys".into(), user("hi")).await.unwrap()).await;
        assert!(matches!(
            &events[..],
            [ChatEvent::Error(m)] if m.contains("invalid_request_error")
        ));
        assert_eq!(fake.hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn mid_stream_error_ends_with_error_event() {
        let failure =
            r#"{"type":"error","error":{"type":"overloaded_error","message":"Overloaded"}}"#;
        let body = sse(&[delta("partial").as_str(), failure, delta("never").as_str()]);
        let (url, _) = spawn_provider(vec![(StatusCode::OK, body)]).await;
        let gw = gateway(&url, Some("test-key"), 2);

        let events = collect(gw.stream_chat("sys".into(), user("hi")).await.unwrap()).await;
        assert_eq!(events.len(), 2);
        assert_eq!(events[0], ChatEvent::Fragment("partial".into()));
        assert!(matches!(&events[1], ChatEvent::Error(m) if m.contains("Overloaded")));
    }

    #[tokio::test]
    async fn edit_collects_full_text_with_meta_prompt() {
        let body = sse(&[
            MESSAGE_START,
            delta("# Revised\n").as_str(),
            delta("body").as_str(),
            MESSAGE_STOP,
        ]);
        let (url, fake) = spawn_provider(vec![(StatusCode::OK, body)]).await;
        let gw = gateway(&url, Some("test-key"), 0);

        let revised = gw.edit_prompt("# Original", "make it shorter").await.unwrap();
        assert_eq!(revised, "# Revised\nbody");

        let sent = fake.last_body.lock().await.clone().unwrap();
        assert_eq!(sent["system"], EDIT_META_PROMPT);
        assert_eq!(sent["max_tokens"], 16000);
        let content = sent["messages"][0]["content"].as_str().unwrap();
        assert!(content.contains("# Original"));
        assert!(content.contains("make it shorter"));
    }

    #[tokio::test]
    async fn edit_is_not_retried() {
        let (url, fake) =
            spawn_provider(vec![(StatusCode::SERVICE_UNAVAILABLE, "busy".to_owned())]).await;
        let gw = gateway(&url, Some("test-key"), 2);

        let err = gw.edit_prompt("p", "i").await.unwrap_err();
        assert!(matches!(err, GatewayError::Provider { status: 503, .. }));
        assert_eq!(fake.hits.load(Ordering::SeqCst), 1);
    }
}
