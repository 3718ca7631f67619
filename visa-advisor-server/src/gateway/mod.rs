//! Model gateway: the seam between the HTTP layer and the hosted LLM.
//!
//! Two operations are exposed through [`ModelGateway`]:
//! - [`ModelGateway::edit_prompt`] – one call, full text returned at once.
//! - [`ModelGateway::stream_chat`] – a [`ChatStream`] of [`ChatEvent`]s fed by
//!   a producer task over a bounded channel.  The stream always ends with
//!   exactly one terminal event ([`ChatEvent::Done`] or [`ChatEvent::Error`]).
//!
//! Timeouts, retries and backoff are explicit ([`CallProfile`]) rather than
//! inherited from whatever HTTP client sits underneath.

pub mod anthropic;
pub mod sse;

pub use anthropic::AnthropicGateway;

use std::time::Duration;

use async_trait::async_trait;
use futures::Stream;
use secrecy::SecretBox;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::mpsc;
use utoipa::ToSchema;
use validator::Validate;

/// System message for the edit operation, sent verbatim.
pub const EDIT_META_PROMPT: &str = "あなたはシステムプロンプトの編集者です。
ユーザーの指示に従って、以下のシステムプロンプトを修正してください。

ルール:
- 指示された箇所のみを変更し、それ以外は一切変更しない
- フォーマット（Markdown記法、インデント、改行）を維持する
- 修正後のシステムプロンプト全文のみを出力する（説明や前置きは不要）
- ```markdown 等のコードブロックで囲まない";

/// User message for the edit operation: current document plus instruction.
pub fn edit_request_message(current_prompt: &str, instruction: &str) -> String {
    format!("## 現在のシステムプロンプト\n\n{current_prompt}\n\n---\n\n## 編集指示\n\n{instruction}")
}

// ── Conversation types ────────────────────────────────────────────────────────

/// Author of a chat message.  The system prompt is passed separately, so
/// only the two conversational roles exist here.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema, strum::Display,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// A single message in the conversation history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate, ToSchema)]
pub struct ChatMessage {
    /// `"user"` or `"assistant"`.
    pub role: Role,
    /// Message text, 1 to 50 000 characters.
    #[validate(length(min = 1, max = 50000))]
    pub content: String,
}

// ── Streaming ─────────────────────────────────────────────────────────────────

/// One item of a chat stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatEvent {
    /// A text fragment, in arrival order.
    Fragment(String),
    /// The provider finished cleanly.
    Done,
    /// The stream failed; carries a human-readable message.
    Error(String),
}

impl ChatEvent {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, ChatEvent::Fragment(_))
    }
}

/// Producer half of a chat stream.
///
/// The terminal methods consume the sink, so a producer cannot emit anything
/// after `done` or `fail`.
#[derive(Debug)]
pub struct ChatSink {
    tx: mpsc::Sender<ChatEvent>,
}

impl ChatSink {
    /// Forward a fragment.  Returns `false` once the consumer has gone away,
    /// which is the producer's cue to stop.
    pub async fn fragment(&self, text: String) -> bool {
        self.tx.send(ChatEvent::Fragment(text)).await.is_ok()
    }

    pub async fn done(self) {
        let _ = self.tx.send(ChatEvent::Done).await;
    }

    pub async fn fail(self, message: impl Into<String>) {
        let _ = self.tx.send(ChatEvent::Error(message.into())).await;
    }
}

/// Consumer half of a chat stream.
///
/// Guarantees at most one terminal event and nothing after it.  If the
/// producer vanishes without a terminal event, an [`ChatEvent::Error`] is
/// synthesized.  Dropping the stream cancels the producer.
#[derive(Debug)]
pub struct ChatStream {
    rx: mpsc::Receiver<ChatEvent>,
    finished: bool,
}

impl ChatStream {
    pub fn channel(capacity: usize) -> (ChatSink, ChatStream) {
        let (tx, rx) = mpsc::channel(capacity);
        (ChatSink { tx }, ChatStream { rx, finished: false })
    }

    pub async fn next(&mut self) -> Option<ChatEvent> {
        if self.finished {
            return None;
        }
        let event = match self.rx.recv().await {
            Some(event) => event,
            None => ChatEvent::Error("stream ended unexpectedly".to_owned()),
        };
        if event.is_terminal() {
            self.finished = true;
            self.rx.close();
        }
        Some(event)
    }

    pub fn into_stream(self) -> impl Stream<Item = ChatEvent> + Send + 'static {
        futures::stream::unfold(self, |mut stream| async move {
            stream.next().await.map(|event| (event, stream))
        })
    }
}

// ── Errors ────────────────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum GatewayError {
    /// No API credential configured.
    #[error("ANTHROPIC_API_KEY is not set")]
    Configuration,

    /// Transport failure: connect, timeout, body read.
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The provider answered with a non-success status.
    #[error("provider returned {status}: {message}")]
    Provider { status: u16, message: String },

    /// The provider reported an error inside an open stream.
    #[error("provider stream error: {0}")]
    Stream(String),

    /// The provider's response could not be understood.
    #[error("malformed provider response: {0}")]
    Protocol(String),
}

impl GatewayError {
    /// Whether establishing the request again may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            GatewayError::Http(e) => e.is_connect() || e.is_timeout(),
            GatewayError::Provider { status, .. } => {
                matches!(status, 408 | 409 | 429) || (500..=599).contains(status)
            }
            _ => false,
        }
    }
}

// ── Settings ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct TimeoutProfile {
    pub connect: Duration,
    /// Maximum gap between two reads of the response body.
    pub read: Duration,
    pub pool_idle: Duration,
}

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Extra attempts after the first one.
    pub max_retries: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl RetryPolicy {
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            initial_backoff: Duration::ZERO,
            max_backoff: Duration::ZERO,
        }
    }

    /// Delay before retry number `attempt` (0-based), doubling each time.
    pub fn backoff(&self, attempt: u32) -> Duration {
        self.initial_backoff
            .saturating_mul(2u32.saturating_pow(attempt))
            .min(self.max_backoff)
    }
}

/// Timeout, retry and output budget for one kind of call.
#[derive(Debug, Clone)]
pub struct CallProfile {
    pub timeouts: TimeoutProfile,
    pub retry: RetryPolicy,
    pub max_tokens: u32,
}

impl CallProfile {
    /// Interactive chat: short read timeout, a couple of connection retries.
    pub fn chat() -> Self {
        Self {
            timeouts: TimeoutProfile {
                connect: Duration::from_secs(5),
                read: Duration::from_secs(60),
                pool_idle: Duration::from_secs(10),
            },
            retry: RetryPolicy {
                max_retries: 2,
                initial_backoff: Duration::from_millis(500),
                max_backoff: Duration::from_secs(8),
            },
            max_tokens: 1500,
        }
    }

    /// Prompt rewrite: long read timeout, never retried (a retry could apply
    /// the edit twice).
    pub fn edit() -> Self {
        Self {
            timeouts: TimeoutProfile {
                connect: Duration::from_secs(5),
                read: Duration::from_secs(300),
                pool_idle: Duration::from_secs(10),
            },
            retry: RetryPolicy::none(),
            max_tokens: 16000,
        }
    }
}

#[derive(Debug)]
pub struct GatewaySettings {
    pub api_key: Option<SecretBox<String>>,
    pub base_url: String,
    pub model: String,
    pub chat: CallProfile,
    pub edit: CallProfile,
}

// ── Trait ─────────────────────────────────────────────────────────────────────

#[async_trait]
pub trait ModelGateway: Send + Sync + 'static {
    /// Rewrite `current_prompt` according to `instruction`, returning the
    /// model's full output unmodified.
    async fn edit_prompt(
        &self,
        current_prompt: &str,
        instruction: &str,
    ) -> Result<String, GatewayError>;

    /// Start a chat completion.  Only configuration problems are reported as
    /// `Err`; everything that goes wrong once the stream exists arrives as a
    /// terminal [`ChatEvent::Error`].
    async fn stream_chat(
        &self,
        system_prompt: String,
        messages: Vec<ChatMessage>,
    ) -> Result<ChatStream, GatewayError>;
}

// ── Tests ──────────────────────────────────────────────────────────────────────
