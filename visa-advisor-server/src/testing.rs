//! Test doubles shared by the router tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::Router;

use crate::config::Config;
use crate::gateway::{ChatEvent, ChatMessage, ChatStream, GatewayError, ModelGateway};
use crate::routes;
use crate::state::AppState;
use crate::store::{MemoryBackend, PromptStore};

/// A [`ModelGateway`] that replays a fixed script.
pub struct ScriptedGateway {
    /// Events emitted by `stream_chat`, in order.  A script without a
    /// terminal event models a producer that dies mid-stream.
    pub chat_events: Vec<ChatEvent>,
    /// `Ok` text or the provider error message for `edit_prompt`.
    pub edit_reply: Result<String, String>,
    /// `false` simulates a missing API key.
    pub configured: bool,
    pub chat_calls: AtomicUsize,
    pub edit_calls: AtomicUsize,
    pub last_chat: Mutex<Option<(String, Vec<ChatMessage>)>>,
    pub last_edit: Mutex<Option<(String, String)>>,
}

impl Default for ScriptedGateway {
    fn default() -> Self {
        Self {
            chat_events: vec![ChatEvent::Done],
            edit_reply: Ok(String::new()),
            configured: true,
            chat_calls: AtomicUsize::new(0),
            edit_calls: AtomicUsize::new(0),
            last_chat: Mutex::new(None),
            last_edit: Mutex::new(None),
        }
    }
}

impl ScriptedGateway {
    pub fn chatting(events: Vec<ChatEvent>) -> Self {
        Self {
            chat_events: events,
            ..Self::default()
        }
    }

    pub fn editing(reply: Result<&str, &str>) -> Self {
        Self {
            edit_reply: reply.map(str::to_owned).map_err(str::to_owned),
            ..Self::default()
        }
    }

    pub fn unconfigured() -> Self {
        Self {
            configured: false,
            ..Self::default()
        }
    }

    pub fn calls(&self) -> usize {
        self.chat_calls.load(Ordering::SeqCst) + self.edit_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ModelGateway for ScriptedGateway {
    async fn edit_prompt(
        &self,
        current_prompt: &str,
        instruction: &str,
    ) -> Result<String, GatewayError> {
        if !self.configured {
            return Err(GatewayError::Configuration);
        }
        self.edit_calls.fetch_add(1, Ordering::SeqCst);
        *self.last_edit.lock().unwrap() = Some((current_prompt.to_owned(), instruction.to_owned()));
        self.edit_reply.clone().map_err(|message| GatewayError::Provider {
            status: 529,
            message,
        })
    }

    async fn stream_chat(
        &self,
        system_prompt: String,
        messages: Vec<ChatMessage>,
    ) -> Result<ChatStream, GatewayError> {
        if !self.configured {
            return Err(GatewayError::Configuration);
        }
        self.chat_calls.fetch_add(1, Ordering::SeqCst);
        *self.last_chat.lock().unwrap() = Some((system_prompt, messages));

        let events = self.chat_events.clone();
        let (sink, stream) = ChatStream::channel(4);
        tokio::spawn(async move {
            for event in events {
                match event {
                    ChatEvent::Fragment(text) => {
                        if !sink.fragment(text).await {
                            return;
                        }
                    }
                    ChatEvent::Done => return sink.done().await,
                    ChatEvent::Error(message) => return sink.fail(message).await,
                }
            }
        });
        Ok(stream)
    }
}

/// Full application router over an in-memory prompt and a scripted gateway.
pub fn test_app(
    prompt: Option<&str>,
    gateway: ScriptedGateway,
) -> (Router, Arc<MemoryBackend>, Arc<ScriptedGateway>) {
    let backend = Arc::new(MemoryBackend::new(prompt));
    let gateway = Arc::new(gateway);
    let state = Arc::new(AppState {
        config: Arc::new(Config::default()),
        prompts: PromptStore::new(backend.clone()),
        gateway: gateway.clone(),
    });
    (routes::build(state), backend, gateway)
}
