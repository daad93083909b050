// Provider module
// Embedding and chat-completion clients for the hosted model services

pub mod ollama;
pub mod openai;


use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;
use url::Url;

use crate::config::{ProviderConfig, ProviderKind};
use crate::{RagError, Result};

pub use ollama::OllamaClient;
pub use openai::OpenAiClient;

/// A dense vector produced by the embedding service
pub type Embedding = Vec<f32>;

/// Lazily produced completion fragments, in arrival order.
///
/// The iterator ends (`None`) only after the service's end-of-stream marker;
/// a transport or protocol failure is yielded once as `Err` and then the
/// iterator is exhausted.
pub type CompletionStream = Box<dyn Iterator<Item = Result<String>>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: MessageRole,
    pub content: String,
}

impl ChatMessage {
    #[inline]
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::System,
            content: content.into(),
        }
    }

    #[inline]
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            content: content.into(),
        }
    }

    #[inline]
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::Assistant,
            content: content.into(),
        }
    }
}

/// A streamed chat-completion request
#[derive(Debug, Clone, Copy)]
pub struct ChatRequest<'a> {
    pub model: &'a str,
    pub messages: &'a [ChatMessage],
}

/// Turns text into a fixed-length vector. One round-trip per call.
pub trait Embedder: Send + Sync {
    fn embed(&self, text: &str) -> Result<Embedding>;
}

/// Submits chat messages and streams the completion back.
pub trait ChatModel: Send + Sync {
    fn stream_chat(&self, request: &ChatRequest<'_>) -> Result<CompletionStream>;
}

/// The embedding and completion clients for one process.
///
/// Built once from configuration and handed by reference to the ingestion
/// pipeline, the responder and the summarizer.
pub struct Providers {
    embedder: Box<dyn Embedder>,
    chat: Box<dyn ChatModel>,
}

impl Providers {
    #[inline]
    pub fn new(embedder: Box<dyn Embedder>, chat: Box<dyn ChatModel>) -> Self {
        Self { embedder, chat }
    }

    #[inline]
    pub fn from_config(config: &ProviderConfig) -> Result<Self> {
        config
            .validate()
            .map_err(|e| RagError::Config(e.to_string()))?;

        debug!(
            "Creating {} provider clients for {}",
            config.kind, config.base_url
        );

        Ok(match config.kind {
            ProviderKind::OpenAi => {
                let client = OpenAiClient::new(config)?;
                Self::new(Box::new(client.clone()), Box::new(client))
            }
            ProviderKind::Ollama => {
                let client = OllamaClient::new(config)?;
                Self::new(Box::new(client.clone()), Box::new(client))
            }
        })
    }

    #[inline]
    pub fn embedder(&self) -> &dyn Embedder {
        self.embedder.as_ref()
    }

    #[inline]
    pub fn chat(&self) -> &dyn ChatModel {
        self.chat.as_ref()
    }
}

/// Join `path` onto `base_url`, treating the base as a directory
#[inline]
pub fn endpoint(base_url: &Url, path: &str) -> Result<Url> {
    let mut base = base_url.clone();
    if !base.path().ends_with('/') {
        let with_slash = format!("{}/", base.path());
        base.set_path(&with_slash);
    }
    base.join(path)
        .map_err(|e| RagError::Config(format!("Invalid endpoint '{}': {}", path, e)))
}

/// Reject input the embedding services cannot meaningfully embed
pub(crate) fn ensure_embeddable(text: &str) -> Result<()> {
    if text.trim().is_empty() {
        return Err(RagError::Embedding(
            "Cannot embed empty or whitespace-only text".to_string(),
        ));
    }
    Ok(())
}

pub(crate) fn check_embedding(embedding: Embedding) -> Result<Embedding> {
    if embedding.is_empty() {
        return Err(RagError::Embedding(
            "Service returned an empty embedding".to_string(),
        ));
    }
    Ok(embedding)
}

/// Agent for single request/response calls; `timeout` bounds the whole call
pub(crate) fn build_agent(timeout: Duration) -> ureq::Agent {
    ureq::Agent::config_builder()
        .timeout_global(Some(timeout))
        .http_status_as_error(false)
        .build()
        .into()
}

/// Agent for streamed completions: `timeout` bounds connecting, sending and
/// waiting for the response head, never reading the body
pub(crate) fn build_stream_agent(timeout: Duration) -> ureq::Agent {
    ureq::Agent::config_builder()
        .timeout_connect(Some(timeout))
        .timeout_send_request(Some(timeout))
        .timeout_send_body(Some(timeout))
        .timeout_recv_response(Some(timeout))
        .timeout_recv_body(None)
        .http_status_as_error(false)
        .build()
        .into()
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ErrorField {
    Detailed { message: String },
    Plain(String),
}

#[derive(Deserialize)]
struct ErrorBody {
    error: ErrorField,
}

/// Pull a human-readable message out of a service error body.
///
/// Understands `{"error": {"message": ...}}` and `{"error": "..."}`; anything
/// else is returned trimmed.
pub(crate) fn service_error_message(body: &str) -> String {
    match serde_json::from_str::<ErrorBody>(body) {
        Ok(ErrorBody {
            error: ErrorField::Detailed { message } | ErrorField::Plain(message),
        }) => message,
        Err(_) => body.trim().chars().take(300).collect(),
    }
}
