
use serde::{Deserialize, Serialize};
use std::io::{BufRead, BufReader};
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

use super::{
    ChatMessage, ChatModel, ChatRequest, CompletionStream, Embedder, Embedding, build_agent,
    build_stream_agent, check_embedding, endpoint, ensure_embeddable, service_error_message,
};
use crate::config::ProviderConfig;
use crate::{RagError, Result};

/// Client for OpenAI-compatible `/embeddings` and `/chat/completions` endpoints
#[derive(Clone)]
pub struct OpenAiClient {
    base_url: Url,
    api_key: Option<String>,
    embedding_model: String,
    agent: ureq::Agent,
    stream_agent: ureq::Agent,
}

impl std::fmt::Debug for OpenAiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiClient")
            .field("base_url", &self.base_url.as_str())
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("embedding_model", &self.embedding_model)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a str,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
}

#[derive(Debug, Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct ChatChunk {
    #[serde(default)]
    choices: Vec<ChunkChoice>,
    #[serde(default)]
    error: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct ChunkChoice {
    #[serde(default)]
    delta: ChunkDelta,
}

#[derive(Debug, Default, Deserialize)]
struct ChunkDelta {
    #[serde(default)]
    content: Option<String>,
}

impl OpenAiClient {
    #[inline]
    pub fn new(config: &ProviderConfig) -> Result<Self> {
        let api_key = config.api_key();
        if api_key.is_none() {
            warn!(
                "Environment variable {} is not set; requests will be sent without an API key",
                config.api_key_env
            );
        }

        Ok(Self {
            base_url: config.base_url.clone(),
            api_key,
            embedding_model: config.embedding_model.clone(),
            agent: build_agent(Duration::from_secs(config.timeout_seconds)),
            stream_agent: build_stream_agent(Duration::from_secs(config.timeout_seconds)),
        })
    }

    #[inline]
    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    #[inline]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.agent = build_agent(timeout);
        self.stream_agent = build_stream_agent(timeout);
        self
    }

    fn post(
        &self,
        agent: &ureq::Agent,
        url: &Url,
        body: &str,
    ) -> std::result::Result<ureq::http::Response<ureq::Body>, ureq::Error> {
        let mut request = agent
            .post(url.as_str())
            .header("Content-Type", "application/json");
        if let Some(key) = &self.api_key {
            request = request.header("Authorization", format!("Bearer {}", key));
        }
        request.send(body)
    }
}

impl Embedder for OpenAiClient {
    fn embed(&self, text: &str) -> Result<Embedding> {
        ensure_embeddable(text)?;
        debug!("Generating embedding for text (length: {})", text.len());

        let url = endpoint(&self.base_url, "embeddings")?;
        let request_json = serde_json::to_string(&EmbeddingRequest {
            model: &self.embedding_model,
            input: text,
        })
        .map_err(|e| RagError::Embedding(format!("Failed to serialize request: {}", e)))?;

        let mut response = self
            .post(&self.agent, &url, &request_json)
            .map_err(|e| RagError::Embedding(format!("Request to {} failed: {}", url, e)))?;
        let status = response.status();
        let response_text = response
            .body_mut()
            .read_to_string()
            .map_err(|e| RagError::Embedding(format!("Failed to read response: {}", e)))?;

        if !status.is_success() {
            return Err(RagError::Embedding(format!(
                "HTTP {}: {}",
                status.as_u16(),
                service_error_message(&response_text)
            )));
        }

        let parsed: EmbeddingResponse = serde_json::from_str(&response_text)
            .map_err(|e| RagError::Embedding(format!("Failed to parse response: {}", e)))?;
        let embedding = parsed
            .data
            .into_iter()
            .next()
            .map(|data| data.embedding)
            .ok_or_else(|| RagError::Embedding("Response contained no embeddings".to_string()))?;

        debug!("Generated embedding with {} dimensions", embedding.len());
        check_embedding(embedding)
    }
}

impl ChatModel for OpenAiClient {
    fn stream_chat(&self, request: &ChatRequest<'_>) -> Result<CompletionStream> {
        debug!(
            "Requesting streamed completion from {} with {} messages",
            request.model,
            request.messages.len()
        );

        let url = endpoint(&self.base_url, "chat/completions")?;
        let request_json = serde_json::to_string(&ChatCompletionRequest {
            model: request.model,
            messages: request.messages,
            stream: true,
        })
        .map_err(|e| RagError::Completion(format!("Failed to serialize request: {}", e)))?;

        let mut response = self
            .post(&self.stream_agent, &url, &request_json)
            .map_err(|e| RagError::Completion(format!("Request to {} failed: {}", url, e)))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.body_mut().read_to_string().unwrap_or_default();
            return Err(RagError::Completion(format!(
                "HTTP {}: {}",
                status,
                service_error_message(&body)
            )));
        }

        let reader = BufReader::new(response.into_body().into_reader());
        Ok(Box::new(SseStream::new(reader)))
    }
}

/// Server-sent-event reader for `chat/completions` with `stream: true`.
///
/// Yields each non-empty `delta.content`; ends on `data: [DONE]`.
pub struct SseStream<R> {
    reader: R,
    finished: bool,
}

impl<R: BufRead> SseStream<R> {
    #[inline]
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            finished: false,
        }
    }

    fn fail(&mut self, message: String) -> Option<Result<String>> {
        self.finished = true;
        warn!("Completion stream failed: {}", message);
        Some(Err(RagError::Completion(message)))
    }
}

impl<R: BufRead> Iterator for SseStream<R> {
    type Item = Result<String>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }

        let mut line = String::new();
        loop {
            line.clear();
            match self.reader.read_line(&mut line) {
                Ok(0) => {
                    return self.fail(
                        "Stream closed before the end-of-stream marker".to_string(),
                    );
                }
                Ok(_) => {}
                Err(e) => return self.fail(format!("Failed to read stream: {}", e)),
            }

            let Some(data) = line.trim().strip_prefix("data:") else {
                continue;
            };
            let data = data.trim();

            if data == "[DONE]" {
                debug!("Completion stream finished");
                self.finished = true;
                return None;
            }

            let chunk: ChatChunk = match serde_json::from_str(data) {
                Ok(chunk) => chunk,
                Err(e) => return self.fail(format!("Malformed stream event: {}", e)),
            };

            if let Some(error) = chunk.error {
                return self.fail(format!(
                    "Service reported an error: {}",
                    service_error_message(&serde_json::json!({ "error": error }).to_string())
                ));
            }

            let content: String = chunk
                .choices
                .into_iter()
                .filter_map(|choice| choice.delta.content)
                .collect();

            if !content.is_empty() {
                return Some(Ok(content));
            }
        }
    }
}
