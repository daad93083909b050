
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::io::{BufRead, BufReader};
use std::time::Duration;
use tracing::{debug, info, warn};
use url::Url;

use super::{
    ChatMessage, ChatModel, ChatRequest, CompletionStream, Embedder, Embedding, build_agent,
    build_stream_agent, check_embedding, endpoint, ensure_embeddable, service_error_message,
};
use crate::config::ProviderConfig;
use crate::{RagError, Result};

#[derive(Debug, Clone)]
pub struct OllamaClient {
    base_url: Url,
    embedding_model: String,
    agent: ureq::Agent,
    stream_agent: ureq::Agent,
}

#[derive(Debug, Serialize)]
struct EmbedRequest<'a> {
    model: &'a str,
    input: &'a str,
}

#[derive(Debug, Deserialize)]
struct EmbedResponse {
    embeddings: Vec<Vec<f32>>,
}

#[derive(Debug, Serialize)]
struct ChatRequestBody<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct ChatResponseLine {
    #[serde(default)]
    message: Option<ChatResponseMessage>,
    #[serde(default)]
    done: bool,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatResponseMessage {
    #[serde(default)]
    content: String,
}

#[derive(Debug, Deserialize)]
pub struct ModelInfo {
    pub name: String,
    pub size: Option<u64>,
    pub digest: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ModelsResponse {
    models: Vec<ModelInfo>,
}

impl OllamaClient {
    #[inline]
    pub fn new(config: &ProviderConfig) -> Result<Self> {
        Ok(Self {
            base_url: config.base_url.clone(),
            embedding_model: config.embedding_model.clone(),
            agent: build_agent(Duration::from_secs(config.timeout_seconds)),
            stream_agent: build_stream_agent(Duration::from_secs(config.timeout_seconds)),
        })
    }

    #[inline]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.agent = build_agent(timeout);
        self.stream_agent = build_stream_agent(timeout);
        self
    }

    /// Test connection to the Ollama server and verify the embedding model is pulled
    #[inline]
    pub fn health_check(&self) -> anyhow::Result<()> {
        debug!("Performing health check for Ollama at {}", self.base_url);

        let models = self.list_models().context("Server ping failed")?;

        if !models.iter().any(|m| m.name == self.embedding_model) {
            let available_models: Vec<&str> = models.iter().map(|m| m.name.as_str()).collect();
            warn!(
                "Model {} not found. Available models: {:?}",
                self.embedding_model, available_models
            );
            return Err(anyhow::anyhow!(
                "Model '{}' is not available. Available models: {:?}",
                self.embedding_model,
                available_models
            ));
        }

        info!(
            "Health check passed for Ollama server at {} with model {}",
            self.base_url, self.embedding_model
        );
        Ok(())
    }

    /// List all models available on the server
    #[inline]
    pub fn list_models(&self) -> anyhow::Result<Vec<ModelInfo>> {
        let url = endpoint(&self.base_url, "api/tags")?;
        debug!("Fetching available models from {}", url);

        let mut response = self
            .agent
            .get(url.as_str())
            .call()
            .context("Failed to fetch models")?;
        let status = response.status();
        let response_text = response
            .body_mut()
            .read_to_string()
            .context("Failed to read models response")?;

        if !status.is_success() {
            return Err(anyhow::anyhow!(
                "HTTP {}: {}",
                status.as_u16(),
                service_error_message(&response_text)
            ));
        }

        let models_response: ModelsResponse =
            serde_json::from_str(&response_text).context("Failed to parse models response")?;

        debug!("Found {} models", models_response.models.len());
        Ok(models_response.models)
    }

    fn post(
        &self,
        agent: &ureq::Agent,
        url: &Url,
        body: &str,
    ) -> std::result::Result<ureq::http::Response<ureq::Body>, ureq::Error> {
        agent
            .post(url.as_str())
            .header("Content-Type", "application/json")
            .send(body)
    }
}

impl Embedder for OllamaClient {
    fn embed(&self, text: &str) -> Result<Embedding> {
        ensure_embeddable(text)?;
        debug!("Generating embedding for text (length: {})", text.len());

        let url = endpoint(&self.base_url, "api/embed")?;
        let request_json = serde_json::to_string(&EmbedRequest {
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

        let embed_response: EmbedResponse = serde_json::from_str(&response_text)
            .map_err(|e| RagError::Embedding(format!("Failed to parse response: {}", e)))?;
        let embedding = embed_response
            .embeddings
            .into_iter()
            .next()
            .ok_or_else(|| RagError::Embedding("Response contained no embeddings".to_string()))?;

        debug!("Generated embedding with {} dimensions", embedding.len());
        check_embedding(embedding)
    }
}

impl ChatModel for OllamaClient {
    fn stream_chat(&self, request: &ChatRequest<'_>) -> Result<CompletionStream> {
        debug!(
            "Requesting streamed chat from {} with {} messages",
            request.model,
            request.messages.len()
        );

        let url = endpoint(&self.base_url, "api/chat")?;
        let request_json = serde_json::to_string(&ChatRequestBody {
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
        Ok(Box::new(NdjsonStream::new(reader)))
    }
}

/// Reader for Ollama's newline-delimited JSON chat stream; ends on `"done": true`
pub struct NdjsonStream<R> {
    reader: R,
    finished: bool,
}

impl<R: BufRead> NdjsonStream<R> {
    #[inline]
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            finished: false,
        }
    }

    fn fail(&mut self, message: String) -> Option<Result<String>> {
        self.finished = true;
        warn!("Chat stream failed: {}", message);
        Some(Err(RagError::Completion(message)))
    }
}

impl<R: BufRead> Iterator for NdjsonStream<R> {
    type Item = Result<String>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }

        let mut line = String::new();
        loop {
            line.clear();
            match self.reader.read_line(&mut line) {
                Ok(0) => return self.fail("Stream closed before the final message".to_string()),
                Ok(_) => {}
                Err(e) => return self.fail(format!("Failed to read stream: {}", e)),
            }

            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }

            let parsed: ChatResponseLine = match serde_json::from_str(trimmed) {
                Ok(parsed) => parsed,
                Err(e) => return self.fail(format!("Malformed stream line: {}", e)),
            };

            if let Some(error) = parsed.error {
                return self.fail(format!("Service reported an error: {}", error));
            }

            let content = parsed.message.map(|m| m.content).unwrap_or_default();

            if parsed.done {
                debug!("Chat stream finished");
                self.finished = true;
                // the final line may still carry text
                return if content.is_empty() {
                    None
                } else {
                    Some(Ok(content))
                };
            }

            if !content.is_empty() {
                return Some(Ok(content));
            }
        }
    }
}
