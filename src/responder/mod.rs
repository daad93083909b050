// Retrieval-augmented responder module
// Grounds each user question in the closest course documents before asking the model

#[cfg(test)]
mod tests;

use itertools::Itertools;
use tracing::{debug, info};

use crate::config::{Config, DEFAULT_TOP_K};
use crate::index::{ScoredEntry, VectorIndex};
use crate::providers::{ChatModel, ChatRequest, Embedder, Providers};
use crate::session::{Session, TurnStream};
use crate::{RagError, Result};

/// What was retrieved for one question and the instruction built from it
#[derive(Debug, Clone, PartialEq)]
pub struct RetrievedContext {
    /// Closest entries, nearest first
    pub hits: Vec<ScoredEntry>,
    /// Raw text of the hits joined in similarity order
    pub context_text: String,
    /// The grounded instruction sent as the newest user message
    pub prompt: String,
}

impl RetrievedContext {
    #[inline]
    pub fn sources(&self) -> impl Iterator<Item = &str> {
        self.hits.iter().map(|hit| hit.entry.id.as_str())
    }
}

pub struct GroundedAnswer<'s> {
    pub context: RetrievedContext,
    pub stream: TurnStream<'s>,
}

/// The grounded instruction for `query` over `context`
#[inline]
pub fn build_grounded_prompt(context: &str, query: &str) -> String {
    format!(
        "Answer the question using only the course material below. \
         If the material does not contain enough information to answer, \
         say that you don't know instead of guessing.\n\n\
         Course material:\n{}\n\n\
         Question: {}",
        context, query
    )
}

pub struct Responder<'a> {
    embedder: &'a dyn Embedder,
    chat: &'a dyn ChatModel,
    index: &'a VectorIndex,
    model: String,
    top_k: usize,
    system_prompt: Option<String>,
}

impl<'a> Responder<'a> {
    #[inline]
    pub fn new(
        embedder: &'a dyn Embedder,
        chat: &'a dyn ChatModel,
        index: &'a VectorIndex,
        model: impl Into<String>,
    ) -> Self {
        Self {
            embedder,
            chat,
            index,
            model: model.into(),
            top_k: DEFAULT_TOP_K,
            system_prompt: None,
        }
    }

    #[inline]
    pub fn from_config(providers: &'a Providers, index: &'a VectorIndex, config: &Config) -> Self {
        Self::new(
            providers.embedder(),
            providers.chat(),
            index,
            config.provider.chat_model.clone(),
        )
        .with_top_k(config.index.top_k)
        .with_system_prompt(config.chat.system_prompt.clone())
    }

    #[inline]
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    #[inline]
    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k;
        self
    }

    #[inline]
    pub fn with_system_prompt(mut self, system_prompt: Option<String>) -> Self {
        self.system_prompt = system_prompt;
        self
    }

    #[inline]
    pub fn top_k(&self) -> usize {
        self.top_k
    }

    /// Embed `query` and collect the closest documents into a grounded prompt
    #[inline]
    pub fn retrieve(&self, query: &str) -> Result<RetrievedContext> {
        if query.trim().is_empty() {
            return Err(RagError::Setup("Question must not be empty".to_string()));
        }
        if self.index.is_empty() {
            return Err(RagError::Setup(
                "The document index is empty; ingest documents first".to_string(),
            ));
        }

        let embedding = self.embedder.embed(query)?;
        let hits = self.index.query(&embedding, self.top_k)?;
        debug!(
            "Retrieved {} documents: {}",
            hits.len(),
            hits.iter()
                .map(|hit| format!("{} ({:.3})", hit.entry.id, hit.distance))
                .join(", ")
        );

        let context_text = hits.iter().map(|hit| hit.entry.raw_text.as_str()).join("\n\n");
        let prompt = build_grounded_prompt(&context_text, query);

        Ok(RetrievedContext {
            hits,
            context_text,
            prompt,
        })
    }

    /// Answer `query` from the indexed documents, streaming the completion.
    ///
    /// The session gains the query and the answer only once the returned
    /// stream has been drained; any failure leaves it as it was.
    #[inline]
    pub fn respond<'s>(&self, session: &'s mut Session, query: &str) -> Result<GroundedAnswer<'s>> {
        let context = self.retrieve(query)?;

        let messages = session.messages_for(self.system_prompt.as_deref(), &context.prompt);
        info!(
            session = %session.id(),
            "Asking {} with {} documents and {} history turns",
            self.model,
            context.hits.len(),
            session.history().len()
        );
        let stream = self.chat.stream_chat(&ChatRequest {
            model: &self.model,
            messages: &messages,
        })?;

        Ok(GroundedAnswer {
            context,
            stream: session.begin_turn(query, stream),
        })
    }
}

/// Chat without retrieval: the user's message goes to the model as typed
pub struct PlainChat<'a> {
    chat: &'a dyn ChatModel,
    model: String,
    system_prompt: Option<String>,
}

impl<'a> PlainChat<'a> {
    #[inline]
    pub fn new(chat: &'a dyn ChatModel, model: impl Into<String>) -> Self {
        Self {
            chat,
            model: model.into(),
            system_prompt: None,
        }
    }

    #[inline]
    pub fn with_system_prompt(mut self, system_prompt: Option<String>) -> Self {
        self.system_prompt = system_prompt;
        self
    }

    #[inline]
    pub fn respond<'s>(&self, session: &'s mut Session, message: &str) -> Result<TurnStream<'s>> {
        if message.trim().is_empty() {
            return Err(RagError::Setup("Message must not be empty".to_string()));
        }

        let messages = session.messages_for(self.system_prompt.as_deref(), message);
        debug!(session = %session.id(), "Sending plain chat turn to {}", self.model);
        let stream = self.chat.stream_chat(&ChatRequest {
            model: &self.model,
            messages: &messages,
        })?;

        Ok(session.begin_turn(message, stream))
    }
}
