// Document summary module


use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::debug;

use crate::providers::{ChatMessage, ChatModel, ChatRequest, CompletionStream};
use crate::{RagError, Result};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum SummaryFormat {
    /// 100 words
    #[default]
    Words,
    /// 2 connecting paragraphs
    Paragraphs,
    /// 5 bullet points
    Bullets,
}

impl SummaryFormat {
    #[inline]
    pub fn instruction(self) -> &'static str {
        match self {
            Self::Words => "100 words",
            Self::Paragraphs => "2 connecting paragraphs",
            Self::Bullets => "5 bullet points",
        }
    }
}

impl fmt::Display for SummaryFormat {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.instruction())
    }
}

#[inline]
pub fn summary_prompt(document: &str, format: SummaryFormat) -> String {
    format!(
        "Here's a document: {} \n\n---\n\n Summarize the document in {}.",
        document,
        format.instruction()
    )
}

/// Stream a summary of `document` in the requested format
#[inline]
pub fn summarize(
    chat: &dyn ChatModel,
    model: &str,
    document: &str,
    format: SummaryFormat,
) -> Result<CompletionStream> {
    if document.trim().is_empty() {
        return Err(RagError::Setup("Document to summarize is empty".to_string()));
    }

    debug!(
        "Summarizing {} characters in {} with {}",
        document.len(),
        format,
        model
    );
    let messages = [ChatMessage::user(summary_prompt(document, format))];
    chat.stream_chat(&ChatRequest {
        model,
        messages: &messages,
    })
}
