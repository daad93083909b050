// Text extraction module
// Turns PDF, plain-text and markdown documents into raw text for embedding

#[cfg(test)]
mod tests;

use pulldown_cmark::{Event, Parser, Tag, TagEnd};
use std::path::Path;
use tracing::debug;

use crate::{RagError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentKind {
    Pdf,
    Text,
    Markdown,
}

impl DocumentKind {
    /// Classify by file extension, case-insensitively
    #[inline]
    pub fn from_extension(extension: &str) -> Option<Self> {
        match extension.to_ascii_lowercase().as_str() {
            "pdf" => Some(Self::Pdf),
            "txt" => Some(Self::Text),
            "md" | "markdown" => Some(Self::Markdown),
            _ => None,
        }
    }

    #[inline]
    pub fn from_path(path: &Path) -> Option<Self> {
        path.extension()
            .and_then(|ext| ext.to_str())
            .and_then(Self::from_extension)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedText {
    pub text: String,
    /// Page count for paginated formats
    pub pages: Option<usize>,
}

/// Extract the text of `bytes`, choosing the format from `filename`'s extension
#[inline]
pub fn extract_text(filename: &str, bytes: &[u8]) -> Result<ExtractedText> {
    let kind = DocumentKind::from_path(Path::new(filename)).ok_or_else(|| {
        RagError::Extraction(format!("Unsupported document type: {}", filename))
    })?;

    match kind {
        DocumentKind::Pdf => extract_pdf(bytes),
        DocumentKind::Text => Ok(ExtractedText {
            text: decode_utf8(bytes)?,
            pages: None,
        }),
        DocumentKind::Markdown => Ok(ExtractedText {
            text: markdown_to_text(&decode_utf8(bytes)?),
            pages: None,
        }),
    }
}

/// Concatenate the text of every page in page order.
///
/// A page whose text cannot be extracted (scanned images, unsupported fonts)
/// contributes nothing; only an unreadable document is an error.
#[inline]
pub fn extract_pdf(bytes: &[u8]) -> Result<ExtractedText> {
    let document = lopdf::Document::load_mem(bytes)
        .map_err(|e| RagError::Extraction(format!("Unreadable PDF: {}", e)))?;

    let pages = document.get_pages();
    let mut text = String::new();

    for &page_number in pages.keys() {
        match document.extract_text(&[page_number]) {
            Ok(page_text) => text.push_str(&page_text),
            Err(e) => debug!("No extractable text on page {}: {}", page_number, e),
        }
    }

    debug!(
        "Extracted {} characters from {} PDF pages",
        text.len(),
        pages.len()
    );

    Ok(ExtractedText {
        text,
        pages: Some(pages.len()),
    })
}

fn decode_utf8(bytes: &[u8]) -> Result<String> {
    let bytes = bytes.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(bytes);
    String::from_utf8(bytes.to_vec())
        .map_err(|e| RagError::Extraction(format!("Document is not valid UTF-8: {}", e)))
}

/// Render markdown as plain text, one block per line
#[inline]
pub fn markdown_to_text(markdown: &str) -> String {
    let mut out = String::with_capacity(markdown.len());

    for event in Parser::new(markdown) {
        match event {
            Event::Text(text) | Event::Code(text) => out.push_str(&text),
            Event::SoftBreak => out.push(' '),
            Event::HardBreak => out.push('\n'),
            Event::Start(Tag::Item | Tag::List(_)) => end_line(&mut out),
            Event::End(
                TagEnd::Paragraph
                | TagEnd::Heading(_)
                | TagEnd::Item
                | TagEnd::CodeBlock
                | TagEnd::TableRow
                | TagEnd::TableHead,
            ) => end_line(&mut out),
            Event::End(TagEnd::TableCell) => out.push('\t'),
            _ => {}
        }
    }

    out.trim_end().to_string()
}

fn end_line(out: &mut String) {
    while out.ends_with([' ', '\t']) {
        out.pop();
    }
    if !out.is_empty() && !out.ends_with('\n') {
        out.push('\n');
    }
}
