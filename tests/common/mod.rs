// Shared fixtures for integration tests

#![allow(dead_code)]

use coursebot::providers::{
    ChatMessage, ChatModel, ChatRequest, CompletionStream, Embedder, Embedding,
};
use coursebot::{RagError, Result};
use lopdf::content::{Content, Operation};
use lopdf::{Document, Object, Stream, dictionary};
use std::path::Path;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

pub fn init_test_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter("debug")
        .with_test_writer()
        .try_init()
        .ok();
}

/// A single-page PDF showing `text` in Courier
pub fn build_pdf(text: &str) -> Vec<u8> {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Courier",
    });
    let resources_id = doc.add_object(dictionary! {
        "Font" => dictionary! { "F1" => font_id },
    });
    let content = Content {
        operations: vec![
            Operation::new("BT", vec![]),
            Operation::new("Tf", vec!["F1".into(), 12.into()]),
            Operation::new("Td", vec![72.into(), 720.into()]),
            Operation::new("Tj", vec![Object::string_literal(text)]),
            Operation::new("ET", vec![]),
        ],
    };
    let content_id = doc.add_object(Stream::new(
        dictionary! {},
        content.encode().expect("content should encode"),
    ));
    let page_id = doc.add_object(dictionary! {
        "Type" => "Page",
        "Parent" => pages_id,
        "Resources" => resources_id,
        "Contents" => content_id,
    });
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => vec![page_id.into()],
            "Count" => 1,
            "MediaBox" => vec![0.into(), 0.into(), 595.into(), 842.into()],
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    let mut bytes = Vec::new();
    doc.save_to(&mut bytes).expect("pdf should save");
    bytes
}

pub fn write_pdf(dir: &Path, filename: &str, text: &str) {
    std::fs::write(dir.join(filename), build_pdf(text)).expect("pdf should be written");
}

const VOCABULARY: [&str; 8] = [
    "sky", "blue", "grass", "green", "color", "mining", "text", "data",
];

/// Deterministic bag-of-words embedder over a small vocabulary
#[derive(Default)]
pub struct BagOfWordsEmbedder {
    calls: AtomicUsize,
}

impl BagOfWordsEmbedder {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Embedder for BagOfWordsEmbedder {
    fn embed(&self, text: &str) -> Result<Embedding> {
        if text.trim().is_empty() {
            return Err(RagError::Embedding("Cannot embed empty text".to_string()));
        }
        self.calls.fetch_add(1, Ordering::SeqCst);
        let lower = text.to_lowercase();
        Ok(VOCABULARY
            .iter()
            .map(|word| lower.matches(word).count() as f32 + 0.01)
            .collect())
    }
}

/// Streams a fixed reply, optionally failing after it, and records requests
pub struct ScriptedChat {
    reply: Vec<&'static str>,
    fail: bool,
    requests: Mutex<Vec<Vec<ChatMessage>>>,
}

impl ScriptedChat {
    pub fn replying(reply: &[&'static str]) -> Self {
        Self {
            reply: reply.to_vec(),
            fail: false,
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn failing_after(reply: &[&'static str]) -> Self {
        Self {
            fail: true,
            ..Self::replying(reply)
        }
    }

    pub fn requests(&self) -> Vec<Vec<ChatMessage>> {
        self.requests.lock().expect("lock").clone()
    }
}

impl ChatModel for ScriptedChat {
    fn stream_chat(&self, request: &ChatRequest<'_>) -> Result<CompletionStream> {
        self.requests
            .lock()
            .expect("lock")
            .push(request.messages.to_vec());
        let mut items: Vec<Result<String>> =
            self.reply.iter().map(|f| Ok((*f).to_string())).collect();
        if self.fail {
            items.push(Err(RagError::Completion(
                "Stream closed before the final message".to_string(),
            )));
        }
        Ok(Box::new(items.into_iter()))
    }
}
