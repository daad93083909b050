use super::*;
use crate::index::{DistanceMetric, IndexEntry, Metadata};
use crate::providers::{ChatMessage, CompletionStream, Embedding, MessageRole, ensure_embeddable};
use crate::session::ConversationTurn;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

const VOCABULARY: [&str; 3] = ["sky", "grass", "mining"];

#[derive(Default)]
struct WordCountEmbedder {
    calls: AtomicUsize,
}

impl Embedder for WordCountEmbedder {
    fn embed(&self, text: &str) -> Result<Embedding> {
        ensure_embeddable(text)?;
        self.calls.fetch_add(1, Ordering::SeqCst);
        let lower = text.to_lowercase();
        Ok(VOCABULARY
            .iter()
            .map(|word| lower.matches(word).count() as f32 + 0.01)
            .collect())
    }
}

/// Replies with fixed fragments and remembers every request
struct ScriptedChat {
    fragments: Vec<&'static str>,
    fail_after_fragments: bool,
    requests: Mutex<Vec<(String, Vec<ChatMessage>)>>,
}

impl ScriptedChat {
    fn replying(fragments: &[&'static str]) -> Self {
        Self {
            fragments: fragments.to_vec(),
            fail_after_fragments: false,
            requests: Mutex::new(Vec::new()),
        }
    }

    fn failing_after(fragments: &[&'static str]) -> Self {
        Self {
            fail_after_fragments: true,
            ..Self::replying(fragments)
        }
    }

    fn last_request(&self) -> (String, Vec<ChatMessage>) {
        self.requests
            .lock()
            .expect("lock")
            .last()
            .cloned()
            .expect("a request was sent")
    }

    fn request_count(&self) -> usize {
        self.requests.lock().expect("lock").len()
    }
}

impl ChatModel for ScriptedChat {
    fn stream_chat(&self, request: &ChatRequest<'_>) -> Result<CompletionStream> {
        self.requests
            .lock()
            .expect("lock")
            .push((request.model.to_string(), request.messages.to_vec()));

        let mut items: Vec<Result<String>> = self
            .fragments
            .iter()
            .map(|f| Ok((*f).to_string()))
            .collect();
        if self.fail_after_fragments {
            items.push(Err(RagError::Completion("stream interrupted".to_string())));
        }
        Ok(Box::new(items.into_iter()))
    }
}

async fn course_index(embedder: &WordCountEmbedder) -> VectorIndex {
    let mut index = VectorIndex::ephemeral(DistanceMetric::Cosine);
    for (id, text) in [
        ("alpha.pdf", "The sky is blue."),
        ("beta.pdf", "Grass is green."),
        ("gamma.pdf", "Text mining finds patterns."),
    ] {
        let embedding = embedder.embed(text).expect("embed");
        let mut metadata = Metadata::new();
        metadata.insert("filename".to_string(), id.to_string());
        index
            .upsert(IndexEntry::new(id, text, metadata, embedding))
            .await
            .expect("upsert");
    }
    index
}

#[test]
fn grounded_prompt_contains_context_query_and_fallback() {
    let prompt = build_grounded_prompt("The sky is blue.", "What color is the sky?");
    assert!(prompt.contains("The sky is blue."));
    assert!(prompt.contains("Question: What color is the sky?"));
    assert!(prompt.contains("don't know"));
}

#[tokio::test]
async fn respond_grounds_answer_in_closest_document() {
    let embedder = WordCountEmbedder::default();
    let chat = ScriptedChat::replying(&["The sky ", "is blue."]);
    let index = course_index(&embedder).await;
    let responder = Responder::new(&embedder, &chat, &index, "gpt-4o-mini").with_top_k(1);
    let mut session = Session::new(4);

    let GroundedAnswer { context, stream } = responder
        .respond(&mut session, "What color is the sky?")
        .expect("respond");
    assert_eq!(context.sources().collect::<Vec<_>>(), vec!["alpha.pdf"]);
    assert_eq!(context.context_text, "The sky is blue.");

    let text = stream.collect_response().expect("stream");
    assert_eq!(text, "The sky is blue.");

    let (model, messages) = chat.last_request();
    assert_eq!(model, "gpt-4o-mini");
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].role, MessageRole::User);
    assert!(messages[0].content.contains("The sky is blue."));
    assert!(messages[0].content.contains("What color is the sky?"));

    assert_eq!(
        session.history(),
        &[
            ConversationTurn::user("What color is the sky?"),
            ConversationTurn::assistant("The sky is blue."),
        ]
    );
}

#[tokio::test]
async fn context_joins_hits_in_similarity_order() {
    let embedder = WordCountEmbedder::default();
    let chat = ScriptedChat::replying(&["ok"]);
    let index = course_index(&embedder).await;
    let responder = Responder::new(&embedder, &chat, &index, "gpt-4o-mini");

    let context = responder.retrieve("grass and sky").expect("retrieve");
    assert_eq!(responder.top_k(), 3);
    assert_eq!(context.hits.len(), 3);
    assert_eq!(context.hits[2].entry.id, "gamma.pdf");
    let texts: Vec<&str> = context.hits.iter().map(|h| h.entry.raw_text.as_str()).collect();
    assert_eq!(context.context_text, texts.join("\n\n"));
    assert_eq!(chat.request_count(), 0);
}

#[tokio::test]
async fn system_prompt_and_history_precede_the_question() {
    let embedder = WordCountEmbedder::default();
    let chat = ScriptedChat::replying(&["Green."]);
    let index = course_index(&embedder).await;
    let responder = Responder::new(&embedder, &chat, &index, "gpt-4o")
        .with_system_prompt(Some("You are a course assistant.".to_string()));
    let mut session = Session::new(4);
    session.push(ConversationTurn::user("Hi"));
    session.push(ConversationTurn::assistant("Hello!"));

    responder
        .respond(&mut session, "What color is grass?")
        .expect("respond")
        .stream
        .collect_response()
        .expect("stream");

    let (_, messages) = chat.last_request();
    let roles: Vec<MessageRole> = messages.iter().map(|m| m.role).collect();
    assert_eq!(
        roles,
        vec![
            MessageRole::System,
            MessageRole::User,
            MessageRole::Assistant,
            MessageRole::User
        ]
    );
    assert_eq!(messages[1].content, "Hi");
    assert_eq!(session.history()[2].content, "What color is grass?");
}

#[tokio::test]
async fn history_window_drops_oldest_turns() {
    let embedder = WordCountEmbedder::default();
    let chat = ScriptedChat::replying(&["answer"]);
    let index = course_index(&embedder).await;
    let responder = Responder::new(&embedder, &chat, &index, "gpt-4o-mini");
    let mut session = Session::new(4);

    for question in ["sky one", "sky two", "sky three"] {
        responder
            .respond(&mut session, question)
            .expect("respond")
            .stream
            .collect_response()
            .expect("stream");
    }

    let contents: Vec<&str> = session.history().iter().map(|t| t.content.as_str()).collect();
    assert_eq!(contents, vec!["sky two", "answer", "sky three", "answer"]);
}

#[tokio::test]
async fn mid_stream_failure_leaves_session_unchanged() {
    let embedder = WordCountEmbedder::default();
    let chat = ScriptedChat::failing_after(&["The sky "]);
    let index = course_index(&embedder).await;
    let responder = Responder::new(&embedder, &chat, &index, "gpt-4o-mini");
    let mut session = Session::new(4);

    let result = responder
        .respond(&mut session, "What color is the sky?")
        .expect("respond")
        .stream
        .collect_response();
    assert!(matches!(result, Err(RagError::Completion(_))));
    assert!(session.history().is_empty());
}

#[tokio::test]
async fn empty_index_and_empty_query_are_rejected() {
    let embedder = WordCountEmbedder::default();
    let chat = ScriptedChat::replying(&["unused"]);
    let empty = VectorIndex::ephemeral(DistanceMetric::Cosine);
    let responder = Responder::new(&embedder, &chat, &empty, "gpt-4o-mini");
    let mut session = Session::new(4);

    assert!(matches!(
        responder.respond(&mut session, "What color is the sky?"),
        Err(RagError::Setup(_))
    ));

    let index = course_index(&embedder).await;
    let calls_before = embedder.calls.load(Ordering::SeqCst);
    let responder = Responder::new(&embedder, &chat, &index, "gpt-4o-mini");
    assert!(matches!(
        responder.respond(&mut session, "  "),
        Err(RagError::Setup(_))
    ));
    assert_eq!(embedder.calls.load(Ordering::SeqCst), calls_before);
    assert_eq!(chat.request_count(), 0);
    assert!(session.history().is_empty());
}

#[test]
fn plain_chat_sends_message_as_typed() {
    let chat = ScriptedChat::replying(&["How can I ", "help you?"]);
    let plain = PlainChat::new(&chat, "gpt-4o-mini");
    let mut session = Session::new(4);

    let reply = plain
        .respond(&mut session, "Hello")
        .expect("respond")
        .collect_response()
        .expect("stream");
    assert_eq!(reply, "How can I help you?");

    let (_, messages) = chat.last_request();
    assert_eq!(messages, vec![ChatMessage::user("Hello")]);
    assert_eq!(session.history().len(), 2);

    assert!(matches!(
        plain.respond(&mut session, ""),
        Err(RagError::Setup(_))
    ));
}

#[tokio::test]
async fn advanced_switch_selects_requested_model() {
    let embedder = WordCountEmbedder::default();
    let chat = ScriptedChat::replying(&["Blue."]);
    let index = course_index(&embedder).await;
    let provider = crate::config::ProviderConfig::default();
    let mut session = Session::new(4);

    Responder::new(&embedder, &chat, &index, provider.chat_model.clone())
        .with_model(provider.chat_model_for(true))
        .respond(&mut session, "What color is the sky?")
        .expect("respond")
        .stream
        .collect_response()
        .expect("stream");
    assert_eq!(chat.last_request().0, "gpt-4o");

    PlainChat::new(&chat, provider.chat_model_for(false))
        .respond(&mut session, "Thanks")
        .expect("respond")
        .collect_response()
        .expect("stream");
    assert_eq!(chat.last_request().0, "gpt-4o-mini");
}
