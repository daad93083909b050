// Conversation session module
// Windowed chat history and the turn stream that commits to it


use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::Result;
use crate::config::DEFAULT_HISTORY_WINDOW;
use crate::providers::{ChatMessage, CompletionStream};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub role: Role,
    pub content: String,
}

impl ConversationTurn {
    #[inline]
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    #[inline]
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }

    #[inline]
    pub fn to_message(&self) -> ChatMessage {
        match self.role {
            Role::User => ChatMessage::user(self.content.clone()),
            Role::Assistant => ChatMessage::assistant(self.content.clone()),
        }
    }
}

/// Conversation history for one user, trimmed from the oldest end so that at
/// most `window` turns are kept
#[derive(Debug, Clone)]
pub struct Session {
    id: Uuid,
    history: Vec<ConversationTurn>,
    window: usize,
}

impl Default for Session {
    #[inline]
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_WINDOW)
    }
}

impl Session {
    #[inline]
    pub fn new(window: usize) -> Self {
        let id = Uuid::new_v4();
        debug!(session = %id, "Starting session with a window of {} turns", window);
        Self {
            id,
            history: Vec::new(),
            window,
        }
    }

    #[inline]
    pub fn id(&self) -> Uuid {
        self.id
    }

    #[inline]
    pub fn history(&self) -> &[ConversationTurn] {
        &self.history
    }

    #[inline]
    pub fn window(&self) -> usize {
        self.window
    }

    /// Append a turn, then drop the oldest turns beyond the window
    #[inline]
    pub fn push(&mut self, turn: ConversationTurn) {
        self.history.push(turn);
        let overflow = self.history.len().saturating_sub(self.window);
        if overflow > 0 {
            self.history.drain(..overflow);
            debug!(session = %self.id, "Dropped {} turns from history", overflow);
        }
    }

    #[inline]
    pub fn clear(&mut self) {
        self.history.clear();
    }

    /// Messages for a completion request: optional system prompt, the windowed
    /// history, then `user_content` as the newest user message
    #[inline]
    pub fn messages_for(&self, system_prompt: Option<&str>, user_content: &str) -> Vec<ChatMessage> {
        let mut messages = Vec::with_capacity(self.history.len() + 2);
        if let Some(prompt) = system_prompt {
            messages.push(ChatMessage::system(prompt));
        }
        messages.extend(self.history.iter().map(ConversationTurn::to_message));
        messages.push(ChatMessage::user(user_content));
        messages
    }

    /// Wrap a completion stream so that `query` and the full response are
    /// committed as a turn pair once the stream is drained
    #[inline]
    pub fn begin_turn(&mut self, query: impl Into<String>, stream: CompletionStream) -> TurnStream<'_> {
        TurnStream {
            session: self,
            query: query.into(),
            inner: stream,
            response: String::new(),
            state: TurnState::Streaming,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TurnState {
    Streaming,
    Committed,
    Failed,
}

/// Lazy, finite stream of response fragments for one turn.
///
/// Holds the session mutably for its whole lifetime. The user and assistant
/// turns are appended only when the underlying stream ends cleanly; an error
/// or an early drop leaves the history untouched.
pub struct TurnStream<'s> {
    session: &'s mut Session,
    query: String,
    inner: CompletionStream,
    response: String,
    state: TurnState,
}

impl TurnStream<'_> {
    /// Drain the stream and return the complete response
    #[inline]
    pub fn collect_response(mut self) -> Result<String> {
        for fragment in self.by_ref() {
            fragment?;
        }
        Ok(std::mem::take(&mut self.response))
    }

    /// Text received so far
    #[inline]
    pub fn response(&self) -> &str {
        &self.response
    }

    #[inline]
    pub fn is_committed(&self) -> bool {
        self.state == TurnState::Committed
    }

    fn commit(&mut self) {
        self.state = TurnState::Committed;
        let query = std::mem::take(&mut self.query);
        let response = self.response.clone();
        self.session.push(ConversationTurn::user(query));
        self.session.push(ConversationTurn::assistant(response));
        info!(
            session = %self.session.id,
            "Committed turn ({} characters), history now {} turns",
            self.response.len(),
            self.session.history.len()
        );
    }
}

impl Iterator for TurnStream<'_> {
    type Item = Result<String>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.state != TurnState::Streaming {
            return None;
        }

        match self.inner.next() {
            Some(Ok(fragment)) => {
                self.response.push_str(&fragment);
                Some(Ok(fragment))
            }
            Some(Err(e)) => {
                self.state = TurnState::Failed;
                warn!(session = %self.session.id, "Turn failed, history unchanged: {}", e);
                Some(Err(e))
            }
            None => {
                self.commit();
                None
            }
        }
    }
}

impl Drop for TurnStream<'_> {
    fn drop(&mut self) {
        if self.state == TurnState::Streaming {
            debug!(session = %self.session.id, "Turn abandoned before the end of the stream");
        }
    }
}
