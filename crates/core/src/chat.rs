//! Streaming Chat Session
//!
//! A `ChatStreamSession` holds one conversation transcript and at most one
//! open assistant stream. Each user turn closes the previous stream (waiting
//! for the close to finish), appends the user message plus an empty assistant
//! slot, and spawns a single consumer task that fills that slot chunk by chunk.

use crate::backend::{LearnerContext, SkillBackend};
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::{
    sync::{Mutex, mpsc},
    task::JoinHandle,
};
use tracing::{Instrument, debug, error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub text: String,
}

impl ChatMessage {
    fn user(text: &str) -> Self {
        Self {
            role: ChatRole::User,
            text: text.to_string(),
        }
    }

    fn assistant_placeholder() -> Self {
        Self {
            role: ChatRole::Assistant,
            text: String::new(),
        }
    }
}

/// How an assistant stream ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEnd {
    /// The server closed the feed normally.
    Completed,
    /// The feed failed to open or broke off; text received so far is kept.
    Failed(String),
    /// The session closed the stream (new message or teardown).
    Closed,
}

/// Progress notifications for a renderer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatEvent {
    /// `text` was appended to the assistant message at `slot`.
    Chunk { slot: usize, text: String },
    /// The stream feeding `slot` is gone.
    Finished { slot: usize, end: StreamEnd },
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ChatError {
    #[error("Message is empty")]
    BlankMessage,
}

struct ActiveStream {
    slot: usize,
    handle: JoinHandle<()>,
}

/// One conversation with the streaming assistant.
pub struct ChatStreamSession {
    backend: Arc<dyn SkillBackend>,
    learner: LearnerContext,
    transcript: Arc<Mutex<Vec<ChatMessage>>>,
    active: Option<ActiveStream>,
    events: Option<mpsc::Sender<ChatEvent>>,
}

impl ChatStreamSession {
    pub fn new(backend: Arc<dyn SkillBackend>, learner: LearnerContext) -> Self {
        Self {
            backend,
            learner,
            transcript: Arc::new(Mutex::new(Vec::new())),
            active: None,
            events: None,
        }
    }

    /// Attaches a channel that receives every chunk and stream end.
    pub fn with_events(mut self, events: mpsc::Sender<ChatEvent>) -> Self {
        self.events = Some(events);
        self
    }

    /// A snapshot of the transcript.
    pub async fn messages(&self) -> Vec<ChatMessage> {
        self.transcript.lock().await.clone()
    }

    /// Whether a stream is currently delivering chunks.
    pub fn is_streaming(&self) -> bool {
        self.active
            .as_ref()
            .is_some_and(|active| !active.handle.is_finished())
    }

    /// Sends a user message and starts streaming the reply.
    ///
    /// Returns the transcript index of the assistant message being filled.
    pub async fn send_message(&mut self, text: &str) -> Result<usize, ChatError> {
        if text.trim().is_empty() {
            return Err(ChatError::BlankMessage);
        }

        self.close().await;

        let slot = {
            let mut transcript = self.transcript.lock().await;
            transcript.push(ChatMessage::user(text));
            transcript.push(ChatMessage::assistant_placeholder());
            transcript.len() - 1
        };

        let reply = stream_reply(
            self.backend.clone(),
            self.learner.clone(),
            text.to_string(),
            self.transcript.clone(),
            slot,
            self.events.clone(),
        );
        let handle = tokio::spawn(reply.instrument(tracing::info_span!("chat_stream", slot)));
        self.active = Some(ActiveStream { slot, handle });
        Ok(slot)
    }

    /// Waits for the current stream to end on its own.
    pub async fn wait(&mut self) {
        if let Some(active) = self.active.take() {
            if let Err(e) = active.handle.await {
                if e.is_panic() {
                    error!(slot = active.slot, "Chat stream task panicked");
                }
            }
        }
    }

    /// Closes the open stream, if any, and waits until it is fully torn down.
    ///
    /// Safe to call repeatedly.
    pub async fn close(&mut self) {
        let Some(active) = self.active.take() else {
            return;
        };
        let interrupted = !active.handle.is_finished();
        active.handle.abort();

        match active.handle.await {
            Err(e) if e.is_panic() => error!(slot = active.slot, "Chat stream task panicked"),
            _ => {}
        }

        if interrupted {
            debug!(slot = active.slot, "Closed chat stream");
            // The caller may be the event receiver itself, so never wait for capacity here.
            if let Some(events) = &self.events {
                let finished = ChatEvent::Finished {
                    slot: active.slot,
                    end: StreamEnd::Closed,
                };
                if let Err(e) = events.try_send(finished) {
                    warn!(error = %e, "Dropped stream-closed event");
                }
            }
        }
    }
}

impl Drop for ChatStreamSession {
    fn drop(&mut self) {
        if let Some(active) = self.active.take() {
            active.handle.abort();
        }
    }
}

/// Consumes one assistant stream into `transcript[slot]`.
async fn stream_reply(
    backend: Arc<dyn SkillBackend>,
    learner: LearnerContext,
    text: String,
    transcript: Arc<Mutex<Vec<ChatMessage>>>,
    slot: usize,
    mut events: Option<mpsc::Sender<ChatEvent>>,
) {
    let end = match backend.open_chat_stream(&learner, &text).await {
        Ok(mut stream) => loop {
            match stream.next().await {
                Some(Ok(chunk)) => {
                    if let Some(message) = transcript.lock().await.get_mut(slot) {
                        message.text.push_str(&chunk);
                    }
                    emit(&mut events, ChatEvent::Chunk { slot, text: chunk }).await;
                }
                Some(Err(e)) => break StreamEnd::Failed(e.to_string()),
                None => break StreamEnd::Completed,
            }
        },
        Err(e) => StreamEnd::Failed(e.to_string()),
    };

    match &end {
        StreamEnd::Failed(reason) => warn!(%reason, "Chat stream ended with an error"),
        _ => info!("Chat stream completed"),
    }
    emit(&mut events, ChatEvent::Finished { slot, end }).await;
}

async fn emit(events: &mut Option<mpsc::Sender<ChatEvent>>, event: ChatEvent) {
    if let Some(tx) = events {
        if tx.send(event).await.is_err() {
            warn!("Chat event receiver dropped; no further events will be sent");
            *events = None;
        }
    }
}
