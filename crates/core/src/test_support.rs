//! Hand-driven backend fake for ordering and race tests.
//!
//! Responses are released by the test through channels, so the test decides
//! exactly when each in-flight call completes.

use crate::{
    backend::{ChatStream, LearnerContext, SkillBackend},
    error::{BackendError, Result},
    models::{LearningPath, MessageResponse, PathEnvelope, Question, QuizHistory, ScoreSubmission, Topic},
};
use async_trait::async_trait;
use futures::stream;
use reqwest::StatusCode;
use std::{
    collections::{HashMap, VecDeque},
    sync::{
        Arc, Mutex,
        atomic::{AtomicUsize, Ordering},
    },
};
use tokio::sync::{mpsc, oneshot};

pub(crate) fn envelope(skill: &str, level: &str) -> PathEnvelope {
    PathEnvelope {
        message: "Quiz submitted and new learning path generated".to_string(),
        skill: Some(skill.to_lowercase()),
        level: level.to_string(),
        learning_path: LearningPath {
            skill: skill.to_string(),
            level: level.to_string(),
            topics: vec![Topic {
                name: format!("{} fundamentals", skill),
                description: "Start here".to_string(),
                resources: vec!["https://docs.example/intro".to_string()],
            }],
        },
        steps: None,
        passed: None,
    }
}

pub(crate) fn ack(message: &str) -> MessageResponse {
    MessageResponse {
        message: message.to_string(),
        next: None,
    }
}

pub(crate) fn status(code: StatusCode, message: &str) -> BackendError {
    BackendError::Status {
        status: code,
        message: message.to_string(),
    }
}

/// Decrements the open-stream counter when the stream is dropped.
struct OpenGuard(Arc<AtomicUsize>);

impl Drop for OpenGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[derive(Default)]
pub(crate) struct GatedBackend {
    existing: Mutex<VecDeque<oneshot::Receiver<Result<PathEnvelope>>>>,
    submits: Mutex<HashMap<String, oneshot::Receiver<Result<PathEnvelope>>>>,
    feeds: Mutex<VecDeque<mpsc::Receiver<Result<String>>>>,
    completions: Mutex<VecDeque<oneshot::Receiver<Result<MessageResponse>>>>,
    pub open_streams: Arc<AtomicUsize>,
    pub max_open_streams: Arc<AtomicUsize>,
    pub opened_messages: Mutex<Vec<String>>,
}

impl GatedBackend {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Queues the response for the next existing-path lookup.
    pub(crate) fn gate_existing(&self) -> oneshot::Sender<Result<PathEnvelope>> {
        let (tx, rx) = oneshot::channel();
        self.existing.lock().unwrap().push_back(rx);
        tx
    }

    /// Holds the submission for `skill` until the returned sender fires.
    pub(crate) fn gate_submit(&self, skill: &str) -> oneshot::Sender<Result<PathEnvelope>> {
        let (tx, rx) = oneshot::channel();
        self.submits.lock().unwrap().insert(skill.to_string(), rx);
        tx
    }

    /// Holds the next step or skill completion until the returned sender fires.
    pub(crate) fn gate_completion(&self) -> oneshot::Sender<Result<MessageResponse>> {
        let (tx, rx) = oneshot::channel();
        self.completions.lock().unwrap().push_back(rx);
        tx
    }

    async fn next_completion(&self) -> Result<MessageResponse> {
        let gate = self.completions.lock().unwrap().pop_front();
        match gate {
            Some(rx) => rx
                .await
                .unwrap_or_else(|_| Err(BackendError::Stream("gate dropped".to_string()))),
            None => unused(),
        }
    }

    /// Queues the feed for the next opened chat stream.
    pub(crate) fn queue_feed(&self) -> mpsc::Sender<Result<String>> {
        let (tx, rx) = mpsc::channel(16);
        self.feeds.lock().unwrap().push_back(rx);
        tx
    }

    pub(crate) fn open_count(&self) -> usize {
        self.open_streams.load(Ordering::SeqCst)
    }

    pub(crate) fn max_open(&self) -> usize {
        self.max_open_streams.load(Ordering::SeqCst)
    }
}

fn unused<T>() -> Result<T> {
    Err(BackendError::Stream("not exercised by this fake".to_string()))
}

#[async_trait]
impl SkillBackend for GatedBackend {
    async fn login(&self, _email: &str, _password: &str) -> Result<LearnerContext> {
        unused()
    }

    async fn register(&self, _u: &str, _e: &str, _p: &str) -> Result<MessageResponse> {
        unused()
    }

    async fn logout(&self, _learner: &LearnerContext) -> Result<MessageResponse> {
        unused()
    }

    async fn fetch_questions(&self, _l: &LearnerContext, _skill: &str) -> Result<Vec<Question>> {
        unused()
    }

    async fn fetch_existing_path(&self, _learner: &LearnerContext) -> Result<PathEnvelope> {
        let gate = self.existing.lock().unwrap().pop_front();
        match gate {
            Some(rx) => rx
                .await
                .unwrap_or_else(|_| Err(BackendError::Stream("gate dropped".to_string()))),
            None => Err(status(StatusCode::NOT_FOUND, "No active learning path found")),
        }
    }

    async fn submit_score(
        &self,
        _learner: &LearnerContext,
        submission: &ScoreSubmission,
    ) -> Result<PathEnvelope> {
        let gate = self.submits.lock().unwrap().remove(&submission.skill);
        match gate {
            Some(rx) => rx
                .await
                .unwrap_or_else(|_| Err(BackendError::Stream("gate dropped".to_string()))),
            None => Ok(envelope(&submission.skill, "Beginner")),
        }
    }

    async fn fetch_quiz_history(&self, _learner: &LearnerContext) -> Result<QuizHistory> {
        unused()
    }

    async fn complete_step(&self, _l: &LearnerContext, _id: i64) -> Result<MessageResponse> {
        self.next_completion().await
    }

    async fn complete_skill(&self, _l: &LearnerContext, _id: i64) -> Result<MessageResponse> {
        self.next_completion().await
    }

    async fn open_chat_stream(&self, _learner: &LearnerContext, message: &str) -> Result<ChatStream> {
        self.opened_messages.lock().unwrap().push(message.to_string());
        let feed = self.feeds.lock().unwrap().pop_front();
        let Some(rx) = feed else {
            return Err(status(StatusCode::SERVICE_UNAVAILABLE, "no feed queued"));
        };

        let now_open = self.open_streams.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_open_streams.fetch_max(now_open, Ordering::SeqCst);
        let guard = OpenGuard(self.open_streams.clone());

        Ok(Box::pin(stream::unfold((rx, guard), |(mut rx, guard)| async move {
            rx.recv().await.map(|item| (item, (rx, guard)))
        })))
    }
}
