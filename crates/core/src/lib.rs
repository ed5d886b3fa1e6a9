//! SkillPath Session Orchestration
//!
//! The learner-facing session layer of SkillPath: a quiz attempt state machine,
//! the learning-path resolution protocol, and a streaming chat session, all
//! talking to the backend through the `SkillBackend` adapter.

pub mod backend;
pub mod chat;
pub mod error;
pub mod models;
pub mod path;
pub mod quiz;
pub mod sse;

#[cfg(test)]
mod test_support;

pub use backend::{ChatStream, HttpBackend, LearnerContext, SkillBackend};
pub use chat::{ChatEvent, ChatMessage, ChatRole, ChatStreamSession, StreamEnd};
pub use error::BackendError;
pub use path::{PathResolver, PathState, SubmitOutcome};
pub use quiz::{Advance, QuizSession, QuizState, Selection};
