//! Wire and Domain Models
//!
//! Payload shapes exchanged with the SkillPath backend. Field names follow the
//! backend's JSON so every type deserializes directly from a response body.
//! Required fields are never defaulted: a missing field is a malformed payload.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

/// Names which of a question's four option fields holds the correct answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AnswerKey {
    #[serde(rename = "option1")]
    Option1,
    #[serde(rename = "option2")]
    Option2,
    #[serde(rename = "option3")]
    Option3,
    #[serde(rename = "option4")]
    Option4,
}

impl AnswerKey {
    /// All keys in display order.
    pub const ALL: [AnswerKey; 4] = [
        AnswerKey::Option1,
        AnswerKey::Option2,
        AnswerKey::Option3,
        AnswerKey::Option4,
    ];

    /// Zero-based display position of the option this key names.
    pub fn position(self) -> usize {
        match self {
            AnswerKey::Option1 => 0,
            AnswerKey::Option2 => 1,
            AnswerKey::Option3 => 2,
            AnswerKey::Option4 => 3,
        }
    }
}

/// A single multiple-choice quiz question.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Question {
    /// The prompt shown to the learner.
    pub question: String,
    pub option1: String,
    pub option2: String,
    pub option3: String,
    pub option4: String,
    /// The option field holding the correct answer (not the answer text).
    pub answer: AnswerKey,
}

impl Question {
    /// The four option texts in display order.
    pub fn options(&self) -> [&str; 4] {
        [&self.option1, &self.option2, &self.option3, &self.option4]
    }

    /// Resolves an option field to its text.
    pub fn option(&self, key: AnswerKey) -> &str {
        self.options()[key.position()]
    }

    /// The text of the correct option, resolved through the answer key.
    pub fn correct_answer(&self) -> &str {
        self.option(self.answer)
    }

    /// Exact comparison of a chosen option text against the correct text.
    pub fn is_correct(&self, choice: &str) -> bool {
        choice == self.correct_answer()
    }
}

/// One stage of a learning path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Topic {
    pub name: String,
    pub description: String,
    /// Resource links in display order.
    pub resources: Vec<String>,
}

/// An ordered curriculum for one skill at one proficiency level.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LearningPath {
    pub skill: String,
    pub level: String,
    pub topics: Vec<Topic>,
}

/// Completion record for a single path topic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepProgress {
    pub id: i64,
    pub step_name: String,
    pub completed: bool,
    #[serde(default, deserialize_with = "deserialize_optional_timestamp")]
    pub completed_at: Option<DateTime<Utc>>,
}

/// Response body of both the existing-path lookup and the score submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PathEnvelope {
    pub message: String,
    pub skill: Option<String>,
    pub level: String,
    pub learning_path: LearningPath,
    /// Progress records; only present on paths fetched after creation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub steps: Option<Vec<StepProgress>>,
    /// Pass flag reported alongside a fresh submission.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub passed: Option<bool>,
}

impl PathEnvelope {
    /// The skill the path covers, preferring the curriculum's own label.
    pub fn skill_name(&self) -> &str {
        if self.learning_path.skill.is_empty() {
            self.skill.as_deref().unwrap_or_default()
        } else {
            &self.learning_path.skill
        }
    }
}

/// The sole hand-off from a finished quiz to path resolution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoreSubmission {
    pub score: u32,
    pub skill: String,
}

/// A past quiz attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuizResult {
    pub id: i64,
    pub user_id: i64,
    pub username: String,
    pub skill_id: i64,
    pub skill_name: Option<String>,
    pub level: String,
    pub score: u32,
    pub passed: bool,
    #[serde(deserialize_with = "deserialize_timestamp")]
    pub taken_at: DateTime<Utc>,
}

/// A learner's quiz history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuizHistory {
    pub user_id: i64,
    pub username: String,
    pub total_results: usize,
    pub results: Vec<QuizResult>,
}

/// Generic `{ "message": ... }` acknowledgement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageResponse {
    pub message: String,
    /// Follow-up prompt sent when a skill is completed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct LoginPayload<'a> {
    pub email: &'a str,
    pub password: &'a str,
}

#[derive(Debug, Clone, Serialize)]
pub struct RegisterPayload<'a> {
    pub username: &'a str,
    pub email: &'a str,
    pub password: &'a str,
}

/// Error body shape; the backend uses either key.
#[derive(Debug, Clone, Default, Deserialize)]
pub(crate) struct ErrorBody {
    pub message: Option<String>,
    pub error: Option<String>,
}

impl ErrorBody {
    pub(crate) fn into_message(self) -> Option<String> {
        self.message.or(self.error)
    }
}

// The backend emits naive ISO-8601 timestamps (no offset) that are UTC by
// convention; RFC 3339 input is accepted too.
fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, String> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Ok(dt.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
        .map(|naive| naive.and_utc())
        .map_err(|e| format!("invalid timestamp '{}': {}", raw, e))
}

fn deserialize_timestamp<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    parse_timestamp(&raw).map_err(serde::de::Error::custom)
}

fn deserialize_optional_timestamp<'de, D>(
    deserializer: D,
) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<String>::deserialize(deserializer)?;
    raw.map(|s| parse_timestamp(&s).map_err(serde::de::Error::custom))
        .transpose()
}
