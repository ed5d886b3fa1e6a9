//! Quiz attempt state machine.
//!
//! A `QuizSession` drives one attempt at a skill quiz: it fetches the question
//! sequence, records at most one answer per question, scores by exact text
//! comparison against the keyed option, and on completion yields the
//! `ScoreSubmission` that path resolution consumes.

use crate::{
    backend::{LearnerContext, SkillBackend},
    error::BackendError,
    models::{Question, ScoreSubmission},
};
use std::sync::Arc;
use tracing::{error, info, warn};

/// One attempt over a fixed question sequence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuizAttempt {
    skill: String,
    questions: Vec<Question>,
    index: usize,
    score: u32,
    selected: Option<String>,
    completed: bool,
}

impl QuizAttempt {
    fn new(skill: String, questions: Vec<Question>) -> Self {
        Self {
            skill,
            questions,
            index: 0,
            score: 0,
            selected: None,
            completed: false,
        }
    }

    pub fn skill(&self) -> &str {
        &self.skill
    }

    pub fn questions(&self) -> &[Question] {
        &self.questions
    }

    /// Zero-based position of the active question.
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn len(&self) -> usize {
        self.questions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.questions.is_empty()
    }

    pub fn score(&self) -> u32 {
        self.score
    }

    pub fn selected(&self) -> Option<&str> {
        self.selected.as_deref()
    }

    pub fn is_completed(&self) -> bool {
        self.completed
    }

    /// The question awaiting an answer, or `None` once completed.
    pub fn current(&self) -> Option<&Question> {
        if self.completed {
            return None;
        }
        self.questions.get(self.index)
    }

    /// Whether the active question is the last one.
    pub fn is_last(&self) -> bool {
        self.index + 1 >= self.questions.len()
    }
}

/// Where a session stands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QuizState {
    /// No quiz has been requested.
    Idle,
    /// The fetch failed or returned nothing; there is no quiz to show.
    NoQuestions { skill: String, reason: String },
    /// An attempt is underway or finished.
    Active(QuizAttempt),
}

/// Result of `select_answer`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Selection {
    Correct,
    Incorrect,
    /// An answer was already recorded for this question; nothing changed.
    AlreadyAnswered,
    /// The option index does not name one of the four options.
    UnknownOption,
    /// No question is awaiting an answer.
    Inactive,
}

/// Result of `advance`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Advance {
    /// Moved on to the question at `index`.
    Next { index: usize },
    /// The last question was answered; the score is final.
    Completed(ScoreSubmission),
    /// The active question has no recorded answer yet; nothing changed.
    NoSelection,
    /// No question is awaiting an answer.
    Inactive,
}

/// Drives a single quiz screen.
pub struct QuizSession {
    backend: Arc<dyn SkillBackend>,
    learner: LearnerContext,
    state: QuizState,
}

impl QuizSession {
    pub fn new(backend: Arc<dyn SkillBackend>, learner: LearnerContext) -> Self {
        Self {
            backend,
            learner,
            state: QuizState::Idle,
        }
    }

    pub fn state(&self) -> &QuizState {
        &self.state
    }

    pub fn attempt(&self) -> Option<&QuizAttempt> {
        match &self.state {
            QuizState::Active(attempt) => Some(attempt),
            _ => None,
        }
    }

    /// Fetches the questions for `skill`, replacing any previous attempt.
    ///
    /// Any failure leaves the session in `QuizState::NoQuestions`; the previous
    /// attempt is discarded before the request is issued.
    pub async fn load(&mut self, skill: &str) -> &QuizState {
        let skill = skill.trim().to_string();
        if skill.is_empty() {
            self.state = QuizState::NoQuestions {
                skill,
                reason: "a skill name is required".to_string(),
            };
            return &self.state;
        }

        self.state = match self.backend.fetch_questions(&self.learner, &skill).await {
            Ok(questions) if questions.is_empty() => {
                warn!(%skill, "Backend returned no questions");
                QuizState::NoQuestions {
                    skill,
                    reason: "the quiz has no questions".to_string(),
                }
            }
            Ok(questions) => {
                info!(%skill, count = questions.len(), "Quiz loaded");
                QuizState::Active(QuizAttempt::new(skill, questions))
            }
            Err(e) => {
                match &e {
                    BackendError::Malformed { .. } => {
                        error!(%skill, error = %e, "Quiz payload is malformed")
                    }
                    _ => warn!(%skill, error = %e, "Failed to fetch quiz"),
                }
                QuizState::NoQuestions {
                    skill,
                    reason: e.to_string(),
                }
            }
        };
        &self.state
    }

    /// Records an answer for the active question.
    ///
    /// Only the first call per question has any effect; the score rises by one
    /// when `choice` equals the text of the keyed correct option.
    pub fn select_answer(&mut self, choice: &str) -> Selection {
        let QuizState::Active(attempt) = &mut self.state else {
            return Selection::Inactive;
        };
        let Some(question) = attempt.current() else {
            return Selection::Inactive;
        };
        if attempt.selected.is_some() {
            return Selection::AlreadyAnswered;
        }

        let correct = question.is_correct(choice);
        attempt.selected = Some(choice.to_string());
        if correct {
            attempt.score += 1;
            Selection::Correct
        } else {
            Selection::Incorrect
        }
    }

    /// Selects an option by its zero-based display position.
    pub fn select_option(&mut self, position: usize) -> Selection {
        let choice = match self.attempt().and_then(QuizAttempt::current) {
            Some(question) => match question.options().get(position) {
                Some(text) => text.to_string(),
                None => return Selection::UnknownOption,
            },
            None => return Selection::Inactive,
        };
        self.select_answer(&choice)
    }

    /// Moves past the active question once it has been answered.
    pub fn advance(&mut self) -> Advance {
        let QuizState::Active(attempt) = &mut self.state else {
            return Advance::Inactive;
        };
        if attempt.completed {
            return Advance::Inactive;
        }
        if attempt.selected.is_none() {
            return Advance::NoSelection;
        }

        if attempt.index + 1 < attempt.questions.len() {
            attempt.index += 1;
            attempt.selected = None;
            Advance::Next {
                index: attempt.index,
            }
        } else {
            attempt.completed = true;
            info!(skill = %attempt.skill, score = attempt.score, total = attempt.questions.len(), "Quiz completed");
            Advance::Completed(ScoreSubmission {
                score: attempt.score,
                skill: attempt.skill.clone(),
            })
        }
    }

    /// The final `(score, skill)` pair, available only once completed.
    pub fn submission(&self) -> Option<ScoreSubmission> {
        self.attempt()
            .filter(|a| a.completed)
            .map(|a| ScoreSubmission {
                score: a.score,
                skill: a.skill.clone(),
            })
    }
}
