//! Learning Path Resolution
//!
//! `PathResolver` owns the learner's single learning-path record for one
//! session. It first asks the backend for an existing path; a 404 there is the
//! normal "no path yet" branch, after which a finished quiz's score is
//! submitted to generate one.
//!
//! Submissions are numbered. Only the newest submission may write its result,
//! so overlapping requests settle on the last one issued regardless of the
//! order their responses arrive in.

use crate::{
    backend::{LearnerContext, SkillBackend},
    error::BackendError,
    models::{MessageResponse, PathEnvelope, ScoreSubmission},
};
use chrono::Utc;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, error, info, instrument, warn};

/// Resolution progress for one session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathState {
    /// The existing-path lookup has not completed.
    Checking,
    /// The learner has no path; waiting for a quiz score.
    NoExistingPath,
    /// A path is available. Terminal for this session.
    Resolved(PathEnvelope),
    /// Resolution failed. Terminal for this session.
    Failed(String),
}

impl PathState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, PathState::Resolved(_) | PathState::Failed(_))
    }

    pub fn path(&self) -> Option<&PathEnvelope> {
        match self {
            PathState::Resolved(envelope) => Some(envelope),
            _ => None,
        }
    }
}

/// What happened to a submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// This submission's result was written; carries the new state.
    Applied(PathState),
    /// A newer submission was issued (or the resolver was abandoned) before
    /// this one finished; its result was discarded.
    Superseded,
    /// The resolver was not accepting submissions; carries the current state.
    Rejected(PathState),
}

/// Failures of the follow-up actions on a resolved path.
#[derive(Debug, thiserror::Error)]
pub enum PathActionError {
    #[error("No learning path is resolved")]
    NoPath,
    #[error("Step {0} is not part of the current learning path")]
    UnknownStep(i64),
    #[error(transparent)]
    Backend(#[from] BackendError),
}

#[derive(Debug)]
struct ResolverInner {
    state: PathState,
    /// Number of the newest submission; bumped to invalidate in-flight work.
    generation: u64,
    in_flight: Option<u64>,
    checking: bool,
    abandoned: bool,
}

/// Resolves the learner's learning path. Cheap to clone; clones share state.
#[derive(Clone)]
pub struct PathResolver {
    backend: Arc<dyn SkillBackend>,
    learner: LearnerContext,
    inner: Arc<Mutex<ResolverInner>>,
}

impl PathResolver {
    pub fn new(backend: Arc<dyn SkillBackend>, learner: LearnerContext) -> Self {
        Self {
            backend,
            learner,
            inner: Arc::new(Mutex::new(ResolverInner {
                state: PathState::Checking,
                generation: 0,
                in_flight: None,
                checking: false,
                abandoned: false,
            })),
        }
    }

    /// A snapshot of the current state.
    pub async fn state(&self) -> PathState {
        self.inner.lock().await.state.clone()
    }

    /// Whether a submission is waiting on the backend.
    pub async fn is_submitting(&self) -> bool {
        self.inner.lock().await.in_flight.is_some()
    }

    /// Looks up the learner's existing path.
    ///
    /// Runs only from `Checking`; in any other state (or while another check
    /// is outstanding) it returns the current state without a request.
    #[instrument(skip_all)]
    pub async fn check(&self) -> PathState {
        {
            let mut inner = self.inner.lock().await;
            if inner.abandoned || inner.checking || inner.state != PathState::Checking {
                return inner.state.clone();
            }
            inner.checking = true;
        }

        let result = self.backend.fetch_existing_path(&self.learner).await;

        let mut inner = self.inner.lock().await;
        inner.checking = false;
        if inner.abandoned {
            debug!("Resolver abandoned; dropping existing-path result");
            return inner.state.clone();
        }

        inner.state = match result {
            Ok(envelope) => {
                info!(skill = %envelope.skill_name(), level = %envelope.level, "Found existing learning path");
                PathState::Resolved(envelope)
            }
            Err(e) if e.is_not_found() => {
                info!("No existing learning path; waiting for a quiz score");
                PathState::NoExistingPath
            }
            Err(e) => {
                error!(error = %e, "Failed to check for an existing learning path");
                PathState::Failed(e.to_string())
            }
        };
        inner.state.clone()
    }

    /// Submits a finished quiz to generate the learner's path.
    ///
    /// Accepted only once the lookup has reported `NoExistingPath`. A newer
    /// call supersedes any submission still in flight.
    #[instrument(skip(self), fields(skill = %submission.skill, score = submission.score))]
    pub async fn submit(&self, submission: ScoreSubmission) -> SubmitOutcome {
        let ticket = {
            let mut inner = self.inner.lock().await;
            if inner.abandoned || inner.state != PathState::NoExistingPath {
                debug!(state = ?inner.state, "Submission rejected");
                return SubmitOutcome::Rejected(inner.state.clone());
            }
            if inner.in_flight.is_some() {
                debug!("Superseding in-flight submission");
            }
            inner.generation += 1;
            inner.in_flight = Some(inner.generation);
            inner.generation
        };

        let result = self.backend.submit_score(&self.learner, &submission).await;

        let mut inner = self.inner.lock().await;
        if inner.abandoned || inner.generation != ticket {
            debug!(ticket, newest = inner.generation, "Discarding stale submission result");
            return SubmitOutcome::Superseded;
        }
        inner.in_flight = None;
        inner.state = match result {
            Ok(envelope) => {
                info!(level = %envelope.level, topics = envelope.learning_path.topics.len(), "Learning path generated");
                PathState::Resolved(envelope)
            }
            Err(e) => {
                error!(error = %e, "Failed to generate learning path");
                PathState::Failed(e.to_string())
            }
        };
        SubmitOutcome::Applied(inner.state.clone())
    }

    /// Runs the lookup, then submits `submission` if no path exists.
    pub async fn resolve(&self, submission: ScoreSubmission) -> PathState {
        match self.check().await {
            PathState::NoExistingPath => match self.submit(submission).await {
                SubmitOutcome::Applied(state) | SubmitOutcome::Rejected(state) => state,
                SubmitOutcome::Superseded => self.state().await,
            },
            state => state,
        }
    }

    /// Marks one step of the resolved path as completed.
    #[instrument(skip(self))]
    pub async fn complete_step(&self, step_id: i64) -> Result<MessageResponse, PathActionError> {
        {
            let inner = self.inner.lock().await;
            let envelope = inner.state.path().ok_or(PathActionError::NoPath)?;
            if let Some(steps) = &envelope.steps {
                if !steps.iter().any(|s| s.id == step_id) {
                    return Err(PathActionError::UnknownStep(step_id));
                }
            }
        }

        let ack = self.backend.complete_step(&self.learner, step_id).await?;

        let mut inner = self.inner.lock().await;
        if inner.abandoned {
            debug!("Resolver abandoned; not recording step completion");
            return Ok(ack);
        }
        if let PathState::Resolved(envelope) = &mut inner.state {
            if let Some(step) = envelope
                .steps
                .iter_mut()
                .flatten()
                .find(|s| s.id == step_id)
            {
                step.completed = true;
                step.completed_at.get_or_insert_with(Utc::now);
            }
        }
        info!(message = %ack.message, "Step completed");
        Ok(ack)
    }

    /// Retires the resolved path once every step is done.
    ///
    /// On success the resolver returns to `NoExistingPath`, ready for the next
    /// quiz submission.
    #[instrument(skip(self))]
    pub async fn complete_skill(&self, skill_id: i64) -> Result<MessageResponse, PathActionError> {
        if self.inner.lock().await.state.path().is_none() {
            return Err(PathActionError::NoPath);
        }

        let ack = match self.backend.complete_skill(&self.learner, skill_id).await {
            Ok(ack) => ack,
            Err(e) => {
                warn!(error = %e, "Skill completion refused");
                return Err(e.into());
            }
        };

        let mut inner = self.inner.lock().await;
        if inner.abandoned || inner.state.path().is_none() {
            debug!(state = ?inner.state, "Resolver moved on; not retiring the path");
            return Ok(ack);
        }
        inner.generation += 1;
        inner.in_flight = None;
        inner.state = PathState::NoExistingPath;
        info!(message = %ack.message, "Skill completed; learning path retired");
        Ok(ack)
    }

    /// Invalidates all in-flight work; later results are never applied.
    pub async fn abandon(&self) {
        let mut inner = self.inner.lock().await;
        inner.abandoned = true;
        inner.generation += 1;
        inner.in_flight = None;
    }
}
