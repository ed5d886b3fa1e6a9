//! Terminal flows for each subcommand.
//!
//! Every flow reads learner input from an async line source and writes to a
//! plain `Write`, so the binary wires them to stdin/stdout and the tests to
//! in-memory buffers.

use anyhow::Context;
use skillpath_core::{
    Advance, ChatEvent, ChatStreamSession, LearnerContext, PathResolver, PathState, QuizSession,
    QuizState, Selection, SkillBackend, StreamEnd, chat::ChatError,
};
use std::{io::Write, sync::Arc};
use tokio::{
    io::{AsyncBufRead, Lines},
    sync::mpsc,
};
use tracing::{error, info};

use crate::render;

/// Runs one quiz for `skill` and resolves the learning path from the score.
///
/// Returns `None` when the quiz never finished.
pub async fn quiz<R, W>(
    backend: Arc<dyn SkillBackend>,
    learner: LearnerContext,
    skill: &str,
    input: &mut Lines<R>,
    out: &mut W,
) -> anyhow::Result<Option<PathState>>
where
    R: AsyncBufRead + Unpin,
    W: Write,
{
    let mut session = QuizSession::new(backend.clone(), learner.clone());
    if let QuizState::NoQuestions { skill, reason } = session.load(skill).await {
        writeln!(out, "No questions available for '{}': {}", skill, reason)?;
        return Ok(None);
    }
    let total = session.attempt().map_or(0, |a| a.len());

    let submission = loop {
        let Some(attempt) = session.attempt() else {
            return Ok(None);
        };
        let Some(current) = attempt.current() else {
            return Ok(None);
        };
        write!(out, "{}", render::question(attempt.index(), total, current))?;
        let correct = current.correct_answer().to_string();

        let position = loop {
            write!(out, "Your answer (1-4): ")?;
            out.flush()?;
            let Some(line) = input.next_line().await.context("Failed to read answer")? else {
                writeln!(out, "\nQuiz abandoned.")?;
                return Ok(None);
            };
            match render::parse_choice(&line) {
                Some(position) => break position,
                None => writeln!(out, "Please enter a number from 1 to 4.")?,
            }
        };

        match session.select_option(position) {
            Selection::Correct => writeln!(out, "Correct!")?,
            Selection::Incorrect => writeln!(out, "Incorrect. The answer was: {}", correct)?,
            _ => {}
        }
        if let Advance::Completed(submission) = session.advance() {
            break submission;
        }
    };

    writeln!(
        out,
        "\nYou scored {}/{} in {}.",
        submission.score, total, submission.skill
    )?;

    let resolver = PathResolver::new(backend, learner);
    let state = resolver.resolve(submission).await;
    write!(out, "{}", render::path_state(&state))?;
    Ok(Some(state))
}

/// Shows the learner's current learning path.
pub async fn path<W: Write>(
    backend: Arc<dyn SkillBackend>,
    learner: LearnerContext,
    out: &mut W,
) -> anyhow::Result<PathState> {
    let state = PathResolver::new(backend, learner).check().await;
    write!(out, "{}", render::path_state(&state))?;
    Ok(state)
}

pub async fn results<W: Write>(
    backend: Arc<dyn SkillBackend>,
    learner: LearnerContext,
    out: &mut W,
) -> anyhow::Result<()> {
    match backend.fetch_quiz_history(&learner).await {
        Ok(history) => write!(out, "{}", render::history(&history))?,
        Err(e) => {
            error!(error = %e, "Failed to fetch quiz history");
            writeln!(out, "Failed to load results.")?;
        }
    }
    Ok(())
}

pub async fn complete_step<W: Write>(
    backend: Arc<dyn SkillBackend>,
    learner: LearnerContext,
    step_id: i64,
    out: &mut W,
) -> anyhow::Result<()> {
    let resolver = PathResolver::new(backend, learner);
    resolver.check().await;
    let ack = resolver
        .complete_step(step_id)
        .await
        .with_context(|| format!("Failed to complete step {}", step_id))?;
    writeln!(out, "{}", ack.message)?;
    Ok(())
}

pub async fn complete_skill<W: Write>(
    backend: Arc<dyn SkillBackend>,
    learner: LearnerContext,
    skill_id: i64,
    out: &mut W,
) -> anyhow::Result<()> {
    let resolver = PathResolver::new(backend, learner);
    resolver.check().await;
    let ack = resolver
        .complete_skill(skill_id)
        .await
        .with_context(|| format!("Failed to complete skill {}", skill_id))?;
    writeln!(out, "{}", ack.message)?;
    if let Some(next) = ack.next {
        writeln!(out, "{}", next)?;
    }
    Ok(())
}

pub async fn register<W: Write>(
    backend: Arc<dyn SkillBackend>,
    username: &str,
    email: &str,
    password: &str,
    out: &mut W,
) -> anyhow::Result<()> {
    let ack = backend
        .register(username, email, password)
        .await
        .context("Registration failed")?;
    info!(%username, "Registered learner");
    writeln!(out, "{}", ack.message)?;
    Ok(())
}

/// Interactive chat. Each input line is a new message; sending while a reply
/// is still streaming interrupts it. `/quit` or end of input leaves, the latter
/// only after the pending reply has finished.
pub async fn chat<R, W>(
    backend: Arc<dyn SkillBackend>,
    learner: LearnerContext,
    input: &mut Lines<R>,
    out: &mut W,
) -> anyhow::Result<()>
where
    R: AsyncBufRead + Unpin,
    W: Write,
{
    let (tx, mut rx) = mpsc::channel(64);
    let mut session = ChatStreamSession::new(backend, learner).with_events(tx);
    let mut input_open = true;
    let mut awaiting: Option<usize> = None;

    while input_open || awaiting.is_some() {
        tokio::select! {
            line = input.next_line(), if input_open => {
                match line.context("Failed to read message")? {
                    None => input_open = false,
                    Some(line) if line.trim() == "/quit" => break,
                    Some(line) => match session.send_message(&line).await {
                        Ok(slot) => awaiting = Some(slot),
                        Err(ChatError::BlankMessage) => {}
                    },
                }
            }
            Some(event) = rx.recv() => match event {
                ChatEvent::Chunk { text, .. } => {
                    write!(out, "{}", text)?;
                    out.flush()?;
                }
                ChatEvent::Finished { slot, end } => {
                    match end {
                        StreamEnd::Completed => writeln!(out)?,
                        StreamEnd::Failed(reason) => writeln!(out, "\n[reply failed: {}]", reason)?,
                        StreamEnd::Closed => writeln!(out, "\n[interrupted]")?,
                    }
                    if awaiting == Some(slot) {
                        awaiting = None;
                    }
                }
            },
        }
    }

    session.close().await;
    Ok(())
}
