//! Plain-text rendering of quiz questions, learning paths and quiz history.

use skillpath_core::{
    PathState,
    models::{PathEnvelope, QuizHistory, Question},
};
use std::fmt::Write;

/// Parses a 1-based option number typed by the learner into a display position.
pub fn parse_choice(line: &str) -> Option<usize> {
    match line.trim().parse::<usize>() {
        Ok(n @ 1..=4) => Some(n - 1),
        _ => None,
    }
}

pub fn question(index: usize, total: usize, question: &Question) -> String {
    let mut out = format!("\nQuestion {}/{}: {}\n", index + 1, total, question.question);
    for (i, option) in question.options().iter().enumerate() {
        let _ = writeln!(out, "  {}) {}", i + 1, option);
    }
    out
}

pub fn path(envelope: &PathEnvelope) -> String {
    let mut out = format!(
        "Learning path: {} ({})\n",
        envelope.skill_name(),
        envelope.level
    );
    if let Some(passed) = envelope.passed {
        let verdict = if passed { "passed" } else { "not passed yet" };
        let _ = writeln!(out, "Quiz {}.", verdict);
    }

    for (i, topic) in envelope.learning_path.topics.iter().enumerate() {
        let step = envelope
            .steps
            .iter()
            .flatten()
            .find(|s| s.step_name == topic.name);
        let mark = match step {
            Some(s) if s.completed => "[x]",
            Some(_) => "[ ]",
            None => "   ",
        };
        let _ = write!(out, "{} {}. {}", mark, i + 1, topic.name);
        if let Some(s) = step {
            let _ = write!(out, " (step {})", s.id);
        }
        out.push('\n');
        if !topic.description.is_empty() {
            let _ = writeln!(out, "      {}", topic.description);
        }
        for resource in &topic.resources {
            let _ = writeln!(out, "      - {}", resource);
        }
    }
    out
}

pub fn path_state(state: &PathState) -> String {
    match state {
        PathState::Resolved(envelope) => path(envelope),
        PathState::NoExistingPath => {
            "You have no learning path yet. Take a quiz with `skillpath quiz <skill>`.\n"
                .to_string()
        }
        PathState::Failed(reason) => format!("Failed to load learning path: {}\n", reason),
        PathState::Checking => "Still checking for a learning path.\n".to_string(),
    }
}

pub fn history(history: &QuizHistory) -> String {
    if history.results.is_empty() {
        return format!("{} has not taken any quizzes yet.\n", history.username);
    }
    let mut out = format!(
        "Quiz results for {} ({} total)\n",
        history.username, history.total_results
    );
    for result in &history.results {
        let _ = writeln!(
            out,
            "{}  {:<20} {:<13} {:>2}  {}",
            result.taken_at.format("%Y-%m-%d %H:%M"),
            result.skill_name.as_deref().unwrap_or("(unknown skill)"),
            result.level,
            result.score,
            if result.passed { "passed" } else { "failed" }
        );
    }
    out
}
