//! Main Entrypoint for the SkillPath Command-Line Client
//!
//! This binary is responsible for:
//! 1. Loading configuration from the environment.
//! 2. Initializing logging.
//! 3. Logging the learner in against the configured backend.
//! 4. Running the requested subcommand against stdin/stdout.

use anyhow::Context;
use clap::{Parser, Subcommand};
use skillpath_cli::{commands, config::Config};
use skillpath_core::{HttpBackend, SkillBackend};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "skillpath", version, about = "Skill quizzes, learning paths and tutor chat")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Take the quiz for a skill and get a learning path from the score
    Quiz { skill: String },
    /// Show the current learning path
    Path,
    /// List past quiz results
    Results,
    /// Chat with the tutor; `/quit` leaves
    Chat,
    /// Mark one step of the current learning path as done
    CompleteStep { step_id: i64 },
    /// Retire the current learning path once every step is done
    CompleteSkill { skill_id: i64 },
    /// Create an account using LEARNER_EMAIL and LEARNER_PASSWORD
    Register { username: String },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // --- 1. Load Configuration ---
    let config = Config::from_env().context("Failed to load configuration")?;

    // --- 2. Initialize Logging ---
    tracing_subscriber::fmt()
        .with_max_level(config.log_level)
        .with_timer(tracing_subscriber::fmt::time::ChronoLocal::rfc_3339())
        .with_writer(std::io::stderr)
        .init();
    info!(backend = %config.backend_url, "Configuration loaded");

    let backend: Arc<dyn SkillBackend> = Arc::new(
        HttpBackend::new(config.backend_url.as_str(), config.request_timeout)
            .context("Failed to create backend client")?,
    );
    let (email, password) = config
        .credentials()
        .context("Learner credentials are not configured")?;
    let mut out = std::io::stdout();

    if let Command::Register { username } = &cli.command {
        return commands::register(backend, username, email, password, &mut out).await;
    }

    // --- 3. Log In ---
    let learner = backend.login(email, password).await.context("Login failed")?;
    info!("Logged in");

    // --- 4. Run the Subcommand ---
    let mut input = BufReader::new(tokio::io::stdin()).lines();
    let outcome = match cli.command {
        Command::Quiz { skill } => {
            commands::quiz(backend.clone(), learner.clone(), &skill, &mut input, &mut out)
                .await
                .map(|_| ())
        }
        Command::Path => commands::path(backend.clone(), learner.clone(), &mut out)
            .await
            .map(|_| ()),
        Command::Results => commands::results(backend.clone(), learner.clone(), &mut out).await,
        Command::Chat => commands::chat(backend.clone(), learner.clone(), &mut input, &mut out).await,
        Command::CompleteStep { step_id } => {
            commands::complete_step(backend.clone(), learner.clone(), step_id, &mut out).await
        }
        Command::CompleteSkill { skill_id } => {
            commands::complete_skill(backend.clone(), learner.clone(), skill_id, &mut out).await
        }
        // Handled before login.
        Command::Register { .. } => Ok(()),
    };

    if let Err(e) = backend.logout(&learner).await {
        warn!(error = %e, "Logout failed");
    }
    outcome
}
