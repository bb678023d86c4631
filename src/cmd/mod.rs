//! CLI command handlers. Thin wiring over the library: construct the
//! dependencies once, run the operation, print the outcome.

use anyhow::{Context, Result};
use console::style;
use std::path::PathBuf;
use std::sync::Arc;

use reckon::client::HttpGenerativeClient;
use reckon::config::Config;
use reckon::dispatch::{LogNotifier, LogRenderer, SideEffectDispatcher};
use reckon::orchestrator::{self, GenerationOrchestrator, GenerationOutcome};
use reckon::record::ReportStatus;
use reckon::store::SqliteStore;
use reckon::submission::Submission;

pub async fn generate(submission_path: PathBuf, db: Option<PathBuf>, verbose: bool) -> Result<()> {
    let submission = load_submission(&submission_path)?;
    let orchestrator = build_orchestrator(db, verbose)?;
    let outcome = orchestrator.generate(&submission).await?;
    print_outcome(&outcome);
    // A short-lived process would kill the detached tasks on exit; let them
    // finish after the outcome is already printed.
    outcome.side_effects.join().await;
    Ok(())
}

pub async fn regenerate(
    token: String,
    submission_path: PathBuf,
    db: Option<PathBuf>,
    verbose: bool,
) -> Result<()> {
    let submission = load_submission(&submission_path)?;
    let orchestrator = build_orchestrator(db, verbose)?;
    let outcome = orchestrator.regenerate(&token, &submission).await?;
    print_outcome(&outcome);
    outcome.side_effects.join().await;
    Ok(())
}

/// Status only reads the store, so it works without an API key.
pub async fn status(token: String, db: Option<PathBuf>) -> Result<()> {
    let db_path = db.unwrap_or_else(Config::db_path_from_env);
    let store = SqliteStore::open(&db_path)?;
    let view = orchestrator::get_status(&store, &token).await?;

    println!("Status:     {}", styled_status(view.status));
    println!("Has report: {}", view.has_report);
    match view.confidence_score {
        Some(score) => println!("Confidence: {}", score),
        None => println!("Confidence: -"),
    }
    println!("Created:    {}", view.created_at.to_rfc3339());
    match view.completed_at {
        Some(at) => println!("Completed:  {}", at.to_rfc3339()),
        None => println!("Completed:  -"),
    }
    Ok(())
}

fn load_submission(path: &PathBuf) -> Result<Submission> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read submission file {}", path.display()))?;
    serde_json::from_str(&raw)
        .with_context(|| format!("Invalid submission JSON in {}", path.display()))
}

fn build_orchestrator(db: Option<PathBuf>, verbose: bool) -> Result<GenerationOrchestrator> {
    let config = Config::from_env(db, verbose)?;
    let store = Arc::new(SqliteStore::open(&config.db_path)?);
    let client = Arc::new(HttpGenerativeClient::new(&config)?);
    let dispatcher =
        SideEffectDispatcher::new(store.clone(), Arc::new(LogNotifier), Arc::new(LogRenderer));
    Ok(GenerationOrchestrator::new(
        client,
        store,
        dispatcher,
        config.confidence_threshold,
        config.max_attempts,
    ))
}

fn print_outcome(outcome: &GenerationOutcome) {
    println!("Token:  {}", outcome.token);
    println!("Status: {}", styled_status(outcome.status));
    if let Some(score) = outcome.confidence {
        println!("Score:  {}", score);
    }
    if !outcome.flags.is_empty() {
        println!("Flags:");
        for flag in &outcome.flags {
            println!("  - {}", flag);
        }
    }
    if let Some(error) = &outcome.error {
        println!("Error:  {}", style(error).red());
    }
}

fn styled_status(status: ReportStatus) -> String {
    match status {
        ReportStatus::Ready => style("ready").green().to_string(),
        ReportStatus::PendingReview => style("pending_review").yellow().to_string(),
        ReportStatus::Failed => style("failed").red().to_string(),
        ReportStatus::Generating => style("generating").dim().to_string(),
    }
}
