//! Typed error hierarchy for the reckon pipeline.
//!
//! Two layers:
//! - `TransportError` / `ParseError` — per-attempt failures, internal to the
//!   retry loop and wrapped by `GenerationError`
//! - `PipelineError` — failures surfaced to the caller of the orchestrator

use thiserror::Error;

/// The external generative call did not complete.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("request to generative service failed: {0}")]
    Request(String),

    #[error("generative service returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("generative service returned an empty completion")]
    EmptyCompletion,

    #[error("generative service timed out")]
    Timeout,
}

/// The generative call completed but its output could not be decoded
/// into a report.
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("model output was empty after trimming")]
    Empty,

    #[error("model output is not a valid report document: {0}")]
    Json(#[from] serde_json::Error),

    #[error("report is missing required section '{section}'")]
    MissingSection { section: &'static str },
}

/// A single failed generation attempt. Transport and parse failures are
/// handled identically by the retry loop.
#[derive(Debug, Error)]
pub enum GenerationError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Parse(#[from] ParseError),
}

/// Errors surfaced to callers of `generate`/`regenerate`/`get_status`.
///
/// Exhausted retries are NOT represented here: a run that never produced
/// decodable content terminates with `ReportStatus::Failed` and the last
/// underlying error in the returned outcome, not as an `Err`.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("unknown token: {0}")]
    UnknownToken(String),

    #[error("generation already in flight for submission {0}")]
    AlreadyGenerating(String),

    #[error("store error: {0}")]
    Store(#[from] anyhow::Error),
}
