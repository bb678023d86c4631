//! The durable reckoning record and its status machinery.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use uuid::Uuid;

use crate::report::Report;
use crate::submission::{Persona, Submission};

/// Lifecycle of a generation run. Terminal states are never overwritten;
/// the one sanctioned reset is an explicit regeneration, which reuses the
/// token and flips the record back to `Generating`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ReportStatus {
    Generating,
    Ready,
    PendingReview,
    Failed,
}

impl ReportStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Generating => "generating",
            Self::Ready => "ready",
            Self::PendingReview => "pending_review",
            Self::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Generating)
    }
}

impl FromStr for ReportStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "generating" => Ok(Self::Generating),
            "ready" => Ok(Self::Ready),
            "pending_review" => Ok(Self::PendingReview),
            "failed" => Ok(Self::Failed),
            _ => Err(format!("Invalid report status: {}", s)),
        }
    }
}

/// Status of the derived document. Owned solely by the side-effect
/// dispatcher; independent of, and never able to change, `ReportStatus`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DocumentStatus {
    None,
    Generating,
    Ready,
    Failed,
}

impl DocumentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Generating => "generating",
            Self::Ready => "ready",
            Self::Failed => "failed",
        }
    }
}

impl FromStr for DocumentStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "none" => Ok(Self::None),
            "generating" => Ok(Self::Generating),
            "ready" => Ok(Self::Ready),
            "failed" => Ok(Self::Failed),
            _ => Err(format!("Invalid document status: {}", s)),
        }
    }
}

/// Mint an opaque, URL-safe token. The only identifier ever exposed
/// externally.
pub fn mint_token() -> String {
    Uuid::new_v4().simple().to_string()
}

/// Durable record of one reckoning, keyed by its token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReckoningRecord {
    pub token: String,
    pub submission_id: String,
    pub persona: Persona,
    pub status: ReportStatus,
    pub report: Option<Report>,
    pub confidence_score: Option<u8>,
    pub validation_flags: Vec<String>,
    pub generation_attempts: u32,
    pub document_status: DocumentStatus,
    pub document_error: Option<String>,
    pub error_log: Option<String>,
    pub email: String,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl ReckoningRecord {
    /// Fresh record for a new generation run.
    pub fn new(token: String, submission: &Submission) -> Self {
        Self {
            token,
            submission_id: submission.id.clone(),
            persona: submission.persona,
            status: ReportStatus::Generating,
            report: None,
            confidence_score: None,
            validation_flags: Vec::new(),
            generation_attempts: 0,
            document_status: DocumentStatus::None,
            document_error: None,
            error_log: None,
            email: submission.email.clone(),
            created_at: Utc::now(),
            completed_at: None,
        }
    }
}

/// The terminal decision the orchestrator writes exactly once per run.
#[derive(Debug, Clone)]
pub struct TerminalOutcome {
    pub status: ReportStatus,
    pub report: Option<Report>,
    pub confidence_score: Option<u8>,
    pub validation_flags: Vec<String>,
    pub error_log: Option<String>,
}
