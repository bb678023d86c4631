//! Persistence gateway for reckoning records.
//!
//! The pipeline depends on the `ReckoningStore` trait; the SQLite
//! implementation wraps a synchronous connection behind
//! `tokio::task::spawn_blocking` so database I/O never ties up async
//! worker threads.

use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, params};
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;

use crate::record::{DocumentStatus, ReckoningRecord, ReportStatus, TerminalOutcome};
use crate::report::Report;
use crate::submission::Persona;

/// Durable record access, keyed by token.
///
/// Field ownership is disjoint: the orchestrator writes decision fields
/// (`record_attempt`, `complete`, `reset_for_regeneration`), the dispatcher
/// writes only the document fields (`set_document_status`).
#[async_trait]
pub trait ReckoningStore: Send + Sync {
    async fn insert(&self, record: &ReckoningRecord) -> Result<()>;

    async fn fetch(&self, token: &str) -> Result<Option<ReckoningRecord>>;

    /// Persist the attempt counter before the external call is made, so a
    /// crash mid-attempt is observable.
    async fn record_attempt(&self, token: &str, attempt: u32) -> Result<()>;

    /// Write the terminal outcome exactly once. Fails if the record already
    /// holds a terminal status.
    async fn complete(&self, token: &str, outcome: &TerminalOutcome) -> Result<()>;

    /// Flip an existing record back to `generating` for a regeneration run,
    /// keeping its token and creation time.
    async fn reset_for_regeneration(&self, token: &str) -> Result<()>;

    /// Dispatcher-owned write: derived-document status and error only.
    async fn set_document_status(
        &self,
        token: &str,
        status: DocumentStatus,
        error: Option<String>,
    ) -> Result<()>;
}

/// SQLite-backed store. Clone-cheap handle; all access runs on the blocking
/// thread pool.
#[derive(Clone)]
pub struct SqliteStore {
    inner: Arc<std::sync::Mutex<ReckonDb>>,
}

impl SqliteStore {
    pub fn open(path: &Path) -> Result<Self> {
        Ok(Self {
            inner: Arc::new(std::sync::Mutex::new(ReckonDb::open(path)?)),
        })
    }

    /// In-memory database for tests.
    pub fn open_in_memory() -> Result<Self> {
        Ok(Self {
            inner: Arc::new(std::sync::Mutex::new(ReckonDb::open_in_memory()?)),
        })
    }

    /// Run a closure against the database on a blocking thread. Data passed
    /// into `f` must be owned (`'static`).
    async fn call<F, R>(&self, f: F) -> Result<R>
    where
        F: FnOnce(&ReckonDb) -> Result<R> + Send + 'static,
        R: Send + 'static,
    {
        let db = self.inner.clone();
        tokio::task::spawn_blocking(move || {
            let guard = db
                .lock()
                .map_err(|e| anyhow!("store lock poisoned: {}", e))?;
            f(&guard)
        })
        .await
        .context("store task panicked")?
    }
}

#[async_trait]
impl ReckoningStore for SqliteStore {
    async fn insert(&self, record: &ReckoningRecord) -> Result<()> {
        let record = record.clone();
        self.call(move |db| db.insert(&record)).await
    }

    async fn fetch(&self, token: &str) -> Result<Option<ReckoningRecord>> {
        let token = token.to_string();
        self.call(move |db| db.fetch(&token)).await
    }

    async fn record_attempt(&self, token: &str, attempt: u32) -> Result<()> {
        let token = token.to_string();
        self.call(move |db| db.record_attempt(&token, attempt)).await
    }

    async fn complete(&self, token: &str, outcome: &TerminalOutcome) -> Result<()> {
        let token = token.to_string();
        let outcome = outcome.clone();
        self.call(move |db| db.complete(&token, &outcome)).await
    }

    async fn reset_for_regeneration(&self, token: &str) -> Result<()> {
        let token = token.to_string();
        self.call(move |db| db.reset_for_regeneration(&token)).await
    }

    async fn set_document_status(
        &self,
        token: &str,
        status: DocumentStatus,
        error: Option<String>,
    ) -> Result<()> {
        let token = token.to_string();
        self.call(move |db| db.set_document_status(&token, status, error.as_deref()))
            .await
    }
}

struct ReckonDb {
    conn: Connection,
}

impl ReckonDb {
    fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path).context("Failed to open SQLite database")?;
        let db = Self { conn };
        db.init()?;
        Ok(db)
    }

    fn open_in_memory() -> Result<Self> {
        let conn =
            Connection::open_in_memory().context("Failed to open in-memory SQLite database")?;
        let db = Self { conn };
        db.init()?;
        Ok(db)
    }

    fn init(&self) -> Result<()> {
        self.conn
            .execute_batch(
                "CREATE TABLE IF NOT EXISTS reckonings (
                    token TEXT PRIMARY KEY,
                    submission_id TEXT NOT NULL,
                    persona TEXT NOT NULL,
                    status TEXT NOT NULL,
                    report TEXT,
                    confidence_score INTEGER,
                    validation_flags TEXT NOT NULL DEFAULT '[]',
                    generation_attempts INTEGER NOT NULL DEFAULT 0,
                    document_status TEXT NOT NULL DEFAULT 'none',
                    document_error TEXT,
                    error_log TEXT,
                    email TEXT NOT NULL,
                    created_at TEXT NOT NULL,
                    completed_at TEXT
                );
                CREATE INDEX IF NOT EXISTS idx_reckonings_submission
                    ON reckonings(submission_id);",
            )
            .context("Failed to initialize schema")
    }

    fn insert(&self, record: &ReckoningRecord) -> Result<()> {
        let report_json = record
            .report
            .as_ref()
            .map(serde_json::to_string)
            .transpose()
            .context("Failed to serialize report")?;
        let flags_json = serde_json::to_string(&record.validation_flags)
            .context("Failed to serialize validation flags")?;

        self.conn
            .execute(
                "INSERT INTO reckonings (
                    token, submission_id, persona, status, report,
                    confidence_score, validation_flags, generation_attempts,
                    document_status, document_error, error_log, email,
                    created_at, completed_at
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
                params![
                    record.token,
                    record.submission_id,
                    record.persona.as_str(),
                    record.status.as_str(),
                    report_json,
                    record.confidence_score.map(i64::from),
                    flags_json,
                    i64::from(record.generation_attempts),
                    record.document_status.as_str(),
                    record.document_error,
                    record.error_log,
                    record.email,
                    record.created_at.to_rfc3339(),
                    record.completed_at.map(|t| t.to_rfc3339()),
                ],
            )
            .context("Failed to insert reckoning record")?;
        Ok(())
    }

    fn fetch(&self, token: &str) -> Result<Option<ReckoningRecord>> {
        let raw = self
            .conn
            .query_row(
                "SELECT token, submission_id, persona, status, report,
                        confidence_score, validation_flags, generation_attempts,
                        document_status, document_error, error_log, email,
                        created_at, completed_at
                 FROM reckonings WHERE token = ?1",
                params![token],
                |row| {
                    Ok(RawRow {
                        token: row.get(0)?,
                        submission_id: row.get(1)?,
                        persona: row.get(2)?,
                        status: row.get(3)?,
                        report: row.get(4)?,
                        confidence_score: row.get(5)?,
                        validation_flags: row.get(6)?,
                        generation_attempts: row.get(7)?,
                        document_status: row.get(8)?,
                        document_error: row.get(9)?,
                        error_log: row.get(10)?,
                        email: row.get(11)?,
                        created_at: row.get(12)?,
                        completed_at: row.get(13)?,
                    })
                },
            )
            .optional()
            .context("Failed to fetch reckoning record")?;

        raw.map(RawRow::into_record).transpose()
    }

    fn record_attempt(&self, token: &str, attempt: u32) -> Result<()> {
        let changed = self
            .conn
            .execute(
                "UPDATE reckonings SET generation_attempts = ?2 WHERE token = ?1",
                params![token, i64::from(attempt)],
            )
            .context("Failed to record attempt")?;
        if changed == 0 {
            anyhow::bail!("no record for token {}", token);
        }
        Ok(())
    }

    fn complete(&self, token: &str, outcome: &TerminalOutcome) -> Result<()> {
        let report_json = outcome
            .report
            .as_ref()
            .map(serde_json::to_string)
            .transpose()
            .context("Failed to serialize report")?;
        let flags_json = serde_json::to_string(&outcome.validation_flags)
            .context("Failed to serialize validation flags")?;

        // Guard in SQL: a terminal status is never overwritten.
        let changed = self
            .conn
            .execute(
                "UPDATE reckonings
                 SET status = ?2, report = ?3, confidence_score = ?4,
                     validation_flags = ?5, error_log = ?6, completed_at = ?7
                 WHERE token = ?1 AND status = 'generating'",
                params![
                    token,
                    outcome.status.as_str(),
                    report_json,
                    outcome.confidence_score.map(i64::from),
                    flags_json,
                    outcome.error_log,
                    Utc::now().to_rfc3339(),
                ],
            )
            .context("Failed to write terminal outcome")?;
        if changed == 0 {
            anyhow::bail!(
                "refusing terminal write for token {}: record missing or already terminal",
                token
            );
        }
        Ok(())
    }

    fn reset_for_regeneration(&self, token: &str) -> Result<()> {
        let changed = self
            .conn
            .execute(
                "UPDATE reckonings
                 SET status = 'generating', report = NULL, confidence_score = NULL,
                     validation_flags = '[]', generation_attempts = 0,
                     document_status = 'none', document_error = NULL,
                     error_log = NULL, completed_at = NULL
                 WHERE token = ?1",
                params![token],
            )
            .context("Failed to reset record for regeneration")?;
        if changed == 0 {
            anyhow::bail!("no record for token {}", token);
        }
        Ok(())
    }

    fn set_document_status(
        &self,
        token: &str,
        status: DocumentStatus,
        error: Option<&str>,
    ) -> Result<()> {
        let changed = self
            .conn
            .execute(
                "UPDATE reckonings SET document_status = ?2, document_error = ?3
                 WHERE token = ?1",
                params![token, status.as_str(), error],
            )
            .context("Failed to set document status")?;
        if changed == 0 {
            anyhow::bail!("no record for token {}", token);
        }
        Ok(())
    }
}

struct RawRow {
    token: String,
    submission_id: String,
    persona: String,
    status: String,
    report: Option<String>,
    confidence_score: Option<i64>,
    validation_flags: String,
    generation_attempts: i64,
    document_status: String,
    document_error: Option<String>,
    error_log: Option<String>,
    email: String,
    created_at: String,
    completed_at: Option<String>,
}

impl RawRow {
    fn into_record(self) -> Result<ReckoningRecord> {
        let report: Option<Report> = self
            .report
            .as_deref()
            .map(serde_json::from_str)
            .transpose()
            .context("Corrupt report JSON in store")?;
        let validation_flags: Vec<String> = serde_json::from_str(&self.validation_flags)
            .context("Corrupt validation flags in store")?;

        Ok(ReckoningRecord {
            token: self.token,
            submission_id: self.submission_id,
            persona: Persona::from_str(&self.persona).map_err(|e| anyhow!(e))?,
            status: ReportStatus::from_str(&self.status).map_err(|e| anyhow!(e))?,
            report,
            confidence_score: self.confidence_score.map(|v| v as u8),
            validation_flags,
            generation_attempts: self.generation_attempts as u32,
            document_status: DocumentStatus::from_str(&self.document_status)
                .map_err(|e| anyhow!(e))?,
            document_error: self.document_error,
            error_log: self.error_log,
            email: self.email,
            created_at: parse_timestamp(&self.created_at)?,
            completed_at: self.completed_at.as_deref().map(parse_timestamp).transpose()?,
        })
    }
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>> {
    Ok(DateTime::parse_from_rfc3339(raw)
        .with_context(|| format!("Corrupt timestamp in store: {}", raw))?
        .with_timezone(&Utc))
}
