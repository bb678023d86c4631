//! Generation orchestration: the bounded retry state machine.
//!
//! One `generate` call is one logical unit of work: attempts run strictly
//! sequentially, each persisting its attempt number before the external
//! call so a crash mid-attempt is observable. Transport failures, parse
//! failures, and structurally unsalvageable output (score 0) retry up to
//! the attempt budget; any decodable report with score > 0 terminates the
//! loop. `failed` is reserved for runs where no attempt ever decoded.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use tracing::{info, warn};

use crate::client::GenerativeClient;
use crate::dispatch::{DispatchHandles, SideEffectDispatcher};
use crate::errors::{GenerationError, PipelineError};
use crate::record::{ReckoningRecord, ReportStatus, TerminalOutcome, mint_token};
use crate::store::ReckoningStore;
use crate::submission::Submission;
use crate::validator::ConfidenceValidator;
use crate::{parse, prompt};

/// What the caller of `generate`/`regenerate` gets back. A failed run is a
/// terminal outcome, not an `Err`: the token is valid and the record holds
/// the last underlying error.
#[derive(Debug)]
pub struct GenerationOutcome {
    pub token: String,
    pub status: ReportStatus,
    pub confidence: Option<u8>,
    pub flags: Vec<String>,
    pub error: Option<String>,
    /// Handles for the detached side effects. Dropping them is fine;
    /// tests await them.
    pub side_effects: DispatchHandles,
}

/// Read-model returned by `get_status`.
#[derive(Debug, Clone, Serialize)]
pub struct StatusView {
    pub status: ReportStatus,
    pub has_report: bool,
    pub confidence_score: Option<u8>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

/// Look up the externally visible status for a token.
pub async fn get_status(
    store: &dyn ReckoningStore,
    token: &str,
) -> Result<StatusView, PipelineError> {
    let record = store
        .fetch(token)
        .await?
        .ok_or_else(|| PipelineError::UnknownToken(token.to_string()))?;
    Ok(StatusView {
        status: record.status,
        has_report: record.report.is_some(),
        confidence_score: record.confidence_score,
        created_at: record.created_at,
        completed_at: record.completed_at,
    })
}

/// Drives one submission through compose → call → parse → validate, with
/// bounded retry, a single terminal write, and fire-once side effects.
pub struct GenerationOrchestrator {
    client: Arc<dyn GenerativeClient>,
    store: Arc<dyn ReckoningStore>,
    dispatcher: SideEffectDispatcher,
    validator: ConfidenceValidator,
    max_attempts: u32,
    in_flight: Arc<Mutex<HashSet<String>>>,
}

impl GenerationOrchestrator {
    pub fn new(
        client: Arc<dyn GenerativeClient>,
        store: Arc<dyn ReckoningStore>,
        dispatcher: SideEffectDispatcher,
        confidence_threshold: u8,
        max_attempts: u32,
    ) -> Self {
        Self {
            client,
            store,
            dispatcher,
            validator: ConfidenceValidator::new(confidence_threshold),
            max_attempts,
            in_flight: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    /// Start a fresh run for a submission, minting a new token.
    pub async fn generate(
        &self,
        submission: &Submission,
    ) -> Result<GenerationOutcome, PipelineError> {
        let _guard = self.claim(&submission.id)?;

        let token = mint_token();
        let record = ReckoningRecord::new(token.clone(), submission);
        self.store.insert(&record).await?;
        info!(token = %token, submission = %submission.id, "generation started");

        self.run(token, submission).await
    }

    /// Re-run generation for an existing record, reusing its token so
    /// previously shared links stay valid.
    pub async fn regenerate(
        &self,
        prior_token: &str,
        submission: &Submission,
    ) -> Result<GenerationOutcome, PipelineError> {
        let existing = self
            .store
            .fetch(prior_token)
            .await?
            .ok_or_else(|| PipelineError::UnknownToken(prior_token.to_string()))?;

        let _guard = self.claim(&submission.id)?;
        self.store.reset_for_regeneration(&existing.token).await?;
        info!(token = %existing.token, submission = %submission.id, "regeneration started");

        self.run(existing.token, submission).await
    }

    /// External status lookup; see the free function.
    pub async fn get_status(&self, token: &str) -> Result<StatusView, PipelineError> {
        get_status(self.store.as_ref(), token).await
    }

    async fn run(
        &self,
        token: String,
        submission: &Submission,
    ) -> Result<GenerationOutcome, PipelineError> {
        let mut last_error: Option<GenerationError> = None;

        for attempt in 1..=self.max_attempts {
            // Attempt counter lands in the store before the external call.
            self.store.record_attempt(&token, attempt).await?;

            let prompt = prompt::compose(submission);
            let raw = match self.client.complete(&prompt).await {
                Ok(raw) => raw,
                Err(e) => {
                    warn!(token = %token, attempt, error = %e, "transport failure");
                    last_error = Some(e.into());
                    continue;
                }
            };

            let report = match parse::parse_report(&raw) {
                Ok(report) => report,
                Err(e) => {
                    warn!(token = %token, attempt, error = %e, "undecodable output");
                    last_error = Some(e.into());
                    continue;
                }
            };

            let result = self.validator.validate(&report, submission);
            if result.score == 0 && attempt < self.max_attempts {
                // Structurally unsalvageable; a fresh attempt may do better.
                warn!(token = %token, attempt, "poison output, retrying");
                continue;
            }

            // Decoded content with any score terminates the loop. At the
            // attempt budget even score 0 routes to review, never to failed.
            let status = if result.auto_approve {
                ReportStatus::Ready
            } else {
                ReportStatus::PendingReview
            };
            let flags = result.flag_messages();
            let outcome = TerminalOutcome {
                status,
                report: Some(report),
                confidence_score: Some(result.score),
                validation_flags: flags.clone(),
                error_log: None,
            };
            self.store.complete(&token, &outcome).await?;
            info!(
                token = %token,
                attempt,
                score = result.score,
                status = status.as_str(),
                "generation terminal"
            );

            let record = self
                .store
                .fetch(&token)
                .await?
                .ok_or_else(|| PipelineError::UnknownToken(token.clone()))?;
            let side_effects = self.dispatcher.dispatch(&record);

            return Ok(GenerationOutcome {
                token,
                status,
                confidence: Some(result.score),
                flags,
                error: None,
                side_effects,
            });
        }

        // No attempt ever produced decodable content.
        let message = last_error
            .map(|e| e.to_string())
            .unwrap_or_else(|| "generation exhausted without an attempt".to_string());
        let outcome = TerminalOutcome {
            status: ReportStatus::Failed,
            report: None,
            confidence_score: None,
            validation_flags: Vec::new(),
            error_log: Some(message.clone()),
        };
        self.store.complete(&token, &outcome).await?;
        warn!(token = %token, error = %message, "generation failed");

        Ok(GenerationOutcome {
            token,
            status: ReportStatus::Failed,
            confidence: None,
            flags: Vec::new(),
            error: Some(message),
            side_effects: DispatchHandles::default(),
        })
    }

    /// Per-submission in-flight guard: a concurrent duplicate `generate`
    /// gets a typed error instead of racing the record.
    fn claim(&self, submission_id: &str) -> Result<InFlightGuard, PipelineError> {
        // A poisoned set only means another claim panicked; the set itself
        // is still usable.
        let mut set = self
            .in_flight
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if !set.insert(submission_id.to_string()) {
            return Err(PipelineError::AlreadyGenerating(submission_id.to_string()));
        }
        Ok(InFlightGuard {
            set: Arc::clone(&self.in_flight),
            submission_id: submission_id.to_string(),
        })
    }
}

struct InFlightGuard {
    set: Arc<Mutex<HashSet<String>>>,
    submission_id: String,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        let mut set = self
            .set
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        set.remove(&self.submission_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::{LogNotifier, LogRenderer};
    use crate::errors::TransportError;
    use crate::prompt::PromptPair;

    struct NeverClient;

    #[async_trait::async_trait]
    impl GenerativeClient for NeverClient {
        async fn complete(&self, _prompt: &PromptPair) -> Result<String, TransportError> {
            Err(TransportError::Timeout)
        }
    }

    fn test_orchestrator() -> GenerationOrchestrator {
        let store = Arc::new(crate::store::SqliteStore::open_in_memory().unwrap());
        let dispatcher = SideEffectDispatcher::new(
            store.clone(),
            Arc::new(LogNotifier),
            Arc::new(LogRenderer),
        );
        GenerationOrchestrator::new(Arc::new(NeverClient), store, dispatcher, 90, 3)
    }

    #[tokio::test]
    async fn claim_is_exclusive_per_submission_and_released_on_drop() {
        let orchestrator = test_orchestrator();

        let guard = orchestrator.claim("sub-1").unwrap();
        assert!(matches!(
            orchestrator.claim("sub-1"),
            Err(PipelineError::AlreadyGenerating(_))
        ));
        // A different submission is unaffected.
        let other = orchestrator.claim("sub-2").unwrap();
        drop(other);

        drop(guard);
        assert!(orchestrator.claim("sub-1").is_ok());
    }

    #[tokio::test]
    async fn regenerate_with_unknown_token_is_typed_error() {
        let orchestrator = test_orchestrator();
        let submission = crate::submission::Submission {
            id: "sub-1".to_string(),
            persona: crate::submission::Persona::SoloFounder,
            answers: vec![],
            email: "a@example.com".to_string(),
            display_name: None,
            created_at: Utc::now(),
        };
        let err = orchestrator
            .regenerate("missing-token", &submission)
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::UnknownToken(_)));
    }
}
