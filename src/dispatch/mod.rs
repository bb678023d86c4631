//! Side-effect dispatch after a terminal write.
//!
//! Document rendering and notifications run as detached tokio tasks: the
//! triggering request returns without waiting, and a failure here is
//! recorded against the sub-task (document status + error, or a log line)
//! and never escalated to the parent record's status.

use async_trait::async_trait;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::record::{DocumentStatus, ReckoningRecord, ReportStatus};
use crate::report::Report;
use crate::store::ReckoningStore;

/// Outbound notification transport. Best-effort; the pipeline only logs
/// failures.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Tell the submitter their report is ready.
    async fn report_ready(&self, email: &str, token: &str) -> anyhow::Result<()>;

    /// Tell reviewers a report needs human eyes, with the gate's evidence.
    async fn review_needed(&self, token: &str, score: u8, flags: &[String]) -> anyhow::Result<()>;
}

/// Derived-document renderer. Tracked via the record's own document status,
/// never via the parent report status.
#[async_trait]
pub trait DocumentRenderer: Send + Sync {
    async fn render(&self, token: &str, report: &Report) -> anyhow::Result<()>;
}

/// Default wiring when no real transport is configured: log and succeed.
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn report_ready(&self, email: &str, token: &str) -> anyhow::Result<()> {
        info!(email, token, "report ready notification");
        Ok(())
    }

    async fn review_needed(&self, token: &str, score: u8, flags: &[String]) -> anyhow::Result<()> {
        info!(token, score, ?flags, "review needed notification");
        Ok(())
    }
}

/// Default renderer stand-in: log and succeed.
pub struct LogRenderer;

#[async_trait]
impl DocumentRenderer for LogRenderer {
    async fn render(&self, token: &str, _report: &Report) -> anyhow::Result<()> {
        info!(token, "document render requested");
        Ok(())
    }
}

/// Join handles for the detached tasks a dispatch spawned. Production
/// callers drop this; tests await it so side effects are observable
/// deterministically.
#[derive(Debug, Default)]
pub struct DispatchHandles {
    pub document: Option<JoinHandle<()>>,
    pub notification: Option<JoinHandle<()>>,
}

impl DispatchHandles {
    /// Wait for every spawned side effect to finish.
    pub async fn join(self) {
        if let Some(handle) = self.document {
            let _ = handle.await;
        }
        if let Some(handle) = self.notification {
            let _ = handle.await;
        }
    }
}

/// Fires side effects exactly once per terminal write. Sole writer of the
/// record's document fields.
pub struct SideEffectDispatcher {
    store: Arc<dyn ReckoningStore>,
    notifier: Arc<dyn Notifier>,
    renderer: Arc<dyn DocumentRenderer>,
}

impl SideEffectDispatcher {
    pub fn new(
        store: Arc<dyn ReckoningStore>,
        notifier: Arc<dyn Notifier>,
        renderer: Arc<dyn DocumentRenderer>,
    ) -> Self {
        Self {
            store,
            notifier,
            renderer,
        }
    }

    /// Spawn the side effects for a freshly written terminal record.
    /// `ready` → document render + submitter notification;
    /// `pending_review` → reviewer notification; anything else → nothing.
    pub fn dispatch(&self, record: &ReckoningRecord) -> DispatchHandles {
        match record.status {
            ReportStatus::Ready => {
                let document = record
                    .report
                    .clone()
                    .map(|report| self.spawn_document_render(record.token.clone(), report));
                let notification = Some(self.spawn_ready_notification(
                    record.email.clone(),
                    record.token.clone(),
                ));
                DispatchHandles {
                    document,
                    notification,
                }
            }
            ReportStatus::PendingReview => DispatchHandles {
                document: None,
                notification: Some(self.spawn_review_notification(
                    record.token.clone(),
                    record.confidence_score.unwrap_or(0),
                    record.validation_flags.clone(),
                )),
            },
            ReportStatus::Generating | ReportStatus::Failed => DispatchHandles::default(),
        }
    }

    fn spawn_document_render(&self, token: String, report: Report) -> JoinHandle<()> {
        let store = Arc::clone(&self.store);
        let renderer = Arc::clone(&self.renderer);
        tokio::spawn(async move {
            if let Err(e) = store
                .set_document_status(&token, DocumentStatus::Generating, None)
                .await
            {
                warn!(token = %token, error = %e, "could not mark document generating");
            }
            match renderer.render(&token, &report).await {
                Ok(()) => {
                    if let Err(e) = store
                        .set_document_status(&token, DocumentStatus::Ready, None)
                        .await
                    {
                        warn!(token = %token, error = %e, "could not mark document ready");
                    }
                }
                Err(render_err) => {
                    warn!(token = %token, error = %render_err, "document render failed");
                    if let Err(e) = store
                        .set_document_status(
                            &token,
                            DocumentStatus::Failed,
                            Some(render_err.to_string()),
                        )
                        .await
                    {
                        warn!(token = %token, error = %e, "could not record document failure");
                    }
                }
            }
        })
    }

    fn spawn_ready_notification(&self, email: String, token: String) -> JoinHandle<()> {
        let notifier = Arc::clone(&self.notifier);
        tokio::spawn(async move {
            if let Err(e) = notifier.report_ready(&email, &token).await {
                warn!(token = %token, error = %e, "report-ready notification failed");
            }
        })
    }

    fn spawn_review_notification(
        &self,
        token: String,
        score: u8,
        flags: Vec<String>,
    ) -> JoinHandle<()> {
        let notifier = Arc::clone(&self.notifier);
        tokio::spawn(async move {
            if let Err(e) = notifier.review_needed(&token, score, &flags).await {
                warn!(token = %token, error = %e, "review notification failed");
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{ReckoningRecord, mint_token};
    use crate::store::SqliteStore;
    use crate::submission::{AnswerValue, Persona, Submission};
    use chrono::Utc;
    use std::sync::Mutex;

    struct RecordingNotifier {
        ready: Mutex<Vec<(String, String)>>,
        review: Mutex<Vec<(String, u8, Vec<String>)>>,
    }

    impl RecordingNotifier {
        fn new() -> Self {
            Self {
                ready: Mutex::new(Vec::new()),
                review: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl Notifier for RecordingNotifier {
        async fn report_ready(&self, email: &str, token: &str) -> anyhow::Result<()> {
            self.ready
                .lock()
                .unwrap()
                .push((email.to_string(), token.to_string()));
            Ok(())
        }

        async fn review_needed(
            &self,
            token: &str,
            score: u8,
            flags: &[String],
        ) -> anyhow::Result<()> {
            self.review
                .lock()
                .unwrap()
                .push((token.to_string(), score, flags.to_vec()));
            Ok(())
        }
    }

    struct FailingRenderer;

    #[async_trait]
    impl DocumentRenderer for FailingRenderer {
        async fn render(&self, _token: &str, _report: &Report) -> anyhow::Result<()> {
            anyhow::bail!("pdf engine unavailable")
        }
    }

    fn submission() -> Submission {
        Submission {
            id: "sub-1".to_string(),
            persona: Persona::Freelancer,
            answers: vec![(
                "rate".to_string(),
                AnswerValue::Text("$90 an hour".to_string()),
            )],
            email: "kim@example.com".to_string(),
            display_name: None,
            created_at: Utc::now(),
        }
    }

    fn report() -> Report {
        serde_json::from_str(
            r#"{
                "opening": {"headline": "h", "body": "b"},
                "snapshot": {"summary": "s"},
                "diagnosis": {"core_issue": "c", "evidence": "e", "impact": "i"},
                "next_step": {"action": "raise your rate next renewal"},
                "closing": {"message": "m"}
            }"#,
        )
        .unwrap()
    }

    async fn terminal_record(store: &SqliteStore, status: ReportStatus) -> ReckoningRecord {
        let mut record = ReckoningRecord::new(mint_token(), &submission());
        store.insert(&record).await.unwrap();
        record.status = status;
        record.report = Some(report());
        record.confidence_score = Some(55);
        record.validation_flags = vec!["voice: flat".to_string()];
        store
            .complete(
                &record.token,
                &crate::record::TerminalOutcome {
                    status,
                    report: record.report.clone(),
                    confidence_score: record.confidence_score,
                    validation_flags: record.validation_flags.clone(),
                    error_log: None,
                },
            )
            .await
            .unwrap();
        record
    }

    #[tokio::test]
    async fn ready_dispatch_renders_document_and_notifies_submitter() {
        let store = Arc::new(SqliteStore::open_in_memory().unwrap());
        let notifier = Arc::new(RecordingNotifier::new());
        let dispatcher = SideEffectDispatcher::new(
            store.clone(),
            notifier.clone(),
            Arc::new(LogRenderer),
        );

        let record = terminal_record(&store, ReportStatus::Ready).await;
        dispatcher.dispatch(&record).join().await;

        let fetched = store.fetch(&record.token).await.unwrap().unwrap();
        assert_eq!(fetched.document_status, DocumentStatus::Ready);
        let ready = notifier.ready.lock().unwrap();
        assert_eq!(ready.len(), 1);
        assert_eq!(ready[0].0, "kim@example.com");
    }

    #[tokio::test]
    async fn render_failure_is_recorded_without_touching_parent_status() {
        let store = Arc::new(SqliteStore::open_in_memory().unwrap());
        let dispatcher = SideEffectDispatcher::new(
            store.clone(),
            Arc::new(RecordingNotifier::new()),
            Arc::new(FailingRenderer),
        );

        let record = terminal_record(&store, ReportStatus::Ready).await;
        dispatcher.dispatch(&record).join().await;

        let fetched = store.fetch(&record.token).await.unwrap().unwrap();
        assert_eq!(fetched.status, ReportStatus::Ready);
        assert_eq!(fetched.document_status, DocumentStatus::Failed);
        assert!(
            fetched
                .document_error
                .as_deref()
                .unwrap()
                .contains("pdf engine unavailable")
        );
    }

    #[tokio::test]
    async fn pending_review_dispatch_notifies_reviewers_with_evidence() {
        let store = Arc::new(SqliteStore::open_in_memory().unwrap());
        let notifier = Arc::new(RecordingNotifier::new());
        let dispatcher = SideEffectDispatcher::new(
            store.clone(),
            notifier.clone(),
            Arc::new(LogRenderer),
        );

        let record = terminal_record(&store, ReportStatus::PendingReview).await;
        dispatcher.dispatch(&record).join().await;

        let fetched = store.fetch(&record.token).await.unwrap().unwrap();
        assert_eq!(fetched.document_status, DocumentStatus::None);
        let review = notifier.review.lock().unwrap();
        assert_eq!(review.len(), 1);
        assert_eq!(review[0].1, 55);
        assert_eq!(review[0].2, vec!["voice: flat".to_string()]);
    }

    #[tokio::test]
    async fn failed_record_dispatches_nothing() {
        let store = Arc::new(SqliteStore::open_in_memory().unwrap());
        let notifier = Arc::new(RecordingNotifier::new());
        let dispatcher = SideEffectDispatcher::new(
            store.clone(),
            notifier.clone(),
            Arc::new(LogRenderer),
        );

        let mut record = ReckoningRecord::new(mint_token(), &submission());
        store.insert(&record).await.unwrap();
        record.status = ReportStatus::Failed;

        let handles = dispatcher.dispatch(&record);
        assert!(handles.document.is_none());
        assert!(handles.notification.is_none());
        assert!(notifier.ready.lock().unwrap().is_empty());
        assert!(notifier.review.lock().unwrap().is_empty());
    }
}
