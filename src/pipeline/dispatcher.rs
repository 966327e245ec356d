//! Review dispatcher: hands flagged entities to the human-review
//! collaborator and ingests completed annotations.
//!
//! A task is persisted only after the collaborator accepted it, so a failed
//! submission can be retried without leaking task ids. Completion callbacks
//! are validated against the persisted task: a stale or duplicate callback
//! is reported as [`DispatchError::UnknownTask`], never silently dropped.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

use crate::models::{EntityRecord, Resolution, ReviewTask, ReviewTaskStatus};
use crate::repository::{RepositoryError, ReviewTaskRepository};

/// Errors from the review boundary.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// The review collaborator rejected or never received the submission;
    /// retryable.
    #[error("review queue unavailable: {0}")]
    QueueUnavailable(String),

    /// Callback for a task id that is unknown or already terminal;
    /// indicates a duplicate or stale callback.
    #[error("unknown or inactive review task: {0}")]
    UnknownTask(String),

    /// A second task was requested while one is still pending.
    #[error("document {0} already has an active review task")]
    TaskAlreadyActive(String),

    #[error(transparent)]
    Storage(#[from] RepositoryError),
}

impl DispatchError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::QueueUnavailable(_))
    }
}

/// A reviewer's verdict on one flagged entity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReviewAnnotation {
    pub entity_type: String,
    /// The span text as it was submitted for review.
    pub original_text: String,
    /// Replacement text when the verdict is `Corrected`.
    pub corrected_text: Option<String>,
    pub verdict: Resolution,
}

/// Human-review collaborator: accepts task submissions. Completions come
/// back through [`ReviewDispatcher::ingest`].
#[async_trait]
pub trait ReviewQueue: Send + Sync {
    async fn submit(&self, task: &ReviewTask) -> Result<(), DispatchError>;
}

/// Submits flagged entities for review and ingests reviewer annotations.
pub struct ReviewDispatcher {
    tasks: Arc<ReviewTaskRepository>,
    queue: Arc<dyn ReviewQueue>,
    submit_timeout: Duration,
    expiry: chrono::Duration,
}

impl ReviewDispatcher {
    pub fn new(
        tasks: Arc<ReviewTaskRepository>,
        queue: Arc<dyn ReviewQueue>,
        submit_timeout: Duration,
        expiry: chrono::Duration,
    ) -> Self {
        Self {
            tasks,
            queue,
            submit_timeout,
            expiry,
        }
    }

    /// Create a pending task for the flagged entities and hand it to the
    /// review collaborator.
    pub async fn submit(
        &self,
        document_id: &str,
        entities: Vec<EntityRecord>,
    ) -> Result<ReviewTask, DispatchError> {
        if let Some(active) = self.tasks.active_for_document(document_id)? {
            warn!(document_id, task_id = %active.task_id, "review task already active");
            return Err(DispatchError::TaskAlreadyActive(document_id.to_string()));
        }

        let task = ReviewTask::new(document_id, entities);
        tokio::time::timeout(self.submit_timeout, self.queue.submit(&task))
            .await
            .map_err(|_| {
                DispatchError::QueueUnavailable("review submission timed out".to_string())
            })??;

        self.tasks.save(&task)?;
        info!(document_id, task_id = %task.task_id, entities = task.entities_under_review.len(), "review task submitted");
        Ok(task)
    }

    /// Ingest a completion callback for a task.
    ///
    /// Returns the task and the human-reviewed records derived from the
    /// annotations. Flagged entities the reviewer left untouched are
    /// treated as accepted: review UIs report only the spans a reviewer
    /// acted on.
    pub async fn ingest(
        &self,
        task_id: &str,
        annotations: Vec<ReviewAnnotation>,
    ) -> Result<(ReviewTask, Vec<EntityRecord>), DispatchError> {
        let mut task = self
            .tasks
            .get(task_id)?
            .ok_or_else(|| DispatchError::UnknownTask(task_id.to_string()))?;

        if task.status != ReviewTaskStatus::Pending {
            return Err(DispatchError::UnknownTask(task_id.to_string()));
        }

        let reviewed = apply_annotations(&task.entities_under_review, &annotations);

        task.status = ReviewTaskStatus::Completed;
        task.resolved_at = Some(Utc::now());
        self.tasks.save(&task)?;
        info!(task_id, document_id = %task.document_id, "review task completed");

        Ok((task, reviewed))
    }

    /// Mark overdue pending tasks as expired and return them so their
    /// documents can be failed. No further reviewer input is accepted for
    /// an expired task.
    pub fn expire_overdue(&self) -> Result<Vec<ReviewTask>, DispatchError> {
        let cutoff = Utc::now() - self.expiry;
        let mut expired = Vec::new();
        for mut task in self.tasks.pending_submitted_before(cutoff)? {
            task.status = ReviewTaskStatus::Expired;
            task.resolved_at = Some(Utc::now());
            self.tasks.save(&task)?;
            warn!(task_id = %task.task_id, document_id = %task.document_id, "review task expired");
            expired.push(task);
        }
        Ok(expired)
    }

    /// Pending tasks, for the review listing surfaces.
    pub fn list_pending(&self) -> Result<Vec<ReviewTask>, DispatchError> {
        Ok(self.tasks.list_pending()?)
    }
}

/// Review queue for local deployments: accepts every submission and
/// relies on the HTTP callback (or CLI) for completions. Real
/// deployments implement [`ReviewQueue`] against their review system.
#[derive(Debug, Default)]
pub struct LoggingReviewQueue;

#[async_trait]
impl ReviewQueue for LoggingReviewQueue {
    async fn submit(&self, task: &ReviewTask) -> Result<(), DispatchError> {
        info!(
            task_id = %task.task_id,
            document_id = %task.document_id,
            entities = task.entities_under_review.len(),
            "review task queued locally"
        );
        Ok(())
    }
}

/// Turn reviewer annotations into final human-reviewed records, one per
/// entity under review.
fn apply_annotations(
    under_review: &[EntityRecord],
    annotations: &[ReviewAnnotation],
) -> Vec<EntityRecord> {
    let mut reviewed = Vec::with_capacity(under_review.len());
    for entity in under_review {
        let annotation = annotations
            .iter()
            .find(|a| a.entity_type == entity.entity_type && a.original_text == entity.text);
        let record = match annotation {
            Some(a) => {
                let text = match (&a.verdict, &a.corrected_text) {
                    (Resolution::Corrected, Some(corrected)) => corrected.clone(),
                    _ => entity.text.clone(),
                };
                EntityRecord::human_reviewed(entity.entity_type.clone(), text, a.verdict)
            }
            // Untouched by the reviewer: implicitly accepted as-is.
            None => EntityRecord::human_reviewed(
                entity.entity_type.clone(),
                entity.text.clone(),
                Resolution::Accepted,
            ),
        };
        reviewed.push(record);
    }
    reviewed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::EntitySource;
    use std::sync::atomic::{AtomicBool, Ordering};

    struct AcceptingQueue;

    #[async_trait]
    impl ReviewQueue for AcceptingQueue {
        async fn submit(&self, _task: &ReviewTask) -> Result<(), DispatchError> {
            Ok(())
        }
    }

    struct FlakyQueue {
        failed_once: AtomicBool,
    }

    #[async_trait]
    impl ReviewQueue for FlakyQueue {
        async fn submit(&self, _task: &ReviewTask) -> Result<(), DispatchError> {
            if !self.failed_once.swap(true, Ordering::SeqCst) {
                return Err(DispatchError::QueueUnavailable("down".to_string()));
            }
            Ok(())
        }
    }

    fn dispatcher(
        dir: &tempfile::TempDir,
        queue: Arc<dyn ReviewQueue>,
        expiry: chrono::Duration,
    ) -> ReviewDispatcher {
        let tasks = Arc::new(ReviewTaskRepository::new(&dir.path().join("test.db")).unwrap());
        ReviewDispatcher::new(tasks, queue, Duration::from_secs(5), expiry)
    }

    fn flagged() -> Vec<EntityRecord> {
        vec![
            EntityRecord::automated("medication", "warfarin", 0.4),
            EntityRecord::automated("dosage", "5 mg", 0.3),
        ]
    }

    #[tokio::test]
    async fn test_submit_creates_pending_task() {
        let dir = tempfile::tempdir().unwrap();
        let d = dispatcher(&dir, Arc::new(AcceptingQueue), chrono::Duration::hours(1));

        let task = d.submit("doc1", flagged()).await.unwrap();
        assert_eq!(task.status, ReviewTaskStatus::Pending);
        assert_eq!(task.entities_under_review.len(), 2);

        // only one active task per document
        let err = d.submit("doc1", flagged()).await.unwrap_err();
        assert!(matches!(err, DispatchError::TaskAlreadyActive(_)));
    }

    #[tokio::test]
    async fn test_queue_failure_leaves_no_task_behind() {
        let dir = tempfile::tempdir().unwrap();
        let queue = Arc::new(FlakyQueue {
            failed_once: AtomicBool::new(false),
        });
        let d = dispatcher(&dir, queue, chrono::Duration::hours(1));

        let err = d.submit("doc1", flagged()).await.unwrap_err();
        assert!(err.is_retryable());

        // retry succeeds because nothing was persisted
        let task = d.submit("doc1", flagged()).await.unwrap();
        assert_eq!(task.status, ReviewTaskStatus::Pending);
    }

    #[tokio::test]
    async fn test_ingest_applies_verdicts_and_pads_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let d = dispatcher(&dir, Arc::new(AcceptingQueue), chrono::Duration::hours(1));

        let task = d.submit("doc1", flagged()).await.unwrap();
        let (task, reviewed) = d
            .ingest(
                &task.task_id,
                vec![ReviewAnnotation {
                    entity_type: "dosage".to_string(),
                    original_text: "5 mg".to_string(),
                    corrected_text: Some("50 mg".to_string()),
                    verdict: Resolution::Corrected,
                }],
            )
            .await
            .unwrap();

        assert_eq!(task.status, ReviewTaskStatus::Completed);
        assert_eq!(reviewed.len(), 2);
        assert!(reviewed.iter().all(|e| e.source == EntitySource::HumanReviewed));

        let untouched = reviewed.iter().find(|e| e.entity_type == "medication").unwrap();
        assert_eq!(untouched.resolution, Some(Resolution::Accepted));
        assert_eq!(untouched.text, "warfarin");

        let corrected = reviewed.iter().find(|e| e.entity_type == "dosage").unwrap();
        assert_eq!(corrected.resolution, Some(Resolution::Corrected));
        assert_eq!(corrected.text, "50 mg");
    }

    #[tokio::test]
    async fn test_duplicate_ingest_is_unknown_task() {
        let dir = tempfile::tempdir().unwrap();
        let d = dispatcher(&dir, Arc::new(AcceptingQueue), chrono::Duration::hours(1));

        let task = d.submit("doc1", flagged()).await.unwrap();
        d.ingest(&task.task_id, vec![]).await.unwrap();

        let err = d.ingest(&task.task_id, vec![]).await.unwrap_err();
        assert!(matches!(err, DispatchError::UnknownTask(_)));

        let err = d.ingest("never-existed", vec![]).await.unwrap_err();
        assert!(matches!(err, DispatchError::UnknownTask(_)));
    }

    #[tokio::test]
    async fn test_expiry_blocks_late_callbacks() {
        let dir = tempfile::tempdir().unwrap();
        // zero-width window: everything pending is immediately overdue
        let d = dispatcher(&dir, Arc::new(AcceptingQueue), chrono::Duration::seconds(-1));

        let task = d.submit("doc1", flagged()).await.unwrap();
        let expired = d.expire_overdue().unwrap();
        assert_eq!(expired.len(), 1);
        assert_eq!(expired[0].status, ReviewTaskStatus::Expired);

        let err = d.ingest(&task.task_id, vec![]).await.unwrap_err();
        assert!(matches!(err, DispatchError::UnknownTask(_)));
    }
}
