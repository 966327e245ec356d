//! Document processing service.
//!
//! Drives documents through extract → route → (review | merge) with a
//! bounded worker pool. Each document is an independent unit of work; its
//! events are serialized by the state machine's per-id lock. Progress is
//! emitted over an event channel, separated from UI concerns.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::{RetryPolicy, Thresholds};
use crate::extraction::{ExtractionError, ExtractionGateway};
use crate::models::{Document, DocumentStatus, EntityRecord, FailureReason, Resolution};
use crate::pipeline::state_machine::DocumentStateMachine;
use crate::pipeline::{merger, router, Applied, DispatchError, DocumentEvent, ReviewAnnotation, ReviewDispatcher};
use crate::repository::DocumentRepository;
use crate::services::retry;

/// Events emitted during pipeline processing.
#[derive(Debug, Clone)]
pub enum ProcessingEvent {
    Started { total_documents: usize },
    DocumentStarted { document_id: String },
    DocumentCompleted { document_id: String, entities: usize },
    DocumentAwaitingReview { document_id: String, task_id: String },
    DocumentFailed { document_id: String, reason: String },
    Complete {
        completed: usize,
        awaiting_review: usize,
        failed: usize,
    },
}

/// Tally of a processing run.
#[derive(Debug, Default)]
pub struct ProcessingResult {
    pub completed: usize,
    pub awaiting_review: usize,
    pub failed: usize,
}

/// Service orchestrating document processing.
#[derive(Clone)]
pub struct ProcessingService {
    repo: Arc<DocumentRepository>,
    state: Arc<DocumentStateMachine>,
    gateway: Arc<ExtractionGateway>,
    dispatcher: Arc<ReviewDispatcher>,
    thresholds: Thresholds,
    retry: RetryPolicy,
}

impl ProcessingService {
    pub fn new(
        repo: Arc<DocumentRepository>,
        state: Arc<DocumentStateMachine>,
        gateway: Arc<ExtractionGateway>,
        dispatcher: Arc<ReviewDispatcher>,
        thresholds: Thresholds,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            repo,
            state,
            gateway,
            dispatcher,
            thresholds,
            retry,
        }
    }

    /// Register a new document record in `Queued` state, before its bytes
    /// exist in storage.
    pub fn create_document(&self) -> anyhow::Result<Document> {
        let doc = Document::new(Uuid::new_v4().to_string(), None);
        self.repo.save(&doc)?;
        Ok(doc)
    }

    /// Record that the uploaded bytes landed at `source_key`.
    pub async fn attach_source(&self, document_id: &str, source_key: &str) -> anyhow::Result<()> {
        self.state
            .apply(
                document_id,
                DocumentEvent::SourceAttached {
                    source_key: source_key.to_string(),
                },
            )
            .await?;
        Ok(())
    }

    /// Request cancellation. Immediate while queued; deferred once work is
    /// in flight or a review task is outstanding.
    pub async fn cancel(&self, document_id: &str) -> anyhow::Result<DocumentStatus> {
        self.state
            .apply(document_id, DocumentEvent::CancelRequested)
            .await?;
        self.current_status(document_id)
    }

    fn current_status(&self, document_id: &str) -> anyhow::Result<DocumentStatus> {
        Ok(self
            .repo
            .get(document_id)?
            .ok_or_else(|| anyhow::anyhow!("document not found: {document_id}"))?
            .status)
    }

    /// Process all ready documents with a bounded worker pool.
    pub async fn process_pending(
        &self,
        limit: usize,
        workers: usize,
        event_tx: mpsc::Sender<ProcessingEvent>,
    ) -> anyhow::Result<ProcessingResult> {
        let effective_limit = if limit > 0 { limit } else { usize::MAX };
        let docs = self.repo.list_ready(effective_limit.min(10_000))?;

        let _ = event_tx
            .send(ProcessingEvent::Started {
                total_documents: docs.len(),
            })
            .await;

        let completed = Arc::new(AtomicUsize::new(0));
        let awaiting = Arc::new(AtomicUsize::new(0));
        let failed = Arc::new(AtomicUsize::new(0));

        let workers = workers.max(1);
        let mut handles = Vec::with_capacity(workers);

        for doc in docs {
            let service = self.clone();
            let event_tx = event_tx.clone();
            let completed = completed.clone();
            let awaiting = awaiting.clone();
            let failed = failed.clone();

            let handle = tokio::spawn(async move {
                let document_id = doc.id;
                let _ = event_tx
                    .send(ProcessingEvent::DocumentStarted {
                        document_id: document_id.clone(),
                    })
                    .await;

                match service.process_document(&document_id).await {
                    Ok(DocumentStatus::Completed) => {
                        completed.fetch_add(1, Ordering::Relaxed);
                        let entities = service
                            .repo
                            .get(&document_id)
                            .ok()
                            .flatten()
                            .map(|d| d.entities.len())
                            .unwrap_or(0);
                        let _ = event_tx
                            .send(ProcessingEvent::DocumentCompleted {
                                document_id,
                                entities,
                            })
                            .await;
                    }
                    Ok(DocumentStatus::AwaitingReview) => {
                        awaiting.fetch_add(1, Ordering::Relaxed);
                        let task_id = service
                            .repo
                            .get(&document_id)
                            .ok()
                            .flatten()
                            .and_then(|d| d.review_task_id)
                            .unwrap_or_default();
                        let _ = event_tx
                            .send(ProcessingEvent::DocumentAwaitingReview { document_id, task_id })
                            .await;
                    }
                    Ok(status) => {
                        failed.fetch_add(1, Ordering::Relaxed);
                        let reason = service
                            .repo
                            .get(&document_id)
                            .ok()
                            .flatten()
                            .and_then(|d| d.failure_reason)
                            .map(|r| r.as_str().to_string())
                            .unwrap_or_else(|| status.as_str().to_string());
                        let _ = event_tx
                            .send(ProcessingEvent::DocumentFailed { document_id, reason })
                            .await;
                    }
                    Err(e) => {
                        warn!(document_id = %document_id, error = %e, "processing error");
                        failed.fetch_add(1, Ordering::Relaxed);
                        service
                            .state
                            .force_fail(&document_id, FailureReason::InternalError)
                            .await;
                        let _ = event_tx
                            .send(ProcessingEvent::DocumentFailed {
                                document_id,
                                reason: e.to_string(),
                            })
                            .await;
                    }
                }
            });

            handles.push(handle);
            if handles.len() >= workers {
                for h in handles.drain(..) {
                    let _ = h.await;
                }
            }
        }

        for h in handles {
            let _ = h.await;
        }

        let result = ProcessingResult {
            completed: completed.load(Ordering::Relaxed),
            awaiting_review: awaiting.load(Ordering::Relaxed),
            failed: failed.load(Ordering::Relaxed),
        };

        let _ = event_tx
            .send(ProcessingEvent::Complete {
                completed: result.completed,
                awaiting_review: result.awaiting_review,
                failed: result.failed,
            })
            .await;

        Ok(result)
    }

    /// Drive one document as far as it can go without reviewer input:
    /// to `Completed`, `AwaitingReview`, or `Failed`.
    pub async fn process_document(&self, document_id: &str) -> anyhow::Result<DocumentStatus> {
        match self.state.apply(document_id, DocumentEvent::ExtractRequested).await? {
            Applied::Discarded => return self.current_status(document_id),
            _ => {}
        }

        let doc = self
            .repo
            .get(document_id)?
            .ok_or_else(|| anyhow::anyhow!("document not found: {document_id}"))?;
        if doc.status == DocumentStatus::Failed {
            // cancellation landed at pickup
            return Ok(DocumentStatus::Failed);
        }

        let Some(source_key) = doc.source_key.clone() else {
            self.state
                .apply(
                    document_id,
                    DocumentEvent::ExtractionFailed {
                        reason: FailureReason::SourceUnavailable,
                    },
                )
                .await?;
            return Ok(DocumentStatus::Failed);
        };

        // Extraction, retried with backoff on transient failures.
        let gateway = Arc::clone(&self.gateway);
        let key = source_key.clone();
        let extracted = retry::with_backoff(
            &self.retry,
            move || {
                let gateway = Arc::clone(&gateway);
                let key = key.clone();
                async move { gateway.extract(&key).await }
            },
            ExtractionError::is_retryable,
        )
        .await;

        let extracted = match extracted {
            Ok(entities) => entities,
            Err(e) => {
                let reason = match e {
                    ExtractionError::SourceUnavailable(_) => FailureReason::SourceUnavailable,
                    ExtractionError::Permanent(_) => FailureReason::ExtractionFailed,
                    ExtractionError::Transient(_) => FailureReason::RetriesExhausted,
                };
                warn!(document_id, error = %e, "extraction failed");
                self.state
                    .apply(document_id, DocumentEvent::ExtractionFailed { reason })
                    .await?;
                return Ok(DocumentStatus::Failed);
            }
        };

        // Route and record: auto-accepted records carry their resolution,
        // flagged records stay unresolved until a reviewer rules on them.
        let decision = router::route(&extracted, &self.thresholds);
        let review_needed = decision.requires_review();
        let recorded: Vec<EntityRecord> = extracted
            .into_iter()
            .map(|mut e| {
                if self.thresholds.accepts(&e) {
                    e.resolution = Some(Resolution::Accepted);
                }
                e
            })
            .collect();

        self.state
            .apply(
                document_id,
                DocumentEvent::ExtractionSucceeded {
                    entities: recorded,
                    review_needed,
                },
            )
            .await?;

        // Deferred cancellation checkpoint: honored before any external
        // dispatch and before completion.
        let doc = self
            .repo
            .get(document_id)?
            .ok_or_else(|| anyhow::anyhow!("document not found: {document_id}"))?;
        if doc.cancel_requested {
            self.state.force_fail(document_id, FailureReason::Cancelled).await;
            return Ok(DocumentStatus::Failed);
        }

        if review_needed {
            let dispatcher = Arc::clone(&self.dispatcher);
            let flagged = decision.needs_review;
            let id = document_id.to_string();
            let submitted = retry::with_backoff(
                &self.retry,
                move || {
                    let dispatcher = Arc::clone(&dispatcher);
                    let flagged = flagged.clone();
                    let id = id.clone();
                    async move { dispatcher.submit(&id, flagged).await }
                },
                DispatchError::is_retryable,
            )
            .await;

            let task = match submitted {
                Ok(task) => task,
                Err(e) => {
                    warn!(document_id, error = %e, "review submission failed");
                    let reason = if e.is_retryable() {
                        FailureReason::RetriesExhausted
                    } else {
                        FailureReason::InternalError
                    };
                    self.state.force_fail(document_id, reason).await;
                    return Ok(DocumentStatus::Failed);
                }
            };

            self.state
                .apply(
                    document_id,
                    DocumentEvent::ReviewTaskOpened {
                        task_id: task.task_id.clone(),
                    },
                )
                .await?;
            info!(document_id, task_id = %task.task_id, "document awaiting review");
            return Ok(DocumentStatus::AwaitingReview);
        }

        self.merge_and_complete(document_id).await
    }

    /// Ingest a reviewer completion callback and finish the document.
    ///
    /// Duplicate or stale callbacks surface as [`DispatchError::UnknownTask`].
    pub async fn complete_review(
        &self,
        task_id: &str,
        annotations: Vec<ReviewAnnotation>,
    ) -> anyhow::Result<DocumentStatus> {
        let (task, reviewed) = self.dispatcher.ingest(task_id, annotations).await?;
        let document_id = task.document_id.clone();

        let applied = self
            .state
            .apply(
                &document_id,
                DocumentEvent::ReviewCompleted {
                    task_id: task.task_id.clone(),
                    entities: reviewed,
                },
            )
            .await;

        match applied {
            Ok(Applied::Discarded) => {
                // The document already reached a terminal state (e.g. an
                // earlier fault); the reviewer's work has nowhere to land.
                return self.current_status(&document_id);
            }
            Ok(_) => {}
            Err(e) => {
                warn!(document_id = %document_id, error = %e, "review completion rejected");
                self.state
                    .force_fail(&document_id, FailureReason::InternalError)
                    .await;
                return Err(e.into());
            }
        }

        let doc = self
            .repo
            .get(&document_id)?
            .ok_or_else(|| anyhow::anyhow!("document not found: {document_id}"))?;
        if doc.cancel_requested {
            // Cancellation was deferred while the task was outstanding.
            self.state.force_fail(&document_id, FailureReason::Cancelled).await;
            return Ok(DocumentStatus::Failed);
        }

        self.merge_and_complete(&document_id).await
    }

    /// Expire overdue review tasks and fail their documents.
    pub async fn expire_reviews(&self) -> anyhow::Result<usize> {
        let expired = self.dispatcher.expire_overdue()?;
        let count = expired.len();
        for task in expired {
            if let Err(e) = self
                .state
                .apply(
                    &task.document_id,
                    DocumentEvent::ReviewExpired {
                        task_id: task.task_id.clone(),
                    },
                )
                .await
            {
                warn!(document_id = %task.document_id, task_id = %task.task_id, error = %e, "could not fail document for expired review");
            }
        }
        Ok(count)
    }

    /// Periodic expiry sweep, intended to run for the lifetime of the
    /// server process.
    pub async fn run_expiry_sweep(&self, interval: std::time::Duration) {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            match self.expire_reviews().await {
                Ok(0) => {}
                Ok(n) => info!(expired = n, "review tasks expired"),
                Err(e) => warn!(error = %e, "expiry sweep failed"),
            }
        }
    }

    fn merge_document(&self, document_id: &str) -> anyhow::Result<Vec<EntityRecord>> {
        let doc = self
            .repo
            .get(document_id)?
            .ok_or_else(|| anyhow::anyhow!("document not found: {document_id}"))?;
        Ok(merger::merge(&doc))
    }

    async fn merge_and_complete(&self, document_id: &str) -> anyhow::Result<DocumentStatus> {
        let merged = self.merge_document(document_id)?;
        self.state
            .apply(document_id, DocumentEvent::Merged { entities: merged })
            .await?;
        Ok(DocumentStatus::Completed)
    }
}
