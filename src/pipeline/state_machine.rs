//! Document state machine: the single writer of document lifecycle state.
//!
//! Every external completion (extraction result, review callback, expiry,
//! cancellation) is applied here as a [`DocumentEvent`]. Events for one
//! document are serialized through a per-id lock, so at most one transition
//! is active per document at a time. Stale or duplicate events against a
//! terminal document are detected and discarded as no-ops.
//!
//! ```text
//! QUEUED --(extract requested)--> EXTRACTING
//! EXTRACTING --(success, no review needed)--> MERGING --> COMPLETED
//! EXTRACTING --(success, review needed)--> AWAITING_REVIEW
//! EXTRACTING --(permanent extraction failure)--> FAILED
//! AWAITING_REVIEW --(review completed)--> MERGING --> COMPLETED
//! AWAITING_REVIEW --(review expired)--> FAILED
//! any non-terminal --(unrecoverable error)--> FAILED
//! ```

use std::collections::HashMap;
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, error, warn};

use crate::models::{Document, DocumentStatus, EntityRecord, EntitySource, FailureReason};
use crate::repository::{DocumentRepository, RepositoryError};

/// Errors from applying an event.
#[derive(Debug, Error)]
pub enum StateError {
    #[error("document {0} not found")]
    NotFound(String),

    #[error("document {id}: {from:?} cannot accept {event}")]
    InvalidTransition {
        id: String,
        from: DocumentStatus,
        event: &'static str,
    },

    #[error("document {id}: event for task {event_task} but active task is {active_task:?}")]
    TaskMismatch {
        id: String,
        event_task: String,
        active_task: Option<String>,
    },

    #[error("document {id}: invariant violated after {event}: {detail}")]
    InvariantViolated {
        id: String,
        event: &'static str,
        detail: String,
    },

    #[error(transparent)]
    Storage(#[from] RepositoryError),
}

/// An event driving a document through its lifecycle.
#[derive(Debug, Clone)]
pub enum DocumentEvent {
    /// The uploaded bytes landed in object storage.
    SourceAttached { source_key: String },
    /// A worker picked the document up for extraction.
    ExtractRequested,
    /// Extraction finished; entities carry the router's outcome
    /// (auto-accepted records resolved, flagged records unresolved).
    ExtractionSucceeded {
        entities: Vec<EntityRecord>,
        review_needed: bool,
    },
    /// Extraction failed past any retry budget.
    ExtractionFailed { reason: FailureReason },
    /// A review task was accepted by the human-review collaborator.
    ReviewTaskOpened { task_id: String },
    /// The reviewer completed the task; records replace the flagged set.
    ReviewCompleted {
        task_id: String,
        entities: Vec<EntityRecord>,
    },
    /// The review task expired without reviewer input.
    ReviewExpired { task_id: String },
    /// The merger produced the finalized entity set.
    Merged { entities: Vec<EntityRecord> },
    /// Cancellation requested by the caller.
    CancelRequested,
    /// Unrecoverable error observed outside the normal edges.
    Fault { reason: FailureReason },
}

impl DocumentEvent {
    pub fn name(&self) -> &'static str {
        match self {
            Self::SourceAttached { .. } => "source_attached",
            Self::ExtractRequested => "extract_requested",
            Self::ExtractionSucceeded { .. } => "extraction_succeeded",
            Self::ExtractionFailed { .. } => "extraction_failed",
            Self::ReviewTaskOpened { .. } => "review_task_opened",
            Self::ReviewCompleted { .. } => "review_completed",
            Self::ReviewExpired { .. } => "review_expired",
            Self::Merged { .. } => "merged",
            Self::CancelRequested => "cancel_requested",
            Self::Fault { .. } => "fault",
        }
    }
}

/// Result of applying an event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Applied {
    /// The document moved to a new status.
    Transitioned {
        from: DocumentStatus,
        to: DocumentStatus,
    },
    /// The record changed without a status transition.
    Updated,
    /// Stale or duplicate event; dropped as a no-op.
    Discarded,
}

/// Per-document mutual exclusion: at most one active transition per id.
#[derive(Clone, Default)]
pub struct DocumentLocks {
    inner: Arc<Mutex<HashMap<String, Arc<Mutex<()>>>>>,
}

impl DocumentLocks {
    pub async fn acquire(&self, id: &str) -> OwnedMutexGuard<()> {
        let entry = {
            let mut map = self.inner.lock().await;
            map.entry(id.to_string()).or_default().clone()
        };
        entry.lock_owned().await
    }
}

/// Owns the authoritative lifecycle record of each document.
pub struct DocumentStateMachine {
    repo: Arc<DocumentRepository>,
    locks: DocumentLocks,
}

impl DocumentStateMachine {
    pub fn new(repo: Arc<DocumentRepository>) -> Self {
        Self {
            repo,
            locks: DocumentLocks::default(),
        }
    }

    /// Apply an event to a document, serialized against all other events
    /// for the same id.
    ///
    /// An invariant violation after a transition forces the document to
    /// `Failed` rather than leaving it inconsistent.
    pub async fn apply(&self, document_id: &str, event: DocumentEvent) -> Result<Applied, StateError> {
        let _guard = self.locks.acquire(document_id).await;

        let mut doc = self
            .repo
            .get(document_id)?
            .ok_or_else(|| StateError::NotFound(document_id.to_string()))?;

        let event_name = event.name();
        let from = doc.status;
        let applied = transition(&mut doc, event)?;

        match &applied {
            Applied::Discarded => {
                debug!(document_id, event = event_name, status = from.as_str(), "discarded stale event");
                return Ok(applied);
            }
            Applied::Transitioned { from, to } => {
                debug!(document_id, event = event_name, from = from.as_str(), to = to.as_str(), "transition");
            }
            Applied::Updated => {
                debug!(document_id, event = event_name, status = from.as_str(), "record updated");
            }
        }

        if let Err(detail) = check_invariants(&doc) {
            error!(document_id, event = event_name, detail, "invariant violated; forcing failed");
            fail(&mut doc, FailureReason::InternalError);
            doc.touch();
            self.repo.save(&doc)?;
            return Err(StateError::InvariantViolated {
                id: document_id.to_string(),
                event: event_name,
                detail,
            });
        }

        doc.touch();
        self.repo.save(&doc)?;
        Ok(applied)
    }

    /// Force a document into `Failed` after an unrecoverable error. A
    /// terminal document is left alone.
    pub async fn force_fail(&self, document_id: &str, reason: FailureReason) {
        match self.apply(document_id, DocumentEvent::Fault { reason }).await {
            Ok(_) => {}
            Err(e) => warn!(document_id, error = %e, "could not force-fail document"),
        }
    }
}

fn fail(doc: &mut Document, reason: FailureReason) {
    doc.status = DocumentStatus::Failed;
    doc.failure_reason = Some(reason);
    doc.review_task_id = None;
}

/// Apply an event to an in-memory record. Pure with respect to storage.
fn transition(doc: &mut Document, event: DocumentEvent) -> Result<Applied, StateError> {
    use DocumentStatus::*;

    // Terminal states absorb everything: late callbacks and retries for a
    // finished document are duplicates, not errors.
    if doc.status.is_terminal() {
        return Ok(Applied::Discarded);
    }

    let from = doc.status;
    let transitioned = |to: DocumentStatus| Applied::Transitioned { from, to };

    match (doc.status, event) {
        (Queued, DocumentEvent::SourceAttached { source_key }) => {
            doc.source_key = Some(source_key);
            Ok(Applied::Updated)
        }

        (Queued, DocumentEvent::ExtractRequested) => {
            if doc.cancel_requested {
                fail(doc, FailureReason::Cancelled);
                return Ok(transitioned(Failed));
            }
            doc.status = Extracting;
            Ok(transitioned(Extracting))
        }
        // A duplicate pickup of an in-flight document is a no-op.
        (Extracting, DocumentEvent::ExtractRequested) => Ok(Applied::Discarded),

        (Extracting, DocumentEvent::ExtractionSucceeded { entities, review_needed }) => {
            doc.replace_automated_entities(entities);
            if review_needed {
                // The review task is dispatched next; AWAITING_REVIEW is
                // entered only once the task id exists.
                Ok(Applied::Updated)
            } else {
                doc.status = Merging;
                Ok(transitioned(Merging))
            }
        }

        (Extracting, DocumentEvent::ExtractionFailed { reason }) => {
            if reason == FailureReason::SourceUnavailable {
                // Nothing was extracted; no partial result to preserve.
                doc.entities.retain(|e| e.source == EntitySource::HumanReviewed);
            }
            fail(doc, reason);
            Ok(transitioned(Failed))
        }

        (Extracting, DocumentEvent::ReviewTaskOpened { task_id }) => {
            doc.status = AwaitingReview;
            doc.review_task_id = Some(task_id);
            Ok(transitioned(AwaitingReview))
        }

        (AwaitingReview, DocumentEvent::ReviewCompleted { task_id, entities }) => {
            if doc.review_task_id.as_deref() != Some(task_id.as_str()) {
                return Err(StateError::TaskMismatch {
                    id: doc.id.clone(),
                    event_task: task_id,
                    active_task: doc.review_task_id.clone(),
                });
            }
            // Reviewed records replace the flagged originals; the task
            // snapshot preserves what the reviewer saw.
            doc.entities
                .retain(|e| !(e.source == EntitySource::Automated && e.resolution.is_none()));
            doc.append_reviewed_entities(entities);
            doc.review_task_id = None;
            doc.status = Merging;
            Ok(transitioned(Merging))
        }

        (AwaitingReview, DocumentEvent::ReviewExpired { task_id }) => {
            if doc.review_task_id.as_deref() != Some(task_id.as_str()) {
                return Err(StateError::TaskMismatch {
                    id: doc.id.clone(),
                    event_task: task_id,
                    active_task: doc.review_task_id.clone(),
                });
            }
            fail(doc, FailureReason::ReviewTimeout);
            Ok(transitioned(Failed))
        }

        (Merging, DocumentEvent::Merged { entities }) => {
            doc.entities = entities;
            doc.status = Completed;
            Ok(transitioned(Completed))
        }

        (Queued, DocumentEvent::CancelRequested) => {
            // Nothing is in flight yet; cancel immediately.
            fail(doc, FailureReason::Cancelled);
            Ok(transitioned(Failed))
        }
        (Extracting | AwaitingReview, DocumentEvent::CancelRequested) => {
            // Deferred: applied at the next checkpoint, or when the
            // outstanding review task resolves or expires.
            doc.cancel_requested = true;
            Ok(Applied::Updated)
        }
        // Past the point of cancellation; completion proceeds.
        (Merging, DocumentEvent::CancelRequested) => Ok(Applied::Discarded),

        (_, DocumentEvent::Fault { reason }) => {
            fail(doc, reason);
            Ok(transitioned(Failed))
        }

        (_, event) => Err(StateError::InvalidTransition {
            id: doc.id.clone(),
            from: doc.status,
            event: event.name(),
        }),
    }
}

/// Structural invariants checked after every applied event.
fn check_invariants(doc: &Document) -> Result<(), String> {
    let awaiting = doc.status == DocumentStatus::AwaitingReview;
    if doc.review_task_id.is_some() != awaiting {
        return Err(format!(
            "review_task_id {:?} inconsistent with status {}",
            doc.review_task_id,
            doc.status.as_str()
        ));
    }
    let failed = doc.status == DocumentStatus::Failed;
    if doc.failure_reason.is_some() != failed {
        return Err(format!(
            "failure_reason {:?} inconsistent with status {}",
            doc.failure_reason,
            doc.status.as_str()
        ));
    }
    Ok(())
}
