//! Document lifecycle records.
//!
//! A document is the unit of orchestration: it owns the entities extracted
//! from it, the reference to at most one outstanding review task, and the
//! lifecycle status that the state machine drives.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{EntityRecord, EntitySource};

/// Lifecycle status of a document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentStatus {
    Queued,
    Extracting,
    AwaitingReview,
    Merging,
    Completed,
    Failed,
}

impl DocumentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Extracting => "extracting",
            Self::AwaitingReview => "awaiting_review",
            Self::Merging => "merging",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "queued" => Some(Self::Queued),
            "extracting" => Some(Self::Extracting),
            "awaiting_review" => Some(Self::AwaitingReview),
            "merging" => Some(Self::Merging),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }

    /// Terminal states accept no further transitions.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

/// Category recorded on a failed document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureReason {
    /// The uploaded object was missing or unreadable.
    SourceUnavailable,
    /// The extraction collaborator reported a non-retryable failure.
    ExtractionFailed,
    /// A transient failure persisted past the retry budget.
    RetriesExhausted,
    /// The review task expired without reviewer input.
    ReviewTimeout,
    /// Processing was cancelled before completion.
    Cancelled,
    /// An invariant violation forced the document out of an
    /// inconsistent state.
    InternalError,
}

impl FailureReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SourceUnavailable => "source_unavailable",
            Self::ExtractionFailed => "extraction_failed",
            Self::RetriesExhausted => "retries_exhausted",
            Self::ReviewTimeout => "review_timeout",
            Self::Cancelled => "cancelled",
            Self::InternalError => "internal_error",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "source_unavailable" => Some(Self::SourceUnavailable),
            "extraction_failed" => Some(Self::ExtractionFailed),
            "retries_exhausted" => Some(Self::RetriesExhausted),
            "review_timeout" => Some(Self::ReviewTimeout),
            "cancelled" => Some(Self::Cancelled),
            "internal_error" => Some(Self::InternalError),
            _ => None,
        }
    }
}

/// A medical document moving through the processing pipeline.
///
/// The orchestrator holds a storage key for the raw upload, never the
/// bytes. `entities` is append/replace only: records are accumulated
/// across extraction and review, and a human-reviewed record is never
/// overwritten by a later automated pass.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    /// Unique identifier, assigned at upload time.
    pub id: String,
    pub status: DocumentStatus,
    /// Storage key of the raw uploaded object; `None` until the upload
    /// completes.
    pub source_key: Option<String>,
    /// Entities accumulated across extraction and review, in extraction
    /// order with reviewed records appended.
    pub entities: Vec<EntityRecord>,
    /// Outstanding review task; set if and only if
    /// `status == AwaitingReview`.
    pub review_task_id: Option<String>,
    /// Set if and only if `status == Failed`.
    pub failure_reason: Option<FailureReason>,
    /// Cancellation was requested but could not yet be applied (an
    /// external review task is still outstanding).
    pub cancel_requested: bool,
    pub created_at: DateTime<Utc>,
    /// Advances on every state transition.
    pub updated_at: DateTime<Utc>,
}

impl Document {
    /// Create a new document record in `Queued` state.
    pub fn new(id: String, source_key: Option<String>) -> Self {
        let now = Utc::now();
        Self {
            id,
            status: DocumentStatus::Queued,
            source_key,
            entities: Vec::new(),
            review_task_id: None,
            failure_reason: None,
            cancel_requested: false,
            created_at: now,
            updated_at: now,
        }
    }

    /// Advance the modification timestamp.
    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }

    /// Replace the automated entity set with a fresh extraction result.
    ///
    /// Human-reviewed records survive the replacement, so a retried
    /// (possibly non-deterministic) extraction can never duplicate or
    /// clobber reviewer input.
    pub fn replace_automated_entities(&mut self, extracted: Vec<EntityRecord>) {
        let reviewed: Vec<EntityRecord> = self
            .entities
            .drain(..)
            .filter(|e| e.source == EntitySource::HumanReviewed)
            .collect();
        self.entities = extracted;
        self.entities.extend(reviewed);
    }

    /// Append reviewer-produced records.
    pub fn append_reviewed_entities(&mut self, reviewed: Vec<EntityRecord>) {
        self.entities.extend(reviewed);
    }

    /// Entities the router flagged for review: automated records without
    /// a resolution.
    pub fn flagged_entities(&self) -> Vec<EntityRecord> {
        self.entities
            .iter()
            .filter(|e| e.source == EntitySource::Automated && e.resolution.is_none())
            .cloned()
            .collect()
    }
}

/// Listing row for the document index endpoints.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentSummary {
    pub id: String,
    pub status: DocumentStatus,
    pub updated_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Resolution;

    #[test]
    fn test_status_round_trip() {
        for status in [
            DocumentStatus::Queued,
            DocumentStatus::Extracting,
            DocumentStatus::AwaitingReview,
            DocumentStatus::Merging,
            DocumentStatus::Completed,
            DocumentStatus::Failed,
        ] {
            assert_eq!(DocumentStatus::from_str(status.as_str()), Some(status));
        }
        assert_eq!(DocumentStatus::from_str("bogus"), None);
    }

    #[test]
    fn test_terminal_states() {
        assert!(DocumentStatus::Completed.is_terminal());
        assert!(DocumentStatus::Failed.is_terminal());
        assert!(!DocumentStatus::AwaitingReview.is_terminal());
    }

    #[test]
    fn test_replace_automated_preserves_reviewed() {
        let mut doc = Document::new("doc1".to_string(), Some("ab/abcd1234.bin".to_string()));
        doc.entities.push(EntityRecord::automated("diagnosis", "asthma", 0.4));
        doc.entities.push(EntityRecord::human_reviewed(
            "diagnosis",
            "chronic asthma",
            Resolution::Corrected,
        ));

        doc.replace_automated_entities(vec![EntityRecord::automated("medication", "albuterol", 0.9)]);

        assert_eq!(doc.entities.len(), 2);
        assert_eq!(doc.entities[0].text, "albuterol");
        assert_eq!(doc.entities[1].source, EntitySource::HumanReviewed);
    }

    #[test]
    fn test_flagged_entities_are_unresolved_automated() {
        let mut doc = Document::new("doc1".to_string(), None);
        let mut accepted = EntityRecord::automated("diagnosis", "asthma", 0.95);
        accepted.resolution = Some(Resolution::Accepted);
        doc.entities.push(accepted);
        doc.entities.push(EntityRecord::automated("medication", "warfarin", 0.4));

        let flagged = doc.flagged_entities();
        assert_eq!(flagged.len(), 1);
        assert_eq!(flagged[0].text, "warfarin");
    }
}
