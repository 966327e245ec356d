//! Review tasks handed to the human-review collaborator.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::EntityRecord;

/// Lifecycle of a review task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewTaskStatus {
    Pending,
    Completed,
    Expired,
}

impl ReviewTaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Completed => "completed",
            Self::Expired => "expired",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "completed" => Some(Self::Completed),
            "expired" => Some(Self::Expired),
            _ => None,
        }
    }
}

/// A unit of work submitted to the human-review collaborator.
///
/// Owned exclusively by the document it was created for; a document has at
/// most one active task at a time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReviewTask {
    pub task_id: String,
    pub document_id: String,
    /// Snapshot of the flagged entities at submission time.
    pub entities_under_review: Vec<EntityRecord>,
    pub status: ReviewTaskStatus,
    pub submitted_at: DateTime<Utc>,
    /// When the task completed or expired.
    pub resolved_at: Option<DateTime<Utc>>,
}

impl ReviewTask {
    /// Create a pending task for the given flagged entities.
    pub fn new(document_id: impl Into<String>, entities_under_review: Vec<EntityRecord>) -> Self {
        Self {
            task_id: Uuid::new_v4().to_string(),
            document_id: document_id.into(),
            entities_under_review,
            status: ReviewTaskStatus::Pending,
            submitted_at: Utc::now(),
            resolved_at: None,
        }
    }

    pub fn is_active(&self) -> bool {
        self.status == ReviewTaskStatus::Pending
    }
}
