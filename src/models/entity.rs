//! Clinical entity records extracted from document text.

use serde::{Deserialize, Serialize};

/// Where an entity record came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntitySource {
    /// Produced by the automated extraction pipeline.
    Automated,
    /// Produced (or confirmed) by a human reviewer. Final: a later
    /// automated pass must never overwrite such a record.
    HumanReviewed,
}

impl EntitySource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Automated => "automated",
            Self::HumanReviewed => "human_reviewed",
        }
    }
}

/// Final verdict on an entity, set during merging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Resolution {
    Accepted,
    Corrected,
    Rejected,
}

impl Resolution {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Accepted => "accepted",
            Self::Corrected => "corrected",
            Self::Rejected => "rejected",
        }
    }
}

/// A clinical fact extracted from document text.
///
/// `entity_type` is the extraction collaborator's category (medication,
/// diagnosis, dosage, ...). The core treats it as an opaque string so it
/// stays decoupled from that collaborator's taxonomy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityRecord {
    pub entity_type: String,
    /// The extracted span text (or the reviewer's corrected text).
    pub text: String,
    /// Extraction confidence in [0, 1]. Human-reviewed records carry 1.0.
    pub confidence: f64,
    pub source: EntitySource,
    /// Set once the entity has a final verdict; `None` while an automated
    /// extraction is still awaiting routing or review.
    pub resolution: Option<Resolution>,
}

impl EntityRecord {
    /// Create a record for a freshly extracted entity. Confidence is
    /// clamped into [0, 1] at the gateway boundary.
    pub fn automated(entity_type: impl Into<String>, text: impl Into<String>, confidence: f64) -> Self {
        Self {
            entity_type: entity_type.into(),
            text: text.into(),
            confidence: confidence.clamp(0.0, 1.0),
            source: EntitySource::Automated,
            resolution: None,
        }
    }

    /// Create a record carrying a reviewer's verdict.
    pub fn human_reviewed(
        entity_type: impl Into<String>,
        text: impl Into<String>,
        resolution: Resolution,
    ) -> Self {
        Self {
            entity_type: entity_type.into(),
            text: text.into(),
            confidence: 1.0,
            source: EntitySource::HumanReviewed,
            resolution: Some(resolution),
        }
    }

    /// Whether this record refers to the same span as another: same
    /// category and same text.
    pub fn same_span(&self, other: &EntityRecord) -> bool {
        self.entity_type == other.entity_type && self.text == other.text
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_automated_clamps_confidence() {
        let e = EntityRecord::automated("medication", "warfarin", 1.7);
        assert_eq!(e.confidence, 1.0);
        let e = EntityRecord::automated("medication", "warfarin", -0.2);
        assert_eq!(e.confidence, 0.0);
        assert_eq!(e.source, EntitySource::Automated);
        assert!(e.resolution.is_none());
    }

    #[test]
    fn test_human_reviewed_is_resolved() {
        let e = EntityRecord::human_reviewed("dosage", "5 mg", Resolution::Corrected);
        assert_eq!(e.source, EntitySource::HumanReviewed);
        assert_eq!(e.resolution, Some(Resolution::Corrected));
        assert_eq!(e.confidence, 1.0);
    }
}
