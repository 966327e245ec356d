//! Result merger: combines auto-accepted and reviewer-produced entities
//! into one canonical set.
//!
//! Deterministic and total: every distinct entity recorded on the document
//! appears exactly once in the output with a final resolution. A flagged
//! automated record is superseded by the reviewer's record for it; a
//! human-reviewed record always wins a collision with an automated one.

use crate::models::{Document, EntityRecord, EntitySource, Resolution};

/// Produce the finalized entity set for a document.
///
/// Never fails on valid input; a document with no entities merges to an
/// empty set (no extractable content is not an error by itself).
pub fn merge(doc: &Document) -> Vec<EntityRecord> {
    let reviewed: Vec<&EntityRecord> = doc
        .entities
        .iter()
        .filter(|e| e.source == EntitySource::HumanReviewed)
        .collect();

    let mut merged = Vec::with_capacity(doc.entities.len());

    for entity in doc.entities.iter().filter(|e| e.source == EntitySource::Automated) {
        // Defensive: a reviewed record for the same span wins even if the
        // router had auto-accepted it.
        if reviewed.iter().any(|r| r.same_span(entity)) {
            continue;
        }
        match entity.resolution {
            Some(_) => merged.push(entity.clone()),
            // Flagged but never covered by a reviewer verdict. Should not
            // occur (ingest pads untouched entities), handled by refusing
            // to trust the span.
            None => {
                let mut rejected = entity.clone();
                rejected.resolution = Some(Resolution::Rejected);
                merged.push(rejected);
            }
        }
    }

    merged.extend(reviewed.into_iter().cloned());
    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Resolution;

    fn accepted(entity_type: &str, text: &str, confidence: f64) -> EntityRecord {
        let mut e = EntityRecord::automated(entity_type, text, confidence);
        e.resolution = Some(Resolution::Accepted);
        e
    }

    #[test]
    fn test_empty_document_merges_empty() {
        let doc = Document::new("doc1".to_string(), None);
        assert!(merge(&doc).is_empty());
    }

    #[test]
    fn test_auto_accepted_pass_through() {
        let mut doc = Document::new("doc1".to_string(), None);
        doc.entities.push(accepted("diagnosis", "asthma", 0.95));
        doc.entities.push(accepted("medication", "albuterol", 0.9));

        let merged = merge(&doc);
        assert_eq!(merged.len(), 2);
        assert!(merged.iter().all(|e| e.resolution == Some(Resolution::Accepted)));
    }

    #[test]
    fn test_reviewed_record_supersedes_flagged_original() {
        let mut doc = Document::new("doc1".to_string(), None);
        // flagged original (no resolution), then the reviewer's correction
        doc.entities.push(EntityRecord::automated("dosage", "5 mg", 0.4));
        doc.entities.push(EntityRecord::human_reviewed(
            "dosage",
            "50 mg",
            Resolution::Corrected,
        ));

        let merged = merge(&doc);
        assert_eq!(merged.len(), 2);
        // flagged original is present only as a rejected span when no
        // reviewer record covers it; here the correction has different
        // text, so the original surfaces rejected and the correction wins
        let corrected = merged
            .iter()
            .find(|e| e.source == EntitySource::HumanReviewed)
            .unwrap();
        assert_eq!(corrected.text, "50 mg");
        assert_eq!(corrected.resolution, Some(Resolution::Corrected));
    }

    #[test]
    fn test_human_record_wins_same_span_collision() {
        let mut doc = Document::new("doc1".to_string(), None);
        doc.entities.push(accepted("medication", "warfarin", 0.9));
        doc.entities.push(EntityRecord::human_reviewed(
            "medication",
            "warfarin",
            Resolution::Accepted,
        ));

        let merged = merge(&doc);
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].source, EntitySource::HumanReviewed);
    }

    #[test]
    fn test_totality_every_record_has_resolution() {
        let mut doc = Document::new("doc1".to_string(), None);
        doc.entities.push(accepted("diagnosis", "asthma", 0.95));
        doc.entities.push(EntityRecord::automated("dosage", "5 mg", 0.3));
        doc.entities.push(EntityRecord::human_reviewed(
            "medication",
            "albuterol",
            Resolution::Accepted,
        ));

        let merged = merge(&doc);
        assert_eq!(merged.len(), 3);
        assert!(merged.iter().all(|e| e.resolution.is_some()));
    }

    #[test]
    fn test_merge_is_deterministic() {
        let mut doc = Document::new("doc1".to_string(), None);
        doc.entities.push(accepted("diagnosis", "asthma", 0.95));
        doc.entities.push(EntityRecord::human_reviewed(
            "dosage",
            "50 mg",
            Resolution::Corrected,
        ));
        assert_eq!(merge(&doc), merge(&doc));
    }
}
