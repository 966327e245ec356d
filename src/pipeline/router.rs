//! Confidence router: partitions extracted entities into auto-accepted vs
//! needing review.
//!
//! Pure decision logic, no side effects: the same entities and thresholds
//! always produce the same partition.

use crate::config::Thresholds;
use crate::models::EntityRecord;

/// Outcome of routing a document's extracted entities.
#[derive(Debug, Clone, PartialEq)]
pub struct RoutingDecision {
    /// Entities meeting their applicable threshold.
    pub auto_accepted: Vec<EntityRecord>,
    /// Entities below threshold, to be escalated to human review.
    pub needs_review: Vec<EntityRecord>,
}

impl RoutingDecision {
    /// Whole-document rule: any flagged entity routes the entire document
    /// through review rather than surfacing unverified entities alongside
    /// verified ones.
    pub fn requires_review(&self) -> bool {
        !self.needs_review.is_empty()
    }
}

/// Partition entities by confidence. An entity is auto-accepted iff its
/// confidence is at or above the threshold for its type (>=, not >);
/// relative order is preserved within each partition.
pub fn route(entities: &[EntityRecord], thresholds: &Thresholds) -> RoutingDecision {
    let mut auto_accepted = Vec::new();
    let mut needs_review = Vec::new();
    for entity in entities {
        if thresholds.accepts(entity) {
            auto_accepted.push(entity.clone());
        } else {
            needs_review.push(entity.clone());
        }
    }
    RoutingDecision {
        auto_accepted,
        needs_review,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn thresholds(default: f64) -> Thresholds {
        Thresholds {
            default_threshold: default,
            per_type: Default::default(),
        }
    }

    #[test]
    fn test_every_entity_lands_in_exactly_one_partition() {
        let entities = vec![
            EntityRecord::automated("diagnosis", "asthma", 0.95),
            EntityRecord::automated("medication", "warfarin", 0.4),
            EntityRecord::automated("dosage", "5 mg", 0.8),
        ];
        let decision = route(&entities, &thresholds(0.8));

        assert_eq!(
            decision.auto_accepted.len() + decision.needs_review.len(),
            entities.len()
        );
        assert_eq!(decision.auto_accepted.len(), 2);
        assert_eq!(decision.needs_review[0].text, "warfarin");
    }

    #[test]
    fn test_confidence_at_threshold_auto_accepts() {
        let entities = vec![EntityRecord::automated("diagnosis", "asthma", 0.8)];
        let decision = route(&entities, &thresholds(0.8));
        assert_eq!(decision.auto_accepted.len(), 1);
        assert!(!decision.requires_review());
    }

    #[test]
    fn test_per_type_override_beats_default() {
        let mut t = thresholds(0.5);
        t.per_type.insert("medication".to_string(), 0.9);

        let entities = vec![
            EntityRecord::automated("medication", "warfarin", 0.7),
            EntityRecord::automated("diagnosis", "asthma", 0.7),
        ];
        let decision = route(&entities, &t);
        assert_eq!(decision.needs_review.len(), 1);
        assert_eq!(decision.needs_review[0].entity_type, "medication");
        assert!(decision.requires_review());
    }

    #[test]
    fn test_route_is_deterministic() {
        let entities = vec![
            EntityRecord::automated("diagnosis", "copd", 0.81),
            EntityRecord::automated("medication", "tiotropium", 0.79),
        ];
        let t = thresholds(0.8);
        assert_eq!(route(&entities, &t), route(&entities, &t));
    }

    #[test]
    fn test_empty_input_needs_no_review() {
        let decision = route(&[], &thresholds(0.8));
        assert!(!decision.requires_review());
        assert!(decision.auto_accepted.is_empty());
    }
}
