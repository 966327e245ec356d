//! JSON extraction backend for local runs and testing.
//!
//! Treats the stored object as a pre-computed extraction result: a JSON
//! array of `{type, text, confidence}` entries, the same shape a remote
//! entity-extraction service would return. Anything that does not parse is
//! a permanent failure (corrupt/unsupported input).

use async_trait::async_trait;

use super::{EntityExtractor, ExtractedEntity, ExtractionError};

/// Backend reading extraction results directly from the object content.
#[derive(Debug, Default)]
pub struct JsonExtractor;

impl JsonExtractor {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl EntityExtractor for JsonExtractor {
    async fn extract_entities(
        &self,
        source_key: &str,
        content: &[u8],
    ) -> Result<Vec<ExtractedEntity>, ExtractionError> {
        serde_json::from_slice(content).map_err(|e| {
            ExtractionError::Permanent(format!("'{source_key}' is not an entity document: {e}"))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_parses_entity_array() {
        let body = br#"[
            {"type": "diagnosis", "text": "hypertension", "confidence": 0.95},
            {"type": "medication", "text": "lisinopril", "confidence": 0.42}
        ]"#;

        let entities = JsonExtractor::new()
            .extract_entities("ab/doc.json", body)
            .await
            .unwrap();
        assert_eq!(entities.len(), 2);
        assert_eq!(entities[0].entity_type, "diagnosis");
        assert_eq!(entities[1].confidence, 0.42);
    }

    #[tokio::test]
    async fn test_garbage_is_permanent() {
        let err = JsonExtractor::new()
            .extract_entities("ab/doc.bin", b"%PDF-1.4 not json")
            .await
            .unwrap_err();
        assert!(matches!(err, ExtractionError::Permanent(_)));
    }
}
