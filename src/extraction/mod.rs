//! Extraction gateway: uniform interface to the text- and entity-extraction
//! collaborators.
//!
//! The gateway verifies the source object is readable, invokes the
//! extraction backend under a timeout, and normalizes its output into
//! [`EntityRecord`]s with `source = Automated`. The backends themselves are
//! external services behind the [`EntityExtractor`] trait.

mod json;

pub use json::JsonExtractor;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::models::EntityRecord;
use crate::storage::ObjectStore;

/// Errors from the extraction boundary.
#[derive(Debug, Error)]
pub enum ExtractionError {
    /// The source object does not exist or cannot be read.
    #[error("source unavailable: {0}")]
    SourceUnavailable(String),

    /// Upstream timeout or throttling; the caller retries with backoff.
    #[error("transient extraction failure: {0}")]
    Transient(String),

    /// Corrupt or unsupported input; never retried.
    #[error("permanent extraction failure: {0}")]
    Permanent(String),
}

impl ExtractionError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transient(_))
    }
}

/// Raw entity as reported by the extraction collaborator, before
/// normalization.
#[derive(Debug, Clone, serde::Deserialize)]
pub struct ExtractedEntity {
    #[serde(rename = "type")]
    pub entity_type: String,
    pub text: String,
    pub confidence: f64,
}

/// Entity-extraction backend. Implementations are expected to be
/// idempotent: re-invoking with the same content yields equivalent
/// entities.
#[async_trait]
pub trait EntityExtractor: Send + Sync {
    async fn extract_entities(
        &self,
        source_key: &str,
        content: &[u8],
    ) -> Result<Vec<ExtractedEntity>, ExtractionError>;
}

/// Gateway normalizing extraction-collaborator output into entity records.
pub struct ExtractionGateway {
    store: Arc<dyn ObjectStore>,
    extractor: Arc<dyn EntityExtractor>,
    timeout: Duration,
}

impl ExtractionGateway {
    pub fn new(
        store: Arc<dyn ObjectStore>,
        extractor: Arc<dyn EntityExtractor>,
        timeout: Duration,
    ) -> Self {
        Self {
            store,
            extractor,
            timeout,
        }
    }

    /// Extract entities from the object at `source_key`.
    ///
    /// Returns records with `source = Automated` and resolution unset.
    /// Confidence scores are clamped into [0, 1] at this boundary.
    pub async fn extract(&self, source_key: &str) -> Result<Vec<EntityRecord>, ExtractionError> {
        match self.store.object_exists(source_key).await {
            Ok(true) => {}
            Ok(false) => {
                return Err(ExtractionError::SourceUnavailable(format!(
                    "no object at '{source_key}'"
                )))
            }
            Err(e) => return Err(ExtractionError::Transient(e.to_string())),
        }

        let content = self
            .store
            .get_object(source_key)
            .await
            .map_err(|e| ExtractionError::SourceUnavailable(e.to_string()))?;

        let raw = tokio::time::timeout(
            self.timeout,
            self.extractor.extract_entities(source_key, &content),
        )
        .await
        .map_err(|_| ExtractionError::Transient("extraction timed out".to_string()))??;

        Ok(raw
            .into_iter()
            .map(|e| EntityRecord::automated(e.entity_type, e.text, e.confidence))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::EntitySource;
    use crate::storage::FsObjectStore;

    struct FixedExtractor(Vec<ExtractedEntity>);

    #[async_trait]
    impl EntityExtractor for FixedExtractor {
        async fn extract_entities(
            &self,
            _source_key: &str,
            _content: &[u8],
        ) -> Result<Vec<ExtractedEntity>, ExtractionError> {
            Ok(self.0.clone())
        }
    }

    fn gateway(dir: &tempfile::TempDir, extractor: Arc<dyn EntityExtractor>) -> ExtractionGateway {
        ExtractionGateway::new(
            Arc::new(FsObjectStore::new(dir.path())),
            extractor,
            Duration::from_secs(5),
        )
    }

    #[tokio::test]
    async fn test_missing_source_is_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let gw = gateway(&dir, Arc::new(FixedExtractor(vec![])));

        let err = gw.extract("ab/missing.bin").await.unwrap_err();
        assert!(matches!(err, ExtractionError::SourceUnavailable(_)));
        assert!(!err.is_retryable());
    }

    #[tokio::test]
    async fn test_normalizes_to_automated_records() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsObjectStore::new(dir.path());
        store.put_object("ab/doc.bin", b"chart").await.unwrap();

        let gw = gateway(
            &dir,
            Arc::new(FixedExtractor(vec![ExtractedEntity {
                entity_type: "medication".to_string(),
                text: "warfarin".to_string(),
                confidence: 1.4,
            }])),
        );

        let entities = gw.extract("ab/doc.bin").await.unwrap();
        assert_eq!(entities.len(), 1);
        assert_eq!(entities[0].source, EntitySource::Automated);
        assert!(entities[0].resolution.is_none());
        // clamped at the boundary
        assert_eq!(entities[0].confidence, 1.0);
    }
}
