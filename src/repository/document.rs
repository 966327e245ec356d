//! Document repository for SQLite persistence.

use std::path::{Path, PathBuf};

use rusqlite::{params, Connection, Row};

use super::{parse_datetime, RepositoryError, Result};
use crate::models::{Document, DocumentStatus, DocumentSummary, EntityRecord, FailureReason};

/// SQLite-backed store of document records, keyed by document id.
pub struct DocumentRepository {
    db_path: PathBuf,
}

impl DocumentRepository {
    /// Create a new document repository, initializing the schema.
    pub fn new(db_path: &Path) -> Result<Self> {
        let repo = Self {
            db_path: db_path.to_path_buf(),
        };
        repo.init_schema()?;
        Ok(repo)
    }

    fn connect(&self) -> Result<Connection> {
        super::connect(&self.db_path)
    }

    fn init_schema(&self) -> Result<()> {
        let conn = self.connect()?;
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS documents (
                id TEXT PRIMARY KEY,
                status TEXT NOT NULL,
                source_key TEXT,
                entities TEXT NOT NULL DEFAULT '[]',
                review_task_id TEXT,
                failure_reason TEXT,
                cancel_requested INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_documents_status ON documents(status);
            "#,
        )?;
        Ok(())
    }

    /// Insert or update a document record.
    pub fn save(&self, doc: &Document) -> Result<()> {
        let conn = self.connect()?;
        conn.execute(
            r#"
            INSERT OR REPLACE INTO documents
                (id, status, source_key, entities, review_task_id,
                 failure_reason, cancel_requested, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            "#,
            params![
                doc.id,
                doc.status.as_str(),
                doc.source_key,
                serde_json::to_string(&doc.entities)?,
                doc.review_task_id,
                doc.failure_reason.map(|r| r.as_str()),
                doc.cancel_requested as i64,
                doc.created_at.to_rfc3339(),
                doc.updated_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    /// Fetch a document by id.
    pub fn get(&self, id: &str) -> Result<Option<Document>> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare(
            "SELECT id, status, source_key, entities, review_task_id,
                    failure_reason, cancel_requested, created_at, updated_at
             FROM documents WHERE id = ?1",
        )?;
        let mut rows = stmt.query(params![id])?;
        match rows.next()? {
            Some(row) => Ok(Some(row_to_document(row)?)),
            None => Ok(None),
        }
    }

    /// List id/status/updated-at summaries, newest first.
    pub fn list_summaries(&self) -> Result<Vec<DocumentSummary>> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare(
            "SELECT id, status, updated_at FROM documents ORDER BY updated_at DESC",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
            ))
        })?;

        let mut summaries = Vec::new();
        for row in rows {
            let (id, status, updated_at) = row?;
            summaries.push(DocumentSummary {
                id,
                status: parse_status(&status)?,
                updated_at: parse_datetime(&updated_at)?,
            });
        }
        Ok(summaries)
    }

    /// Queued documents whose upload has completed, oldest first.
    pub fn list_ready(&self, limit: usize) -> Result<Vec<Document>> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare(
            "SELECT id, status, source_key, entities, review_task_id,
                    failure_reason, cancel_requested, created_at, updated_at
             FROM documents
             WHERE status = 'queued' AND source_key IS NOT NULL
             ORDER BY created_at ASC
             LIMIT ?1",
        )?;
        let mut rows = stmt.query(params![limit as i64])?;
        let mut docs = Vec::new();
        while let Some(row) = rows.next()? {
            docs.push(row_to_document(row)?);
        }
        Ok(docs)
    }

    /// Count of documents per status.
    pub fn count_by_status(&self) -> Result<Vec<(DocumentStatus, u64)>> {
        let conn = self.connect()?;
        let mut stmt =
            conn.prepare("SELECT status, COUNT(*) FROM documents GROUP BY status")?;
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
        })?;

        let mut counts = Vec::new();
        for row in rows {
            let (status, count) = row?;
            counts.push((parse_status(&status)?, count as u64));
        }
        Ok(counts)
    }
}

fn parse_status(s: &str) -> Result<DocumentStatus> {
    DocumentStatus::from_str(s)
        .ok_or_else(|| RepositoryError::Corrupt(format!("unknown document status '{s}'")))
}

fn row_to_document(row: &Row<'_>) -> Result<Document> {
    let status: String = row.get(1)?;
    let entities_json: String = row.get(3)?;
    let failure_reason: Option<String> = row.get(5)?;
    let created_at: String = row.get(7)?;
    let updated_at: String = row.get(8)?;

    let entities: Vec<EntityRecord> = serde_json::from_str(&entities_json)?;
    let failure_reason = failure_reason
        .map(|s| {
            FailureReason::from_str(&s)
                .ok_or_else(|| RepositoryError::Corrupt(format!("unknown failure reason '{s}'")))
        })
        .transpose()?;

    Ok(Document {
        id: row.get(0)?,
        status: parse_status(&status)?,
        source_key: row.get(2)?,
        entities,
        review_task_id: row.get(4)?,
        failure_reason,
        cancel_requested: row.get::<_, i64>(6)? != 0,
        created_at: parse_datetime(&created_at)?,
        updated_at: parse_datetime(&updated_at)?,
    })
}
