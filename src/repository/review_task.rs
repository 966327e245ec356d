//! Review task repository for SQLite persistence.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, Row};

use super::{parse_datetime, RepositoryError, Result};
use crate::models::{EntityRecord, ReviewTask, ReviewTaskStatus};

/// SQLite-backed store of review tasks, keyed by task id with a
/// back-reference to the owning document.
pub struct ReviewTaskRepository {
    db_path: PathBuf,
}

impl ReviewTaskRepository {
    /// Create a new review task repository, initializing the schema.
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
            CREATE TABLE IF NOT EXISTS review_tasks (
                task_id TEXT PRIMARY KEY,
                document_id TEXT NOT NULL,
                entities_under_review TEXT NOT NULL DEFAULT '[]',
                status TEXT NOT NULL,
                submitted_at TEXT NOT NULL,
                resolved_at TEXT
            );
            CREATE INDEX IF NOT EXISTS idx_review_tasks_document
                ON review_tasks(document_id);
            CREATE INDEX IF NOT EXISTS idx_review_tasks_status
                ON review_tasks(status);
            "#,
        )?;
        Ok(())
    }

    /// Insert or update a review task.
    pub fn save(&self, task: &ReviewTask) -> Result<()> {
        let conn = self.connect()?;
        conn.execute(
            r#"
            INSERT OR REPLACE INTO review_tasks
                (task_id, document_id, entities_under_review, status,
                 submitted_at, resolved_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
            params![
                task.task_id,
                task.document_id,
                serde_json::to_string(&task.entities_under_review)?,
                task.status.as_str(),
                task.submitted_at.to_rfc3339(),
                task.resolved_at.map(|t| t.to_rfc3339()),
            ],
        )?;
        Ok(())
    }

    /// Fetch a task by id.
    pub fn get(&self, task_id: &str) -> Result<Option<ReviewTask>> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare(
            "SELECT task_id, document_id, entities_under_review, status,
                    submitted_at, resolved_at
             FROM review_tasks WHERE task_id = ?1",
        )?;
        let mut rows = stmt.query(params![task_id])?;
        match rows.next()? {
            Some(row) => Ok(Some(row_to_task(row)?)),
            None => Ok(None),
        }
    }

    /// The pending task for a document, if any. At most one task per
    /// document is pending at a time.
    pub fn active_for_document(&self, document_id: &str) -> Result<Option<ReviewTask>> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare(
            "SELECT task_id, document_id, entities_under_review, status,
                    submitted_at, resolved_at
             FROM review_tasks
             WHERE document_id = ?1 AND status = 'pending'
             LIMIT 1",
        )?;
        let mut rows = stmt.query(params![document_id])?;
        match rows.next()? {
            Some(row) => Ok(Some(row_to_task(row)?)),
            None => Ok(None),
        }
    }

    /// All pending tasks, newest first.
    pub fn list_pending(&self) -> Result<Vec<ReviewTask>> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare(
            "SELECT task_id, document_id, entities_under_review, status,
                    submitted_at, resolved_at
             FROM review_tasks
             WHERE status = 'pending'
             ORDER BY submitted_at DESC",
        )?;
        let mut rows = stmt.query([])?;
        let mut tasks = Vec::new();
        while let Some(row) = rows.next()? {
            tasks.push(row_to_task(row)?);
        }
        Ok(tasks)
    }

    /// Pending tasks submitted before the cutoff (expiry candidates).
    pub fn pending_submitted_before(&self, cutoff: DateTime<Utc>) -> Result<Vec<ReviewTask>> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare(
            "SELECT task_id, document_id, entities_under_review, status,
                    submitted_at, resolved_at
             FROM review_tasks
             WHERE status = 'pending' AND submitted_at < ?1",
        )?;
        let mut rows = stmt.query(params![cutoff.to_rfc3339()])?;
        let mut tasks = Vec::new();
        while let Some(row) = rows.next()? {
            tasks.push(row_to_task(row)?);
        }
        Ok(tasks)
    }
}

fn row_to_task(row: &Row<'_>) -> Result<ReviewTask> {
    let entities_json: String = row.get(2)?;
    let status: String = row.get(3)?;
    let submitted_at: String = row.get(4)?;
    let resolved_at: Option<String> = row.get(5)?;

    let entities_under_review: Vec<EntityRecord> = serde_json::from_str(&entities_json)?;
    let status = ReviewTaskStatus::from_str(&status)
        .ok_or_else(|| RepositoryError::Corrupt(format!("unknown task status '{status}'")))?;

    Ok(ReviewTask {
        task_id: row.get(0)?,
        document_id: row.get(1)?,
        entities_under_review,
        status,
        submitted_at: parse_datetime(&submitted_at)?,
        resolved_at: resolved_at.as_deref().map(parse_datetime).transpose()?,
    })
}
