//! SQLite checkpoint store implementation.
//!
//! Implements `CheckpointStore` from `waystone-core` using sqlx with split
//! read/write pools. Rows are append-only; the autoincrement `seq` column
//! preserves write order, so "latest" is simply the highest `seq` for a
//! workflow id.

use chrono::{DateTime, Utc};
use sqlx::Row;
use uuid::Uuid;
use waystone_core::repository::checkpoint::CheckpointStore;
use waystone_types::error::RepositoryError;
use waystone_types::workflow::{CheckpointStatus, ExecutionCheckpoint};

use super::pool::DatabasePool;

const SELECT_COLUMNS: &str = "id, workflow_id, step_number, step_name, status, state, input, \
     output, state_updates, error, attempts, duration_ms, created_at";

/// SQLite-backed implementation of `CheckpointStore`.
#[derive(Clone)]
pub struct SqliteCheckpointStore {
    pool: DatabasePool,
}

impl SqliteCheckpointStore {
    /// Create a new store backed by the given database pool.
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &DatabasePool {
        &self.pool
    }
}

// ---------------------------------------------------------------------------
// Internal row type
// ---------------------------------------------------------------------------

struct CheckpointRow {
    id: String,
    workflow_id: String,
    step_number: i64,
    step_name: String,
    status: String,
    state: String,
    input: String,
    output: String,
    state_updates: String,
    error: Option<String>,
    attempts: i64,
    duration_ms: i64,
    created_at: String,
}

impl CheckpointRow {
    fn from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            workflow_id: row.try_get("workflow_id")?,
            step_number: row.try_get("step_number")?,
            step_name: row.try_get("step_name")?,
            status: row.try_get("status")?,
            state: row.try_get("state")?,
            input: row.try_get("input")?,
            output: row.try_get("output")?,
            state_updates: row.try_get("state_updates")?,
            error: row.try_get("error")?,
            attempts: row.try_get("attempts")?,
            duration_ms: row.try_get("duration_ms")?,
            created_at: row.try_get("created_at")?,
        })
    }

    fn into_checkpoint(self) -> Result<ExecutionCheckpoint, RepositoryError> {
        let status: CheckpointStatus = self.status.parse().map_err(RepositoryError::Query)?;
        let step_number = u32::try_from(self.step_number).map_err(|_| {
            RepositoryError::Query(format!("invalid step number: {}", self.step_number))
        })?;

        Ok(ExecutionCheckpoint {
            id: parse_uuid(&self.id)?,
            workflow_id: self.workflow_id,
            step_number,
            step_name: self.step_name,
            status,
            state: self.state,
            input: self.input,
            output: self.output,
            state_updates: self.state_updates,
            error: self.error,
            attempts: u32::try_from(self.attempts).unwrap_or(0),
            duration_ms: u64::try_from(self.duration_ms).unwrap_or(0),
            created_at: parse_datetime(&self.created_at)?,
        })
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn parse_uuid(s: &str) -> Result<Uuid, RepositoryError> {
    s.parse::<Uuid>()
        .map_err(|e| RepositoryError::Query(format!("invalid UUID: {e}")))
}

fn parse_datetime(s: &str) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| RepositoryError::Query(format!("invalid datetime: {e}")))
}

fn format_datetime(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339()
}

// ---------------------------------------------------------------------------
// CheckpointStore impl
// ---------------------------------------------------------------------------

impl CheckpointStore for SqliteCheckpointStore {
    async fn write_checkpoint(&self, checkpoint: &ExecutionCheckpoint) -> Result<(), RepositoryError> {
        sqlx::query(
            r#"INSERT INTO execution_checkpoints
               (id, workflow_id, step_number, step_name, status, state, input, output,
                state_updates, error, attempts, duration_ms, created_at)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
        )
        .bind(checkpoint.id.to_string())
        .bind(&checkpoint.workflow_id)
        .bind(i64::from(checkpoint.step_number))
        .bind(&checkpoint.step_name)
        .bind(checkpoint.status.as_str())
        .bind(&checkpoint.state)
        .bind(&checkpoint.input)
        .bind(&checkpoint.output)
        .bind(&checkpoint.state_updates)
        .bind(&checkpoint.error)
        .bind(i64::from(checkpoint.attempts))
        .bind(i64::try_from(checkpoint.duration_ms).unwrap_or(i64::MAX))
        .bind(format_datetime(&checkpoint.created_at))
        .execute(&self.pool.writer)
        .await
        .map_err(|e| match &e {
            sqlx::Error::Database(db) if db.is_unique_violation() => {
                RepositoryError::Conflict(format!("checkpoint {} already written", checkpoint.id))
            }
            _ => RepositoryError::Query(e.to_string()),
        })?;

        Ok(())
    }

    async fn read_latest(
        &self,
        workflow_id: &str,
    ) -> Result<Option<ExecutionCheckpoint>, RepositoryError> {
        let sql = format!(
            "SELECT {SELECT_COLUMNS} FROM execution_checkpoints WHERE workflow_id = ? ORDER BY seq DESC LIMIT 1"
        );
        let row = sqlx::query(&sql)
            .bind(workflow_id)
            .fetch_optional(&self.pool.reader)
            .await
            .map_err(|e| RepositoryError::Query(e.to_string()))?;

        match row {
            Some(row) => {
                let r = CheckpointRow::from_row(&row)
                    .map_err(|e| RepositoryError::Query(e.to_string()))?;
                Ok(Some(r.into_checkpoint()?))
            }
            None => Ok(None),
        }
    }

    async fn read_all(&self, workflow_id: &str) -> Result<Vec<ExecutionCheckpoint>, RepositoryError> {
        let sql = format!(
            "SELECT {SELECT_COLUMNS} FROM execution_checkpoints WHERE workflow_id = ? ORDER BY seq ASC"
        );
        let rows = sqlx::query(&sql)
            .bind(workflow_id)
            .fetch_all(&self.pool.reader)
            .await
            .map_err(|e| RepositoryError::Query(e.to_string()))?;

        let mut checkpoints = Vec::with_capacity(rows.len());
        for row in &rows {
            let r = CheckpointRow::from_row(row)
                .map_err(|e| RepositoryError::Query(e.to_string()))?;
            checkpoints.push(r.into_checkpoint()?);
        }
        Ok(checkpoints)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
