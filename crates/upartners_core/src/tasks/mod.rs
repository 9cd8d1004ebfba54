//! Fire-and-forget background jobs.
//!
//! # Responsibility
//! - Define the two deferred jobs: labelling-flow update and message export.
//! - Persist enqueued jobs until a runner drains them.
//!
//! # Invariants
//! - Jobs are claimed oldest first.
//! - A failed job keeps its error and is never retried automatically.

use crate::db::DbError;
use crate::model::export::ExportId;
use crate::model::org::OrgId;
use log::info;
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};

pub mod runner;

pub use runner::{TaskRunReport, TaskRunner};

pub type TaskId = i64;
pub type TaskResult<T> = Result<T, TaskError>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Task {
    /// Push the org's label keywords to the platform labelling flow.
    UpdateLabellingFlow { org_id: OrgId },
    /// Build, store and announce a message export.
    MessageExport { export_id: ExportId },
}

impl Task {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::UpdateLabellingFlow { .. } => "update_labelling_flow",
            Self::MessageExport { .. } => "message_export",
        }
    }
}

#[derive(Debug)]
pub enum TaskError {
    Db(DbError),
    InvalidPayload(String),
}

impl Display for TaskError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Db(err) => write!(f, "{err}"),
            Self::InvalidPayload(message) => write!(f, "invalid task payload: {message}"),
        }
    }
}

impl Error for TaskError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Db(err) => Some(err),
            Self::InvalidPayload(_) => None,
        }
    }
}

impl From<rusqlite::Error> for TaskError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

/// Queue that accepts jobs for later execution.
pub trait TaskQueue {
    fn enqueue(&self, task: &Task) -> TaskResult<TaskId>;
}

/// A job claimed from the queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueuedTask {
    pub id: TaskId,
    pub task: Task,
    pub attempts: u32,
}

/// Failed job kept for inspection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailedTask {
    pub id: TaskId,
    pub kind: String,
    pub error: String,
}

/// Queue persisted in the `pending_tasks` table.
pub struct SqliteTaskQueue<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteTaskQueue<'conn> {
    pub fn new(conn: &'conn Connection) -> Self {
        Self { conn }
    }

    /// Returns the oldest job that has not failed, if any.
    ///
    /// An undecodable payload is marked failed and reported as
    /// `InvalidPayload`.
    pub fn claim_next(&self) -> TaskResult<Option<QueuedTask>> {
        let row = self
            .conn
            .query_row(
                "SELECT id, payload, attempts
                 FROM pending_tasks
                 WHERE last_error IS NULL
                 ORDER BY id ASC
                 LIMIT 1;",
                [],
                |row| {
                    Ok((
                        row.get::<_, i64>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, u32>(2)?,
                    ))
                },
            )
            .optional()?;

        let Some((id, payload, attempts)) = row else {
            return Ok(None);
        };
        match serde_json::from_str::<Task>(&payload) {
            Ok(task) => Ok(Some(QueuedTask { id, task, attempts })),
            Err(err) => {
                let message = format!("task {id}: {err}");
                // Park the row so the next claim moves past it.
                self.fail(id, &message)?;
                Err(TaskError::InvalidPayload(message))
            }
        }
    }

    /// Removes a finished job.
    pub fn complete(&self, id: TaskId) -> TaskResult<()> {
        self.conn
            .execute("DELETE FROM pending_tasks WHERE id = ?1;", [id])?;
        Ok(())
    }

    /// Records the failure; the job stays in the table but is not claimed again.
    pub fn fail(&self, id: TaskId, error: &str) -> TaskResult<()> {
        self.conn.execute(
            "UPDATE pending_tasks
             SET attempts = attempts + 1, last_error = ?1
             WHERE id = ?2;",
            params![error, id],
        )?;
        Ok(())
    }

    pub fn pending_count(&self) -> TaskResult<u64> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM pending_tasks WHERE last_error IS NULL;",
            [],
            |row| row.get(0),
        )?;
        Ok(u64::try_from(count).unwrap_or(0))
    }

    pub fn list_failed(&self) -> TaskResult<Vec<FailedTask>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, kind, last_error
             FROM pending_tasks
             WHERE last_error IS NOT NULL
             ORDER BY id ASC;",
        )?;
        let mut rows = stmt.query([])?;
        let mut failed = Vec::new();
        while let Some(row) = rows.next()? {
            failed.push(FailedTask {
                id: row.get(0)?,
                kind: row.get(1)?,
                error: row.get(2)?,
            });
        }
        Ok(failed)
    }
}

impl TaskQueue for SqliteTaskQueue<'_> {
    fn enqueue(&self, task: &Task) -> TaskResult<TaskId> {
        let payload = serde_json::to_string(task)
            .map_err(|err| TaskError::InvalidPayload(err.to_string()))?;
        self.conn.execute(
            "INSERT INTO pending_tasks (kind, payload) VALUES (?1, ?2);",
            params![task.kind(), payload],
        )?;
        let id = self.conn.last_insert_rowid();
        info!(
            "event=task_enqueued module=tasks status=ok kind={} task_id={}",
            task.kind(),
            id
        );
        Ok(id)
    }
}
