//! Drains the task queue by dispatching jobs to the services.
//!
//! # Invariants
//! - A job is deleted only after it succeeded.
//! - A failing job records its error and the runner moves on.

use crate::mail::Mailer;
use crate::model::org::{Org, OrgId};
use crate::remote::ClientProvider;
use crate::repo::export_repo::SqliteExportRepository;
use crate::repo::label_repo::{LabelRepository, SqliteLabelRepository};
use crate::repo::org_repo::{OrgRepository, SqliteOrgRepository};
use crate::repo::user_repo::{SqliteUserRepository, UserRepository};
use crate::service::export_service::ExportService;
use crate::service::label_service::LabelService;
use crate::service::{ServiceError, ServiceResult};
use crate::storage::FileStore;
use crate::tasks::{SqliteTaskQueue, Task, TaskError, TaskResult};
use log::{error, info, warn};
use rusqlite::Connection;

/// Outcome counts of one [`TaskRunner::run_pending`] call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TaskRunReport {
    pub succeeded: usize,
    pub failed: usize,
}

impl TaskRunReport {
    pub fn total(&self) -> usize {
        self.succeeded + self.failed
    }
}

pub struct TaskRunner<'a> {
    conn: &'a Connection,
    clients: &'a dyn ClientProvider,
    store: &'a dyn FileStore,
    mailer: &'a dyn Mailer,
    hostname: &'a str,
}

impl<'a> TaskRunner<'a> {
    pub fn new(
        conn: &'a Connection,
        clients: &'a dyn ClientProvider,
        store: &'a dyn FileStore,
        mailer: &'a dyn Mailer,
        hostname: &'a str,
    ) -> Self {
        Self {
            conn,
            clients,
            store,
            mailer,
            hostname,
        }
    }

    /// Runs up to `limit` queued jobs, oldest first.
    ///
    /// Only queue storage errors abort the run; job failures are recorded
    /// on the job row and counted in the report.
    pub fn run_pending(&self, limit: usize) -> TaskResult<TaskRunReport> {
        let queue = SqliteTaskQueue::new(self.conn);
        let mut report = TaskRunReport::default();
        while report.total() < limit {
            let claimed = match queue.claim_next() {
                Ok(Some(claimed)) => claimed,
                Ok(None) => break,
                Err(TaskError::InvalidPayload(message)) => {
                    warn!(
                        "event=task_run module=tasks status=error error_code=invalid_payload detail={}",
                        message
                    );
                    report.failed += 1;
                    continue;
                }
                Err(err) => return Err(err),
            };

            match self.run_task(&claimed.task) {
                Ok(()) => {
                    queue.complete(claimed.id)?;
                    report.succeeded += 1;
                    info!(
                        "event=task_run module=tasks status=ok kind={} task_id={}",
                        claimed.task.kind(),
                        claimed.id
                    );
                }
                Err(err) => {
                    queue.fail(claimed.id, &err.to_string())?;
                    report.failed += 1;
                    error!(
                        "event=task_run module=tasks status=error kind={} task_id={} error={}",
                        claimed.task.kind(),
                        claimed.id,
                        err
                    );
                }
            }
        }
        Ok(report)
    }

    /// Executes one job immediately, bypassing the queue.
    pub fn run_task(&self, task: &Task) -> ServiceResult<()> {
        let queue = SqliteTaskQueue::new(self.conn);
        match task {
            Task::UpdateLabellingFlow { org_id } => {
                let org = self.load_org(*org_id)?;
                let labels = LabelService::new(
                    SqliteLabelRepository::new(self.conn),
                    self.clients,
                    &queue,
                );
                labels.push_labelling_flow(&org)?;
            }
            Task::MessageExport { export_id } => {
                let exports = ExportService::new(
                    SqliteExportRepository::new(self.conn),
                    self.clients,
                    &queue,
                    self.store,
                    self.mailer,
                    self.hostname,
                );
                let export = exports.get_export(*export_id)?;
                let org = self.load_org(export.org_id)?;
                let creator = SqliteUserRepository::new(self.conn)
                    .get_user(export.created_by)?
                    .ok_or_else(|| ServiceError::not_found("user", export.created_by))?;
                let labels = SqliteLabelRepository::new(self.conn).list_active(org.id)?;
                exports.do_export(&export, &org, &creator, &labels)?;
            }
        }
        Ok(())
    }

    fn load_org(&self, id: OrgId) -> ServiceResult<Org> {
        SqliteOrgRepository::new(self.conn)
            .get_org(id)?
            .ok_or_else(|| ServiceError::not_found("org", id))
    }
}
