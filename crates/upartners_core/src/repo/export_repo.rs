//! Message export repository contracts and SQLite implementation.

use crate::model::export::{ExportId, MessageExport};
use crate::model::org::{OrgId, UserId};
use crate::repo::{RepoError, RepoResult};
use rusqlite::{params, Connection, OptionalExtension, Row};

const EXPORT_SELECT_SQL: &str =
    "SELECT id, org_id, search, filename, created_by, created_on FROM message_exports";

pub trait ExportRepository {
    fn create_export(
        &self,
        org_id: OrgId,
        created_by: UserId,
        search_json: &str,
        created_on: i64,
    ) -> RepoResult<MessageExport>;
    fn get_export(&self, id: ExportId) -> RepoResult<Option<MessageExport>>;
    fn set_filename(&self, id: ExportId, filename: &str) -> RepoResult<()>;
}

pub struct SqliteExportRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteExportRepository<'conn> {
    pub fn new(conn: &'conn Connection) -> Self {
        Self { conn }
    }
}

impl ExportRepository for SqliteExportRepository<'_> {
    fn create_export(
        &self,
        org_id: OrgId,
        created_by: UserId,
        search_json: &str,
        created_on: i64,
    ) -> RepoResult<MessageExport> {
        self.conn.execute(
            "INSERT INTO message_exports (org_id, search, filename, created_by, created_on)
             VALUES (?1, ?2, '', ?3, ?4);",
            params![org_id, search_json, created_by, created_on],
        )?;
        let id = self.conn.last_insert_rowid();
        self.get_export(id)?
            .ok_or_else(|| RepoError::InvalidData(format!("export {id} missing after insert")))
    }

    fn get_export(&self, id: ExportId) -> RepoResult<Option<MessageExport>> {
        let mut stmt = self
            .conn
            .prepare(&format!("{EXPORT_SELECT_SQL} WHERE id = ?1;"))?;
        let row = stmt
            .query_row([id], |row| Ok(parse_export_row(row)))
            .optional()?;
        row.transpose()
    }

    fn set_filename(&self, id: ExportId, filename: &str) -> RepoResult<()> {
        let changed = self.conn.execute(
            "UPDATE message_exports SET filename = ?1 WHERE id = ?2;",
            params![filename, id],
        )?;
        if changed == 0 {
            return Err(RepoError::not_found("message export", id));
        }
        Ok(())
    }
}

fn parse_export_row(row: &Row<'_>) -> RepoResult<MessageExport> {
    Ok(MessageExport {
        id: row.get("id")?,
        org_id: row.get("org_id")?,
        search: row.get("search")?,
        filename: row.get("filename")?,
        created_by: row.get("created_by")?,
        created_on: row.get("created_on")?,
    })
}
