//! Contact group repository contracts and SQLite implementation.
//!
//! # Invariants
//! - A group sync commits as one transaction or not at all.

use crate::model::group::{Group, GroupId};
use crate::model::org::OrgId;
use crate::repo::{bool_to_int, int_to_bool, is_unique_violation, placeholders, RepoError, RepoResult};
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};

const GROUP_SELECT_SQL: &str = "SELECT id, org_id, uuid, name, is_active FROM groups";

pub trait GroupRepository {
    fn create_group(&self, org_id: OrgId, name: &str, uuid: &str) -> RepoResult<Group>;
    fn get_group(&self, id: GroupId) -> RepoResult<Option<Group>>;
    /// Looks up an org's group by platform uuid, active or not.
    fn get_by_uuid(&self, org_id: OrgId, uuid: &str) -> RepoResult<Option<Group>>;
    fn list_active(&self, org_id: OrgId) -> RepoResult<Vec<Group>>;
    fn update_group(&self, id: GroupId, name: &str, is_active: bool) -> RepoResult<()>;
    /// Makes `groups` (uuid, name) the org's active set in one transaction:
    /// other groups are deactivated, known ones renamed and reactivated,
    /// missing ones created.
    fn sync_groups(
        &self,
        org_id: OrgId,
        groups: &[(String, String)],
    ) -> RepoResult<GroupSyncReport>;
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GroupSyncReport {
    pub created: usize,
    pub updated: usize,
    pub deactivated: usize,
}

pub struct SqliteGroupRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteGroupRepository<'conn> {
    pub fn new(conn: &'conn Connection) -> Self {
        Self { conn }
    }
}

impl GroupRepository for SqliteGroupRepository<'_> {
    fn create_group(&self, org_id: OrgId, name: &str, uuid: &str) -> RepoResult<Group> {
        let id = insert_group(self.conn, org_id, name, uuid)?;
        self.get_group(id)?
            .ok_or_else(|| RepoError::InvalidData(format!("group {id} missing after insert")))
    }

    fn get_group(&self, id: GroupId) -> RepoResult<Option<Group>> {
        let mut stmt = self
            .conn
            .prepare(&format!("{GROUP_SELECT_SQL} WHERE id = ?1;"))?;
        let row = stmt
            .query_row([id], |row| Ok(parse_group_row(row)))
            .optional()?;
        row.transpose()
    }

    fn get_by_uuid(&self, org_id: OrgId, uuid: &str) -> RepoResult<Option<Group>> {
        let mut stmt = self.conn.prepare(&format!(
            "{GROUP_SELECT_SQL} WHERE org_id = ?1 AND uuid = ?2;"
        ))?;
        let row = stmt
            .query_row(params![org_id, uuid], |row| Ok(parse_group_row(row)))
            .optional()?;
        row.transpose()
    }

    fn list_active(&self, org_id: OrgId) -> RepoResult<Vec<Group>> {
        let mut stmt = self.conn.prepare(&format!(
            "{GROUP_SELECT_SQL}
             WHERE org_id = ?1 AND is_active = 1
             ORDER BY name COLLATE NOCASE ASC, id ASC;"
        ))?;
        let mut rows = stmt.query([org_id])?;
        let mut groups = Vec::new();
        while let Some(row) = rows.next()? {
            groups.push(parse_group_row(row)?);
        }
        Ok(groups)
    }

    fn update_group(&self, id: GroupId, name: &str, is_active: bool) -> RepoResult<()> {
        let changed = self.conn.execute(
            "UPDATE groups SET name = ?1, is_active = ?2 WHERE id = ?3;",
            params![name, bool_to_int(is_active), id],
        )?;
        if changed == 0 {
            return Err(RepoError::not_found("group", id));
        }
        Ok(())
    }

    fn sync_groups(
        &self,
        org_id: OrgId,
        groups: &[(String, String)],
    ) -> RepoResult<GroupSyncReport> {
        let tx = self.conn.unchecked_transaction()?;
        let mut report = GroupSyncReport::default();

        let mut sql =
            String::from("UPDATE groups SET is_active = 0 WHERE org_id = ? AND is_active = 1");
        let mut bind_values = vec![Value::Integer(org_id)];
        if !groups.is_empty() {
            sql.push_str(&format!(" AND uuid NOT IN ({})", placeholders(groups.len())));
            bind_values.extend(groups.iter().map(|(uuid, _)| Value::Text(uuid.clone())));
        }
        report.deactivated = tx.execute(&sql, params_from_iter(bind_values))?;

        for (uuid, name) in groups {
            let changed = tx.execute(
                "UPDATE groups SET name = ?1, is_active = 1 WHERE org_id = ?2 AND uuid = ?3;",
                params![name, org_id, uuid],
            )?;
            if changed > 0 {
                report.updated += 1;
            } else {
                insert_group(&tx, org_id, name, uuid)?;
                report.created += 1;
            }
        }
        tx.commit()?;
        Ok(report)
    }
}

fn insert_group(
    conn: &Connection,
    org_id: OrgId,
    name: &str,
    uuid: &str,
) -> RepoResult<GroupId> {
    conn.execute(
        "INSERT INTO groups (org_id, uuid, name, is_active) VALUES (?1, ?2, ?3, 1);",
        params![org_id, uuid, name],
    )
    .map_err(|err| {
        if is_unique_violation(&err) {
            RepoError::Conflict(format!("group uuid `{uuid}` already exists"))
        } else {
            err.into()
        }
    })?;
    Ok(conn.last_insert_rowid())
}

fn parse_group_row(row: &Row<'_>) -> RepoResult<Group> {
    Ok(Group {
        id: row.get("id")?,
        org_id: row.get("org_id")?,
        uuid: row.get("uuid")?,
        name: row.get("name")?,
        is_active: int_to_bool(row.get("is_active")?, "groups.is_active")?,
    })
}
