//! Partner repository contracts and SQLite implementation.
//!
//! # Invariants
//! - Listing helpers return active rows only.
//! - Partner users are active users whose profile points at the partner.

use crate::model::label::Label;
use crate::model::org::{OrgId, OrgRole, User};
use crate::model::partner::{Partner, PartnerId};
use crate::repo::label_repo::{parse_label_row, LABEL_SELECT_SQL};
use crate::repo::user_repo::load_users;
use crate::repo::{bool_to_int, int_to_bool, RepoError, RepoResult};
use rusqlite::{params, Connection, OptionalExtension, Row};

const PARTNER_SELECT_SQL: &str = "SELECT id, org_id, name, is_active FROM partners";

pub trait PartnerRepository {
    fn create_partner(&self, org_id: OrgId, name: &str) -> RepoResult<Partner>;
    fn get_partner(&self, id: PartnerId) -> RepoResult<Option<Partner>>;
    fn list_active(&self, org_id: OrgId) -> RepoResult<Vec<Partner>>;
    fn set_active(&self, id: PartnerId, is_active: bool) -> RepoResult<()>;
    fn list_labels(&self, id: PartnerId) -> RepoResult<Vec<Label>>;
    /// Active users of the partner, optionally restricted to one org role.
    fn list_users(&self, id: PartnerId, role: Option<OrgRole>) -> RepoResult<Vec<User>>;
}

pub struct SqlitePartnerRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqlitePartnerRepository<'conn> {
    pub fn new(conn: &'conn Connection) -> Self {
        Self { conn }
    }
}

impl PartnerRepository for SqlitePartnerRepository<'_> {
    fn create_partner(&self, org_id: OrgId, name: &str) -> RepoResult<Partner> {
        self.conn.execute(
            "INSERT INTO partners (org_id, name, is_active) VALUES (?1, ?2, 1);",
            params![org_id, name],
        )?;
        let id = self.conn.last_insert_rowid();
        self.get_partner(id)?
            .ok_or_else(|| RepoError::InvalidData(format!("partner {id} missing after insert")))
    }

    fn get_partner(&self, id: PartnerId) -> RepoResult<Option<Partner>> {
        get_partner(self.conn, id)
    }

    fn list_active(&self, org_id: OrgId) -> RepoResult<Vec<Partner>> {
        let mut stmt = self.conn.prepare(&format!(
            "{PARTNER_SELECT_SQL}
             WHERE org_id = ?1 AND is_active = 1
             ORDER BY name COLLATE NOCASE ASC, id ASC;"
        ))?;
        let mut rows = stmt.query([org_id])?;
        let mut partners = Vec::new();
        while let Some(row) = rows.next()? {
            partners.push(parse_partner_row(row)?);
        }
        Ok(partners)
    }

    fn set_active(&self, id: PartnerId, is_active: bool) -> RepoResult<()> {
        let changed = self.conn.execute(
            "UPDATE partners SET is_active = ?1 WHERE id = ?2;",
            params![bool_to_int(is_active), id],
        )?;
        if changed == 0 {
            return Err(RepoError::not_found("partner", id));
        }
        Ok(())
    }

    fn list_labels(&self, id: PartnerId) -> RepoResult<Vec<Label>> {
        let mut stmt = self.conn.prepare(&format!(
            "{LABEL_SELECT_SQL}
             WHERE is_active = 1
               AND id IN (SELECT label_id FROM label_partners WHERE partner_id = ?1)
             ORDER BY name COLLATE NOCASE ASC, id ASC;"
        ))?;
        let mut rows = stmt.query([id])?;
        let mut labels = Vec::new();
        while let Some(row) = rows.next()? {
            labels.push(parse_label_row(row)?);
        }
        Ok(labels)
    }

    fn list_users(&self, id: PartnerId, role: Option<OrgRole>) -> RepoResult<Vec<User>> {
        match role {
            None => load_users(
                self.conn,
                "u.is_active = 1 AND p.partner_id = ?1",
                params![id],
            ),
            Some(role) => load_users(
                self.conn,
                "u.is_active = 1 AND p.partner_id = ?1
                 AND EXISTS (
                    SELECT 1
                    FROM org_roles r
                    INNER JOIN partners pa ON pa.id = p.partner_id
                    WHERE r.user_id = u.id AND r.org_id = pa.org_id AND r.role = ?2
                 )",
                params![id, role.as_str()],
            ),
        }
    }
}

pub(crate) fn get_partner(conn: &Connection, id: PartnerId) -> RepoResult<Option<Partner>> {
    let mut stmt = conn.prepare(&format!("{PARTNER_SELECT_SQL} WHERE id = ?1;"))?;
    let row = stmt
        .query_row([id], |row| Ok(parse_partner_row(row)))
        .optional()?;
    row.transpose()
}

fn parse_partner_row(row: &Row<'_>) -> RepoResult<Partner> {
    Ok(Partner {
        id: row.get("id")?,
        org_id: row.get("org_id")?,
        name: row.get("name")?,
        is_active: int_to_bool(row.get("is_active")?, "partners.is_active")?,
    })
}
