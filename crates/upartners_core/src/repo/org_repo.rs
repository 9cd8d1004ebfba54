//! Org repository contracts and SQLite implementation.

use crate::model::org::{Org, OrgId};
use crate::repo::{bool_to_int, int_to_bool, RepoError, RepoResult};
use rusqlite::{params, Connection, OptionalExtension, Row};

const ORG_SELECT_SQL: &str = "SELECT
    id,
    name,
    api_token,
    timezone,
    contact_fields,
    is_active
FROM orgs";

/// Insert model for orgs mirrored from the dashboard.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NewOrg {
    pub name: String,
    pub api_token: String,
    pub timezone: String,
    pub contact_fields: Vec<String>,
}

pub trait OrgRepository {
    fn create_org(&self, org: &NewOrg) -> RepoResult<Org>;
    fn get_org(&self, id: OrgId) -> RepoResult<Option<Org>>;
    fn list_orgs(&self) -> RepoResult<Vec<Org>>;
    fn set_contact_fields(&self, id: OrgId, fields: &[String]) -> RepoResult<()>;
}

pub struct SqliteOrgRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteOrgRepository<'conn> {
    pub fn new(conn: &'conn Connection) -> Self {
        Self { conn }
    }
}

impl OrgRepository for SqliteOrgRepository<'_> {
    fn create_org(&self, org: &NewOrg) -> RepoResult<Org> {
        let timezone = if org.timezone.trim().is_empty() {
            "UTC"
        } else {
            org.timezone.as_str()
        };
        self.conn.execute(
            "INSERT INTO orgs (name, api_token, timezone, contact_fields, is_active)
             VALUES (?1, ?2, ?3, ?4, ?5);",
            params![
                org.name.as_str(),
                org.api_token.as_str(),
                timezone,
                encode_fields(&org.contact_fields)?,
                bool_to_int(true),
            ],
        )?;
        let id = self.conn.last_insert_rowid();
        self.get_org(id)?
            .ok_or_else(|| RepoError::InvalidData(format!("org {id} missing after insert")))
    }

    fn get_org(&self, id: OrgId) -> RepoResult<Option<Org>> {
        let mut stmt = self
            .conn
            .prepare(&format!("{ORG_SELECT_SQL} WHERE id = ?1;"))?;
        let row = stmt.query_row([id], |row| Ok(parse_org_row(row))).optional()?;
        row.transpose()
    }

    fn list_orgs(&self) -> RepoResult<Vec<Org>> {
        let mut stmt = self.conn.prepare(&format!(
            "{ORG_SELECT_SQL} WHERE is_active = 1 ORDER BY name COLLATE NOCASE ASC, id ASC;"
        ))?;
        let mut rows = stmt.query([])?;
        let mut orgs = Vec::new();
        while let Some(row) = rows.next()? {
            orgs.push(parse_org_row(row)?);
        }
        Ok(orgs)
    }

    fn set_contact_fields(&self, id: OrgId, fields: &[String]) -> RepoResult<()> {
        let changed = self.conn.execute(
            "UPDATE orgs SET contact_fields = ?1 WHERE id = ?2;",
            params![encode_fields(fields)?, id],
        )?;
        if changed == 0 {
            return Err(RepoError::not_found("org", id));
        }
        Ok(())
    }
}

fn encode_fields(fields: &[String]) -> RepoResult<String> {
    serde_json::to_string(fields)
        .map_err(|err| RepoError::InvalidData(format!("cannot encode contact fields: {err}")))
}

fn parse_org_row(row: &Row<'_>) -> RepoResult<Org> {
    let fields_text: String = row.get("contact_fields")?;
    let contact_fields: Vec<String> = serde_json::from_str(&fields_text).map_err(|err| {
        RepoError::InvalidData(format!("invalid orgs.contact_fields `{fields_text}`: {err}"))
    })?;
    Ok(Org {
        id: row.get("id")?,
        name: row.get("name")?,
        api_token: row.get("api_token")?,
        timezone: row.get("timezone")?,
        contact_fields,
        is_active: int_to_bool(row.get("is_active")?, "orgs.is_active")?,
    })
}
