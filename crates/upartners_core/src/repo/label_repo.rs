//! Label repository contracts and SQLite implementation.
//!
//! # Invariants
//! - Label/partner links are replaced in the same transaction as the label
//!   row they belong to.
//! - Listing helpers return active rows only.

use crate::model::label::{Label, LabelId};
use crate::model::org::OrgId;
use crate::model::partner::{Partner, PartnerId};
use crate::repo::{bool_to_int, int_to_bool, placeholders, RepoError, RepoResult};
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row, Transaction};
use std::collections::BTreeMap;

pub(crate) const LABEL_SELECT_SQL: &str = "SELECT
    id,
    org_id,
    name,
    description,
    keywords,
    is_active
FROM labels";

/// Write model for label create/update. `keywords` is already normalized.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelDraft {
    pub org_id: OrgId,
    pub name: String,
    pub description: String,
    pub keywords: String,
    pub partner_ids: Vec<PartnerId>,
}

/// Case totals for one label.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LabelCaseCounts {
    pub open: u64,
    pub total: u64,
}

pub trait LabelRepository {
    fn create_label(&self, draft: &LabelDraft) -> RepoResult<Label>;
    fn update_label(&self, id: LabelId, draft: &LabelDraft) -> RepoResult<Label>;
    fn get_label(&self, id: LabelId) -> RepoResult<Option<Label>>;
    fn list_active(&self, org_id: OrgId) -> RepoResult<Vec<Label>>;
    fn list_partners(&self, id: LabelId) -> RepoResult<Vec<Partner>>;
    fn set_active(&self, id: LabelId, is_active: bool) -> RepoResult<()>;
    /// Open and total case counts per label; labels without cases are absent.
    fn case_counts(&self, ids: &[LabelId]) -> RepoResult<BTreeMap<LabelId, LabelCaseCounts>>;
}

pub struct SqliteLabelRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteLabelRepository<'conn> {
    pub fn new(conn: &'conn Connection) -> Self {
        Self { conn }
    }
}

impl LabelRepository for SqliteLabelRepository<'_> {
    fn create_label(&self, draft: &LabelDraft) -> RepoResult<Label> {
        let tx = self.conn.unchecked_transaction()?;
        tx.execute(
            "INSERT INTO labels (org_id, name, description, keywords, is_active)
             VALUES (?1, ?2, ?3, ?4, 1);",
            params![
                draft.org_id,
                draft.name.trim(),
                draft.description.as_str(),
                draft.keywords.as_str(),
            ],
        )?;
        let id = tx.last_insert_rowid();
        replace_partners(&tx, id, &draft.partner_ids)?;
        tx.commit()?;

        self.get_label(id)?
            .ok_or_else(|| RepoError::InvalidData(format!("label {id} missing after insert")))
    }

    fn update_label(&self, id: LabelId, draft: &LabelDraft) -> RepoResult<Label> {
        let tx = self.conn.unchecked_transaction()?;
        let changed = tx.execute(
            "UPDATE labels
             SET name = ?1, description = ?2, keywords = ?3
             WHERE id = ?4 AND org_id = ?5;",
            params![
                draft.name.trim(),
                draft.description.as_str(),
                draft.keywords.as_str(),
                id,
                draft.org_id,
            ],
        )?;
        if changed == 0 {
            return Err(RepoError::not_found("label", id));
        }
        replace_partners(&tx, id, &draft.partner_ids)?;
        tx.commit()?;

        self.get_label(id)?
            .ok_or_else(|| RepoError::not_found("label", id))
    }

    fn get_label(&self, id: LabelId) -> RepoResult<Option<Label>> {
        let mut stmt = self
            .conn
            .prepare(&format!("{LABEL_SELECT_SQL} WHERE id = ?1;"))?;
        let row = stmt
            .query_row([id], |row| Ok(parse_label_row(row)))
            .optional()?;
        row.transpose()
    }

    fn list_active(&self, org_id: OrgId) -> RepoResult<Vec<Label>> {
        let mut stmt = self.conn.prepare(&format!(
            "{LABEL_SELECT_SQL}
             WHERE org_id = ?1 AND is_active = 1
             ORDER BY name COLLATE NOCASE ASC, id ASC;"
        ))?;
        let labels = collect_labels(stmt.query([org_id])?)?;
        Ok(labels)
    }

    fn list_partners(&self, id: LabelId) -> RepoResult<Vec<Partner>> {
        let mut stmt = self.conn.prepare(
            "SELECT p.id, p.org_id, p.name, p.is_active
             FROM partners p
             INNER JOIN label_partners lp ON lp.partner_id = p.id
             WHERE lp.label_id = ?1 AND p.is_active = 1
             ORDER BY p.name COLLATE NOCASE ASC, p.id ASC;",
        )?;
        let mut rows = stmt.query([id])?;
        let mut partners = Vec::new();
        while let Some(row) = rows.next()? {
            partners.push(Partner {
                id: row.get(0)?,
                org_id: row.get(1)?,
                name: row.get(2)?,
                is_active: int_to_bool(row.get(3)?, "partners.is_active")?,
            });
        }
        Ok(partners)
    }

    fn set_active(&self, id: LabelId, is_active: bool) -> RepoResult<()> {
        let changed = self.conn.execute(
            "UPDATE labels SET is_active = ?1 WHERE id = ?2;",
            params![bool_to_int(is_active), id],
        )?;
        if changed == 0 {
            return Err(RepoError::not_found("label", id));
        }
        Ok(())
    }

    fn case_counts(&self, ids: &[LabelId]) -> RepoResult<BTreeMap<LabelId, LabelCaseCounts>> {
        let mut counts = BTreeMap::new();
        if ids.is_empty() {
            return Ok(counts);
        }
        let sql = format!(
            "SELECT
                cl.label_id,
                SUM(CASE WHEN c.closed_on IS NULL THEN 1 ELSE 0 END) AS open_count,
                COUNT(*) AS total_count
             FROM case_labels cl
             INNER JOIN cases c ON c.id = cl.case_id
             WHERE cl.label_id IN ({})
             GROUP BY cl.label_id;",
            placeholders(ids.len())
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let mut rows = stmt.query(params_from_iter(ids.iter()))?;
        while let Some(row) = rows.next()? {
            let label_id: LabelId = row.get(0)?;
            let open: i64 = row.get(1)?;
            let total: i64 = row.get(2)?;
            counts.insert(
                label_id,
                LabelCaseCounts {
                    open: u64::try_from(open).unwrap_or(0),
                    total: u64::try_from(total).unwrap_or(0),
                },
            );
        }
        Ok(counts)
    }
}

pub(crate) fn parse_label_row(row: &Row<'_>) -> RepoResult<Label> {
    Ok(Label {
        id: row.get("id")?,
        org_id: row.get("org_id")?,
        name: row.get("name")?,
        description: row.get("description")?,
        keywords: row.get("keywords")?,
        is_active: int_to_bool(row.get("is_active")?, "labels.is_active")?,
    })
}

fn collect_labels(mut rows: rusqlite::Rows<'_>) -> RepoResult<Vec<Label>> {
    let mut labels = Vec::new();
    while let Some(row) = rows.next()? {
        labels.push(parse_label_row(row)?);
    }
    Ok(labels)
}

fn replace_partners(tx: &Transaction<'_>, id: LabelId, partner_ids: &[PartnerId]) -> RepoResult<()> {
    tx.execute("DELETE FROM label_partners WHERE label_id = ?1;", [id])?;
    for partner_id in partner_ids {
        tx.execute(
            "INSERT OR IGNORE INTO label_partners (label_id, partner_id) VALUES (?1, ?2);",
            params![id, partner_id],
        )?;
    }
    Ok(())
}
