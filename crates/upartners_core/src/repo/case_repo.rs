//! Case and case-action repository contracts and SQLite implementation.
//!
//! # Responsibility
//! - Persist cases, their label links and their audit trail.
//! - Apply each state transition together with its audit action.
//!
//! # Invariants
//! - A state change and its `case_actions` row commit in one transaction.
//! - A change applies only while the row still matches the state it was
//!   checked against; a moved row surfaces as `RepoError::Conflict`.
//! - `case_actions` rows are never updated or deleted by this module.
//! - `message_id` is unique; reuse surfaces as `RepoError::Conflict`.

use crate::model::case::{Case, CaseAction, CaseActionKind, CaseId};
use crate::model::label::{Label, LabelId};
use crate::model::org::{OrgId, UserId};
use crate::model::partner::{Partner, PartnerId};
use crate::repo::label_repo::parse_label_row;
use crate::repo::partner_repo::get_partner;
use crate::repo::{is_unique_violation, RepoError, RepoResult};
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row, Transaction};

const CASE_SELECT_SQL: &str = "SELECT
    id,
    org_id,
    assignee_id,
    contact_uuid,
    message_id,
    message_on,
    summary,
    opened_on,
    closed_on
FROM cases";

/// Insert model for a case opened from an inbound message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewCase {
    pub org_id: OrgId,
    pub assignee_id: PartnerId,
    pub contact_uuid: String,
    pub message_id: i64,
    pub message_on: i64,
    pub summary: String,
    pub opened_on: i64,
    pub label_ids: Vec<LabelId>,
}

/// Insert model for one audit row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewCaseAction {
    pub action: CaseActionKind,
    pub created_by: UserId,
    pub created_on: i64,
    pub assignee_id: Option<PartnerId>,
    pub note: Option<String>,
}

/// Mutation applied to a case row alongside its audit action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaseChange {
    Close { closed_on: i64 },
    Reopen,
    Reassign { assignee_id: PartnerId },
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum CaseState {
    #[default]
    Any,
    Open,
    Closed,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CaseListQuery {
    pub org_id: OrgId,
    pub label_id: Option<LabelId>,
    pub state: CaseState,
    pub contact_uuid: Option<String>,
    pub assignee_id: Option<PartnerId>,
}

pub trait CaseRepository {
    /// Inserts the case, its labels and the opening action atomically.
    fn open_case(&self, case: &NewCase, opened_by: UserId) -> RepoResult<Case>;
    fn get_case(&self, id: CaseId) -> RepoResult<Option<Case>>;
    fn get_by_message_id(&self, message_id: i64) -> RepoResult<Option<Case>>;
    /// Lists cases newest first.
    fn list_cases(&self, query: &CaseListQuery) -> RepoResult<Vec<Case>>;
    /// Applies `change` and appends `action` atomically.
    ///
    /// `current` is the row the caller validated; the write is refused with
    /// `Conflict` when its assignee or open/closed state has moved since.
    fn apply_change(
        &self,
        current: &Case,
        change: CaseChange,
        action: &NewCaseAction,
    ) -> RepoResult<Case>;
    fn append_action(&self, id: CaseId, action: &NewCaseAction) -> RepoResult<CaseAction>;
    /// Audit trail ordered by action id.
    fn list_actions(&self, id: CaseId) -> RepoResult<Vec<CaseAction>>;
    /// Active labels of the case ordered by name.
    fn list_labels(&self, id: CaseId) -> RepoResult<Vec<Label>>;
    fn replace_labels(&self, id: CaseId, label_ids: &[LabelId]) -> RepoResult<()>;
    fn get_partner(&self, id: PartnerId) -> RepoResult<Option<Partner>>;
}

pub struct SqliteCaseRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteCaseRepository<'conn> {
    pub fn new(conn: &'conn Connection) -> Self {
        Self { conn }
    }
}

impl CaseRepository for SqliteCaseRepository<'_> {
    fn open_case(&self, case: &NewCase, opened_by: UserId) -> RepoResult<Case> {
        let tx = self.conn.unchecked_transaction()?;
        tx.execute(
            "INSERT INTO cases (
                org_id,
                assignee_id,
                contact_uuid,
                message_id,
                message_on,
                summary,
                opened_on,
                closed_on
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, NULL);",
            params![
                case.org_id,
                case.assignee_id,
                case.contact_uuid.as_str(),
                case.message_id,
                case.message_on,
                case.summary.as_str(),
                case.opened_on,
            ],
        )
        .map_err(|err| {
            if is_unique_violation(&err) {
                RepoError::Conflict(format!(
                    "a case already exists for message {}",
                    case.message_id
                ))
            } else {
                err.into()
            }
        })?;
        let id = tx.last_insert_rowid();
        insert_labels(&tx, id, &case.label_ids)?;
        insert_action(
            &tx,
            id,
            &NewCaseAction {
                action: CaseActionKind::Open,
                created_by: opened_by,
                created_on: case.opened_on,
                assignee_id: Some(case.assignee_id),
                note: None,
            },
        )?;
        tx.commit()?;

        self.get_case(id)?
            .ok_or_else(|| RepoError::InvalidData(format!("case {id} missing after insert")))
    }

    fn get_case(&self, id: CaseId) -> RepoResult<Option<Case>> {
        let mut stmt = self
            .conn
            .prepare(&format!("{CASE_SELECT_SQL} WHERE id = ?1;"))?;
        let row = stmt
            .query_row([id], |row| Ok(parse_case_row(row)))
            .optional()?;
        row.transpose()
    }

    fn get_by_message_id(&self, message_id: i64) -> RepoResult<Option<Case>> {
        let mut stmt = self
            .conn
            .prepare(&format!("{CASE_SELECT_SQL} WHERE message_id = ?1;"))?;
        let row = stmt
            .query_row([message_id], |row| Ok(parse_case_row(row)))
            .optional()?;
        row.transpose()
    }

    fn list_cases(&self, query: &CaseListQuery) -> RepoResult<Vec<Case>> {
        let mut sql = format!("{CASE_SELECT_SQL} WHERE org_id = ?");
        let mut bind_values = vec![Value::Integer(query.org_id)];

        match query.state {
            CaseState::Any => {}
            CaseState::Open => sql.push_str(" AND closed_on IS NULL"),
            CaseState::Closed => sql.push_str(" AND closed_on IS NOT NULL"),
        }
        if let Some(label_id) = query.label_id {
            sql.push_str(
                " AND EXISTS (
                    SELECT 1 FROM case_labels cl
                    WHERE cl.case_id = cases.id AND cl.label_id = ?
                )",
            );
            bind_values.push(Value::Integer(label_id));
        }
        if let Some(contact_uuid) = query.contact_uuid.as_ref() {
            sql.push_str(" AND contact_uuid = ?");
            bind_values.push(Value::Text(contact_uuid.clone()));
        }
        if let Some(assignee_id) = query.assignee_id {
            sql.push_str(" AND assignee_id = ?");
            bind_values.push(Value::Integer(assignee_id));
        }
        sql.push_str(" ORDER BY opened_on DESC, id DESC");

        let mut stmt = self.conn.prepare(&sql)?;
        let mut rows = stmt.query(params_from_iter(bind_values))?;
        let mut cases = Vec::new();
        while let Some(row) = rows.next()? {
            cases.push(parse_case_row(row)?);
        }
        Ok(cases)
    }

    fn apply_change(
        &self,
        current: &Case,
        change: CaseChange,
        action: &NewCaseAction,
    ) -> RepoResult<Case> {
        let id = current.id;
        let tx = self.conn.unchecked_transaction()?;
        let changed = match change {
            CaseChange::Close { closed_on } => tx.execute(
                "UPDATE cases SET closed_on = ?1
                 WHERE id = ?2 AND assignee_id = ?3 AND closed_on IS NULL;",
                params![closed_on, id, current.assignee_id],
            )?,
            CaseChange::Reopen => tx.execute(
                "UPDATE cases SET closed_on = NULL
                 WHERE id = ?1 AND assignee_id = ?2 AND closed_on IS NOT NULL;",
                params![id, current.assignee_id],
            )?,
            CaseChange::Reassign { assignee_id } => tx.execute(
                "UPDATE cases SET assignee_id = ?1
                 WHERE id = ?2 AND assignee_id = ?3 AND closed_on IS ?4;",
                params![assignee_id, id, current.assignee_id, current.closed_on],
            )?,
        };
        if changed == 0 {
            let exists: Option<i64> = tx
                .query_row("SELECT 1 FROM cases WHERE id = ?1;", [id], |row| row.get(0))
                .optional()?;
            return Err(match exists {
                Some(_) => RepoError::Conflict(format!("case {id} changed since it was read")),
                None => RepoError::not_found("case", id),
            });
        }
        insert_action(&tx, id, action)?;
        tx.commit()?;

        self.get_case(id)?
            .ok_or_else(|| RepoError::not_found("case", id))
    }

    fn append_action(&self, id: CaseId, action: &NewCaseAction) -> RepoResult<CaseAction> {
        if self.get_case(id)?.is_none() {
            return Err(RepoError::not_found("case", id));
        }
        let tx = self.conn.unchecked_transaction()?;
        let action_id = insert_action(&tx, id, action)?;
        tx.commit()?;
        Ok(CaseAction {
            id: action_id,
            case_id: id,
            action: action.action,
            created_by: action.created_by,
            created_on: action.created_on,
            assignee_id: action.assignee_id,
            note: action.note.clone(),
        })
    }

    fn list_actions(&self, id: CaseId) -> RepoResult<Vec<CaseAction>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, case_id, action, created_by, created_on, assignee_id, note
             FROM case_actions
             WHERE case_id = ?1
             ORDER BY id ASC;",
        )?;
        let mut rows = stmt.query([id])?;
        let mut actions = Vec::new();
        while let Some(row) = rows.next()? {
            actions.push(parse_action_row(row)?);
        }
        Ok(actions)
    }

    fn list_labels(&self, id: CaseId) -> RepoResult<Vec<Label>> {
        let mut stmt = self.conn.prepare(
            "SELECT l.id, l.org_id, l.name, l.description, l.keywords, l.is_active
             FROM labels l
             INNER JOIN case_labels cl ON cl.label_id = l.id
             WHERE cl.case_id = ?1 AND l.is_active = 1
             ORDER BY l.name COLLATE NOCASE ASC, l.id ASC;",
        )?;
        let mut rows = stmt.query([id])?;
        let mut labels = Vec::new();
        while let Some(row) = rows.next()? {
            labels.push(parse_label_row(row)?);
        }
        Ok(labels)
    }

    fn replace_labels(&self, id: CaseId, label_ids: &[LabelId]) -> RepoResult<()> {
        let tx = self.conn.unchecked_transaction()?;
        let exists: Option<i64> = tx
            .query_row("SELECT 1 FROM cases WHERE id = ?1;", [id], |row| row.get(0))
            .optional()?;
        if exists.is_none() {
            return Err(RepoError::not_found("case", id));
        }
        tx.execute("DELETE FROM case_labels WHERE case_id = ?1;", [id])?;
        insert_labels(&tx, id, label_ids)?;
        tx.commit()?;
        Ok(())
    }

    fn get_partner(&self, id: PartnerId) -> RepoResult<Option<Partner>> {
        get_partner(self.conn, id)
    }
}

fn insert_labels(tx: &Transaction<'_>, id: CaseId, label_ids: &[LabelId]) -> RepoResult<()> {
    for label_id in label_ids {
        tx.execute(
            "INSERT OR IGNORE INTO case_labels (case_id, label_id) VALUES (?1, ?2);",
            params![id, label_id],
        )?;
    }
    Ok(())
}

fn insert_action(tx: &Transaction<'_>, id: CaseId, action: &NewCaseAction) -> RepoResult<i64> {
    tx.execute(
        "INSERT INTO case_actions (case_id, action, created_by, created_on, assignee_id, note)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6);",
        params![
            id,
            action.action.code(),
            action.created_by,
            action.created_on,
            action.assignee_id,
            action.note.as_deref(),
        ],
    )?;
    Ok(tx.last_insert_rowid())
}

fn parse_case_row(row: &Row<'_>) -> RepoResult<Case> {
    Ok(Case {
        id: row.get("id")?,
        org_id: row.get("org_id")?,
        assignee_id: row.get("assignee_id")?,
        contact_uuid: row.get("contact_uuid")?,
        message_id: row.get("message_id")?,
        message_on: row.get("message_on")?,
        summary: row.get("summary")?,
        opened_on: row.get("opened_on")?,
        closed_on: row.get("closed_on")?,
    })
}

fn parse_action_row(row: &Row<'_>) -> RepoResult<CaseAction> {
    let code: String = row.get("action")?;
    let action = CaseActionKind::from_code(&code).ok_or_else(|| {
        RepoError::InvalidData(format!("invalid action `{code}` in case_actions.action"))
    })?;
    Ok(CaseAction {
        id: row.get("id")?,
        case_id: row.get("case_id")?,
        action,
        created_by: row.get("created_by")?,
        created_on: row.get("created_on")?,
        assignee_id: row.get("assignee_id")?,
        note: row.get("note")?,
    })
}
