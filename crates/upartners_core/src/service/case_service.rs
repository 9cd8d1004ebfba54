//! Case use-case service.
//!
//! # Responsibility
//! - Open cases from inbound platform messages.
//! - Apply note/close/reopen/reassign transitions with their audit actions.
//! - Resolve the case contact from the platform.
//!
//! # Invariants
//! - Close, reopen and reassign check edit permission against the stored
//!   row, not the caller's copy, before any write.
//! - Every accepted transition appends exactly one case action.
//! - Notes need no edit permission.

use crate::db::now_epoch_ms;
use crate::model::case::{
    case_summary, Case, CaseAction, CaseActionKind, CaseId, CASE_NOTE_MAX_CHARS,
};
use crate::model::label::{Label, LabelId};
use crate::model::org::{Org, OrgId, User};
use crate::model::partner::Partner;
use crate::remote::{ClientProvider, RemoteContact, RemoteError, RemoteMessage};
use crate::repo::case_repo::{
    CaseChange, CaseListQuery, CaseRepository, CaseState, NewCase, NewCaseAction,
};
use crate::service::permissions::{can_edit_case, ensure_can_edit_case};
use crate::service::{ServiceError, ServiceResult};
use log::{info, warn};
use serde_json::Value;

pub struct CaseService<'a, R: CaseRepository> {
    repo: R,
    clients: &'a dyn ClientProvider,
}

impl<'a, R: CaseRepository> CaseService<'a, R> {
    pub fn new(repo: R, clients: &'a dyn ClientProvider) -> Self {
        Self { repo, clients }
    }

    pub fn get_case(&self, id: CaseId) -> ServiceResult<Case> {
        self.repo
            .get_case(id)?
            .ok_or_else(|| ServiceError::not_found("case", id))
    }

    /// All cases of the org, optionally restricted to one label.
    pub fn get_all(&self, org_id: OrgId, label_id: Option<LabelId>) -> ServiceResult<Vec<Case>> {
        self.list(org_id, label_id, CaseState::Any)
    }

    pub fn get_open(&self, org_id: OrgId, label_id: Option<LabelId>) -> ServiceResult<Vec<Case>> {
        self.list(org_id, label_id, CaseState::Open)
    }

    pub fn get_closed(
        &self,
        org_id: OrgId,
        label_id: Option<LabelId>,
    ) -> ServiceResult<Vec<Case>> {
        self.list(org_id, label_id, CaseState::Closed)
    }

    pub fn get_for_contact(&self, org_id: OrgId, contact_uuid: &str) -> ServiceResult<Vec<Case>> {
        Ok(self.repo.list_cases(&CaseListQuery {
            org_id,
            contact_uuid: Some(contact_uuid.to_string()),
            ..CaseListQuery::default()
        })?)
    }

    pub fn get_labels(&self, case: &Case) -> ServiceResult<Vec<Label>> {
        Ok(self.repo.list_labels(case.id)?)
    }

    pub fn get_actions(&self, case: &Case) -> ServiceResult<Vec<CaseAction>> {
        Ok(self.repo.list_actions(case.id)?)
    }

    pub fn can_edit(&self, user: &User, case: &Case) -> bool {
        can_edit_case(user, case)
    }

    /// Opens a case for `message`, assigned to `partner`.
    ///
    /// # Contract
    /// - Summary is the message text cut to 255 characters.
    /// - Appends an `Open` action carrying the assignee.
    /// - A second case for the same message fails with `Conflict`.
    pub fn open(
        &self,
        org: &Org,
        user: &User,
        labels: &[Label],
        partner: &Partner,
        message: &RemoteMessage,
    ) -> ServiceResult<Case> {
        ensure_assignable(org.id, partner)?;
        if let Some(foreign) = labels.iter().find(|l| l.org_id != org.id) {
            return Err(ServiceError::Validation(format!(
                "label {} belongs to another org",
                foreign.id
            )));
        }
        let new_case = NewCase {
            org_id: org.id,
            assignee_id: partner.id,
            contact_uuid: message.contact.clone(),
            message_id: message.id,
            message_on: message.created_on.timestamp_millis(),
            summary: case_summary(&message.text),
            opened_on: now_epoch_ms(),
            label_ids: labels.iter().map(|l| l.id).collect(),
        };
        let case = self.repo.open_case(&new_case, user.id)?;
        info!(
            "event=case_open module=service status=ok org_id={} case_id={} assignee_id={} labels={}",
            org.id,
            case.id,
            partner.id,
            labels.len()
        );
        Ok(case)
    }

    /// Appends a note. Any user of the org may add notes.
    pub fn note(&self, case: &Case, user: &User, note: &str) -> ServiceResult<CaseAction> {
        let note = clean_note(Some(note))?
            .ok_or_else(|| ServiceError::Validation("note is empty".to_string()))?;
        let action = self.repo.append_action(
            case.id,
            &NewCaseAction {
                action: CaseActionKind::Note,
                created_by: user.id,
                created_on: now_epoch_ms(),
                assignee_id: None,
                note: Some(note),
            },
        )?;
        info!(
            "event=case_note module=service status=ok case_id={} action_id={}",
            case.id, action.id
        );
        Ok(action)
    }

    pub fn close(&self, case: &Case, user: &User, note: Option<&str>) -> ServiceResult<Case> {
        let case = &self.get_case(case.id)?;
        self.authorize(case, user, CaseActionKind::Close)?;
        if case.is_closed() {
            return Err(ServiceError::InvalidState(format!(
                "case {} is already closed",
                case.id
            )));
        }
        let closed_on = now_epoch_ms();
        self.transition(
            case,
            CaseChange::Close { closed_on },
            CaseActionKind::Close,
            user,
            None,
            note,
        )
    }

    pub fn reopen(&self, case: &Case, user: &User, note: Option<&str>) -> ServiceResult<Case> {
        let case = &self.get_case(case.id)?;
        self.authorize(case, user, CaseActionKind::Reopen)?;
        if !case.is_closed() {
            return Err(ServiceError::InvalidState(format!(
                "case {} is not closed",
                case.id
            )));
        }
        self.transition(
            case,
            CaseChange::Reopen,
            CaseActionKind::Reopen,
            user,
            None,
            note,
        )
    }

    /// Moves the case to `partner`; the action records the new assignee.
    pub fn reassign(
        &self,
        case: &Case,
        user: &User,
        partner: &Partner,
        note: Option<&str>,
    ) -> ServiceResult<Case> {
        let case = &self.get_case(case.id)?;
        self.authorize(case, user, CaseActionKind::Reassign)?;
        ensure_assignable(case.org_id, partner)?;
        self.transition(
            case,
            CaseChange::Reassign {
                assignee_id: partner.id,
            },
            CaseActionKind::Reassign,
            user,
            Some(partner),
            note,
        )
    }

    /// Replaces the label set of the case in one transaction.
    pub fn update_labels(&self, case: &Case, labels: &[Label]) -> ServiceResult<()> {
        if let Some(foreign) = labels.iter().find(|l| l.org_id != case.org_id) {
            return Err(ServiceError::Validation(format!(
                "label {} belongs to another org",
                foreign.id
            )));
        }
        let mut ids: Vec<LabelId> = labels.iter().map(|l| l.id).collect();
        ids.sort_unstable();
        ids.dedup();
        self.repo.replace_labels(case.id, &ids)?;
        info!(
            "event=case_labels_update module=service status=ok case_id={} labels={}",
            case.id,
            ids.len()
        );
        Ok(())
    }

    /// Fetches the case contact; `None` when the platform no longer has it.
    pub fn fetch_contact(&self, org: &Org, case: &Case) -> ServiceResult<Option<RemoteContact>> {
        match self.clients.client_for(org).get_contact(&case.contact_uuid) {
            Ok(contact) => Ok(Some(contact)),
            Err(RemoteError::NoSuchObject { .. }) => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    /// `{id, assignee, labels, summary, opened_on, is_closed}`.
    pub fn as_json(&self, case: &Case) -> ServiceResult<Value> {
        let assignee = self
            .repo
            .get_partner(case.assignee_id)?
            .ok_or_else(|| ServiceError::not_found("partner", case.assignee_id))?;
        let labels = self.repo.list_labels(case.id)?;
        Ok(case.as_json(&assignee, &labels))
    }

    fn list(
        &self,
        org_id: OrgId,
        label_id: Option<LabelId>,
        state: CaseState,
    ) -> ServiceResult<Vec<Case>> {
        Ok(self.repo.list_cases(&CaseListQuery {
            org_id,
            label_id,
            state,
            ..CaseListQuery::default()
        })?)
    }

    fn authorize(&self, case: &Case, user: &User, kind: CaseActionKind) -> ServiceResult<()> {
        ensure_can_edit_case(user, case).inspect_err(|_| {
            warn!(
                "event=case_transition module=service status=denied action={} case_id={} user_id={}",
                kind.code(),
                case.id,
                user.id
            );
        })
    }

    fn transition(
        &self,
        case: &Case,
        change: CaseChange,
        kind: CaseActionKind,
        user: &User,
        assignee: Option<&Partner>,
        note: Option<&str>,
    ) -> ServiceResult<Case> {
        let action = NewCaseAction {
            action: kind,
            created_by: user.id,
            created_on: now_epoch_ms(),
            assignee_id: assignee.map(|p| p.id),
            note: clean_note(note)?,
        };
        let updated = self.repo.apply_change(case, change, &action)?;
        info!(
            "event=case_transition module=service status=ok action={} case_id={} user_id={}",
            kind.code(),
            case.id,
            user.id
        );
        Ok(updated)
    }
}

fn ensure_assignable(org_id: OrgId, partner: &Partner) -> ServiceResult<()> {
    if partner.org_id != org_id {
        return Err(ServiceError::Validation(format!(
            "partner {} belongs to another org",
            partner.id
        )));
    }
    if !partner.is_active {
        return Err(ServiceError::Validation(format!(
            "partner {} is not active",
            partner.id
        )));
    }
    Ok(())
}

/// Blank notes become `None`; notes over the limit are rejected.
fn clean_note(note: Option<&str>) -> ServiceResult<Option<String>> {
    let Some(note) = note.map(str::trim).filter(|n| !n.is_empty()) else {
        return Ok(None);
    };
    if note.chars().count() > CASE_NOTE_MAX_CHARS {
        return Err(ServiceError::Validation(format!(
            "note exceeds {CASE_NOTE_MAX_CHARS} characters"
        )));
    }
    Ok(Some(note.to_string()))
}
