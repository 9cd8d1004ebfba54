//! Case and case-action records.
//!
//! # Invariants
//! - A case always has exactly one assignee partner.
//! - `closed_on` is `None` while open and `Some` while closed.
//! - Case actions are append-only and ordered by id.

use crate::model::label::Label;
use crate::model::org::{OrgId, User, UserId};
use crate::model::partner::{Partner, PartnerId};
use crate::model::text::truncate;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

pub type CaseId = i64;
pub type CaseActionId = i64;

pub const CASE_SUMMARY_MAX_CHARS: usize = 255;
pub const CASE_NOTE_MAX_CHARS: usize = 1024;

/// Tracked issue opened from one inbound message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Case {
    pub id: CaseId,
    pub org_id: OrgId,
    pub assignee_id: PartnerId,
    pub contact_uuid: String,
    /// Platform id of the message that opened the case. Unique.
    pub message_id: i64,
    pub message_on: i64,
    pub summary: String,
    pub opened_on: i64,
    pub closed_on: Option<i64>,
}

impl Case {
    pub fn is_closed(&self) -> bool {
        self.closed_on.is_some()
    }

    /// JSON projection with the resolved assignee and active labels.
    pub fn as_json(&self, assignee: &Partner, labels: &[Label]) -> Value {
        json!({
            "id": self.id,
            "assignee": assignee.as_json(),
            "labels": labels.iter().map(|l| l.as_json(None)).collect::<Vec<_>>(),
            "summary": self.summary,
            "opened_on": self.opened_on,
            "is_closed": self.is_closed(),
        })
    }
}

/// Derives the stored case summary from the opening message text.
pub fn case_summary(text: &str) -> String {
    truncate(text, CASE_SUMMARY_MAX_CHARS)
}

/// Kind of state transition recorded by a [`CaseAction`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CaseActionKind {
    #[serde(rename = "O")]
    Open,
    #[serde(rename = "N")]
    Note,
    #[serde(rename = "A")]
    Reassign,
    #[serde(rename = "C")]
    Close,
    #[serde(rename = "R")]
    Reopen,
}

impl CaseActionKind {
    /// Single-letter code used in storage and JSON.
    pub fn code(self) -> &'static str {
        match self {
            Self::Open => "O",
            Self::Note => "N",
            Self::Reassign => "A",
            Self::Close => "C",
            Self::Reopen => "R",
        }
    }

    pub fn from_code(value: &str) -> Option<Self> {
        match value {
            "O" => Some(Self::Open),
            "N" => Some(Self::Note),
            "A" => Some(Self::Reassign),
            "C" => Some(Self::Close),
            "R" => Some(Self::Reopen),
            _ => None,
        }
    }

    pub fn display_name(self) -> &'static str {
        match self {
            Self::Open => "Open",
            Self::Note => "Add Note",
            Self::Reassign => "Reassign",
            Self::Close => "Close",
            Self::Reopen => "Reopen",
        }
    }
}

/// Immutable audit record of one case transition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaseAction {
    pub id: CaseActionId,
    pub case_id: CaseId,
    pub action: CaseActionKind,
    pub created_by: UserId,
    pub created_on: i64,
    pub assignee_id: Option<PartnerId>,
    pub note: Option<String>,
}

impl CaseAction {
    /// JSON projection with the resolved creator and optional assignee.
    pub fn as_json(&self, created_by: &User, assignee: Option<&Partner>) -> Value {
        json!({
            "id": self.id,
            "action": self.action.code(),
            "created_by": { "id": created_by.id, "name": created_by.display_name() },
            "created_on": self.created_on,
            "assignee": assignee.map(Partner::as_json),
            "note": self.note,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::{case_summary, CaseActionKind, CASE_SUMMARY_MAX_CHARS};

    #[test]
    fn action_codes_roundtrip() {
        for kind in [
            CaseActionKind::Open,
            CaseActionKind::Note,
            CaseActionKind::Reassign,
            CaseActionKind::Close,
            CaseActionKind::Reopen,
        ] {
            assert_eq!(CaseActionKind::from_code(kind.code()), Some(kind));
        }
        assert_eq!(CaseActionKind::from_code("X"), None);
    }

    #[test]
    fn action_kind_serializes_as_code() {
        let value = serde_json::to_value(CaseActionKind::Reassign).unwrap();
        assert_eq!(value, serde_json::json!("A"));
    }

    #[test]
    fn summary_is_truncated_to_column_width() {
        let summary = case_summary(&"a".repeat(400));
        assert_eq!(summary.chars().count(), CASE_SUMMARY_MAX_CHARS);
    }
}
