//! Message export requests.

use crate::model::org::{OrgId, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub type ExportId = i64;

/// Persisted export request. `filename` stays empty until the export ran.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageExport {
    pub id: ExportId,
    pub org_id: OrgId,
    /// JSON-encoded [`MessageSearch`].
    pub search: String,
    pub filename: String,
    pub created_by: UserId,
    pub created_on: i64,
}

impl MessageExport {
    pub fn get_search(&self) -> Result<MessageSearch, serde_json::Error> {
        serde_json::from_str(&self.search)
    }

    pub fn is_complete(&self) -> bool {
        !self.filename.is_empty()
    }
}

/// Message search captured from the inbox view when an export is requested.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageSearch {
    /// Platform label names; a `-` prefix excludes a label.
    #[serde(default)]
    pub labels: Vec<String>,
    /// Platform group uuids.
    #[serde(default)]
    pub groups: Vec<String>,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub after: Option<DateTime<Utc>>,
    #[serde(default)]
    pub before: Option<DateTime<Utc>>,
    #[serde(default)]
    pub reverse: bool,
}
