//! Partner organizations that cases are assigned to.

use crate::model::org::OrgId;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

pub type PartnerId = i64;

pub const PARTNER_NAME_MAX_CHARS: usize = 128;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Partner {
    pub id: PartnerId,
    pub org_id: OrgId,
    pub name: String,
    pub is_active: bool,
}

impl Partner {
    pub fn as_json(&self) -> Value {
        json!({ "id": self.id, "name": self.name })
    }
}
