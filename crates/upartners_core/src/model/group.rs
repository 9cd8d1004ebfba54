//! Local mirror of a platform contact group, used for filtering messages.

use crate::model::org::OrgId;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

pub type GroupId = i64;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Group {
    pub id: GroupId,
    pub org_id: OrgId,
    /// Platform group uuid; unique across all orgs.
    pub uuid: String,
    pub name: String,
    pub is_active: bool,
}

impl Group {
    pub fn as_json(&self) -> Value {
        json!({ "id": self.id, "name": self.name, "uuid": self.uuid })
    }
}
