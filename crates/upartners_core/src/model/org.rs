//! Tenant organizations and their users.
//!
//! Orgs are owned by the hosting dashboard; this crate mirrors the fields it
//! needs (api token, contact fields shown in exports) and the per-org roles
//! used for permission checks.

use crate::model::partner::PartnerId;
use serde::{Deserialize, Serialize};

pub type OrgId = i64;
pub type UserId = i64;

/// Tenant organization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Org {
    pub id: OrgId,
    pub name: String,
    /// Token used to authenticate against the messaging platform.
    #[serde(skip_serializing)]
    pub api_token: String,
    pub timezone: String,
    /// Platform contact field keys included as extra export columns.
    pub contact_fields: Vec<String>,
    pub is_active: bool,
}

/// Role a user holds within one org.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrgRole {
    Admin,
    Editor,
    Viewer,
}

impl OrgRole {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Admin => "admin",
            Self::Editor => "editor",
            Self::Viewer => "viewer",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "admin" => Some(Self::Admin),
            "editor" => Some(Self::Editor),
            "viewer" => Some(Self::Viewer),
            _ => None,
        }
    }
}

/// One `(org, role)` grant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrgMembership {
    pub org_id: OrgId,
    pub role: OrgRole,
}

/// Dashboard user with org roles and optional partner profile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    /// Login name; doubles as the notification email address.
    pub username: String,
    pub full_name: String,
    pub is_active: bool,
    pub memberships: Vec<OrgMembership>,
    /// `None` means the user has no profile.
    pub partner_id: Option<PartnerId>,
}

impl User {
    pub fn has_role(&self, org_id: OrgId, role: OrgRole) -> bool {
        self.memberships
            .iter()
            .any(|m| m.org_id == org_id && m.role == role)
    }

    pub fn is_admin_for(&self, org_id: OrgId) -> bool {
        self.has_role(org_id, OrgRole::Admin)
    }

    pub fn has_profile(&self) -> bool {
        self.partner_id.is_some()
    }

    /// Display name, falling back to the username when no full name is set.
    pub fn display_name(&self) -> &str {
        if self.full_name.trim().is_empty() {
            self.username.as_str()
        } else {
            self.full_name.as_str()
        }
    }
}
