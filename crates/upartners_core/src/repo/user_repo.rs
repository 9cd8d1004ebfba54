//! User, org-role and partner-profile persistence.
//!
//! # Invariants
//! - A user has at most one profile, so at most one partner.
//! - Role grants are unique per `(org, user, role)`.

use crate::model::org::{OrgId, OrgMembership, OrgRole, User, UserId};
use crate::model::partner::PartnerId;
use crate::repo::{bool_to_int, int_to_bool, is_unique_violation, RepoError, RepoResult};
use rusqlite::{params, Connection};

pub trait UserRepository {
    fn create_user(&self, username: &str, full_name: &str) -> RepoResult<User>;
    fn get_user(&self, id: UserId) -> RepoResult<Option<User>>;
    fn get_user_by_username(&self, username: &str) -> RepoResult<Option<User>>;
    fn grant_role(&self, user_id: UserId, org_id: OrgId, role: OrgRole) -> RepoResult<()>;
    fn revoke_role(&self, user_id: UserId, org_id: OrgId, role: OrgRole) -> RepoResult<()>;
    /// Creates or replaces the user's profile. `None` detaches the partner.
    fn set_profile_partner(&self, user_id: UserId, partner_id: Option<PartnerId>)
        -> RepoResult<()>;
    fn set_active(&self, user_id: UserId, is_active: bool) -> RepoResult<()>;
}

pub struct SqliteUserRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteUserRepository<'conn> {
    pub fn new(conn: &'conn Connection) -> Self {
        Self { conn }
    }
}

impl UserRepository for SqliteUserRepository<'_> {
    fn create_user(&self, username: &str, full_name: &str) -> RepoResult<User> {
        let username = username.trim();
        if username.is_empty() {
            return Err(RepoError::InvalidData("username must not be empty".to_string()));
        }
        self.conn
            .execute(
                "INSERT INTO users (username, full_name, is_active) VALUES (?1, ?2, 1);",
                params![username, full_name.trim()],
            )
            .map_err(|err| {
                if is_unique_violation(&err) {
                    RepoError::Conflict(format!("username `{username}` already exists"))
                } else {
                    err.into()
                }
            })?;
        let id = self.conn.last_insert_rowid();
        self.get_user(id)?
            .ok_or_else(|| RepoError::InvalidData(format!("user {id} missing after insert")))
    }

    fn get_user(&self, id: UserId) -> RepoResult<Option<User>> {
        load_user(self.conn, "u.id = ?1", &id)
    }

    fn get_user_by_username(&self, username: &str) -> RepoResult<Option<User>> {
        load_user(self.conn, "u.username = ?1", &username.trim())
    }

    fn grant_role(&self, user_id: UserId, org_id: OrgId, role: OrgRole) -> RepoResult<()> {
        self.conn.execute(
            "INSERT OR IGNORE INTO org_roles (org_id, user_id, role) VALUES (?1, ?2, ?3);",
            params![org_id, user_id, role.as_str()],
        )?;
        Ok(())
    }

    fn revoke_role(&self, user_id: UserId, org_id: OrgId, role: OrgRole) -> RepoResult<()> {
        self.conn.execute(
            "DELETE FROM org_roles WHERE org_id = ?1 AND user_id = ?2 AND role = ?3;",
            params![org_id, user_id, role.as_str()],
        )?;
        Ok(())
    }

    fn set_profile_partner(
        &self,
        user_id: UserId,
        partner_id: Option<PartnerId>,
    ) -> RepoResult<()> {
        if self.get_user(user_id)?.is_none() {
            return Err(RepoError::not_found("user", user_id));
        }
        self.conn.execute(
            "INSERT INTO user_profiles (user_id, partner_id) VALUES (?1, ?2)
             ON CONFLICT(user_id) DO UPDATE SET partner_id = excluded.partner_id;",
            params![user_id, partner_id],
        )?;
        Ok(())
    }

    fn set_active(&self, user_id: UserId, is_active: bool) -> RepoResult<()> {
        let changed = self.conn.execute(
            "UPDATE users SET is_active = ?1 WHERE id = ?2;",
            params![bool_to_int(is_active), user_id],
        )?;
        if changed == 0 {
            return Err(RepoError::not_found("user", user_id));
        }
        Ok(())
    }
}

/// Loads users whose row matches `filter_sql` plus their roles and profile.
pub(crate) fn load_users(
    conn: &Connection,
    filter_sql: &str,
    bind: &[&dyn rusqlite::ToSql],
) -> RepoResult<Vec<User>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT u.id, u.username, u.full_name, u.is_active, p.partner_id
         FROM users u
         LEFT JOIN user_profiles p ON p.user_id = u.id
         WHERE {filter_sql}
         ORDER BY u.username COLLATE NOCASE ASC, u.id ASC;"
    ))?;
    let mut rows = stmt.query(bind)?;
    let mut users = Vec::new();
    while let Some(row) = rows.next()? {
        users.push(User {
            id: row.get(0)?,
            username: row.get(1)?,
            full_name: row.get(2)?,
            is_active: int_to_bool(row.get(3)?, "users.is_active")?,
            memberships: Vec::new(),
            partner_id: row.get(4)?,
        });
    }
    for user in &mut users {
        user.memberships = load_memberships(conn, user.id)?;
    }
    Ok(users)
}

fn load_user(
    conn: &Connection,
    filter_sql: &str,
    bind: &dyn rusqlite::ToSql,
) -> RepoResult<Option<User>> {
    Ok(load_users(conn, filter_sql, &[bind])?.into_iter().next())
}

fn load_memberships(conn: &Connection, user_id: UserId) -> RepoResult<Vec<OrgMembership>> {
    let mut stmt = conn.prepare(
        "SELECT org_id, role FROM org_roles WHERE user_id = ?1 ORDER BY org_id ASC, role ASC;",
    )?;
    let mut rows = stmt.query([user_id])?;
    let mut memberships = Vec::new();
    while let Some(row) = rows.next()? {
        let role_text: String = row.get(1)?;
        let role = OrgRole::parse(&role_text).ok_or_else(|| {
            RepoError::InvalidData(format!("invalid role `{role_text}` in org_roles.role"))
        })?;
        memberships.push(OrgMembership {
            org_id: row.get(0)?,
            role,
        });
    }
    Ok(memberships)
}
