//! Group use-case service.
//!
//! # Responsibility
//! - Mirror the platform contact groups an org has selected.
//! - Resolve group sizes from the platform.
//!
//! # Invariants
//! - Group names always come from the platform during sync.
//! - Sync validates every requested uuid before writing anything.

use crate::model::group::{Group, GroupId};
use crate::model::org::{Org, OrgId};
use crate::remote::{ClientProvider, RemoteGroup};
use crate::repo::group_repo::GroupRepository;
use crate::service::{ServiceError, ServiceResult};
use log::info;
use std::collections::HashMap;

pub struct GroupService<'a, R: GroupRepository> {
    repo: R,
    clients: &'a dyn ClientProvider,
}

impl<'a, R: GroupRepository> GroupService<'a, R> {
    pub fn new(repo: R, clients: &'a dyn ClientProvider) -> Self {
        Self { repo, clients }
    }

    pub fn create(&self, org_id: OrgId, name: &str, uuid: &str) -> ServiceResult<Group> {
        let uuid = uuid.trim();
        if uuid.is_empty() {
            return Err(ServiceError::Validation("group uuid is empty".to_string()));
        }
        Ok(self.repo.create_group(org_id, name.trim(), uuid)?)
    }

    pub fn get_group(&self, id: GroupId) -> ServiceResult<Group> {
        self.repo
            .get_group(id)?
            .ok_or_else(|| ServiceError::not_found("group", id))
    }

    /// Active groups of the org ordered by name.
    pub fn get_all(&self, org_id: OrgId) -> ServiceResult<Vec<Group>> {
        Ok(self.repo.list_active(org_id)?)
    }

    /// Maps each group to its platform size, 0 when the platform omits it.
    pub fn fetch_sizes(&self, org: &Org, groups: &[Group]) -> ServiceResult<HashMap<GroupId, u64>> {
        if groups.is_empty() {
            return Ok(HashMap::new());
        }
        let uuids: Vec<String> = groups.iter().map(|g| g.uuid.clone()).collect();
        let remote = self.clients.client_for(org).get_groups(&uuids)?;
        let by_uuid: HashMap<&str, u64> =
            remote.iter().map(|g| (g.uuid.as_str(), g.size)).collect();
        Ok(groups
            .iter()
            .map(|g| (g.id, by_uuid.get(g.uuid.as_str()).copied().unwrap_or(0)))
            .collect())
    }

    pub fn get_size(&self, org: &Org, group: &Group) -> ServiceResult<u64> {
        let sizes = self.fetch_sizes(org, std::slice::from_ref(group))?;
        Ok(sizes.get(&group.id).copied().unwrap_or(0))
    }

    /// Makes `uuids` the org's active group set.
    ///
    /// # Contract
    /// - Groups outside `uuids` are deactivated.
    /// - Known groups are reactivated and renamed; missing ones are created.
    /// - A uuid unknown to the platform fails with `NotFound` and leaves
    ///   local groups untouched.
    /// - A uuid held by another org fails with `Conflict`; nothing is
    ///   written.
    pub fn update_groups(&self, org: &Org, uuids: &[String]) -> ServiceResult<Vec<Group>> {
        let mut wanted: Vec<String> = Vec::with_capacity(uuids.len());
        for uuid in uuids.iter().map(|u| u.trim()).filter(|u| !u.is_empty()) {
            if !wanted.iter().any(|w| w == uuid) {
                wanted.push(uuid.to_string());
            }
        }

        let remote: Vec<RemoteGroup> = if wanted.is_empty() {
            Vec::new()
        } else {
            self.clients.client_for(org).get_groups(&wanted)?
        };
        let by_uuid: HashMap<&str, &RemoteGroup> =
            remote.iter().map(|g| (g.uuid.as_str(), g)).collect();
        if let Some(missing) = wanted.iter().find(|u| !by_uuid.contains_key(u.as_str())) {
            return Err(ServiceError::not_found("remote group", missing));
        }

        let synced: Vec<(String, String)> = wanted
            .iter()
            .map(|uuid| {
                let name = by_uuid
                    .get(uuid.as_str())
                    .map(|g| g.name.clone())
                    .unwrap_or_default();
                (uuid.clone(), name)
            })
            .collect();
        let report = self.repo.sync_groups(org.id, &synced)?;
        info!(
            "event=group_sync module=service status=ok org_id={} active={} created={} deactivated={}",
            org.id,
            wanted.len(),
            report.created,
            report.deactivated
        );
        self.get_all(org.id)
    }
}
