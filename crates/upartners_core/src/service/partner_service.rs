//! Partner use-case service.
//!
//! # Responsibility
//! - Create and release partners of an org.
//! - Resolve the labels and users visible through a partner.

use crate::model::label::Label;
use crate::model::org::{OrgId, OrgRole, User};
use crate::model::partner::{Partner, PartnerId, PARTNER_NAME_MAX_CHARS};
use crate::repo::partner_repo::PartnerRepository;
use crate::service::{ServiceError, ServiceResult};
use log::info;

pub struct PartnerService<R: PartnerRepository> {
    repo: R,
}

impl<R: PartnerRepository> PartnerService<R> {
    pub fn new(repo: R) -> Self {
        Self { repo }
    }

    /// Creates an active partner.
    ///
    /// # Contract
    /// - Name is trimmed; empty names or names over
    ///   [`PARTNER_NAME_MAX_CHARS`] are rejected.
    pub fn create(&self, org_id: OrgId, name: &str) -> ServiceResult<Partner> {
        let name = name.trim();
        if name.is_empty() {
            return Err(ServiceError::Validation("partner name is empty".to_string()));
        }
        if name.chars().count() > PARTNER_NAME_MAX_CHARS {
            return Err(ServiceError::Validation(format!(
                "partner name exceeds {PARTNER_NAME_MAX_CHARS} characters"
            )));
        }
        let partner = self.repo.create_partner(org_id, name)?;
        info!(
            "event=partner_create module=service status=ok org_id={} partner_id={}",
            org_id, partner.id
        );
        Ok(partner)
    }

    pub fn get_partner(&self, id: PartnerId) -> ServiceResult<Partner> {
        self.repo
            .get_partner(id)?
            .ok_or_else(|| ServiceError::not_found("partner", id))
    }

    /// Active partners of the org ordered by name.
    pub fn get_all(&self, org_id: OrgId) -> ServiceResult<Vec<Partner>> {
        Ok(self.repo.list_active(org_id)?)
    }

    pub fn get_labels(&self, id: PartnerId) -> ServiceResult<Vec<Label>> {
        Ok(self.repo.list_labels(id)?)
    }

    /// Active users whose profile points at the partner.
    pub fn get_users(&self, id: PartnerId) -> ServiceResult<Vec<User>> {
        Ok(self.repo.list_users(id, None)?)
    }

    /// Partner users holding the org editor role.
    pub fn get_managers(&self, id: PartnerId) -> ServiceResult<Vec<User>> {
        Ok(self.repo.list_users(id, Some(OrgRole::Editor))?)
    }

    /// Partner users holding the org viewer role.
    pub fn get_analysts(&self, id: PartnerId) -> ServiceResult<Vec<User>> {
        Ok(self.repo.list_users(id, Some(OrgRole::Viewer))?)
    }

    pub fn release(&self, id: PartnerId) -> ServiceResult<()> {
        self.repo.set_active(id, false)?;
        info!(
            "event=partner_release module=service status=ok partner_id={}",
            id
        );
        Ok(())
    }
}
