//! Label use-case service.
//!
//! # Responsibility
//! - Validate and persist labels with their keywords and partners.
//! - Resolve message counts from the platform and case counts locally.
//! - Keep the platform labelling flow in step with local labels.
//!
//! # Invariants
//! - Every write that changes keywords or label activity enqueues the
//!   labelling-flow task unless the caller opts out.
//! - Count helpers make no platform call for an empty label list.

use crate::model::label::{validate_label_input, Label, LabelId};
use crate::model::org::{Org, OrgId};
use crate::model::partner::Partner;
use crate::remote::{ClientProvider, LabelRule};
use crate::repo::label_repo::{LabelCaseCounts, LabelDraft, LabelRepository};
use crate::service::{ServiceError, ServiceResult};
use crate::tasks::{Task, TaskQueue};
use log::info;
use std::collections::{BTreeMap, HashMap};

/// Create/update request for a label.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelInput {
    pub name: String,
    pub description: String,
    /// Raw keywords; normalized before storage.
    pub keywords: Vec<String>,
}

pub struct LabelService<'a, R: LabelRepository> {
    repo: R,
    clients: &'a dyn ClientProvider,
    tasks: &'a dyn TaskQueue,
}

impl<'a, R: LabelRepository> LabelService<'a, R> {
    pub fn new(repo: R, clients: &'a dyn ClientProvider, tasks: &'a dyn TaskQueue) -> Self {
        Self {
            repo,
            clients,
            tasks,
        }
    }

    /// Creates an active label linked to `partners`.
    ///
    /// # Contract
    /// - Keywords are normalized and stored comma-joined.
    /// - Partners must belong to the label's org.
    /// - Enqueues the labelling-flow task when `update_flow` is set.
    pub fn create(
        &self,
        org: &Org,
        input: &LabelInput,
        partners: &[Partner],
        update_flow: bool,
    ) -> ServiceResult<Label> {
        let draft = self.draft(org.id, input, partners)?;
        let label = self.repo.create_label(&draft)?;
        info!(
            "event=label_create module=service status=ok org_id={} label_id={} keywords={}",
            org.id,
            label.id,
            label.get_keywords().len()
        );
        if update_flow {
            self.update_labelling_flow(org.id)?;
        }
        Ok(label)
    }

    /// Replaces name, description, keywords and partners of a label.
    pub fn update(
        &self,
        org: &Org,
        id: LabelId,
        input: &LabelInput,
        partners: &[Partner],
        update_flow: bool,
    ) -> ServiceResult<Label> {
        let draft = self.draft(org.id, input, partners)?;
        let label = self.repo.update_label(id, &draft)?;
        info!(
            "event=label_update module=service status=ok org_id={} label_id={}",
            org.id, label.id
        );
        if update_flow {
            self.update_labelling_flow(org.id)?;
        }
        Ok(label)
    }

    pub fn get_label(&self, id: LabelId) -> ServiceResult<Label> {
        self.repo
            .get_label(id)?
            .ok_or_else(|| ServiceError::not_found("label", id))
    }

    /// Active labels of the org ordered by name.
    pub fn get_all(&self, org_id: OrgId) -> ServiceResult<Vec<Label>> {
        Ok(self.repo.list_active(org_id)?)
    }

    /// Active partners linked to the label.
    pub fn get_partners(&self, id: LabelId) -> ServiceResult<Vec<Partner>> {
        Ok(self.repo.list_partners(id)?)
    }

    /// Enqueues a rebuild of the org's labelling flow.
    pub fn update_labelling_flow(&self, org_id: OrgId) -> ServiceResult<()> {
        let task_id = self.tasks.enqueue(&Task::UpdateLabellingFlow { org_id })?;
        info!(
            "event=task_enqueue module=service status=ok kind=update_labelling_flow org_id={} task_id={}",
            org_id, task_id
        );
        Ok(())
    }

    /// Pushes keyword rules of all active labels to the platform.
    ///
    /// Labels without keywords produce no rule. Returns the rule count.
    pub fn push_labelling_flow(&self, org: &Org) -> ServiceResult<usize> {
        let rules: Vec<LabelRule> = self
            .repo
            .list_active(org.id)?
            .into_iter()
            .filter_map(|label| {
                let keywords = label.get_keywords();
                if keywords.is_empty() {
                    None
                } else {
                    Some(LabelRule {
                        label: label.name,
                        keywords,
                    })
                }
            })
            .collect();
        self.clients.client_for(org).update_labelling_flow(&rules)?;
        info!(
            "event=labelling_flow_push module=service status=ok org_id={} rules={}",
            org.id,
            rules.len()
        );
        Ok(rules.len())
    }

    /// Maps each label to its platform message count, 0 when the platform
    /// has no label of that name.
    pub fn get_message_counts(
        &self,
        org: &Org,
        labels: &[Label],
    ) -> ServiceResult<HashMap<LabelId, u64>> {
        if labels.is_empty() {
            return Ok(HashMap::new());
        }
        let remote = self.clients.client_for(org).get_labels()?;
        let by_name: HashMap<&str, u64> = remote
            .iter()
            .filter(|l| !l.name.is_empty())
            .map(|l| (l.name.as_str(), l.count))
            .collect();
        Ok(labels
            .iter()
            .map(|label| {
                let count = by_name.get(label.name.as_str()).copied().unwrap_or(0);
                (label.id, count)
            })
            .collect())
    }

    pub fn get_count(&self, org: &Org, label: &Label) -> ServiceResult<u64> {
        let counts = self.get_message_counts(org, std::slice::from_ref(label))?;
        Ok(counts.get(&label.id).copied().unwrap_or(0))
    }

    /// Open and total case counts per label; labels without cases map to 0.
    pub fn get_case_counts(
        &self,
        labels: &[Label],
    ) -> ServiceResult<BTreeMap<LabelId, LabelCaseCounts>> {
        let ids: Vec<LabelId> = labels.iter().map(|l| l.id).collect();
        let mut counts = self.repo.case_counts(&ids)?;
        for id in ids {
            counts.entry(id).or_default();
        }
        Ok(counts)
    }

    /// Deactivates the label and enqueues the labelling-flow task.
    pub fn release(&self, label: &Label) -> ServiceResult<()> {
        self.repo.set_active(label.id, false)?;
        info!(
            "event=label_release module=service status=ok org_id={} label_id={}",
            label.org_id, label.id
        );
        self.update_labelling_flow(label.org_id)
    }

    fn draft(&self, org_id: OrgId, input: &LabelInput, partners: &[Partner]) -> ServiceResult<LabelDraft> {
        let keywords = validate_label_input(&input.name, &input.description, &input.keywords)?;
        if let Some(foreign) = partners.iter().find(|p| p.org_id != org_id) {
            return Err(ServiceError::Validation(format!(
                "partner {} belongs to another org",
                foreign.id
            )));
        }
        let mut partner_ids: Vec<_> = partners.iter().map(|p| p.id).collect();
        partner_ids.sort_unstable();
        partner_ids.dedup();
        Ok(LabelDraft {
            org_id,
            name: input.name.trim().to_string(),
            description: input.description.clone(),
            keywords,
            partner_ids,
        })
    }
}
