//! Permission rules for case editing.

use crate::model::case::Case;
use crate::model::org::User;
use crate::service::{ServiceError, ServiceResult};

/// Org admins can edit any case of their org; other users only cases
/// assigned to the partner of their profile.
pub fn can_edit_case(user: &User, case: &Case) -> bool {
    if user.is_admin_for(case.org_id) {
        return true;
    }
    user.partner_id == Some(case.assignee_id)
}

pub fn ensure_can_edit_case(user: &User, case: &Case) -> ServiceResult<()> {
    if can_edit_case(user, case) {
        Ok(())
    } else {
        Err(ServiceError::PermissionDenied)
    }
}
