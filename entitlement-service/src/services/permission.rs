//! Authorization decisions for group management and inspection.

use service_core::error::AppError;

use crate::models::{ChildrenReference, EntityNode, Role};

use super::error::ServiceError;
use super::retrieval::RetrievalService;

/// Members of this group may list and count any group in the partition.
pub const ADMIN_GROUP: &str = "service.entitlements.admin";
/// Members of this group may manage any group in the partition.
pub const OPS_GROUP: &str = "users.datalake.ops";
/// Members of this group may manage any data or user group.
pub const DATA_ROOT_GROUP: &str = "users.data.root";

#[derive(Clone)]
pub struct PermissionService {
    retrieval: RetrievalService,
    service_principal: String,
}

impl PermissionService {
    pub fn new(retrieval: RetrievalService, service_principal: &str) -> Self {
        Self {
            retrieval,
            service_principal: service_principal.to_string(),
        }
    }

    pub async fn verify_can_manage_members(
        &self,
        requester: &EntityNode,
        group: &EntityNode,
    ) -> Result<(), AppError> {
        if self.has_owner_permission_of(requester, group).await? {
            Ok(())
        } else {
            Err(ServiceError::NotAuthorized.into())
        }
    }

    /// True when the requester is the tenant service principal, carries a
    /// privileged group, or is a direct OWNER of `group`.
    pub async fn has_owner_permission_of(
        &self,
        requester: &EntityNode,
        group: &EntityNode,
    ) -> Result<bool, AppError> {
        if requester.node_id.eq_ignore_ascii_case(&self.service_principal) {
            return Ok(true);
        }
        if self.belongs_to_group(requester, OPS_GROUP).await {
            return Ok(true);
        }
        if (group.is_data_group() || group.is_user_group())
            && self.belongs_to_group(requester, DATA_ROOT_GROUP).await
        {
            return Ok(true);
        }
        self.retrieval
            .has_direct_child(group, &ChildrenReference::from_node(requester, Role::Owner))
            .await
    }

    pub async fn has_admin_permission(&self, requester: &EntityNode) -> bool {
        self.belongs_to_group(requester, ADMIN_GROUP).await
    }

    /// True when the requester carries one of the partition-wide management
    /// groups. Gates listings made on behalf of another member.
    pub async fn has_partition_wide_permission(&self, requester: &EntityNode) -> bool {
        self.belongs_to_any_group(requester, &[OPS_GROUP, ADMIN_GROUP])
            .await
    }

    async fn belongs_to_group(&self, requester: &EntityNode, group_name: &str) -> bool {
        self.belongs_to_any_group(requester, &[group_name]).await
    }

    /// Transitive membership probe for privileged groups, matched by group
    /// name. A failed traversal counts as no membership.
    async fn belongs_to_any_group(&self, requester: &EntityNode, group_names: &[&str]) -> bool {
        match self.retrieval.load_all_parents(requester).await {
            Ok(tree) => tree.parent_references.iter().any(|parent| {
                group_names
                    .iter()
                    .any(|name| parent.name.eq_ignore_ascii_case(name))
            }),
            Err(e) => {
                tracing::warn!(groups = ?group_names, error = %e, "Privileged group check failed");
                false
            }
        }
    }
}
