//! Membership workflows: add, remove, bulk-delete, list, count.

use std::collections::HashSet;
use std::sync::Arc;

use service_core::error::AppError;
use validator::Validate;

use crate::config::FeatureConfig;
use crate::dtos::{AddMemberDto, MembersCountResponse, RequestContext};
use crate::models::{ChangeEvent, ChildrenReference, EntityNode, Role};
use crate::storage::{
    AddEdgeOperation, GraphStore, Operation, OperationRunner, RemoveEdgeOperation,
};

use super::audit::{AuditLogger, AuditSink};
use super::cache::GroupCacheService;
use super::error::ServiceError;
use super::events::ChangeEventPublisher;
use super::permission::PermissionService;
use super::retrieval::RetrievalService;
use super::tenant::TenantRegistry;

#[derive(Clone)]
pub struct MemberService {
    store: Arc<dyn GraphStore>,
    retrieval: RetrievalService,
    cache: Arc<GroupCacheService>,
    permission: PermissionService,
    tenant_registry: Arc<dyn TenantRegistry>,
    audit_sink: Arc<dyn AuditSink>,
    event_publisher: Arc<dyn ChangeEventPublisher>,
    features: FeatureConfig,
}

impl MemberService {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        store: Arc<dyn GraphStore>,
        retrieval: RetrievalService,
        cache: Arc<GroupCacheService>,
        permission: PermissionService,
        tenant_registry: Arc<dyn TenantRegistry>,
        audit_sink: Arc<dyn AuditSink>,
        event_publisher: Arc<dyn ChangeEventPublisher>,
        features: FeatureConfig,
    ) -> Self {
        Self {
            store,
            retrieval,
            cache,
            permission,
            tenant_registry,
            audit_sink,
            event_publisher,
            features,
        }
    }

    /// Attach a member to a group. A member carrying the partition group
    /// domain must name an existing group; anything else is taken as a user.
    /// Returns the new edge and the impacted user ids.
    pub async fn add_member(
        &self,
        group_email: &str,
        dto: AddMemberDto,
        ctx: &RequestContext,
    ) -> Result<(ChildrenReference, HashSet<String>), AppError> {
        dto.validate()?;
        tracing::debug!("requested by {}", ctx.requester_id);
        let tenant = self.tenant_registry.resolve(&ctx.partition_id).await?;
        let member_email = dto.email.to_lowercase();

        let member_node = if member_email.ends_with(&format!("@{}", tenant.domain)) {
            self.retrieval
                .get_node(&member_email, &ctx.partition_id)
                .await?
                .ok_or(ServiceError::MemberGroupNotFound(member_email.clone()))?
        } else {
            EntityNode::member_node_for_new_user(&member_email, &ctx.partition_id)
        };
        let group = self
            .retrieval
            .group_existence_validation(group_email, &ctx.partition_id)
            .await?;
        let requester_node =
            EntityNode::member_node_for_requester(&ctx.requester_id, &ctx.partition_id);
        self.permission
            .verify_can_manage_members(&requester_node, &group)
            .await?;

        if member_node.is_group() && dto.role == Role::Owner {
            return Err(ServiceError::GroupOwnerNotAllowed.into());
        }
        if self
            .retrieval
            .direct_child_reference(&member_node, &group)
            .await?
            .is_some()
        {
            return Err(ServiceError::AlreadyMember {
                member: member_node.node_id.clone(),
                group: group.node_id.clone(),
            }
            .into());
        }

        let member_parents = self.retrieval.load_all_parents(&member_node).await?;
        let parents_in_partition = member_parents
            .parent_references
            .iter()
            .filter(|parent| parent.data_partition_id.eq_ignore_ascii_case(&ctx.partition_id))
            .count();
        if parents_in_partition >= EntityNode::MAX_PARENTS {
            tracing::error!(
                "Identity {} already belongs to {} groups",
                member_node.node_id,
                parents_in_partition
            );
            return Err(ServiceError::GroupQuotaExceeded {
                member: member_node.node_id.clone(),
                limit: EntityNode::MAX_PARENTS,
            }
            .into());
        }

        if group.node_id.eq_ignore_ascii_case(&member_node.node_id) {
            return Err(ServiceError::CyclicMembership.into());
        }
        let group_ancestors = self.retrieval.load_all_parents(&group).await?;
        if group_ancestors
            .parent_references
            .iter()
            .any(|parent| parent.id.eq_ignore_ascii_case(&member_node.node_id))
        {
            return Err(ServiceError::CyclicMembership.into());
        }

        let impacted = self.impacted_users_of(&member_node).await?;
        let reference = ChildrenReference::from_node(&member_node, dto.role);
        let operations: Vec<Box<dyn Operation>> = vec![Box::new(AddEdgeOperation::new(
            Arc::clone(&self.store),
            group.clone(),
            reference.clone(),
        ))];
        let audit = self.audit_logger(ctx);

        match OperationRunner::run(operations).await {
            Ok(()) => {
                match self
                    .cache
                    .refresh_list_group_cache(&impacted, &ctx.partition_id)
                    .await
                {
                    Ok(()) => {
                        audit
                            .add_member_success(&group.node_id, &member_node.node_id, dto.role.as_str())
                            .await;
                        self.publish_events(&[ChangeEvent::member_added(
                            &group.node_id,
                            &member_node.node_id,
                            &ctx.requester_id,
                        )])
                        .await;
                        Ok((reference, impacted))
                    }
                    Err(e) => {
                        audit
                            .add_member_failure(&group.node_id, &member_node.node_id, dto.role.as_str())
                            .await;
                        Err(e)
                    }
                }
            }
            Err(e) => {
                self.refresh_after_rollback(&impacted, &ctx.partition_id).await;
                audit
                    .add_member_failure(&group.node_id, &member_node.node_id, dto.role.as_str())
                    .await;
                Err(e)
            }
        }
    }

    /// Detach a member from one group. Returns the impacted user ids.
    pub async fn remove_member(
        &self,
        group_email: &str,
        member_email: &str,
        ctx: &RequestContext,
    ) -> Result<HashSet<String>, AppError> {
        tracing::debug!("requested by {}", ctx.requester_id);
        let tenant = self.tenant_registry.resolve(&ctx.partition_id).await?;
        let group = self
            .retrieval
            .group_existence_validation(group_email, &ctx.partition_id)
            .await?;
        let requester_node =
            EntityNode::member_node_for_requester(&ctx.requester_id, &ctx.partition_id);
        self.permission
            .verify_can_manage_members(&requester_node, &group)
            .await?;

        let member_node =
            self.retrieval
                .member_node_for_removal(member_email, &ctx.partition_id, &tenant.domain);
        let reference = self
            .retrieval
            .direct_child_reference(&member_node, &group)
            .await?
            .ok_or(ServiceError::NotDirectChild {
                group: group.node_id.clone(),
                member: member_node.node_id.clone(),
            })?;

        if self.features.data_root_hierarchy_enabled
            && member_node.is_users_data_root_group()
            && group.is_data_group()
        {
            return Err(ServiceError::DataRootRemoval.into());
        }
        if group.is_root_users_group() {
            let member_parents = self
                .retrieval
                .load_direct_parents(&ctx.partition_id, &member_node.node_id)
                .await?;
            if member_parents.len() > 1 {
                return Err(ServiceError::RootUsersGroupRemoval {
                    member: member_node.node_id.clone(),
                    group: group.node_id.clone(),
                }
                .into());
            }
        }

        let impacted = self.impacted_users_of(&member_node).await?;
        let operations: Vec<Box<dyn Operation>> = vec![Box::new(RemoveEdgeOperation::new(
            Arc::clone(&self.store),
            group.clone(),
            reference,
        ))];
        let audit = self.audit_logger(ctx);

        match OperationRunner::run(operations).await {
            Ok(()) => {
                match self
                    .cache
                    .refresh_list_group_cache(&impacted, &ctx.partition_id)
                    .await
                {
                    Ok(()) => {
                        audit
                            .remove_member_success(
                                &group.node_id,
                                &member_node.node_id,
                                &ctx.requester_id,
                            )
                            .await;
                        self.publish_events(&[ChangeEvent::member_removed(
                            &group.node_id,
                            &member_node.node_id,
                            &ctx.requester_id,
                        )])
                        .await;
                        Ok(impacted)
                    }
                    Err(e) => {
                        audit
                            .remove_member_failure(
                                &group.node_id,
                                &member_node.node_id,
                                &ctx.requester_id,
                            )
                            .await;
                        Err(e)
                    }
                }
            }
            Err(e) => {
                self.refresh_after_rollback(&impacted, &ctx.partition_id).await;
                audit
                    .remove_member_failure(&group.node_id, &member_node.node_id, &ctx.requester_id)
                    .await;
                Err(e)
            }
        }
    }

    /// Detach a member from every group it directly belongs to, then drop
    /// its cached closure. The root users group goes last so the
    /// still-provisioned guard never fires mid-removal. A member with no
    /// memberships resolves to a no-op.
    pub async fn delete_member(
        &self,
        member_email: &str,
        ctx: &RequestContext,
    ) -> Result<(), AppError> {
        tracing::info!("requested by {}", ctx.requester_id);
        let member_email = member_email.to_lowercase();
        let mut parents = self
            .retrieval
            .load_direct_parents(&ctx.partition_id, &member_email)
            .await?;
        parents.sort_by_key(|parent| (parent.is_root_users_group(), parent.id.clone()));
        for parent in &parents {
            self.remove_member(&parent.id, &member_email, ctx).await?;
        }
        self.cache
            .flush_list_group_cache_for_user(&member_email, &ctx.partition_id)
            .await?;
        Ok(())
    }

    /// Direct members of a group, optionally narrowed to one role.
    pub async fn list_members(
        &self,
        group_email: &str,
        role: Option<Role>,
        ctx: &RequestContext,
    ) -> Result<Vec<ChildrenReference>, AppError> {
        let audit = self.audit_logger(ctx);
        match self.list_members_checked(group_email, role, ctx).await {
            Ok(children) => {
                audit.list_members_success(group_email).await;
                Ok(children)
            }
            Err(e) => {
                audit.list_members_failure(group_email).await;
                Err(e)
            }
        }
    }

    async fn list_members_checked(
        &self,
        group_email: &str,
        role: Option<Role>,
        ctx: &RequestContext,
    ) -> Result<Vec<ChildrenReference>, AppError> {
        let group = self
            .retrieval
            .group_existence_validation(group_email, &ctx.partition_id)
            .await?;
        let requester_node =
            EntityNode::member_node_for_requester(&ctx.requester_id, &ctx.partition_id);
        if !(self.permission.has_admin_permission(&requester_node).await
            || self
                .permission
                .has_owner_permission_of(&requester_node, &group)
                .await?)
        {
            return Err(ServiceError::NotAuthorized.into());
        }

        let children = self
            .retrieval
            .load_direct_children(&ctx.partition_id, &group.node_id)
            .await?;
        Ok(match role {
            Some(role) => children.into_iter().filter(|child| child.role == role).collect(),
            None => children,
        })
    }

    /// Direct member count of a group, optionally narrowed to one role.
    pub async fn count_members(
        &self,
        group_email: &str,
        role: Option<Role>,
        ctx: &RequestContext,
    ) -> Result<MembersCountResponse, AppError> {
        let group = self
            .retrieval
            .group_existence_validation(group_email, &ctx.partition_id)
            .await?;
        let requester_node =
            EntityNode::member_node_for_requester(&ctx.requester_id, &ctx.partition_id);
        if !(self
            .permission
            .has_owner_permission_of(&requester_node, &group)
            .await?
            || self.permission.has_admin_permission(&requester_node).await)
        {
            return Err(ServiceError::NotAuthorized.into());
        }

        let members_count = self.retrieval.count_members(&group, role).await?;
        Ok(MembersCountResponse {
            group_email: group.node_id,
            members_count,
        })
    }

    async fn impacted_users_of(&self, member_node: &EntityNode) -> Result<HashSet<String>, AppError> {
        if member_node.is_group() {
            Ok(self
                .retrieval
                .load_all_children_users(member_node)
                .await?
                .child_user_ids)
        } else {
            Ok(HashSet::from([member_node.node_id.clone()]))
        }
    }

    fn audit_logger(&self, ctx: &RequestContext) -> AuditLogger {
        AuditLogger::new(
            Arc::clone(&self.audit_sink),
            &ctx.requester_id,
            &ctx.partition_id,
        )
    }

    async fn publish_events(&self, events: &[ChangeEvent]) {
        if !self.features.event_publishing_enabled {
            return;
        }
        if let Err(e) = self.event_publisher.publish(events).await {
            tracing::warn!(error = %e, "Failed to publish change events");
        }
    }

    async fn refresh_after_rollback(&self, impacted: &HashSet<String>, partition_id: &str) {
        if let Err(e) = self.cache.refresh_list_group_cache(impacted, partition_id).await {
            tracing::error!(error = %e, "Failed to refresh group cache after rollback");
        }
    }
}
