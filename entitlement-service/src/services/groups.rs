//! Group lifecycle workflows: create, delete, update, list.
//!
//! Mutations run as compensated operation lists. After the outcome is known,
//! success or rollback, the workflow drops the cached closure of every
//! impacted user before answering, then writes the audit record.

use std::collections::HashSet;
use std::sync::Arc;

use service_core::error::AppError;
use validator::Validate;

use crate::config::{FeatureConfig, QuotaConfig};
use crate::dtos::{CreateGroupDto, RequestContext, UpdateGroupDto, UpdateGroupResponse};
use crate::models::{ChangeEvent, ChildrenReference, EntityNode, GroupType, ParentReference, Role};
use crate::storage::{
    AddEdgeOperation, CreateNodeOperation, DeleteNodeOperation, GraphStore, Operation,
    OperationRunner, RemoveEdgeOperation, RenameGroupOperation, UpdateAppIdsOperation,
};

use super::audit::{AuditLogger, AuditSink};
use super::bootstrap::is_default_group_name;
use super::cache::GroupCacheService;
use super::error::ServiceError;
use super::events::ChangeEventPublisher;
use super::permission::PermissionService;
use super::retrieval::RetrievalService;
use super::tenant::TenantRegistry;

#[derive(Clone)]
pub struct GroupService {
    store: Arc<dyn GraphStore>,
    retrieval: RetrievalService,
    cache: Arc<GroupCacheService>,
    permission: PermissionService,
    tenant_registry: Arc<dyn TenantRegistry>,
    audit_sink: Arc<dyn AuditSink>,
    event_publisher: Arc<dyn ChangeEventPublisher>,
    features: FeatureConfig,
    quota: QuotaConfig,
}

impl GroupService {
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
        quota: QuotaConfig,
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
            quota,
        }
    }

    /// Create a group owned by the requester. Data groups additionally get
    /// the partition data root group as MEMBER while that wiring is enabled.
    /// Returns the created node and the impacted user ids.
    pub async fn create_group(
        &self,
        dto: CreateGroupDto,
        ctx: &RequestContext,
    ) -> Result<(EntityNode, HashSet<String>), AppError> {
        dto.validate()?;
        tracing::debug!("requested by {}", ctx.requester_id);

        let tenant = self.tenant_registry.resolve(&ctx.partition_id).await?;
        let group_node =
            EntityNode::new_group(&dto.name, &dto.description, &ctx.partition_id, &tenant.domain);
        let requester_node =
            EntityNode::member_node_for_requester(&ctx.requester_id, &ctx.partition_id);
        let audit = self.audit_logger(ctx);

        let requester_parents = self
            .cache
            .get_from_partition_cache(&ctx.requester_id, &ctx.partition_id)
            .await?;
        if requester_parents
            .iter()
            .any(|parent| parent.id.eq_ignore_ascii_case(&group_node.node_id))
        {
            return Err(ServiceError::GroupAlreadyExists.into());
        }
        self.validate_group_membership_limit(
            &ctx.requester_id,
            requester_parents.len(),
            EntityNode::MAX_PARENTS,
        )?;

        let mut operations: Vec<Box<dyn Operation>> = vec![
            Box::new(CreateNodeOperation::new(
                Arc::clone(&self.store),
                group_node.clone(),
            )),
            Box::new(AddEdgeOperation::new(
                Arc::clone(&self.store),
                group_node.clone(),
                ChildrenReference::from_node(&requester_node, Role::Owner),
            )),
        ];
        let mut impacted: HashSet<String> = HashSet::from([requester_node.node_id.clone()]);

        if self.should_add_data_root_group(&group_node) {
            let data_root_email = EntityNode::root_data_group_email(&tenant.domain);
            let data_root = self
                .retrieval
                .group_existence_validation(&data_root_email, &ctx.partition_id)
                .await?;
            let data_root_parents = self.retrieval.load_all_parents(&data_root).await?;
            self.validate_group_membership_limit(
                &data_root.node_id,
                data_root_parents.parent_references.len(),
                self.quota.data_root_max_parents,
            )?;
            tracing::debug!("Creating a group with root group node: {}", data_root.name);
            impacted.extend(
                self.retrieval
                    .load_all_children_users(&data_root)
                    .await?
                    .child_user_ids,
            );
            operations.push(Box::new(AddEdgeOperation::new(
                Arc::clone(&self.store),
                group_node.clone(),
                ChildrenReference::from_node(&data_root, Role::Member),
            )));
        } else {
            tracing::debug!("Creating a group with no root group node");
        }

        match OperationRunner::run(operations).await {
            Ok(()) => {
                match self
                    .cache
                    .refresh_list_group_cache(&impacted, &ctx.partition_id)
                    .await
                {
                    Ok(()) => {
                        audit.create_group_success(&group_node.node_id).await;
                        Ok((group_node, impacted))
                    }
                    Err(e) => {
                        audit.create_group_failure(&group_node.node_id).await;
                        Err(e)
                    }
                }
            }
            Err(e) => {
                self.refresh_after_rollback(&impacted, &ctx.partition_id).await;
                audit.create_group_failure(&group_node.node_id).await;
                Err(e)
            }
        }
    }

    /// Delete a group and every edge touching it. A missing group resolves
    /// to an empty impacted set so retried deletes converge.
    pub async fn delete_group(
        &self,
        group_email: &str,
        ctx: &RequestContext,
    ) -> Result<HashSet<String>, AppError> {
        tracing::info!("requested by {}", ctx.requester_id);
        let Some(group) = self.retrieval.get_node(group_email, &ctx.partition_id).await? else {
            return Ok(HashSet::new());
        };
        let requester_node =
            EntityNode::member_node_for_requester(&ctx.requester_id, &ctx.partition_id);
        self.permission
            .verify_can_manage_members(&requester_node, &group)
            .await?;
        if is_default_group_name(&group.name) {
            return Err(ServiceError::BootstrapGroupDeletion.into());
        }
        let audit = self.audit_logger(ctx);

        // impacted set reflects the graph as it was before the delete
        let impacted = self
            .retrieval
            .load_all_children_users(&group)
            .await?
            .child_user_ids;

        let parents = self
            .retrieval
            .load_direct_parents(&ctx.partition_id, &group.node_id)
            .await?;
        let children = self
            .retrieval
            .load_direct_children(&ctx.partition_id, &group.node_id)
            .await?;

        let mut operations: Vec<Box<dyn Operation>> = Vec::new();
        for parent in &parents {
            let parent_node = EntityNode::from_parent_reference(parent);
            let reference = self
                .retrieval
                .direct_child_reference(&group, &parent_node)
                .await?
                .unwrap_or_else(|| ChildrenReference::from_node(&group, Role::Member));
            operations.push(Box::new(RemoveEdgeOperation::new(
                Arc::clone(&self.store),
                parent_node,
                reference,
            )));
        }
        for child in children {
            operations.push(Box::new(RemoveEdgeOperation::new(
                Arc::clone(&self.store),
                group.clone(),
                child,
            )));
        }
        operations.push(Box::new(DeleteNodeOperation::new(
            Arc::clone(&self.store),
            group.clone(),
        )));

        match OperationRunner::run(operations).await {
            Ok(()) => {
                match self
                    .cache
                    .refresh_list_group_cache(&impacted, &ctx.partition_id)
                    .await
                {
                    Ok(()) => {
                        audit.delete_group_success(&group.node_id).await;
                        self.publish_events(&[ChangeEvent::group_deleted(
                            &group.node_id,
                            &ctx.requester_id,
                        )])
                        .await;
                        Ok(impacted)
                    }
                    Err(e) => {
                        audit.delete_group_failure(&group.node_id).await;
                        Err(e)
                    }
                }
            }
            Err(e) => {
                self.refresh_after_rollback(&impacted, &ctx.partition_id).await;
                audit.delete_group_failure(&group.node_id).await;
                Err(e)
            }
        }
    }

    /// Rename a group and/or replace its app id allowlist. The two changes
    /// commit independently, in that order.
    pub async fn update_group(
        &self,
        group_email: &str,
        dto: UpdateGroupDto,
        ctx: &RequestContext,
    ) -> Result<(UpdateGroupResponse, HashSet<String>), AppError> {
        dto.validate()?;
        let tenant = self.tenant_registry.resolve(&ctx.partition_id).await?;
        let existing_name = group_email.split('@').next().unwrap_or(group_email);
        if is_default_group_name(existing_name) {
            return Err(ServiceError::BootstrapGroupUpdate.into());
        }
        let group = self
            .retrieval
            .group_existence_validation(group_email, &ctx.partition_id)
            .await?;
        let requester_node =
            EntityNode::member_node_for_requester(&ctx.requester_id, &ctx.partition_id);
        self.permission
            .verify_can_manage_members(&requester_node, &group)
            .await?;
        let audit = self.audit_logger(ctx);

        let mut app_ids: Vec<String> = group.app_ids.iter().cloned().collect();
        app_ids.sort();
        let mut response = UpdateGroupResponse {
            name: existing_name.to_string(),
            email: group_email.to_string(),
            app_ids,
        };
        let mut current = group.clone();
        let mut impacted: HashSet<String> = HashSet::new();
        let mut renamed_email: Option<String> = None;

        if let Some(rename) = &dto.rename {
            if group.is_data_group() {
                return Err(ServiceError::DataGroupRename(group_email.to_string()).into());
            }
            let new_name = rename.to_lowercase();
            if is_default_group_name(&new_name) {
                return Err(ServiceError::BootstrapGroupUpdate.into());
            }
            let new_email = format!("{}@{}", new_name, tenant.domain);
            if self
                .retrieval
                .get_node(&new_email, &ctx.partition_id)
                .await?
                .is_some()
            {
                return Err(ServiceError::GroupNameTaken(new_name).into());
            }

            let users = self
                .retrieval
                .load_all_children_users(&group)
                .await?
                .child_user_ids;
            let rename_op: Vec<Box<dyn Operation>> = vec![Box::new(RenameGroupOperation::new(
                Arc::clone(&self.store),
                group.clone(),
                new_name.clone(),
                new_email.clone(),
            ))];
            if let Err(e) = OperationRunner::run(rename_op).await {
                self.refresh_after_rollback(&users, &ctx.partition_id).await;
                audit.update_group_failure(group_email).await;
                return Err(e);
            }
            impacted.extend(users);
            current.name = new_name.clone();
            current.node_id = new_email.clone();
            response.name = new_name;
            response.email = new_email.clone();
            renamed_email = Some(new_email);
        }

        if let Some(allowed) = &dto.app_ids {
            let users = self
                .retrieval
                .load_all_children_users(&current)
                .await?
                .child_user_ids;
            let update_op: Vec<Box<dyn Operation>> = vec![Box::new(UpdateAppIdsOperation::new(
                Arc::clone(&self.store),
                current.clone(),
                allowed.iter().cloned().collect(),
            ))];
            if let Err(e) = OperationRunner::run(update_op).await {
                impacted.extend(users);
                self.refresh_after_rollback(&impacted, &ctx.partition_id).await;
                audit.update_group_failure(group_email).await;
                return Err(e);
            }
            impacted.extend(users);
            response.app_ids = allowed.clone();
        }

        match self
            .cache
            .refresh_list_group_cache(&impacted, &ctx.partition_id)
            .await
        {
            Ok(()) => {
                audit.update_group_success(group_email).await;
                if let Some(new_email) = renamed_email {
                    self.publish_events(&[ChangeEvent::group_renamed(
                        group_email,
                        &new_email,
                        &ctx.requester_id,
                    )])
                    .await;
                }
                Ok((response, impacted))
            }
            Err(e) => {
                audit.update_group_failure(group_email).await;
                Err(e)
            }
        }
    }

    /// Every group the requester transitively belongs to, read through the
    /// cache. Calls carrying an app id see only groups open to that app; the
    /// service principal is never filtered.
    pub async fn list_groups(
        &self,
        ctx: &RequestContext,
    ) -> Result<HashSet<ParentReference>, AppError> {
        self.list_groups_across_partitions(std::slice::from_ref(&ctx.partition_id), ctx)
            .await
    }

    /// Union of the requester's groups over several partitions, one cache
    /// read per partition. The app id filter runs against the full union.
    pub async fn list_groups_across_partitions(
        &self,
        partition_ids: &[String],
        ctx: &RequestContext,
    ) -> Result<HashSet<ParentReference>, AppError> {
        tracing::debug!("requested by {}", ctx.requester_id);
        let tenant = self.tenant_registry.resolve(&ctx.partition_id).await?;
        let mut groups: HashSet<ParentReference> = HashSet::new();
        for partition_id in partition_ids {
            groups.extend(
                self.cache
                    .get_from_partition_cache(&ctx.requester_id, partition_id)
                    .await?,
            );
        }
        match &ctx.app_id {
            Some(app_id)
                if !app_id.is_empty()
                    && !ctx
                        .requester_id
                        .eq_ignore_ascii_case(&tenant.service_principal) =>
            {
                let mut accessible: HashSet<ParentReference> = HashSet::new();
                for partition_id in partition_ids {
                    accessible.extend(
                        self.retrieval
                            .filter_parents_by_app_id(groups.clone(), partition_id, app_id)
                            .await?,
                    );
                }
                Ok(accessible)
            }
            _ => Ok(groups),
        }
    }

    /// Groups of another member, for partition operators and entitlement
    /// admins. The member's own app id narrowing applies; an optional group
    /// kind narrows the result further.
    pub async fn list_groups_on_behalf_of(
        &self,
        member_id: &str,
        group_type: Option<GroupType>,
        ctx: &RequestContext,
    ) -> Result<HashSet<ParentReference>, AppError> {
        let member_id = member_id.to_lowercase();
        tracing::info!("requesting groups for {}", member_id);
        let requester_node =
            EntityNode::member_node_for_requester(&ctx.requester_id, &ctx.partition_id);
        if !self
            .permission
            .has_partition_wide_permission(&requester_node)
            .await
        {
            return Err(ServiceError::NotAuthorized.into());
        }

        let mut member_ctx = RequestContext::new(&member_id, &ctx.partition_id);
        if let Some(app_id) = &ctx.app_id {
            member_ctx = member_ctx.with_app_id(app_id);
        }
        let groups = self.list_groups(&member_ctx).await?;
        Ok(match group_type {
            Some(group_type) => groups
                .into_iter()
                .filter(|parent| parent.matches_group_type(group_type))
                .collect(),
            None => groups,
        })
    }

    fn should_add_data_root_group(&self, group_node: &EntityNode) -> bool {
        self.features.data_root_hierarchy_enabled
            && group_node.is_data_group()
            && !is_default_group_name(&group_node.name)
    }

    fn validate_group_membership_limit(
        &self,
        member_id: &str,
        current: usize,
        limit: usize,
    ) -> Result<(), AppError> {
        if current >= limit {
            tracing::error!("Identity {} already belongs to {} groups", member_id, current);
            return Err(ServiceError::GroupQuotaExceeded {
                member: member_id.to_string(),
                limit,
            }
            .into());
        }
        Ok(())
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
