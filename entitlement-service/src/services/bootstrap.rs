//! Default-group provisioning for a partition.

use std::sync::Arc;

use service_core::error::AppError;

use crate::models::{ChildrenReference, EntityNode, Role};
use crate::storage::GraphStore;

use super::tenant::TenantRegistry;

/// Groups every partition starts with. Protected from rename and deletion.
pub const DEFAULT_GROUP_NAMES: [&str; 8] = [
    "users",
    "users.data.root",
    "users.datalake.ops",
    "users.datalake.admins",
    "users.datalake.viewers",
    "users.datalake.editors",
    "service.entitlements.user",
    "service.entitlements.admin",
];

/// Groups nested under `users` so their members always belong to the
/// partition root users group.
const NESTED_UNDER_USERS: [&str; 5] = [
    "users.data.root",
    "users.datalake.ops",
    "users.datalake.admins",
    "users.datalake.viewers",
    "users.datalake.editors",
];

pub fn is_default_group_name(name: &str) -> bool {
    DEFAULT_GROUP_NAMES
        .iter()
        .any(|default| default.eq_ignore_ascii_case(name))
}

#[derive(Clone)]
pub struct BootstrapService {
    store: Arc<dyn GraphStore>,
    tenant_registry: Arc<dyn TenantRegistry>,
}

impl BootstrapService {
    pub fn new(store: Arc<dyn GraphStore>, tenant_registry: Arc<dyn TenantRegistry>) -> Self {
        Self {
            store,
            tenant_registry,
        }
    }

    /// Create the default groups of a partition, owned by the tenant service
    /// principal. Groups that already exist are left untouched, so a rerun
    /// converges instead of failing.
    pub async fn provision_partition(&self, partition_id: &str) -> Result<Vec<String>, AppError> {
        let tenant = self.tenant_registry.resolve(partition_id).await?;
        let principal =
            EntityNode::member_node_for_requester(&tenant.service_principal, partition_id);

        let mut created = Vec::new();
        for name in DEFAULT_GROUP_NAMES {
            let group = EntityNode::new_group(name, "", partition_id, &tenant.domain);
            if self
                .store
                .get_node(&group.node_id, partition_id)
                .await?
                .is_some()
            {
                continue;
            }
            self.store.create_node(&group).await?;
            self.store
                .add_edge(&group, &ChildrenReference::from_node(&principal, Role::Owner))
                .await?;
            tracing::info!(group = %group.node_id, partition_id, "Provisioned bootstrap group");
            created.push(group.node_id);
        }

        let users = EntityNode::new_group("users", "", partition_id, &tenant.domain);
        for name in NESTED_UNDER_USERS {
            let child = EntityNode::new_group(name, "", partition_id, &tenant.domain);
            let reference = ChildrenReference::from_node(&child, Role::Member);
            if !self.store.has_direct_child(&users, &reference).await? {
                self.store.add_edge(&users, &reference).await?;
            }
        }

        Ok(created)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TenantConfig;
    use crate::services::retrieval::RetrievalService;
    use crate::services::tenant::ConfigTenantRegistry;
    use crate::storage::InMemoryGraphStore;

    fn tenant_registry() -> Arc<dyn TenantRegistry> {
        Arc::new(ConfigTenantRegistry::new(&TenantConfig {
            base_domain: "group.com".to_string(),
            service_principal: "service-principal@group.com".to_string(),
        }))
    }

    #[test]
    fn test_default_group_names_match_case_insensitively() {
        assert!(is_default_group_name("users"));
        assert!(is_default_group_name("USERS.DATA.ROOT"));
        assert!(!is_default_group_name("data.x"));
    }

    #[tokio::test]
    async fn test_provision_creates_all_defaults_once() {
        let store: Arc<dyn GraphStore> = Arc::new(InMemoryGraphStore::new());
        let bootstrap = BootstrapService::new(Arc::clone(&store), tenant_registry());

        let created = bootstrap.provision_partition("dp").await.unwrap();
        assert_eq!(created.len(), DEFAULT_GROUP_NAMES.len());
        assert!(created.contains(&"users.data.root@dp.group.com".to_string()));

        let rerun = bootstrap.provision_partition("dp").await.unwrap();
        assert!(rerun.is_empty());
    }

    #[tokio::test]
    async fn test_datalake_members_belong_to_root_users_group() {
        let store: Arc<dyn GraphStore> = Arc::new(InMemoryGraphStore::new());
        let bootstrap = BootstrapService::new(Arc::clone(&store), tenant_registry());
        bootstrap.provision_partition("dp").await.unwrap();

        let ops = EntityNode::new_group("users.datalake.ops", "", "dp", "dp.group.com");
        let operator = EntityNode::member_node_for_new_user("op@x.com", "dp");
        store
            .add_edge(&ops, &ChildrenReference::from_node(&operator, Role::Member))
            .await
            .unwrap();

        let retrieval = RetrievalService::new(Arc::clone(&store));
        let parents = retrieval.load_all_parents(&operator).await.unwrap();
        let names: Vec<String> = parents
            .parent_references
            .iter()
            .map(|p| p.name.clone())
            .collect();
        assert!(names.contains(&"users".to_string()));
    }

    #[tokio::test]
    async fn test_service_principal_owns_bootstrap_groups() {
        let store: Arc<dyn GraphStore> = Arc::new(InMemoryGraphStore::new());
        let bootstrap = BootstrapService::new(Arc::clone(&store), tenant_registry());
        bootstrap.provision_partition("dp").await.unwrap();

        let admin = EntityNode::new_group("service.entitlements.admin", "", "dp", "dp.group.com");
        let principal =
            EntityNode::member_node_for_requester("service-principal@group.com", "dp");
        assert!(store
            .has_direct_child(&admin, &ChildrenReference::from_node(&principal, Role::Owner))
            .await
            .unwrap());
    }
}
