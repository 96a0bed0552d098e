//! Test helper module for entitlement-service integration tests.
//!
//! Wires a self-contained `AppState` over the in-memory store with recording
//! audit and event backends, and provisions the test partition.

#![allow(dead_code)]

use std::collections::HashSet;
use std::sync::{Arc, Once};

use entitlement_service::config::{
    CacheConfig, EntitlementsConfig, Environment, FeatureConfig, QuotaConfig, RedisConfig,
    TenantConfig,
};
use entitlement_service::dtos::{AddMemberDto, CreateGroupDto, RequestContext};
use entitlement_service::models::{EntityNode, Role};
use entitlement_service::services::{
    AuditSink, ChangeEventPublisher, GroupCacheBackend, MockCacheBackend, RecordingAuditSink,
    RecordingEventPublisher,
};
use entitlement_service::storage::{GraphStore, InMemoryGraphStore};
use entitlement_service::AppState;

static TRACING: Once = Once::new();

/// Initialize tracing for tests (only once per test binary).
fn init_tracing() {
    TRACING.call_once(|| {
        service_core::observability::init_tracing("entitlement-service-test", "warn");
    });
}

/// Partition every test runs in; its group domain is `dp.domain.com`.
pub const TEST_PARTITION: &str = "dp";
pub const TEST_DOMAIN: &str = "dp.domain.com";
pub const SERVICE_PRINCIPAL: &str = "service-principal@domain.com";

/// Test application with recording backends.
pub struct TestApp {
    pub state: AppState,
    pub audit: Arc<RecordingAuditSink>,
    pub events: Arc<RecordingEventPublisher>,
    pub cache_backend: Arc<MockCacheBackend>,
}

impl TestApp {
    /// Spawn the test application with the default config and a provisioned
    /// partition.
    pub async fn spawn() -> Self {
        Self::spawn_with(test_config(), Arc::new(InMemoryGraphStore::new())).await
    }

    pub async fn spawn_with_config(config: EntitlementsConfig) -> Self {
        Self::spawn_with(config, Arc::new(InMemoryGraphStore::new())).await
    }

    pub async fn spawn_with_store(store: Arc<dyn GraphStore>) -> Self {
        Self::spawn_with(test_config(), store).await
    }

    /// Spawn without provisioning the bootstrap groups.
    pub fn spawn_bare(config: EntitlementsConfig) -> Self {
        Self::build(config, Arc::new(InMemoryGraphStore::new()))
    }

    async fn spawn_with(config: EntitlementsConfig, store: Arc<dyn GraphStore>) -> Self {
        let app = Self::build(config, store);
        app.state
            .bootstrap
            .provision_partition(TEST_PARTITION)
            .await
            .expect("Failed to provision test partition");
        app
    }

    fn build(config: EntitlementsConfig, store: Arc<dyn GraphStore>) -> Self {
        init_tracing();
        let audit = Arc::new(RecordingAuditSink::new());
        let events = Arc::new(RecordingEventPublisher::new());
        let cache_backend = Arc::new(MockCacheBackend::new());
        let state = AppState::build(
            config,
            store,
            Arc::clone(&cache_backend) as Arc<dyn GroupCacheBackend>,
            Arc::clone(&audit) as Arc<dyn AuditSink>,
            Arc::clone(&events) as Arc<dyn ChangeEventPublisher>,
        );
        TestApp {
            state,
            audit,
            events,
            cache_backend,
        }
    }

    /// Create a group as `requester`, panicking on failure.
    pub async fn create_group(&self, name: &str, requester: &str) -> EntityNode {
        let (group, _) = self
            .state
            .groups
            .create_group(CreateGroupDto::new(name, ""), &ctx(requester))
            .await
            .expect("Failed to create group");
        group
    }

    /// Add a member as `requester`, panicking on failure.
    pub async fn add_member(&self, group_email: &str, member: &str, role: Role, requester: &str) {
        self.state
            .members
            .add_member(group_email, AddMemberDto::new(member, role), &ctx(requester))
            .await
            .expect("Failed to add member");
    }

    /// The groups `requester` transitively belongs to, as emails.
    pub async fn ancestor_emails(&self, requester: &str) -> HashSet<String> {
        self.state
            .groups
            .list_groups(&ctx(requester))
            .await
            .expect("Failed to list groups")
            .into_iter()
            .map(|parent| parent.id)
            .collect()
    }
}

/// Request context for `requester` in the test partition.
pub fn ctx(requester: &str) -> RequestContext {
    RequestContext::new(requester, TEST_PARTITION)
}

/// Email of a group named `name` in the test partition.
pub fn email(name: &str) -> String {
    format!("{}@{}", name, TEST_DOMAIN)
}

pub fn test_config() -> EntitlementsConfig {
    EntitlementsConfig {
        environment: Environment::Dev,
        service_name: "entitlement-service-test".to_string(),
        service_version: "0.1.0".to_string(),
        log_level: "debug".to_string(),
        tenant: TenantConfig {
            base_domain: "domain.com".to_string(),
            service_principal: SERVICE_PRINCIPAL.to_string(),
        },
        redis: RedisConfig {
            url: "redis://localhost:6379".to_string(),
            enabled: false,
        },
        cache: CacheConfig {
            local_ttl_seconds: 300,
            local_max_entries: 1000,
            distributed_ttl_seconds: 3600,
            lock_expiry_seconds: 10,
            lock_retries: 3,
            lock_retry_delay_ms: 10,
        },
        quota: QuotaConfig {
            data_root_max_parents: 5000,
        },
        features: FeatureConfig {
            data_root_hierarchy_enabled: true,
            event_publishing_enabled: true,
        },
    }
}
