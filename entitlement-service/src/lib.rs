pub mod config;
pub mod dtos;
pub mod models;
pub mod services;
pub mod storage;

use std::sync::Arc;

use service_core::error::AppError;

use crate::config::EntitlementsConfig;
use crate::services::{
    AuditSink, BootstrapService, ChangeEventPublisher, ConfigTenantRegistry, GroupCacheBackend,
    GroupCacheService, GroupService, LoggingEventPublisher, MemberService, MockCacheBackend,
    PermissionService, RedisCacheBackend, RetrievalService, TenantRegistry, TracingAuditSink,
};
use crate::storage::{GraphStore, InMemoryGraphStore};

/// Fully wired service stack. Construct once and share; every service is
/// cheaply cloneable.
#[derive(Clone)]
pub struct AppState {
    pub config: EntitlementsConfig,
    pub store: Arc<dyn GraphStore>,
    pub cache_backend: Arc<dyn GroupCacheBackend>,
    pub cache: Arc<GroupCacheService>,
    pub tenant_registry: Arc<dyn TenantRegistry>,
    pub retrieval: RetrievalService,
    pub permission: PermissionService,
    pub groups: GroupService,
    pub members: MemberService,
    pub bootstrap: BootstrapService,
}

impl AppState {
    /// Wire the service stack over the given storage, cache, audit, and
    /// event backends.
    pub fn build(
        config: EntitlementsConfig,
        store: Arc<dyn GraphStore>,
        cache_backend: Arc<dyn GroupCacheBackend>,
        audit_sink: Arc<dyn AuditSink>,
        event_publisher: Arc<dyn ChangeEventPublisher>,
    ) -> Self {
        let retrieval = RetrievalService::new(Arc::clone(&store));
        let tenant_registry: Arc<dyn TenantRegistry> =
            Arc::new(ConfigTenantRegistry::new(&config.tenant));
        let permission =
            PermissionService::new(retrieval.clone(), &config.tenant.service_principal);
        let cache = Arc::new(GroupCacheService::new(
            Arc::clone(&cache_backend),
            retrieval.clone(),
            config.cache.clone(),
        ));
        let groups = GroupService::new(
            Arc::clone(&store),
            retrieval.clone(),
            Arc::clone(&cache),
            permission.clone(),
            Arc::clone(&tenant_registry),
            Arc::clone(&audit_sink),
            Arc::clone(&event_publisher),
            config.features.clone(),
            config.quota.clone(),
        );
        let members = MemberService::new(
            Arc::clone(&store),
            retrieval.clone(),
            Arc::clone(&cache),
            permission.clone(),
            Arc::clone(&tenant_registry),
            Arc::clone(&audit_sink),
            Arc::clone(&event_publisher),
            config.features.clone(),
        );
        let bootstrap = BootstrapService::new(Arc::clone(&store), Arc::clone(&tenant_registry));

        Self {
            config,
            store,
            cache_backend,
            cache,
            tenant_registry,
            retrieval,
            permission,
            groups,
            members,
            bootstrap,
        }
    }

    /// Environment-driven wiring: the in-memory reference store, with redis
    /// behind the cache when enabled and an in-process cache backend
    /// otherwise.
    pub async fn from_env() -> Result<Self, AppError> {
        let config = EntitlementsConfig::from_env()?;
        let cache_backend: Arc<dyn GroupCacheBackend> = if config.redis.enabled {
            Arc::new(
                RedisCacheBackend::new(&config.redis)
                    .await
                    .map_err(AppError::InternalError)?,
            )
        } else {
            Arc::new(MockCacheBackend::new())
        };
        Ok(Self::build(
            config,
            Arc::new(InMemoryGraphStore::new()),
            cache_backend,
            Arc::new(TracingAuditSink),
            Arc::new(LoggingEventPublisher),
        ))
    }

    /// Self-contained stack for tests: in-memory store, in-process cache,
    /// tracing audit sink, logging event publisher.
    pub fn in_memory(config: EntitlementsConfig) -> Self {
        Self::build(
            config,
            Arc::new(InMemoryGraphStore::new()),
            Arc::new(MockCacheBackend::new()),
            Arc::new(TracingAuditSink),
            Arc::new(LoggingEventPublisher),
        )
    }

    /// Liveness probe over the cache backend.
    pub async fn health_check(&self) -> Result<(), AppError> {
        self.cache_backend.health_check().await.map_err(|e| {
            tracing::error!(error = %e, "Cache backend health check failed");
            AppError::InternalError(e)
        })
    }
}
