//! Services layer for the entitlements engine.
//!
//! Retrieval and permission checks over the membership graph, the mutation
//! workflows, the two-tier membership cache, and the tenant, bootstrap,
//! event, and audit services.

mod audit;
mod bootstrap;
mod cache;
pub mod error;
mod events;
mod groups;
mod members;
mod permission;
pub mod redis;
mod retrieval;
mod tenant;

pub use audit::{
    AuditAction, AuditLogger, AuditRecord, AuditSink, AuditStatus, RecordingAuditSink,
    TracingAuditSink,
};
pub use bootstrap::{is_default_group_name, BootstrapService, DEFAULT_GROUP_NAMES};
pub use cache::{GroupCacheService, LocalGroupCache};
pub use error::ServiceError;
pub use events::{ChangeEventPublisher, LoggingEventPublisher, RecordingEventPublisher};
pub use groups::GroupService;
pub use members::MemberService;
pub use permission::{PermissionService, ADMIN_GROUP, DATA_ROOT_GROUP, OPS_GROUP};
pub use redis::{GroupCacheBackend, MockCacheBackend, RedisCacheBackend};
pub use retrieval::RetrievalService;
pub use tenant::{ConfigTenantRegistry, TenantInfo, TenantRegistry};
