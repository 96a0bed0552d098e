//! service-core: Shared infrastructure for entitlement services.
pub mod error;
pub mod observability;

pub use tracing;
pub use validator;
