use async_trait::async_trait;
use service_core::error::AppError;

use crate::config::TenantConfig;

/// Per-partition identity facts every workflow needs: the email domain
/// groups live under and the service principal that bypasses ownership
/// checks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TenantInfo {
    pub data_partition_id: String,
    pub domain: String,
    pub service_principal: String,
}

#[async_trait]
pub trait TenantRegistry: Send + Sync {
    async fn resolve(&self, data_partition_id: &str) -> Result<TenantInfo, AppError>;
}

/// Derives tenant facts from static configuration. The partition domain is
/// `{partition}.{base_domain}`.
pub struct ConfigTenantRegistry {
    base_domain: String,
    service_principal: String,
}

impl ConfigTenantRegistry {
    pub fn new(config: &TenantConfig) -> Self {
        Self {
            base_domain: config.base_domain.clone(),
            service_principal: config.service_principal.clone(),
        }
    }
}

#[async_trait]
impl TenantRegistry for ConfigTenantRegistry {
    async fn resolve(&self, data_partition_id: &str) -> Result<TenantInfo, AppError> {
        if data_partition_id.is_empty() {
            return Err(AppError::BadRequest(anyhow::anyhow!(
                "Data partition id is missing"
            )));
        }
        Ok(TenantInfo {
            data_partition_id: data_partition_id.to_string(),
            domain: format!("{}.{}", data_partition_id, self.base_domain),
            service_principal: self.service_principal.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> ConfigTenantRegistry {
        ConfigTenantRegistry::new(&TenantConfig {
            base_domain: "group.com".to_string(),
            service_principal: "service-principal@group.com".to_string(),
        })
    }

    #[tokio::test]
    async fn test_domain_includes_partition() {
        let info = registry().resolve("osdu").await.unwrap();
        assert_eq!(info.domain, "osdu.group.com");
        assert_eq!(info.service_principal, "service-principal@group.com");
    }

    #[tokio::test]
    async fn test_empty_partition_is_rejected() {
        let err = registry().resolve("").await.unwrap_err();
        assert_eq!(err.status_code(), 400);
    }
}
