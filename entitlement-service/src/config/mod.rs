use serde::Deserialize;
use service_core::error::AppError;
use std::env;

#[derive(Debug, Clone, Deserialize)]
pub struct EntitlementsConfig {
    pub environment: Environment,
    pub service_name: String,
    pub service_version: String,
    pub log_level: String,
    pub tenant: TenantConfig,
    pub redis: RedisConfig,
    pub cache: CacheConfig,
    pub quota: QuotaConfig,
    pub features: FeatureConfig,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    Dev,
    Prod,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TenantConfig {
    /// Base DNS suffix appended after the partition id, e.g. `group.com` in
    /// `data.default.viewers@opendes.group.com`.
    pub base_domain: String,
    /// Identity that bypasses ownership checks and owns bootstrap groups.
    pub service_principal: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RedisConfig {
    pub url: String,
    pub enabled: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
    pub local_ttl_seconds: u64,
    pub local_max_entries: usize,
    pub distributed_ttl_seconds: i64,
    pub lock_expiry_seconds: i64,
    pub lock_retries: u32,
    pub lock_retry_delay_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct QuotaConfig {
    /// Upper bound on direct parents of the partition data root group. The
    /// per-member quota is fixed by the entity model and not configurable.
    pub data_root_max_parents: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FeatureConfig {
    /// When set, newly created data groups are attached under the partition
    /// data root group.
    pub data_root_hierarchy_enabled: bool,
    /// When set, successful mutations publish change events.
    pub event_publishing_enabled: bool,
}

impl EntitlementsConfig {
    pub fn from_env() -> Result<Self, AppError> {
        let env_str = env::var("ENVIRONMENT").unwrap_or_else(|_| "dev".to_string());
        let environment: Environment = env_str
            .parse()
            .map_err(|e: String| AppError::ConfigError(anyhow::anyhow!(e)))?;

        let is_prod = environment == Environment::Prod;

        let config = EntitlementsConfig {
            environment,
            service_name: get_env("SERVICE_NAME", Some("entitlement-service"), is_prod)?,
            service_version: get_env("SERVICE_VERSION", Some(env!("CARGO_PKG_VERSION")), is_prod)?,
            log_level: get_env("LOG_LEVEL", Some("info"), is_prod)?,
            tenant: TenantConfig {
                base_domain: get_env("TENANT_BASE_DOMAIN", Some("group.com"), is_prod)?,
                service_principal: get_env(
                    "TENANT_SERVICE_PRINCIPAL",
                    Some("service-principal@group.com"),
                    is_prod,
                )?,
            },
            redis: RedisConfig {
                url: get_env("REDIS_URL", Some("redis://127.0.0.1:6379"), is_prod)?,
                enabled: get_env("REDIS_ENABLED", Some("false"), is_prod)?
                    .parse()
                    .unwrap_or(false),
            },
            cache: CacheConfig {
                local_ttl_seconds: get_env("CACHE_LOCAL_TTL_SECONDS", Some("300"), is_prod)?
                    .parse()
                    .map_err(|e: std::num::ParseIntError| {
                        AppError::ConfigError(anyhow::anyhow!(e.to_string()))
                    })?,
                local_max_entries: get_env("CACHE_LOCAL_MAX_ENTRIES", Some("1000"), is_prod)?
                    .parse()
                    .map_err(|e: std::num::ParseIntError| {
                        AppError::ConfigError(anyhow::anyhow!(e.to_string()))
                    })?,
                distributed_ttl_seconds: get_env("CACHE_REDIS_TTL_SECONDS", Some("3600"), is_prod)?
                    .parse()
                    .map_err(|e: std::num::ParseIntError| {
                        AppError::ConfigError(anyhow::anyhow!(e.to_string()))
                    })?,
                lock_expiry_seconds: get_env("CACHE_LOCK_EXPIRY_SECONDS", Some("10"), is_prod)?
                    .parse()
                    .map_err(|e: std::num::ParseIntError| {
                        AppError::ConfigError(anyhow::anyhow!(e.to_string()))
                    })?,
                lock_retries: get_env("CACHE_LOCK_RETRIES", Some("5"), is_prod)?
                    .parse()
                    .map_err(|e: std::num::ParseIntError| {
                        AppError::ConfigError(anyhow::anyhow!(e.to_string()))
                    })?,
                lock_retry_delay_ms: get_env("CACHE_LOCK_RETRY_DELAY_MS", Some("100"), is_prod)?
                    .parse()
                    .map_err(|e: std::num::ParseIntError| {
                        AppError::ConfigError(anyhow::anyhow!(e.to_string()))
                    })?,
            },
            quota: QuotaConfig {
                data_root_max_parents: get_env("DATA_ROOT_MAX_PARENTS", Some("5000"), is_prod)?
                    .parse()
                    .map_err(|e: std::num::ParseIntError| {
                        AppError::ConfigError(anyhow::anyhow!(e.to_string()))
                    })?,
            },
            features: FeatureConfig {
                data_root_hierarchy_enabled: get_env(
                    "DATA_ROOT_HIERARCHY_ENABLED",
                    Some("true"),
                    is_prod,
                )?
                .parse()
                .unwrap_or(true),
                event_publishing_enabled: get_env("EVENT_PUBLISHING_ENABLED", Some("false"), is_prod)?
                    .parse()
                    .unwrap_or(false),
            },
        };

        Ok(config)
    }
}

fn get_env(key: &str, default: Option<&str>, is_prod: bool) -> Result<String, AppError> {
    match env::var(key) {
        Ok(val) => Ok(val),
        Err(_) => {
            if is_prod {
                Err(AppError::ConfigError(anyhow::anyhow!(format!(
                    "{} is required in production but not set",
                    key
                ))))
            } else if let Some(def) = default {
                Ok(def.to_string())
            } else {
                Err(AppError::ConfigError(anyhow::anyhow!(format!(
                    "{} is required but not set",
                    key
                ))))
            }
        }
    }
}

impl std::str::FromStr for Environment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "dev" => Ok(Environment::Dev),
            "prod" => Ok(Environment::Prod),
            _ => Err(format!("Invalid environment: {}", s)),
        }
    }
}
