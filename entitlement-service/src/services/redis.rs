use async_trait::async_trait;
use redis::{aio::ConnectionManager, Client};

/// Distributed tier of the list-group cache. Keys hold serialized parent
/// trees; lock keys serialize rebuilds of the same entry across instances.
#[async_trait]
pub trait GroupCacheBackend: Send + Sync {
    async fn get_cache(&self, key: &str) -> Result<Option<String>, anyhow::Error>;
    async fn set_cache(
        &self,
        key: &str,
        value: &str,
        expiry_seconds: i64,
    ) -> Result<(), anyhow::Error>;
    async fn delete_cache(&self, key: &str) -> Result<(), anyhow::Error>;
    /// Returns false when another holder already owns the lock.
    async fn acquire_lock(&self, key: &str, expiry_seconds: i64) -> Result<bool, anyhow::Error>;
    async fn release_lock(&self, key: &str) -> Result<(), anyhow::Error>;
    async fn health_check(&self) -> Result<(), anyhow::Error>;
}

#[derive(Clone)]
pub struct RedisCacheBackend {
    _client: Client,
    manager: ConnectionManager,
}

impl RedisCacheBackend {
    pub async fn new(config: &crate::config::RedisConfig) -> Result<Self, anyhow::Error> {
        tracing::info!(url = %config.url, "Connecting to Redis");
        let client = Client::open(config.url.clone())?;

        // ConnectionManager reconnects on its own after a dropped connection
        let manager = client.get_connection_manager().await.map_err(|e| {
            tracing::error!("Failed to get Redis connection manager: {}", e);
            anyhow::anyhow!("Failed to connect to Redis: {}", e)
        })?;

        tracing::info!("Successfully connected to Redis");

        Ok(Self {
            _client: client,
            manager,
        })
    }
}

#[async_trait]
impl GroupCacheBackend for RedisCacheBackend {
    async fn get_cache(&self, key: &str) -> Result<Option<String>, anyhow::Error> {
        let mut conn = self.manager.clone();
        redis::cmd("GET")
            .arg(key)
            .query_async(&mut conn)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to get cache entry: {}", e))
    }

    async fn set_cache(
        &self,
        key: &str,
        value: &str,
        expiry_seconds: i64,
    ) -> Result<(), anyhow::Error> {
        let mut conn = self.manager.clone();
        redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("EX")
            .arg(expiry_seconds)
            .query_async(&mut conn)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to set cache entry: {}", e))
    }

    async fn delete_cache(&self, key: &str) -> Result<(), anyhow::Error> {
        let mut conn = self.manager.clone();
        redis::cmd("DEL")
            .arg(key)
            .query_async(&mut conn)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to delete cache entry: {}", e))
    }

    async fn acquire_lock(&self, key: &str, expiry_seconds: i64) -> Result<bool, anyhow::Error> {
        let mut conn = self.manager.clone();
        // SET NX EX answers OK when we won the lock, nil otherwise
        let reply: Option<String> = redis::cmd("SET")
            .arg(key)
            .arg("locked")
            .arg("NX")
            .arg("EX")
            .arg(expiry_seconds)
            .query_async(&mut conn)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to acquire cache lock: {}", e))?;
        Ok(reply.is_some())
    }

    async fn release_lock(&self, key: &str) -> Result<(), anyhow::Error> {
        let mut conn = self.manager.clone();
        redis::cmd("DEL")
            .arg(key)
            .query_async(&mut conn)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to release cache lock: {}", e))
    }

    async fn health_check(&self) -> Result<(), anyhow::Error> {
        let mut conn = self.manager.clone();
        redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .map_err(|e| anyhow::anyhow!("Redis health check failed: {}", e))
    }
}

pub struct MockCacheBackend {
    pub cache: std::sync::Mutex<std::collections::HashMap<String, String>>,
    pub locks: std::sync::Mutex<std::collections::HashSet<String>>,
}

impl Default for MockCacheBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl MockCacheBackend {
    pub fn new() -> Self {
        Self {
            cache: std::sync::Mutex::new(std::collections::HashMap::new()),
            locks: std::sync::Mutex::new(std::collections::HashSet::new()),
        }
    }
}

#[async_trait]
impl GroupCacheBackend for MockCacheBackend {
    async fn get_cache(&self, key: &str) -> Result<Option<String>, anyhow::Error> {
        let val = self
            .cache
            .lock()
            .map_err(|e| anyhow::anyhow!("Mock cache mutex poisoned: {}", e))?
            .get(key)
            .cloned();
        Ok(val)
    }

    async fn set_cache(
        &self,
        key: &str,
        value: &str,
        _expiry_seconds: i64,
    ) -> Result<(), anyhow::Error> {
        self.cache
            .lock()
            .map_err(|e| anyhow::anyhow!("Mock cache mutex poisoned: {}", e))?
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn delete_cache(&self, key: &str) -> Result<(), anyhow::Error> {
        self.cache
            .lock()
            .map_err(|e| anyhow::anyhow!("Mock cache mutex poisoned: {}", e))?
            .remove(key);
        Ok(())
    }

    async fn acquire_lock(&self, key: &str, _expiry_seconds: i64) -> Result<bool, anyhow::Error> {
        let acquired = self
            .locks
            .lock()
            .map_err(|e| anyhow::anyhow!("Mock lock mutex poisoned: {}", e))?
            .insert(key.to_string());
        Ok(acquired)
    }

    async fn release_lock(&self, key: &str) -> Result<(), anyhow::Error> {
        self.locks
            .lock()
            .map_err(|e| anyhow::anyhow!("Mock lock mutex poisoned: {}", e))?
            .remove(key);
        Ok(())
    }

    async fn health_check(&self) -> Result<(), anyhow::Error> {
        Ok(())
    }
}
