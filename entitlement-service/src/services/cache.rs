//! Two-tier read-through cache for the list-group closure.
//!
//! Tier one is an in-process map with a short TTL, tier two a shared
//! [`GroupCacheBackend`]. Misses rebuild the entry from storage under a
//! distributed lock so concurrent instances do not stampede the graph.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use service_core::error::AppError;

use crate::config::CacheConfig;
use crate::models::{EntityNode, ParentReference};

use super::redis::GroupCacheBackend;
use super::retrieval::RetrievalService;

struct LocalEntry {
    parents: HashSet<ParentReference>,
    inserted_at: Instant,
}

/// In-process tier. Entries expire after a fixed TTL; when the map is full
/// the oldest entry makes room for the next insert.
pub struct LocalGroupCache {
    entries: DashMap<String, LocalEntry>,
    ttl: Duration,
    max_entries: usize,
}

impl LocalGroupCache {
    pub fn new(ttl_seconds: u64, max_entries: usize) -> Self {
        Self {
            entries: DashMap::new(),
            ttl: Duration::from_secs(ttl_seconds),
            max_entries,
        }
    }

    pub fn get(&self, key: &str) -> Option<HashSet<ParentReference>> {
        let expired = match self.entries.get(key) {
            Some(entry) if entry.inserted_at.elapsed() <= self.ttl => {
                return Some(entry.parents.clone());
            }
            Some(_) => true,
            None => false,
        };
        if expired {
            self.entries.remove(key);
        }
        None
    }

    pub fn put(&self, key: &str, parents: HashSet<ParentReference>) {
        if self.entries.len() >= self.max_entries && !self.entries.contains_key(key) {
            let oldest = self
                .entries
                .iter()
                .min_by_key(|entry| entry.value().inserted_at)
                .map(|entry| entry.key().clone());
            if let Some(oldest) = oldest {
                self.entries.remove(&oldest);
            }
        }
        self.entries.insert(
            key.to_string(),
            LocalEntry {
                parents,
                inserted_at: Instant::now(),
            },
        );
    }

    pub fn remove(&self, key: &str) {
        self.entries.remove(key);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

pub struct GroupCacheService {
    local: LocalGroupCache,
    backend: Arc<dyn GroupCacheBackend>,
    retrieval: RetrievalService,
    config: CacheConfig,
}

impl GroupCacheService {
    pub fn new(
        backend: Arc<dyn GroupCacheBackend>,
        retrieval: RetrievalService,
        config: CacheConfig,
    ) -> Self {
        Self {
            local: LocalGroupCache::new(config.local_ttl_seconds, config.local_max_entries),
            backend,
            retrieval,
            config,
        }
    }

    /// Transitive parents of `requester_id`, cache first. A backend outage
    /// degrades to a direct storage load instead of failing the request.
    pub async fn get_from_partition_cache(
        &self,
        requester_id: &str,
        partition_id: &str,
    ) -> Result<HashSet<ParentReference>, AppError> {
        let key = cache_key(requester_id, partition_id);
        if let Some(parents) = self.local.get(&key) {
            return Ok(parents);
        }

        match self.read_distributed(&key).await {
            Ok(Some(parents)) => {
                self.local.put(&key, parents.clone());
                return Ok(parents);
            }
            Ok(None) => {}
            Err(e) => {
                tracing::warn!(error = %e, "Cache read failed, loading groups from storage");
                return self.load_from_storage(requester_id, partition_id).await;
            }
        }

        self.lock_cache_entry_and_rebuild(&key, requester_id, partition_id)
            .await
    }

    /// Drop the cached entry of every impacted user. Callers run this after
    /// a mutation commits and after a rollback completes, so readers never
    /// see a closure the graph no longer agrees with.
    pub async fn refresh_list_group_cache(
        &self,
        user_ids: &HashSet<String>,
        partition_id: &str,
    ) -> Result<(), AppError> {
        for user_id in user_ids {
            self.flush_list_group_cache_for_user(user_id, partition_id)
                .await?;
        }
        Ok(())
    }

    pub async fn flush_list_group_cache_for_user(
        &self,
        user_id: &str,
        partition_id: &str,
    ) -> Result<(), AppError> {
        let key = cache_key(user_id, partition_id);
        self.local.remove(&key);
        self.backend.delete_cache(&key).await?;
        Ok(())
    }

    async fn lock_cache_entry_and_rebuild(
        &self,
        key: &str,
        requester_id: &str,
        partition_id: &str,
    ) -> Result<HashSet<ParentReference>, AppError> {
        let lock_key = format!("lock-{}", key);
        for _ in 0..self.config.lock_retries {
            match self
                .backend
                .acquire_lock(&lock_key, self.config.lock_expiry_seconds)
                .await
            {
                Ok(true) => {
                    let rebuilt = self.rebuild_cache(key, requester_id, partition_id).await;
                    if let Err(e) = self.backend.release_lock(&lock_key).await {
                        tracing::warn!(error = %e, "Failed to release cache lock");
                    }
                    return rebuilt;
                }
                Ok(false) => {
                    // another instance is rebuilding this entry, wait for it
                    tokio::time::sleep(Duration::from_millis(self.config.lock_retry_delay_ms))
                        .await;
                    if let Some(parents) = self.read_distributed(key).await? {
                        self.local.put(key, parents.clone());
                        return Ok(parents);
                    }
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Cache lock failed, loading groups from storage");
                    return self.load_from_storage(requester_id, partition_id).await;
                }
            }
        }
        Err(AppError::ServiceUnavailable(
            "Failed to get the groups".to_string(),
        ))
    }

    async fn rebuild_cache(
        &self,
        key: &str,
        requester_id: &str,
        partition_id: &str,
    ) -> Result<HashSet<ParentReference>, AppError> {
        let parents = self.load_from_storage(requester_id, partition_id).await?;
        let serialized = serde_json::to_string(&parents)
            .map_err(|e| anyhow::anyhow!("Failed to serialize cache entry: {}", e))?;
        if let Err(e) = self
            .backend
            .set_cache(key, &serialized, self.config.distributed_ttl_seconds)
            .await
        {
            tracing::warn!(error = %e, "Failed to write cache entry");
        }
        self.local.put(key, parents.clone());
        Ok(parents)
    }

    async fn load_from_storage(
        &self,
        requester_id: &str,
        partition_id: &str,
    ) -> Result<HashSet<ParentReference>, AppError> {
        let requester = EntityNode::member_node_for_new_user(requester_id, partition_id);
        let tree = self.retrieval.load_all_parents(&requester).await?;
        Ok(tree.parent_references)
    }

    async fn read_distributed(
        &self,
        key: &str,
    ) -> Result<Option<HashSet<ParentReference>>, AppError> {
        let Some(raw) = self.backend.get_cache(key).await? else {
            return Ok(None);
        };
        match serde_json::from_str(&raw) {
            Ok(parents) => Ok(Some(parents)),
            Err(e) => {
                // a corrupt entry reads as a miss and gets rebuilt
                tracing::warn!(key, error = %e, "Discarding unparseable cache entry");
                Ok(None)
            }
        }
    }
}

fn cache_key(requester_id: &str, partition_id: &str) -> String {
    format!("{}-{}", requester_id, partition_id)
}
