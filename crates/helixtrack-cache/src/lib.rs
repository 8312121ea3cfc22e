//! Bounded, TTL-expiring, LRU-evicting permission cache. Values are small,
//! explicit `AccessDecision` structs, so the underlying
//! `moka::future::Cache` is typed directly rather than going through a
//! serialize/deserialize round trip.

pub mod key;

use helixtrack_core::{AccessDecision, AccessRequest};
use moka::future::Cache;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct PermissionCacheConfig {
    pub max_capacity: u64,
    pub time_to_live: Duration,
}

impl Default for PermissionCacheConfig {
    fn default() -> Self {
        Self {
            max_capacity: 50_000,
            time_to_live: Duration::from_secs(60),
        }
    }
}

/// Snapshot of cache health: `{size, max, hits, misses, evictions, hit-rate}`.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct CacheStats {
    pub size: u64,
    pub max: u64,
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
}

impl CacheStats {
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

/// Tracks a principal's live cache keys so `InvalidatePrincipal` can evict
/// precisely, without a full scan. Entries are digests, not the requests
/// themselves, to avoid retaining caller-controlled context-map data
/// longer than necessary.
type PrincipalIndex = Arc<dashmap::DashMap<String, Vec<String>>>;

pub struct PermissionCache {
    cache: Cache<String, AccessDecision>,
    config: PermissionCacheConfig,
    principal_index: PrincipalIndex,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
}

impl PermissionCache {
    pub fn new(config: PermissionCacheConfig) -> Self {
        let cache = Cache::builder()
            .max_capacity(config.max_capacity)
            .time_to_live(config.time_to_live)
            .build();

        Self {
            cache,
            config,
            principal_index: Arc::new(dashmap::DashMap::new()),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
        }
    }

    /// `Get(request) -> (response, hit)`.
    pub async fn get(&self, request: &AccessRequest) -> (Option<AccessDecision>, bool) {
        let digest = key::digest(request);
        match self.cache.get(&digest).await {
            Some(decision) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                (Some(decision), true)
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                (None, false)
            }
        }
    }

    /// `Put(request, response)` with the cache's default TTL.
    pub async fn put(&self, request: &AccessRequest, decision: AccessDecision) {
        let digest = key::digest(request);
        self.cache.insert(digest.clone(), decision).await;
        self.principal_index
            .entry(request.username.clone())
            .or_default()
            .push(digest);
    }

    /// Conservatively drops every cached decision for one principal.
    pub async fn invalidate_principal(&self, username: &str) {
        if let Some((_, digests)) = self.principal_index.remove(username) {
            for digest in digests {
                self.cache.invalidate(&digest).await;
                self.evictions.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    /// Used when a change is role- or team-wide and the affected principal
    /// set cannot cheaply be enumerated.
    pub async fn invalidate_all(&self) {
        self.cache.invalidate_all().await;
        self.principal_index.clear();
        self.evictions
            .fetch_add(self.cache.entry_count(), Ordering::Relaxed);
    }

    pub async fn stats(&self) -> CacheStats {
        CacheStats {
            size: self.cache.entry_count(),
            max: self.config.max_capacity,
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn req(username: &str) -> AccessRequest {
        AccessRequest::new(username, "ticket", Some("t-1".into()), "ticketUpdate")
    }

    #[tokio::test]
    async fn miss_then_put_then_hit() {
        let cache = PermissionCache::new(PermissionCacheConfig::default());
        let r = req("alice");

        let (val, hit) = cache.get(&r).await;
        assert!(!hit);
        assert!(val.is_none());

        cache.put(&r, AccessDecision::allow("ok")).await;

        let (val, hit) = cache.get(&r).await;
        assert!(hit);
        assert_eq!(val.unwrap(), AccessDecision::allow("ok"));

        let stats = cache.stats().await;
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
    }

    #[tokio::test]
    async fn invalidate_principal_drops_only_that_principals_entries() {
        let cache = PermissionCache::new(PermissionCacheConfig::default());
        let alice = req("alice");
        let bob = req("bob");

        cache.put(&alice, AccessDecision::allow("ok")).await;
        cache.put(&bob, AccessDecision::allow("ok")).await;

        cache.invalidate_principal("alice").await;

        let (val, hit) = cache.get(&alice).await;
        assert!(!hit);
        assert!(val.is_none());

        let (val, hit) = cache.get(&bob).await;
        assert!(hit);
        assert!(val.is_some());
    }

    #[tokio::test]
    async fn invalidate_all_clears_every_entry() {
        let cache = PermissionCache::new(PermissionCacheConfig::default());
        cache.put(&req("alice"), AccessDecision::allow("ok")).await;
        cache.put(&req("bob"), AccessDecision::allow("ok")).await;

        cache.invalidate_all().await;

        let (_, hit) = cache.get(&req("alice")).await;
        assert!(!hit);
        let (_, hit) = cache.get(&req("bob")).await;
        assert!(!hit);
    }
}
