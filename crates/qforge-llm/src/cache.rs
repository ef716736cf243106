//! # Response Cache
//!
//! Content-addressed cache for completion responses. The default
//! in-memory implementation is bounded, evicts the soonest-to-expire
//! entry when full (approximates LRU under uniform TTL), and sweeps
//! expired entries in the background every five minutes.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use serde::Serialize;
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::backend::{CompletionRequest, CompletionResponse};

const DEFAULT_MAX_SIZE: usize = 1000;
const SWEEP_INTERVAL: Duration = Duration::from_secs(300);

/// Cache observability counters
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CacheStats {
    pub entries: usize,
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
}

/// Abstract KV over completion responses
pub trait ResponseCache: Send + Sync {
    fn get(&self, key: &str) -> Option<CompletionResponse>;
    fn set(&self, key: &str, value: CompletionResponse, ttl: Duration);
    fn stats(&self) -> CacheStats;
}

/// Cache key: SHA-256 over a canonical JSON serialization of the request
/// fields that determine the completion.
pub fn cache_key(request: &CompletionRequest) -> String {
    #[derive(Serialize)]
    struct KeyMaterial<'a> {
        tier: crate::backend::ModelTier,
        system: Option<&'a str>,
        messages: Vec<(&'static str, &'a str)>,
        temperature: f32,
    }

    let material = KeyMaterial {
        tier: request.tier,
        system: request.system.as_deref(),
        messages: request
            .messages
            .iter()
            .map(|m| {
                let role = match m.role {
                    crate::backend::MessageRole::User => "user",
                    crate::backend::MessageRole::Assistant => "assistant",
                };
                (role, m.content.as_str())
            })
            .collect(),
        temperature: request.temperature,
    };

    let canonical = serde_json::to_string(&material).unwrap_or_default();
    let digest = Sha256::digest(canonical.as_bytes());
    digest.iter().map(|b| format!("{b:02x}")).collect()
}

struct Entry {
    value: CompletionResponse,
    expires_at: Instant,
}

struct CacheInner {
    entries: HashMap<String, Entry>,
    hits: u64,
    misses: u64,
    evictions: u64,
}

/// Bounded in-memory cache
pub struct InMemoryCache {
    inner: Mutex<CacheInner>,
    max_size: usize,
}

impl InMemoryCache {
    pub fn new(max_size: usize) -> Self {
        Self {
            inner: Mutex::new(CacheInner {
                entries: HashMap::new(),
                hits: 0,
                misses: 0,
                evictions: 0,
            }),
            max_size: max_size.max(1),
        }
    }

    /// Spawn the periodic expired-entry sweep. Callers hold the handle if
    /// they want to stop it; dropping it leaves the task running.
    pub fn start_sweep(self: &Arc<Self>) -> tokio::task::JoinHandle<()> {
        let cache = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(SWEEP_INTERVAL);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                cache.sweep();
            }
        })
    }

    /// Drop every expired entry
    pub fn sweep(&self) {
        let mut inner = self.inner.lock().unwrap();
        let now = Instant::now();
        let before = inner.entries.len();
        inner.entries.retain(|_, entry| entry.expires_at > now);
        let removed = before - inner.entries.len();
        if removed > 0 {
            debug!(removed, "cache sweep removed expired entries");
        }
    }
}

impl Default for InMemoryCache {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_SIZE)
    }
}

impl ResponseCache for InMemoryCache {
    fn get(&self, key: &str) -> Option<CompletionResponse> {
        let mut inner = self.inner.lock().unwrap();
        let now = Instant::now();

        let expired = matches!(inner.entries.get(key), Some(entry) if entry.expires_at <= now);
        if expired {
            inner.entries.remove(key);
        }

        match inner.entries.get(key) {
            Some(entry) => {
                let mut value = entry.value.clone();
                value.cached = true;
                inner.hits += 1;
                Some(value)
            }
            None => {
                inner.misses += 1;
                None
            }
        }
    }

    fn set(&self, key: &str, value: CompletionResponse, ttl: Duration) {
        let mut inner = self.inner.lock().unwrap();

        if inner.entries.len() >= self.max_size && !inner.entries.contains_key(key) {
            // evict whichever entry dies first
            if let Some(victim) = inner
                .entries
                .iter()
                .min_by_key(|(_, e)| e.expires_at)
                .map(|(k, _)| k.clone())
            {
                inner.entries.remove(&victim);
                inner.evictions += 1;
            }
        }

        inner.entries.insert(
            key.to_string(),
            Entry {
                value,
                expires_at: Instant::now() + ttl,
            },
        );
    }

    fn stats(&self) -> CacheStats {
        let inner = self.inner.lock().unwrap();
        CacheStats {
            entries: inner.entries.len(),
            hits: inner.hits,
            misses: inner.misses,
            evictions: inner.evictions,
        }
    }
}

/// Cache that stores nothing; safe for concurrent use
pub struct NullCache;

impl ResponseCache for NullCache {
    fn get(&self, _key: &str) -> Option<CompletionResponse> {
        None
    }

    fn set(&self, _key: &str, _value: CompletionResponse, _ttl: Duration) {}

    fn stats(&self) -> CacheStats {
        CacheStats::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::ModelTier;

    fn response(content: &str) -> CompletionResponse {
        CompletionResponse {
            content: content.to_string(),
            provider: "stub".to_string(),
            model: "m".to_string(),
            tokens_used: 1,
            cached: false,
            latency_ms: 0,
        }
    }

    #[test]
    fn test_cache_key_deterministic_and_sensitive() {
        let a = CompletionRequest::new(ModelTier::Fast, "hello");
        let b = CompletionRequest::new(ModelTier::Fast, "hello");
        assert_eq!(cache_key(&a), cache_key(&b));

        let other_prompt = CompletionRequest::new(ModelTier::Fast, "hello!");
        assert_ne!(cache_key(&a), cache_key(&other_prompt));

        let other_tier = CompletionRequest::new(ModelTier::Thorough, "hello");
        assert_ne!(cache_key(&a), cache_key(&other_tier));

        let mut other_temp = CompletionRequest::new(ModelTier::Fast, "hello");
        other_temp.temperature = 0.9;
        assert_ne!(cache_key(&a), cache_key(&other_temp));
    }

    #[test]
    fn test_hit_sets_cached_flag() {
        let cache = InMemoryCache::new(10);
        cache.set("k", response("v"), Duration::from_secs(60));

        let hit = cache.get("k").unwrap();
        assert!(hit.cached);
        assert_eq!(hit.content, "v");

        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.entries, 1);
    }

    #[test]
    fn test_ttl_expiry() {
        let cache = InMemoryCache::new(10);
        cache.set("k", response("v"), Duration::from_millis(20));
        assert!(cache.get("k").is_some());

        std::thread::sleep(Duration::from_millis(40));
        assert!(cache.get("k").is_none());
        assert_eq!(cache.stats().entries, 0);
    }

    #[test]
    fn test_soonest_to_expire_eviction() {
        let cache = InMemoryCache::new(2);
        cache.set("short", response("a"), Duration::from_secs(5));
        cache.set("long", response("b"), Duration::from_secs(500));
        cache.set("new", response("c"), Duration::from_secs(100));

        assert!(cache.get("short").is_none());
        assert!(cache.get("long").is_some());
        assert!(cache.get("new").is_some());
        assert_eq!(cache.stats().evictions, 1);
    }

    #[test]
    fn test_sweep_removes_expired() {
        let cache = InMemoryCache::new(10);
        cache.set("a", response("a"), Duration::from_millis(10));
        cache.set("b", response("b"), Duration::from_secs(60));

        std::thread::sleep(Duration::from_millis(30));
        cache.sweep();

        let stats = cache.stats();
        assert_eq!(stats.entries, 1);
    }

    #[test]
    fn test_null_cache_stores_nothing() {
        let cache = NullCache;
        cache.set("k", response("v"), Duration::from_secs(60));
        assert!(cache.get("k").is_none());
        assert_eq!(cache.stats(), CacheStats::default());
    }
}
