//! TTL cache shared by every pipeline stage.
//!
//! Page renders are the expensive part of job discovery, so URL analyses,
//! validations and listing extractions are memoised here. Entries are keyed
//! by `namespace:` plus a SHA-256 of the canonical JSON form of the key
//! payload, so structurally equal payloads hit the same entry regardless of
//! field order.
//!
//! # Example
//!
//! ```rust
//! use std::time::Duration;
//! use jobscout_core::cache::Cache;
//!
//! let cache = Cache::new();
//! let key = serde_json::json!("https://example.com/jobs");
//! cache.set("demo", &key, serde_json::json!({"kind": "job_listing"}), Duration::from_secs(60));
//! assert!(cache.get("demo", &key).is_some());
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use moka::Expiry;
use moka::notification::RemovalCause;
use moka::sync::Cache as MokaCache;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::AppError;
use crate::util::compute_hash;

/// Namespace for [`crate::models::UrlAnalysis`] results.
pub const URL_ANALYSIS: &str = "url_analysis";
/// Namespace for [`crate::models::JobValidation`] results.
pub const JOB_VALIDATION: &str = "job_validation";
/// Namespace for listing extraction results.
pub const LISTING_EXTRACTION: &str = "listing_extraction";

/// URLs rarely change type.
pub const URL_ANALYSIS_TTL: Duration = Duration::from_secs(24 * 60 * 60);
/// Postings expire.
pub const JOB_VALIDATION_TTL: Duration = Duration::from_secs(6 * 60 * 60);
/// Listings change most often.
pub const LISTING_EXTRACTION_TTL: Duration = Duration::from_secs(2 * 60 * 60);

/// A cached value. Replaced whole on every `set`, never mutated.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    value: Arc<Value>,
    created_at: Instant,
    ttl: Duration,
}

impl CacheEntry {
    fn is_expired(&self) -> bool {
        self.created_at.elapsed() > self.ttl
    }
}

/// How long moka keeps an entry past its TTL. Inside this window `get`
/// already treats the entry as gone and `sweep` can still see it.
const EVICTION_GRACE: Duration = Duration::from_secs(60);

/// Per-entry expiry: moka drops each entry a grace period after its own TTL.
struct EntryExpiry;

impl Expiry<String, CacheEntry> for EntryExpiry {
    fn expire_after_create(
        &self,
        _key: &String,
        value: &CacheEntry,
        _created_at: Instant,
    ) -> Option<Duration> {
        Some(value.ttl.saturating_add(EVICTION_GRACE))
    }

    fn expire_after_update(
        &self,
        _key: &String,
        value: &CacheEntry,
        _updated_at: Instant,
        _duration_until_expiry: Option<Duration>,
    ) -> Option<Duration> {
        Some(value.ttl.saturating_add(EVICTION_GRACE))
    }
}

/// Hit/miss counters and size.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub hit_rate: f64,
    pub entry_count: u64,
}

/// Thread-safe keyed store with per-entry TTL.
pub struct Cache {
    entries: MokaCache<String, CacheEntry>,
    hits: AtomicU64,
    misses: AtomicU64,
    /// Entries moka dropped on its own since the last sweep.
    evicted: Arc<AtomicU64>,
}

impl Default for Cache {
    fn default() -> Self {
        Self::new()
    }
}

impl Cache {
    pub fn new() -> Self {
        let evicted = Arc::new(AtomicU64::new(0));
        let counter = Arc::clone(&evicted);
        let entries = MokaCache::builder()
            .expire_after(EntryExpiry)
            .eviction_listener(move |_key, _entry, cause| {
                if matches!(cause, RemovalCause::Expired) {
                    counter.fetch_add(1, Ordering::Relaxed);
                }
            })
            .build();

        Self {
            entries,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evicted,
        }
    }

    /// Derive the storage key for a namespace + key payload.
    pub fn key_for(namespace: &str, key: &Value) -> String {
        format!("{namespace}:{}", compute_hash(&canonical_json(key)))
    }

    /// Look up a live entry. Expired entries are evicted and count as misses.
    pub fn get(&self, namespace: &str, key: &Value) -> Option<Arc<Value>> {
        let cache_key = Self::key_for(namespace, key);
        match self.entries.get(&cache_key) {
            Some(entry) if !entry.is_expired() => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                Some(entry.value)
            }
            Some(_) => {
                self.entries.invalidate(&cache_key);
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    /// Create or replace an entry.
    pub fn set(&self, namespace: &str, key: &Value, value: Value, ttl: Duration) {
        let entry = CacheEntry {
            value: Arc::new(value),
            created_at: Instant::now(),
            ttl,
        };
        self.entries.insert(Self::key_for(namespace, key), entry);
    }

    /// Typed lookup. A payload that no longer deserializes is treated as a miss.
    pub fn get_as<T: DeserializeOwned>(&self, namespace: &str, key: &Value) -> Option<T> {
        let value = self.get(namespace, key)?;
        match T::deserialize(value.as_ref()) {
            Ok(typed) => Some(typed),
            Err(e) => {
                tracing::warn!(%namespace, error = %e, "Discarding undecodable cache entry");
                self.entries.invalidate(&Self::key_for(namespace, key));
                None
            }
        }
    }

    /// Typed insert.
    pub fn set_as<T: Serialize>(
        &self,
        namespace: &str,
        key: &Value,
        value: &T,
        ttl: Duration,
    ) -> Result<(), AppError> {
        let value = serde_json::to_value(value)?;
        self.set(namespace, key, value, ttl);
        Ok(())
    }

    /// Remove every entry whose age exceeds its TTL. Returns how many expired
    /// entries left the cache since the last sweep, including those moka
    /// evicted by itself.
    pub fn sweep(&self) -> usize {
        let expired: Vec<Arc<String>> = self
            .entries
            .iter()
            .filter(|(_, entry)| entry.is_expired())
            .map(|(key, _)| key)
            .collect();
        for key in &expired {
            self.entries.invalidate(key.as_str());
        }
        self.entries.run_pending_tasks();

        let removed = expired.len() + self.evicted.swap(0, Ordering::Relaxed) as usize;
        if removed > 0 {
            tracing::info!(removed, "Cleared expired cache entries");
        }
        removed
    }

    /// Drop every entry and reset the counters.
    pub fn clear(&self) {
        self.entries.invalidate_all();
        self.entries.run_pending_tasks();
        self.hits.store(0, Ordering::Relaxed);
        self.misses.store(0, Ordering::Relaxed);
        self.evicted.store(0, Ordering::Relaxed);
        tracing::info!("Cache cleared");
    }

    pub fn stats(&self) -> CacheStats {
        self.entries.run_pending_tasks();
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let total = hits + misses;
        CacheStats {
            hits,
            misses,
            hit_rate: if total == 0 {
                0.0
            } else {
                hits as f64 / total as f64
            },
            entry_count: self.entries.entry_count(),
        }
    }
}

/// Serialize with object keys sorted at every level.
fn canonical_json(value: &Value) -> String {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            let fields: Vec<String> = keys
                .into_iter()
                .map(|k| format!("{}:{}", Value::String(k.clone()), canonical_json(&map[k])))
                .collect();
            format!("{{{}}}", fields.join(","))
        }
        Value::Array(items) => {
            let items: Vec<String> = items.iter().map(canonical_json).collect();
            format!("[{}]", items.join(","))
        }
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn set_then_get_returns_value() {
        let cache = Cache::new();
        let key = json!("https://example.com/jobs");
        cache.set("ns", &key, json!({"a": 1}), Duration::from_secs(60));
        assert_eq!(*cache.get("ns", &key).unwrap(), json!({"a": 1}));
        assert!(cache.get("other", &key).is_none());
    }

    #[test]
    fn entry_expires_after_ttl() {
        let cache = Cache::new();
        let key = json!("k");
        cache.set("ns", &key, json!(42), Duration::from_secs(1));
        assert_eq!(*cache.get("ns", &key).unwrap(), json!(42));

        std::thread::sleep(Duration::from_secs(2));
        assert!(cache.get("ns", &key).is_none());
    }

    #[test]
    fn structurally_equal_keys_collide() {
        let mut forward = serde_json::Map::new();
        forward.insert("url".into(), json!("https://x.test"));
        forward.insert("max_jobs".into(), json!(30));
        let mut backward = serde_json::Map::new();
        backward.insert("max_jobs".into(), json!(30));
        backward.insert("url".into(), json!("https://x.test"));

        assert_eq!(
            Cache::key_for("ns", &Value::Object(forward)),
            Cache::key_for("ns", &Value::Object(backward))
        );
        assert_ne!(
            Cache::key_for("ns", &json!({"url": "a"})),
            Cache::key_for("ns", &json!({"url": "b"}))
        );
    }

    #[test]
    fn set_replaces_whole_entry() {
        let cache = Cache::new();
        let key = json!("k");
        cache.set("ns", &key, json!({"a": 1, "b": 2}), Duration::from_secs(60));
        cache.set("ns", &key, json!({"a": 3}), Duration::from_secs(60));
        assert_eq!(*cache.get("ns", &key).unwrap(), json!({"a": 3}));
    }

    #[test]
    fn typed_roundtrip_and_bad_payload() {
        let cache = Cache::new();
        let key = json!("k");
        cache
            .set_as("ns", &key, &vec!["a".to_string()], Duration::from_secs(60))
            .unwrap();
        let back: Vec<String> = cache.get_as("ns", &key).unwrap();
        assert_eq!(back, vec!["a".to_string()]);

        let wrong: Option<u32> = cache.get_as("ns", &key);
        assert!(wrong.is_none());
        assert!(cache.get("ns", &key).is_none());
    }

    #[test]
    fn stats_track_hits_and_misses() {
        let cache = Cache::new();
        let key = json!("k");
        assert!(cache.get("ns", &key).is_none());
        cache.set("ns", &key, json!(1), Duration::from_secs(60));
        cache.get("ns", &key);
        cache.get("ns", &key);

        let stats = cache.stats();
        assert_eq!(stats.hits, 2);
        assert_eq!(stats.misses, 1);
        assert!((stats.hit_rate - 2.0 / 3.0).abs() < 1e-9);
        assert_eq!(stats.entry_count, 1);

        cache.clear();
        let stats = cache.stats();
        assert_eq!(stats.hits, 0);
        assert_eq!(stats.entry_count, 0);
    }

    #[test]
    fn sweep_removes_only_expired_entries() {
        let cache = Cache::new();
        cache.set("ns", &json!("short"), json!(1), Duration::from_millis(10));
        cache.set("ns", &json!("long"), json!(2), Duration::from_secs(60));
        std::thread::sleep(Duration::from_millis(30));

        assert_eq!(cache.sweep(), 1);
        assert!(cache.get("ns", &json!("long")).is_some());
        assert_eq!(cache.stats().entry_count, 1);
    }

    #[test]
    fn sweep_counts_each_expired_entry_once() {
        let cache = Cache::new();
        cache.set("ns", &json!("a"), json!(1), Duration::from_millis(10));
        cache.set("ns", &json!("b"), json!(2), Duration::from_millis(10));
        cache.set("ns", &json!("c"), json!(3), Duration::from_secs(60));
        std::thread::sleep(Duration::from_millis(50));

        assert_eq!(cache.sweep(), 2);
        assert_eq!(cache.sweep(), 0);
        assert_eq!(cache.stats().entry_count, 1);
    }
}
