//! Process-lifetime caches.
//!
//! [`ResolutionCache`] holds one slot per `specifier@version`. A slot is an
//! `OnceCell`, so concurrent lookups of the same key await a single fetch
//! instead of racing the network. Failed fetches leave the slot empty and it
//! is pruned, so a later request retries the providers.
//!
//! [`CompileCache`] keeps finished compile results, bounded in size and
//! expiring after a fixed time to live.

use dashmap::DashMap;
use moka::sync::Cache;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::OnceCell;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CachedPackage {
    pub specifier: String,
    pub version: String,
    pub url: String,
    pub provider: String,
    pub content: String,
    /// Milliseconds since the Unix epoch.
    pub resolved_at: u64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CdnStats {
    pub requests: u64,
    pub hits: u64,
    pub misses: u64,
    pub fetch_failures: u64,
    pub entries: usize,
}

#[derive(Default)]
pub struct ResolutionCache {
    slots: DashMap<String, Arc<OnceCell<CachedPackage>>>,
    requests: AtomicU64,
    hits: AtomicU64,
    misses: AtomicU64,
    fetch_failures: AtomicU64,
}

impl ResolutionCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn key(specifier: &str, version: &str) -> String {
        format!("{}@{}", specifier, version)
    }

    /// Cached value for `key`, if a fetch has already completed.
    pub fn peek(&self, key: &str) -> Option<CachedPackage> {
        self.slots.get(key).and_then(|slot| slot.value().get().cloned())
    }

    /// Return the cached package for `key`, running `fetch` at most once per
    /// key across all concurrent callers. The flag is true on a cache hit.
    pub async fn get_or_fetch<F, Fut, E>(&self, key: &str, fetch: F) -> Result<(CachedPackage, bool), E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<CachedPackage, E>>,
    {
        self.requests.fetch_add(1, Ordering::Relaxed);

        // The map guard must not be held across the await below.
        let slot = {
            let entry = self
                .slots
                .entry(key.to_string())
                .or_insert_with(|| Arc::new(OnceCell::new()));
            Arc::clone(entry.value())
        };

        if let Some(cached) = slot.get() {
            self.hits.fetch_add(1, Ordering::Relaxed);
            return Ok((cached.clone(), true));
        }

        let mut fetched_here = false;
        let result = slot
            .get_or_try_init(|| {
                fetched_here = true;
                fetch()
            })
            .await;

        match result {
            Ok(cached) => {
                if fetched_here {
                    self.misses.fetch_add(1, Ordering::Relaxed);
                } else {
                    self.hits.fetch_add(1, Ordering::Relaxed);
                }
                Ok((cached.clone(), !fetched_here))
            }
            Err(e) => {
                self.fetch_failures.fetch_add(1, Ordering::Relaxed);
                self.slots
                    .remove_if(key, |_, cell| cell.get().is_none() && Arc::ptr_eq(cell, &slot));
                Err(e)
            }
        }
    }

    /// Number of populated entries.
    pub fn len(&self) -> usize {
        self.slots.iter().filter(|slot| slot.value().get().is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.slots.clear();
    }

    pub fn stats(&self) -> CdnStats {
        CdnStats {
            requests: self.requests.load(Ordering::Relaxed),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            fetch_failures: self.fetch_failures.load(Ordering::Relaxed),
            entries: self.len(),
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// COMPILE RESULTS
// ═══════════════════════════════════════════════════════════════════════════════

pub struct CompileCache<V: Clone + Send + Sync + 'static> {
    entries: Option<Cache<String, V>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl<V: Clone + Send + Sync + 'static> CompileCache<V> {
    /// A capacity of zero disables caching.
    pub fn new(capacity: u64, ttl: Duration) -> Self {
        let entries = (capacity > 0).then(|| {
            Cache::builder()
                .max_capacity(capacity)
                .time_to_live(ttl)
                .build()
        });
        Self {
            entries,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    pub fn get(&self, key: &str) -> Option<V> {
        let found = self.entries.as_ref().and_then(|entries| entries.get(key));
        match found {
            Some(_) => self.hits.fetch_add(1, Ordering::Relaxed),
            None => self.misses.fetch_add(1, Ordering::Relaxed),
        };
        found
    }

    pub fn insert(&self, key: String, value: V) {
        if let Some(entries) = &self.entries {
            entries.insert(key, value);
        }
    }

    pub fn len(&self) -> u64 {
        match &self.entries {
            Some(entries) => {
                entries.run_pending_tasks();
                entries.entry_count()
            }
            None => 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every entry. Returns how many there were.
    pub fn clear(&self) -> u64 {
        let cleared = self.len();
        if let Some(entries) = &self.entries {
            entries.invalidate_all();
            entries.run_pending_tasks();
        }
        cleared
    }

    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    pub fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }
}

/// `compile:` plus 16 hex chars of the SHA-256 over everything that can change
/// the output. Library order does not matter.
pub fn compile_key<O: Serialize, F: Serialize>(
    source: &str,
    libraries: &[String],
    options: &O,
    files: &F,
) -> String {
    let mut libraries = libraries.to_vec();
    libraries.sort();
    let material = serde_json::json!({
        "code": source,
        "libraries": libraries,
        "options": options,
        "files": files,
    });
    format!("compile:{}", &compute_hash(&material.to_string())[..16])
}

pub fn compute_hash(source: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(source.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Short artifact id: the first 12 hex chars of the SHA-256.
pub fn short_hash(source: &str) -> String {
    compute_hash(source)[..12].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use std::sync::atomic::AtomicUsize;

    fn package(url: &str) -> CachedPackage {
        CachedPackage {
            specifier: "lodash".into(),
            version: "latest".into(),
            url: url.into(),
            provider: "esm.sh".into(),
            content: "export default {}".into(),
            resolved_at: 0,
        }
    }

    #[tokio::test]
    async fn test_second_lookup_is_a_hit() {
        let cache = ResolutionCache::new();
        let (first, hit) = cache
            .get_or_fetch::<_, _, String>("lodash@latest", || async { Ok(package("u1")) })
            .await
            .unwrap();
        assert!(!hit);
        let (second, hit) = cache
            .get_or_fetch::<_, _, String>("lodash@latest", || async { Ok(package("u2")) })
            .await
            .unwrap();
        assert!(hit);
        assert_eq!(first, second);

        let stats = cache.stats();
        assert_eq!(stats.requests, 2);
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.entries, 1);
    }

    #[tokio::test]
    async fn test_failures_are_not_cached() {
        let cache = ResolutionCache::new();
        let err = cache
            .get_or_fetch::<_, _, String>("x@1", || async { Err("down".to_string()) })
            .await
            .unwrap_err();
        assert_eq!(err, "down");
        assert!(cache.is_empty());
        assert_eq!(cache.stats().fetch_failures, 1);

        let (_, hit) = cache
            .get_or_fetch::<_, _, String>("x@1", || async { Ok(package("u")) })
            .await
            .unwrap();
        assert!(!hit);
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_lookups_fetch_once() {
        let cache = Arc::new(ResolutionCache::new());
        let calls = Arc::new(AtomicUsize::new(0));

        let lookup = |cache: Arc<ResolutionCache>, calls: Arc<AtomicUsize>| async move {
            cache
                .get_or_fetch::<_, _, String>("react@18", || async {
                    calls.fetch_add(1, Ordering::SeqCst);
                    tokio::time::sleep(std::time::Duration::from_millis(20)).await;
                    Ok(package("https://esm.sh/react@18"))
                })
                .await
                .map(|(p, _)| p.url)
        };

        let (a, b) = tokio::join!(
            lookup(Arc::clone(&cache), Arc::clone(&calls)),
            lookup(Arc::clone(&cache), Arc::clone(&calls))
        );
        assert_eq!(a.unwrap(), b.unwrap());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_compile_cache_counts_hits_and_clears() {
        let cache: CompileCache<String> = CompileCache::new(10, Duration::from_secs(60));
        assert!(cache.get("compile:a").is_none());
        cache.insert("compile:a".into(), "out".into());
        assert_eq!(cache.get("compile:a").as_deref(), Some("out"));
        assert_eq!(cache.hits(), 1);
        assert_eq!(cache.misses(), 1);
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.clear(), 1);
        assert!(cache.get("compile:a").is_none());
    }

    #[test]
    fn test_compile_cache_expires_entries() {
        let cache: CompileCache<u32> = CompileCache::new(10, Duration::from_millis(20));
        cache.insert("k".into(), 1);
        std::thread::sleep(Duration::from_millis(60));
        assert!(cache.get("k").is_none());
    }

    #[test]
    fn test_zero_capacity_disables_compile_cache() {
        let cache: CompileCache<u32> = CompileCache::new(0, Duration::from_secs(60));
        cache.insert("k".into(), 1);
        assert!(cache.get("k").is_none());
        assert!(cache.is_empty());
    }

    #[test]
    fn test_compile_key_ignores_library_order() {
        let files: BTreeMap<String, String> = BTreeMap::new();
        let a = compile_key("x", &["b".into(), "a".into()], &1, &files);
        let b = compile_key("x", &["a".into(), "b".into()], &1, &files);
        assert_eq!(a, b);
        assert!(a.starts_with("compile:"));
        assert_eq!(a.len(), "compile:".len() + 16);
        assert_ne!(a, compile_key("y", &["a".into(), "b".into()], &1, &files));
        assert_ne!(a, compile_key("x", &["a".into(), "b".into()], &2, &files));
    }

    #[test]
    fn test_short_hash() {
        let h = short_hash("export default 1;");
        assert_eq!(h.len(), 12);
        assert_eq!(h, compute_hash("export default 1;")[..12]);
    }
}
