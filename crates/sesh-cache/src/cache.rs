//! Host cache capability — cross-request storage keyed by [`CacheKey`].
//!
//! The memoizer never owns storage. It is handed an `Arc<dyn HostCache>` by
//! whatever hosts it. [`MemoryCache`] is an in-process implementation with
//! time-based revalidation and tag invalidation.
//!
//! ## Revalidation
//!
//! An entry older than its revalidation window is treated as a miss and
//! dropped, so the next call runs the lookup again. Stale entries nobody asks
//! for again are reclaimed by [`MemoryCache::cleanup_expired`], which also
//! runs before counting and whenever the cache is full.
//!
//! ## LRU eviction
//!
//! When a new key arrives at `max_entries`, expired entries are swept first;
//! if none were, the least-recently-accessed entry is evicted.

use std::any::Any;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::DashMap;

use crate::key::{CacheKey, Tags};
use crate::types::CacheStats;

/// Default maximum number of entries before LRU eviction.
pub const DEFAULT_MAX_ENTRIES: usize = 10_000;

/// A type-erased cached value.
pub type CachedValue = Arc<dyn Any + Send + Sync>;

/// Per-entry options passed to the host cache.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheOptions {
    /// Invalidation labels.
    pub tags: Vec<String>,
    /// Revalidation window; `None` uses the cache's default.
    pub revalidate: Option<Duration>,
}

impl CacheOptions {
    pub fn tagged(tags: &Tags) -> Self {
        Self {
            tags: tags.to_vec(),
            revalidate: None,
        }
    }

    pub fn with_revalidate(mut self, revalidate: Option<Duration>) -> Self {
        self.revalidate = revalidate;
        self
    }
}

/// Cross-request cache supplied by the host.
#[async_trait]
pub trait HostCache: Send + Sync {
    /// Fetch a fresh entry.
    async fn get(&self, key: &CacheKey) -> Option<CachedValue>;

    /// Store an entry, replacing any previous one under the same key.
    async fn put(&self, key: CacheKey, value: CachedValue, options: &CacheOptions);

    /// Drop every entry labelled with `tag`. Returns how many were dropped.
    async fn revalidate_tag(&self, tag: &str) -> usize;

    fn stats(&self) -> CacheStats {
        CacheStats::default()
    }
}

/// Return the cached value for `key` or run `lookup` and store its result.
///
/// Errors from `lookup` are returned unchanged and never stored.
pub async fn cached<T, E, F, Fut>(
    cache: &dyn HostCache,
    key: CacheKey,
    options: &CacheOptions,
    lookup: F,
) -> Result<T, E>
where
    T: Clone + Send + Sync + 'static,
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    if let Some(hit) = cache.get(&key).await {
        match hit.downcast::<T>() {
            Ok(value) => return Ok((*value).clone()),
            Err(_) => tracing::debug!("cache entry {key} holds a different type, recomputing"),
        }
    }

    let value = lookup().await?;
    cache.put(key, Arc::new(value.clone()), options).await;
    Ok(value)
}

struct CacheEntry {
    value: CachedValue,
    tags: Vec<String>,
    stored_at: Instant,
    last_accessed: Instant,
    revalidate: Option<Duration>,
}

impl CacheEntry {
    fn is_stale(&self) -> bool {
        self.revalidate
            .is_some_and(|window| self.stored_at.elapsed() >= window)
    }

    fn touch(&mut self) {
        self.last_accessed = Instant::now();
    }
}

/// In-process host cache.
pub struct MemoryCache {
    entries: DashMap<CacheKey, CacheEntry>,
    /// Applied to entries stored without their own window. `None` keeps
    /// entries until invalidated by tag.
    default_revalidate: Option<Duration>,
    max_entries: usize,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl MemoryCache {
    pub fn new(default_revalidate: Option<Duration>) -> Self {
        Self {
            entries: DashMap::new(),
            default_revalidate,
            max_entries: DEFAULT_MAX_ENTRIES,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Cap the number of entries. Clamped to at least one.
    pub fn with_max_entries(mut self, max_entries: usize) -> Self {
        self.max_entries = max_entries.max(1);
        self
    }

    /// Number of live entries. Expired ones are reclaimed first.
    pub fn len(&self) -> usize {
        self.cleanup_expired();
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, key: &CacheKey) -> bool {
        self.entries.get(key).is_some_and(|e| !e.is_stale())
    }

    /// Remove all expired entries. Returns how many were removed.
    pub fn cleanup_expired(&self) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, entry| !entry.is_stale());
        let removed = before.saturating_sub(self.entries.len());
        if removed > 0 {
            tracing::debug!("reclaimed {removed} expired cache entries");
        }
        removed
    }

    /// Make room for one more entry.
    fn evict_lru(&self) {
        if self.cleanup_expired() > 0 {
            return;
        }

        let lru = self
            .entries
            .iter()
            .min_by_key(|entry| entry.last_accessed)
            .map(|entry| entry.key().clone());
        if let Some(key) = lru {
            tracing::info!("evicting LRU cache entry: {key}");
            self.entries.remove(&key);
        }
    }
}

impl Default for MemoryCache {
    fn default() -> Self {
        Self::new(None)
    }
}

#[async_trait]
impl HostCache for MemoryCache {
    async fn get(&self, key: &CacheKey) -> Option<CachedValue> {
        self.entries.remove_if(key, |_, entry| entry.is_stale());
        let fresh = match self.entries.get_mut(key) {
            Some(mut entry) if !entry.is_stale() => {
                entry.touch();
                Some(entry.value.clone())
            }
            _ => None,
        };

        match fresh {
            Some(value) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                Some(value)
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    async fn put(&self, key: CacheKey, value: CachedValue, options: &CacheOptions) {
        if self.entries.len() >= self.max_entries && !self.entries.contains_key(&key) {
            self.evict_lru();
        }

        let now = Instant::now();
        self.entries.insert(
            key,
            CacheEntry {
                value,
                tags: options.tags.clone(),
                stored_at: now,
                last_accessed: now,
                revalidate: options.revalidate.or(self.default_revalidate),
            },
        );
    }

    async fn revalidate_tag(&self, tag: &str) -> usize {
        let before = self.entries.len();
        self.entries
            .retain(|_, entry| !entry.tags.iter().any(|t| t == tag));
        let dropped = before.saturating_sub(self.entries.len());
        tracing::info!("revalidated tag {tag:?}: {dropped} entries dropped");
        dropped
    }

    fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            entries: self.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn counting_lookup(
        calls: &Arc<AtomicUsize>,
        value: u32,
    ) -> impl FnOnce() -> std::future::Ready<Result<u32, String>> {
        let calls = calls.clone();
        move || {
            calls.fetch_add(1, Ordering::SeqCst);
            std::future::ready(Ok(value))
        }
    }

    #[tokio::test]
    async fn test_cached_hit_skips_lookup() {
        let cache = MemoryCache::default();
        let calls = Arc::new(AtomicUsize::new(0));
        let key = CacheKey::new(["user-1"]);
        let opts = CacheOptions::default();

        let a = cached(&cache, key.clone(), &opts, counting_lookup(&calls, 7)).await;
        let b = cached(&cache, key, &opts, counting_lookup(&calls, 8)).await;
        assert_eq!(a, Ok(7));
        assert_eq!(b, Ok(7));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(cache.stats(), CacheStats { hits: 1, misses: 1, entries: 1 });
    }

    #[tokio::test]
    async fn test_errors_are_not_stored() {
        let cache = MemoryCache::default();
        let key = CacheKey::new(["boom"]);
        let opts = CacheOptions::default();

        let err: Result<u32, String> =
            cached(&cache, key.clone(), &opts, || async { Err("db down".to_string()) }).await;
        assert_eq!(err, Err("db down".to_string()));
        assert!(cache.is_empty());

        let ok: Result<u32, String> = cached(&cache, key, &opts, || async { Ok(1) }).await;
        assert_eq!(ok, Ok(1));
    }

    #[tokio::test]
    async fn test_type_mismatch_is_a_miss() {
        let cache = MemoryCache::default();
        let key = CacheKey::new(["shared"]);
        let opts = CacheOptions::default();

        let _: Result<u32, String> = cached(&cache, key.clone(), &opts, || async { Ok(5) }).await;
        let s: Result<String, String> =
            cached(&cache, key, &opts, || async { Ok("five".to_string()) }).await;
        assert_eq!(s, Ok("five".to_string()));
    }

    #[tokio::test]
    async fn test_revalidate_window_expires_entry() {
        let cache = MemoryCache::default();
        let calls = Arc::new(AtomicUsize::new(0));
        let key = CacheKey::new(["ttl"]);
        let opts = CacheOptions::default().with_revalidate(Some(Duration::from_millis(20)));

        let _ = cached(&cache, key.clone(), &opts, counting_lookup(&calls, 1)).await;
        assert!(cache.contains(&key));
        tokio::time::sleep(Duration::from_millis(40)).await;
        assert!(!cache.contains(&key));
        let _ = cached(&cache, key, &opts, counting_lookup(&calls, 1)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_zero_default_window_never_hits() {
        let cache = MemoryCache::new(Some(Duration::ZERO));
        let calls = Arc::new(AtomicUsize::new(0));
        let key = CacheKey::new(["zero"]);
        let opts = CacheOptions::default();

        let _ = cached(&cache, key.clone(), &opts, counting_lookup(&calls, 1)).await;
        let _ = cached(&cache, key, &opts, counting_lookup(&calls, 1)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_revalidate_tag() {
        let cache = MemoryCache::default();
        let user = CacheOptions::tagged(&Tags::from("user-1"));
        let team = CacheOptions::tagged(&Tags::from(["team-2", "user-1"]));
        let other = CacheOptions::tagged(&Tags::from("user-2"));

        cache.put(CacheKey::new(["a"]), Arc::new(1u8), &user).await;
        cache.put(CacheKey::new(["b"]), Arc::new(2u8), &team).await;
        cache.put(CacheKey::new(["c"]), Arc::new(3u8), &other).await;

        assert_eq!(cache.revalidate_tag("user-1").await, 2);
        assert_eq!(cache.len(), 1);
        assert!(cache.contains(&CacheKey::new(["c"])));
        assert_eq!(cache.revalidate_tag("missing").await, 0);
    }

    #[tokio::test]
    async fn test_cleanup_reclaims_abandoned_sessions() {
        let cache = MemoryCache::new(Some(Duration::from_millis(10)));
        let opts = CacheOptions::tagged(&Tags::from("user-1"));
        for session in 0..200 {
            let key = CacheKey::new(["user-1".to_string(), format!("session-{session}")]);
            cache.put(key, Arc::new(session), &opts).await;
        }
        assert_eq!(cache.entries.len(), 200);

        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(cache.cleanup_expired(), 200);
        assert_eq!(cache.entries.len(), 0);
        assert_eq!(cache.stats().entries, 0);
    }

    #[tokio::test]
    async fn test_stale_entries_are_not_counted() {
        let cache = MemoryCache::new(Some(Duration::from_millis(10)));
        cache.put(CacheKey::new(["a"]), Arc::new(1u8), &CacheOptions::default()).await;
        cache.put(CacheKey::new(["b"]), Arc::new(2u8), &CacheOptions::default()).await;
        tokio::time::sleep(Duration::from_millis(30)).await;

        assert!(cache.is_empty());
        assert_eq!(cache.entries.len(), 0);
    }

    #[tokio::test]
    async fn test_full_cache_sweeps_expired_first() {
        let cache = MemoryCache::default().with_max_entries(3);
        let short = CacheOptions::default().with_revalidate(Some(Duration::from_millis(10)));
        let long = CacheOptions::default();

        cache.put(CacheKey::new(["keep"]), Arc::new(0u8), &long).await;
        cache.put(CacheKey::new(["old-1"]), Arc::new(1u8), &short).await;
        cache.put(CacheKey::new(["old-2"]), Arc::new(2u8), &short).await;
        tokio::time::sleep(Duration::from_millis(30)).await;

        cache.put(CacheKey::new(["new"]), Arc::new(3u8), &long).await;
        assert_eq!(cache.entries.len(), 2);
        assert!(cache.contains(&CacheKey::new(["keep"])));
        assert!(cache.contains(&CacheKey::new(["new"])));
    }

    #[tokio::test]
    async fn test_lru_eviction() {
        let cache = MemoryCache::default().with_max_entries(3);
        let opts = CacheOptions::default();

        cache.put(CacheKey::new(["a"]), Arc::new(1u8), &opts).await;
        cache.put(CacheKey::new(["b"]), Arc::new(2u8), &opts).await;
        cache.put(CacheKey::new(["c"]), Arc::new(3u8), &opts).await;
        tokio::time::sleep(Duration::from_millis(2)).await;

        // Touch b and c so a is least recently used.
        assert!(cache.get(&CacheKey::new(["b"])).await.is_some());
        assert!(cache.get(&CacheKey::new(["c"])).await.is_some());

        cache.put(CacheKey::new(["d"]), Arc::new(4u8), &opts).await;
        assert_eq!(cache.len(), 3);
        assert!(!cache.contains(&CacheKey::new(["a"])));
        assert!(cache.contains(&CacheKey::new(["b"])));
        assert!(cache.contains(&CacheKey::new(["c"])));
        assert!(cache.contains(&CacheKey::new(["d"])));
    }

    #[tokio::test]
    async fn test_replacing_a_key_at_capacity_evicts_nothing() {
        let cache = MemoryCache::default().with_max_entries(2);
        let opts = CacheOptions::default();

        cache.put(CacheKey::new(["a"]), Arc::new(1u8), &opts).await;
        cache.put(CacheKey::new(["b"]), Arc::new(2u8), &opts).await;
        cache.put(CacheKey::new(["a"]), Arc::new(3u8), &opts).await;
        assert_eq!(cache.len(), 2);
    }
}
