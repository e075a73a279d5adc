//! TTL-bounded cache of successful extraction results.
//!
//! Entries expire lazily on lookup once older than the TTL. When a purge
//! interval is configured a background task also sweeps the map, so keys
//! that are never looked up again still get dropped. The sweep only removes
//! entries older than TTL plus one purge period; anything younger is left
//! for lazy eviction.
//!
//! Only successful results are ever stored.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::{Duration, Instant};

use serde::Serialize;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::clock::{Clock, TokioClock};
use crate::models::MediaExtractionResult;

/// Configuration for [`SuccessResultCache`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheConfig {
    pub ttl: Duration,
    /// Background sweep period. `None` disables the sweep.
    pub purge_interval: Option<Duration>,
    pub max_entries: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(300),
            purge_interval: Some(Duration::from_secs(60)),
            max_entries: 200,
        }
    }
}

impl CacheConfig {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            purge_interval: None,
            ..Self::default()
        }
    }

    pub fn with_purge_interval(mut self, interval: Duration) -> Self {
        self.purge_interval = (!interval.is_zero()).then_some(interval);
        self
    }

    pub fn with_max_entries(mut self, max_entries: usize) -> Self {
        self.max_entries = max_entries;
        self
    }
}

/// Live snapshot of cache occupancy and churn counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheMetrics {
    pub size: usize,
    pub purge_interval_active: bool,
    /// Entries removed by background sweeps.
    pub purge_count: u64,
    /// Entries removed for age, lazily or by sweep.
    pub ttl_evictions: u64,
    /// All removals: TTL and capacity.
    pub evictions: u64,
}

#[derive(Debug)]
struct CacheEntry {
    value: MediaExtractionResult,
    inserted_at: Instant,
}

#[derive(Debug, Default)]
struct CacheState {
    entries: HashMap<String, CacheEntry>,
    /// Keys in insertion order, oldest first.
    order: VecDeque<String>,
    purge_count: u64,
    ttl_evictions: u64,
    evictions: u64,
    disposed: bool,
}

impl CacheState {
    fn remove(&mut self, key: &str) -> Option<CacheEntry> {
        let entry = self.entries.remove(key)?;
        self.order.retain(|k| k != key);
        Some(entry)
    }

    /// Removes every entry older than `max_age`. Returns how many were removed.
    fn sweep(&mut self, now: Instant, max_age: Duration) -> u64 {
        let expired: Vec<String> = self
            .entries
            .iter()
            .filter(|(_, e)| now.saturating_duration_since(e.inserted_at) > max_age)
            .map(|(k, _)| k.clone())
            .collect();
        for key in &expired {
            self.remove(key);
        }
        let removed = expired.len() as u64;
        self.ttl_evictions += removed;
        self.evictions += removed;
        removed
    }
}

fn lock_state(state: &Mutex<CacheState>) -> MutexGuard<'_, CacheState> {
    state.lock().unwrap_or_else(|poisoned| {
        tracing::warn!("Recovered from poisoned success cache mutex");
        poisoned.into_inner()
    })
}

/// Keyed cache of successful results with TTL expiry and capacity eviction.
///
/// Owns its background purge task; [`dispose`](Self::dispose) (or drop)
/// cancels it.
#[derive(Debug)]
pub struct SuccessResultCache {
    config: CacheConfig,
    clock: Arc<dyn Clock>,
    state: Arc<Mutex<CacheState>>,
    cancel: CancellationToken,
    purge_active: AtomicBool,
}

impl SuccessResultCache {
    /// Creates the cache. The purge task only starts inside a tokio runtime.
    pub fn new(config: CacheConfig) -> Self {
        Self::with_clock(config, Arc::new(TokioClock))
    }

    pub fn with_clock(config: CacheConfig, clock: Arc<dyn Clock>) -> Self {
        let state = Arc::new(Mutex::new(CacheState::default()));
        let cancel = CancellationToken::new();

        let purge_active = match config.purge_interval {
            Some(period) if !period.is_zero() => spawn_purge(
                Arc::downgrade(&state),
                Arc::clone(&clock),
                config.ttl + period,
                period,
                cancel.clone(),
            ),
            _ => false,
        };

        Self {
            config,
            clock,
            state,
            cancel,
            purge_active: AtomicBool::new(purge_active),
        }
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Returns a live entry, evicting it instead if it outlived the TTL.
    pub fn get(&self, key: &str) -> Option<MediaExtractionResult> {
        let now = self.clock.now();
        let mut state = lock_state(&self.state);

        let age = now.saturating_duration_since(state.entries.get(key)?.inserted_at);
        if age > self.config.ttl {
            state.remove(key);
            state.ttl_evictions += 1;
            state.evictions += 1;
            tracing::debug!(%key, age_ms = age.as_millis() as u64, "Success cache entry expired");
            return None;
        }

        state.entries.get(key).map(|e| e.value.clone())
    }

    /// Stores a successful result, replacing any previous entry for `key`.
    ///
    /// Returns false (and stores nothing) for failed results.
    pub fn set(&self, key: &str, result: MediaExtractionResult) -> bool {
        if !result.success {
            tracing::debug!(%key, "Refusing to cache failed result");
            return false;
        }

        let now = self.clock.now();
        let mut state = lock_state(&self.state);
        state.remove(key);
        state.entries.insert(
            key.to_string(),
            CacheEntry {
                value: result,
                inserted_at: now,
            },
        );
        state.order.push_back(key.to_string());

        let max_entries = self.config.max_entries.max(1);
        while state.entries.len() > max_entries {
            let Some(oldest) = state.order.pop_front() else {
                break;
            };
            state.entries.remove(&oldest);
            state.evictions += 1;
            tracing::debug!(key = %oldest, "Success cache at capacity, evicted oldest entry");
        }
        true
    }

    pub fn len(&self) -> usize {
        lock_state(&self.state).entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Removes every entry older than the TTL right now.
    pub fn purge_expired(&self) -> u64 {
        let now = self.clock.now();
        let mut state = lock_state(&self.state);
        let removed = state.sweep(now, self.config.ttl);
        state.purge_count += removed;
        removed
    }

    pub fn metrics(&self) -> CacheMetrics {
        let state = lock_state(&self.state);
        CacheMetrics {
            size: state.entries.len(),
            purge_interval_active: self.purge_active.load(Ordering::SeqCst),
            purge_count: state.purge_count,
            ttl_evictions: state.ttl_evictions,
            evictions: state.evictions,
        }
    }

    /// Stops the background sweep. Safe to call repeatedly.
    pub fn dispose(&self) {
        self.cancel.cancel();
        lock_state(&self.state).disposed = true;
        if self.purge_active.swap(false, Ordering::SeqCst) {
            tracing::debug!("Success cache purge task stopped");
        }
    }
}

impl Drop for SuccessResultCache {
    fn drop(&mut self) {
        self.dispose();
    }
}

fn spawn_purge(
    state: Weak<Mutex<CacheState>>,
    clock: Arc<dyn Clock>,
    max_age: Duration,
    period: Duration,
    cancel: CancellationToken,
) -> bool {
    let Ok(handle) = tokio::runtime::Handle::try_current() else {
        tracing::debug!("No tokio runtime, success cache purge disabled");
        return false;
    };

    let first_tick = tokio::time::Instant::now() + period;
    handle.spawn(async move {
        let mut ticker = tokio::time::interval_at(first_tick, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    let Some(state) = state.upgrade() else {
                        break;
                    };
                    let mut guard = lock_state(&state);
                    if guard.disposed {
                        break;
                    }
                    let removed = guard.sweep(clock.now(), max_age);
                    if removed > 0 {
                        guard.purge_count += removed;
                        tracing::debug!(
                            removed,
                            remaining = guard.entries.len(),
                            "Purged expired success cache entries"
                        );
                    }
                }
            }
        }
    });
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{MediaInfo, MediaType};
    use crate::testutil::ManualClock;

    fn success(id: &str) -> MediaExtractionResult {
        MediaExtractionResult::success(
            vec![MediaInfo::new(
                id,
                format!("https://pbs.twimg.com/media/{id}?name=orig"),
                MediaType::Image,
            )],
            0,
            "test",
            "mock",
            None,
        )
    }

    fn manual_cache(ttl_ms: u64, max_entries: usize) -> (SuccessResultCache, ManualClock) {
        let clock = ManualClock::new();
        let cache = SuccessResultCache::with_clock(
            CacheConfig::new(Duration::from_millis(ttl_ms)).with_max_entries(max_entries),
            Arc::new(clock.clone()),
        );
        (cache, clock)
    }

    #[test]
    fn test_only_successes_are_stored() {
        let (cache, _) = manual_cache(1000, 10);
        let failure = MediaExtractionResult::failure("test", "mock", "nope");

        assert!(!cache.set("1", failure));
        assert!(cache.is_empty());
        assert!(cache.set("1", success("a")));
        assert_eq!(cache.get("1").unwrap().media_items[0].id, "a");
    }

    #[test]
    fn test_lazy_ttl_eviction_counts_both_counters() {
        let (cache, clock) = manual_cache(100, 10);
        cache.set("1", success("a"));

        clock.advance(Duration::from_millis(100));
        assert!(cache.get("1").is_some(), "age equal to ttl is still live");

        clock.advance(Duration::from_millis(1));
        assert!(cache.get("1").is_none());

        let metrics = cache.metrics();
        assert_eq!(metrics.size, 0);
        assert_eq!(metrics.ttl_evictions, 1);
        assert_eq!(metrics.evictions, 1);
        assert_eq!(metrics.purge_count, 0);
    }

    #[test]
    fn test_capacity_evicts_oldest_first() {
        let (cache, _) = manual_cache(1000, 2);
        cache.set("1", success("a"));
        cache.set("2", success("b"));
        cache.set("3", success("c"));

        assert!(cache.get("1").is_none());
        assert!(cache.get("2").is_some());
        assert!(cache.get("3").is_some());
        assert_eq!(cache.metrics().evictions, 1);
        assert_eq!(cache.metrics().ttl_evictions, 0);
    }

    #[test]
    fn test_replacement_refreshes_insertion_order() {
        let (cache, clock) = manual_cache(100, 2);
        cache.set("1", success("a"));
        cache.set("2", success("b"));
        clock.advance(Duration::from_millis(80));
        cache.set("1", success("a2"));
        cache.set("3", success("c"));

        assert!(cache.get("2").is_none(), "key 2 is now the oldest");
        assert_eq!(cache.get("1").unwrap().media_items[0].id, "a2");

        clock.advance(Duration::from_millis(50));
        assert!(cache.get("1").is_some(), "replacement resets the entry age");
    }

    #[test]
    fn test_manual_purge() {
        let (cache, clock) = manual_cache(10, 10);
        cache.set("1", success("a"));
        cache.set("2", success("b"));
        clock.advance(Duration::from_millis(11));
        cache.set("3", success("c"));

        assert_eq!(cache.purge_expired(), 2);
        let metrics = cache.metrics();
        assert_eq!(metrics.size, 1);
        assert_eq!(metrics.purge_count, 2);
        assert_eq!(metrics.ttl_evictions, 2);
    }

    #[test]
    fn test_no_runtime_means_no_purge_task() {
        let cache = SuccessResultCache::new(
            CacheConfig::new(Duration::from_millis(10))
                .with_purge_interval(Duration::from_millis(15)),
        );
        assert!(!cache.metrics().purge_interval_active);
        cache.dispose();
        cache.dispose();
    }

    #[tokio::test(start_paused = true)]
    async fn test_background_purge_after_grace_period() {
        let cache = SuccessResultCache::new(
            CacheConfig::new(Duration::from_millis(10))
                .with_purge_interval(Duration::from_millis(15)),
        );
        assert!(cache.metrics().purge_interval_active);
        cache.set("1", success("a"));

        tokio::time::sleep(Duration::from_millis(15)).await;
        tokio::task::yield_now().await;
        let metrics = cache.metrics();
        assert_eq!(metrics.size, 1);
        assert_eq!(metrics.purge_count, 0);

        tokio::time::sleep(Duration::from_millis(15)).await;
        tokio::task::yield_now().await;
        let metrics = cache.metrics();
        assert_eq!(metrics.size, 0);
        assert!(metrics.purge_count >= 1);
        assert!(metrics.ttl_evictions >= 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dispose_stops_purging() {
        let cache = SuccessResultCache::new(
            CacheConfig::new(Duration::from_millis(10))
                .with_purge_interval(Duration::from_millis(15)),
        );
        cache.set("1", success("a"));
        cache.dispose();
        assert!(!cache.metrics().purge_interval_active);

        tokio::time::sleep(Duration::from_millis(100)).await;
        tokio::task::yield_now().await;

        let metrics = cache.metrics();
        assert_eq!(metrics.size, 1);
        assert_eq!(metrics.purge_count, 0);
        cache.dispose();
    }
}
