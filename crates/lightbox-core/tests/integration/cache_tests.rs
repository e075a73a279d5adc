use std::sync::Arc;
use std::time::Duration;

use lightbox_core::testutil::make_success;
use lightbox_core::{CacheConfig, SuccessResultCache};

fn purging_cache(ttl_ms: u64, purge_ms: u64) -> SuccessResultCache {
    SuccessResultCache::new(
        CacheConfig::new(Duration::from_millis(ttl_ms))
            .with_purge_interval(Duration::from_millis(purge_ms)),
    )
}

async fn settle() {
    for _ in 0..3 {
        tokio::task::yield_now().await;
    }
}

#[tokio::test(start_paused = true)]
async fn purge_scenario_ttl_10_interval_15() {
    let cache = purging_cache(10, 15);
    cache.set("1", make_success("1", &["a"]));

    tokio::time::sleep(Duration::from_millis(15)).await;
    settle().await;
    let metrics = cache.metrics();
    assert_eq!(metrics.size, 1);
    assert_eq!(metrics.purge_count, 0);

    tokio::time::sleep(Duration::from_millis(15)).await;
    settle().await;
    let metrics = cache.metrics();
    assert_eq!(metrics.size, 0);
    assert!(metrics.ttl_evictions >= 1);
    assert!(metrics.purge_count >= 1);
    assert!(metrics.evictions >= 1);
}

#[tokio::test(start_paused = true)]
async fn purge_bounds_memory_for_keys_never_read_again() {
    let cache = purging_cache(20, 10);
    for i in 0..50 {
        cache.set(&i.to_string(), make_success(&i.to_string(), &["m"]));
    }
    assert_eq!(cache.len(), 50);

    tokio::time::sleep(Duration::from_millis(100)).await;
    settle().await;

    let metrics = cache.metrics();
    assert_eq!(metrics.size, 0);
    assert_eq!(metrics.purge_count, 50);
}

#[tokio::test(start_paused = true)]
async fn dropping_the_cache_stops_the_purge_task() {
    let metrics = tokio::runtime::Handle::current().metrics();
    let cache = Arc::new(purging_cache(10, 10));
    cache.set("1", make_success("1", &["a"]));
    assert_eq!(metrics.num_alive_tasks(), 1);
    drop(cache);

    tokio::time::sleep(Duration::from_millis(100)).await;
    settle().await;
    assert_eq!(metrics.num_alive_tasks(), 0);
}

#[tokio::test]
async fn dispose_is_idempotent_without_interval() {
    let cache = SuccessResultCache::new(CacheConfig::new(Duration::from_secs(1)));
    assert!(!cache.metrics().purge_interval_active);
    cache.dispose();
    cache.dispose();
    assert!(cache.set("1", make_success("1", &["a"])));
    assert!(cache.get("1").is_some());
}

#[test]
fn capacity_churn_is_counted() {
    let cache = SuccessResultCache::new(
        CacheConfig::new(Duration::from_secs(60)).with_max_entries(3),
    );
    for i in 0..10 {
        cache.set(&i.to_string(), make_success(&i.to_string(), &["m"]));
    }
    let metrics = cache.metrics();
    assert_eq!(metrics.size, 3);
    assert_eq!(metrics.evictions, 7);
    assert_eq!(metrics.ttl_evictions, 0);
    assert!(cache.get("9").is_some());
    assert!(cache.get("6").is_none());
}
