use std::sync::Arc;
use std::time::Duration;

use lightbox_core::testutil::{
    FakeElement, MockOutcome, MockStrategy, RecordingReporter, StaticIdentityResolver,
};
use lightbox_core::{
    ExtractionOptions, ExtractionOrchestrator, MediaExtractionService, ServiceConfig, with_retry,
};

use crate::common::{cache_with_ttl, orchestrator_with, tweet_media};

#[tokio::test]
async fn cache_hit_is_idempotent_and_skips_strategies() {
    let strategy = MockStrategy::succeeding("dom-direct");
    let orchestrator = orchestrator_with(cache_with_ttl(60_000), &[strategy.clone()]);
    let options = ExtractionOptions::default();

    let first = orchestrator
        .extract(&tweet_media("1001"), &options)
        .await
        .unwrap();
    let calls_after_first = strategy.call_count();
    let second = orchestrator
        .extract(&tweet_media("1001"), &options)
        .await
        .unwrap();

    assert_eq!(calls_after_first, 1);
    assert_eq!(strategy.call_count(), calls_after_first);
    assert_eq!(first.media_items, second.media_items);
    assert_eq!(second.metadata.cache_hit, Some(true));
}

#[tokio::test]
async fn reopen_after_dom_removal_hits_cache() {
    let strategy = MockStrategy::succeeding("dom-attributes");
    let orchestrator = orchestrator_with(cache_with_ttl(60_000), &[strategy.clone()]);
    let options = ExtractionOptions::default();

    let clicked = tweet_media("2002");
    orchestrator.extract(&clicked, &options).await.unwrap();
    clicked.detach();
    drop(clicked);

    // Gallery closed and reopened: a brand new node for the same tweet.
    let remounted = tweet_media("2002");
    let result = orchestrator.extract(&remounted, &options).await.unwrap();

    assert_eq!(result.metadata.cache_hit, Some(true));
    assert_eq!(strategy.call_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn ttl_expiry_reruns_chain_and_counts_eviction() {
    let strategy = MockStrategy::succeeding("dom-direct");
    let orchestrator = orchestrator_with(cache_with_ttl(50), &[strategy.clone()]);
    let options = ExtractionOptions::default();

    orchestrator
        .extract(&tweet_media("3003"), &options)
        .await
        .unwrap();
    let evictions_before = orchestrator.metrics().success_result_cache_evictions;

    tokio::time::advance(Duration::from_millis(51)).await;
    let result = orchestrator
        .extract(&tweet_media("3003"), &options)
        .await
        .unwrap();

    assert_eq!(strategy.call_count(), 2);
    assert_eq!(result.metadata.cache_hit, Some(false));
    assert!(orchestrator.metrics().success_result_cache_evictions >= evictions_before + 1);
    assert!(orchestrator.metrics().ttl_evictions >= 1);
}

#[tokio::test]
async fn zero_retries_means_one_attempt_and_no_entry() {
    let strategy = MockStrategy::failing("twitter-api");
    let orchestrator = ExtractionOrchestrator::builder(cache_with_ttl(60_000))
        .strategy(with_retry(strategy.clone(), 0))
        .strategy(MockStrategy::succeeding("dom-direct"))
        .build();

    let result = orchestrator
        .extract(&tweet_media("4004"), &ExtractionOptions::default())
        .await
        .unwrap();

    assert_eq!(strategy.call_count(), 1);
    let chain = result.metadata.central_metrics.unwrap().chain;
    assert!(!chain.strategy_retries.contains_key("twitter-api"));
}

#[tokio::test]
async fn n_failures_then_success_records_n_retries() {
    let strategy = MockStrategy::scripted(
        "twitter-api",
        vec![
            MockOutcome::Failure("429".into()),
            MockOutcome::Failure("429".into()),
            MockOutcome::Failure("429".into()),
            MockOutcome::Success,
        ],
    );
    let orchestrator = ExtractionOrchestrator::builder(cache_with_ttl(60_000))
        .strategy(with_retry(strategy.clone(), 3))
        .build();

    let result = orchestrator
        .extract(&tweet_media("5005"), &ExtractionOptions::default())
        .await
        .unwrap();

    assert!(result.success);
    assert_eq!(strategy.call_count(), 4);
    let chain = result.metadata.central_metrics.unwrap().chain;
    assert_eq!(chain.strategy_retries.get("twitter-api"), Some(&3));
    assert_eq!(chain.attempted_strategies, vec!["twitter-api"]);
}

#[tokio::test]
async fn chain_short_circuits_after_first_success() {
    let a = MockStrategy::failing("A");
    let b = MockStrategy::succeeding("B");
    let c = MockStrategy::succeeding("C");
    let orchestrator = orchestrator_with(cache_with_ttl(60_000), &[a, b, c.clone()]);

    let result = orchestrator
        .extract(&tweet_media("6006"), &ExtractionOptions::default())
        .await
        .unwrap();

    let chain = result.metadata.central_metrics.unwrap().chain;
    assert_eq!(chain.success_strategy.as_deref(), Some("B"));
    assert_eq!(chain.attempted_strategies, vec!["A", "B"]);
    assert_eq!(c.call_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn aggregate_durations_are_running_mean_and_max() {
    let strategy = MockStrategy::scripted_delays(
        "dom-direct",
        vec![Duration::from_millis(10), Duration::from_millis(30)],
    );
    let orchestrator = orchestrator_with(cache_with_ttl(60_000), &[strategy]);
    let options = ExtractionOptions::default();

    orchestrator
        .extract(&tweet_media("7001"), &options)
        .await
        .unwrap();
    let result = orchestrator
        .extract(&tweet_media("7002"), &options)
        .await
        .unwrap();

    let aggregate = result.metadata.central_metrics.unwrap().aggregate;
    assert!((aggregate.chain_duration_avg_ms - 20.0).abs() <= 0.1);
    assert!((aggregate.chain_duration_max_ms - 30.0).abs() <= 0.1);
    assert_eq!(aggregate.success_result_cache_size, 2);
}

#[tokio::test]
async fn failures_are_never_cached() {
    let a = MockStrategy::failing("A");
    let b = MockStrategy::failing("B");
    let orchestrator = orchestrator_with(cache_with_ttl(60_000), &[a.clone(), b.clone()]);
    let options = ExtractionOptions::default();

    let first = orchestrator
        .extract(&tweet_media("8008"), &options)
        .await
        .unwrap();
    orchestrator
        .extract(&tweet_media("8008"), &options)
        .await
        .unwrap();

    assert!(!first.success);
    assert_eq!(first.errors, vec!["A: no media found", "B: no media found"]);
    assert_eq!(a.call_count(), 2);
    assert_eq!(b.call_count(), 2);
    assert_eq!(orchestrator.metrics().success_result_cache_size, 0);
}

#[tokio::test]
async fn concurrent_calls_for_different_tweets_are_independent() {
    let strategy = MockStrategy::succeeding("dom-direct");
    let orchestrator = Arc::new(orchestrator_with(
        cache_with_ttl(60_000),
        &[strategy.clone()],
    ));

    let handles: Vec<_> = (0..8)
        .map(|i| {
            let orchestrator = Arc::clone(&orchestrator);
            tokio::spawn(async move {
                orchestrator
                    .extract(&tweet_media(&format!("90{i}")), &ExtractionOptions::default())
                    .await
            })
        })
        .collect();

    for handle in handles {
        assert!(handle.await.unwrap().unwrap().success);
    }
    assert_eq!(strategy.call_count(), 8);
    assert_eq!(orchestrator.cache().len(), 8);
}

#[tokio::test(start_paused = true)]
async fn service_timeout_falls_back_and_shares_cache() {
    let cache = cache_with_ttl(60_000);
    let api = MockStrategy::succeeding("twitter-api").with_delay(Duration::from_secs(30));
    let dom = MockStrategy::succeeding("dom-direct");
    let primary = ExtractionOrchestrator::builder(Arc::clone(&cache))
        .identity_resolver(StaticIdentityResolver::from_attribute("data-tweet-id"))
        .strategy(api.clone())
        .strategy(dom.clone())
        .build();
    let fallback = ExtractionOrchestrator::builder(Arc::clone(&cache))
        .identity_resolver(StaticIdentityResolver::from_attribute("data-tweet-id"))
        .strategy(dom.clone())
        .build();
    let reporter = RecordingReporter::new();
    let service = MediaExtractionService::new(primary, ServiceConfig::default())
        .with_fallback(fallback)
        .with_reporter(reporter.clone());

    let element: FakeElement = tweet_media("1111");
    let options = ExtractionOptions::default().with_timeout_ms(1_000);
    let first = service.extract(&element, &options).await.unwrap();
    let second = service.extract(&element, &options).await.unwrap();

    assert!(first.success);
    assert_eq!(first.metadata.source_type, "dom-fallback");
    assert_eq!(reporter.count("TimedOut"), 1);
    assert_eq!(second.metadata.cache_hit, Some(true));
    assert_eq!(dom.call_count(), 1);
}
