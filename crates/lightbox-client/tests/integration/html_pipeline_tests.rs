use lightbox_client::DomIdentityResolver;
use lightbox_core::testutil::{MockTweetLookup, RecordingReporter, api_photo};
use lightbox_core::{AppError, ExtractionOptions, IdentityResolver};

use crate::common::*;

const FIRST_TWEET: &str = "1790000000000000001";

#[test]
fn identity_prepass_over_snapshot() {
    let doc = parse(TIMELINE, TIMELINE_URL);
    let resolver = DomIdentityResolver::new();

    let first = resolver.resolve(&nth(&doc, "article img", 1)).unwrap();
    assert_eq!(first.tweet_id, FIRST_TWEET);
    assert_eq!(first.username, "ferris");

    let second = resolver.resolve(&nth(&doc, "article img", 2)).unwrap();
    assert_eq!(second.tweet_id, "1790000000000000002");
    assert_eq!(second.username, "corro");

    let main = doc.select_first("main").unwrap().unwrap();
    assert!(resolver.resolve(&main).is_none());
}

#[tokio::test]
async fn dom_chain_extracts_clicked_photo() {
    let reporter = RecordingReporter::new();
    let service = dom_only_service(&reporter);
    let doc = parse(TIMELINE, TIMELINE_URL);

    let result = service
        .extract(&nth(&doc, "article img", 1), &ExtractionOptions::default())
        .await
        .unwrap();

    assert!(result.success);
    assert_eq!(result.metadata.strategy, "dom-direct");
    assert_eq!(
        result.metadata.attempted_strategies,
        vec!["dom-attributes", "dom-direct"]
    );
    assert_eq!(result.media_items.len(), 2);
    assert_eq!(result.clicked_index, 1);
    assert_eq!(
        result.media_items[1].url,
        "https://pbs.twimg.com/media/BBB222?format=jpg&name=orig"
    );
    assert_eq!(
        result.media_items[1].filename,
        format!("ferris_{FIRST_TWEET}_2.jpg")
    );
    assert_eq!(result.tweet_info.unwrap().tweet_id, FIRST_TWEET);
    assert_eq!(result.metadata.cache_hit, Some(false));
    assert_eq!(reporter.count("StrategyFailed"), 1);
    service.dispose();
}

#[tokio::test]
async fn reopen_after_rerender_hits_cache() {
    let reporter = RecordingReporter::new();
    let service = dom_only_service(&reporter);

    let timeline = parse(TIMELINE, TIMELINE_URL);
    let first = service
        .extract(&nth(&timeline, "article img", 1), &ExtractionOptions::default())
        .await
        .unwrap();
    drop(timeline);

    // Same tweet, different markup and page.
    let status = parse(
        STATUS_PAGE,
        &format!("https://x.com/ferris/status/{FIRST_TWEET}"),
    );
    let reopened = service
        .extract(&nth(&status, "img", 0), &ExtractionOptions::default())
        .await
        .unwrap();

    assert_eq!(reopened.metadata.cache_hit, Some(true));
    assert_eq!(reopened.media_items, first.media_items);
    assert_eq!(first.clicked_index, 1);
    assert_eq!(reopened.clicked_index, 0);
    assert_ne!(reopened.metadata.request_id, first.metadata.request_id);
    assert_eq!(reporter.count("CacheHit"), 1);
    assert_eq!(reporter.count("Succeeded"), 1);
    assert_eq!(service.metrics().success_result_cache_size, 1);
    service.dispose();
}

#[tokio::test]
async fn cache_hit_opens_the_photo_clicked_now() {
    let reporter = RecordingReporter::new();
    let service = dom_only_service(&reporter);
    let doc = parse(TIMELINE, TIMELINE_URL);
    let options = ExtractionOptions::default();

    let first_photo = service
        .extract(&nth(&doc, "article img", 0), &options)
        .await
        .unwrap();
    let second_photo = service
        .extract(&nth(&doc, "article img", 1), &options)
        .await
        .unwrap();

    assert_eq!(first_photo.clicked_index, 0);
    assert_eq!(second_photo.metadata.cache_hit, Some(true));
    assert_eq!(second_photo.clicked_index, 1);
    assert_eq!(reporter.count("Succeeded"), 1);

    // The photo link alone, without the image inside it.
    let link = nth(&doc, r#"a[href$="/photo/2"]"#, 0);
    let from_link = service.extract(&link, &options).await.unwrap();
    assert_eq!(from_link.metadata.cache_hit, Some(true));
    assert_eq!(from_link.clicked_index, 1);
    service.dispose();
}

#[tokio::test]
async fn other_tweet_is_a_miss() {
    let reporter = RecordingReporter::new();
    let service = dom_only_service(&reporter);
    let doc = parse(TIMELINE, TIMELINE_URL);

    service
        .extract(&nth(&doc, "article img", 0), &ExtractionOptions::default())
        .await
        .unwrap();
    let other = service
        .extract(&nth(&doc, "article img", 2), &ExtractionOptions::default())
        .await
        .unwrap();

    assert_eq!(other.metadata.cache_hit, Some(false));
    assert_eq!(other.media_items.len(), 1);
    assert_eq!(other.tweet_info.unwrap().username, "corro");
    assert_eq!(reporter.count("CacheHit"), 0);
    assert_eq!(service.metrics().success_result_cache_size, 2);
    service.dispose();
}

#[tokio::test]
async fn api_strategy_leads_the_chain() {
    let lookup = MockTweetLookup::new(vec![api_photo("AAA111"), api_photo("BBB222")]);
    let reporter = RecordingReporter::new();
    let service = api_service(&lookup, &reporter);
    let doc = parse(TIMELINE, TIMELINE_URL);

    let result = service
        .extract(&nth(&doc, "article img", 1), &ExtractionOptions::default())
        .await
        .unwrap();

    assert!(result.success);
    assert_eq!(result.metadata.strategy, "twitter-api");
    assert_eq!(result.metadata.source_type, "api");
    assert_eq!(result.clicked_index, 1);
    assert_eq!(result.media_items[0].id, format!("{FIRST_TWEET}_api_0"));
    assert_eq!(result.tweet_info.unwrap().username, "ferris");

    let calls = lookup.calls.lock().unwrap().clone();
    assert_eq!(calls, vec![(FIRST_TWEET.to_string(), Some("x.com".to_string()))]);
    service.dispose();
}

#[tokio::test]
async fn api_errors_fall_through_to_dom() {
    let lookup = MockTweetLookup::with_responses(vec![
        Err(AppError::RateLimitExceeded),
        Err(AppError::RateLimitExceeded),
    ]);
    let reporter = RecordingReporter::new();
    let service = api_service(&lookup, &reporter);
    let doc = parse(TIMELINE, TIMELINE_URL);

    let result = service
        .extract(&nth(&doc, "article img", 0), &ExtractionOptions::default())
        .await
        .unwrap();

    assert!(result.success);
    assert_eq!(result.metadata.strategy, "dom-direct");
    assert_eq!(
        result.metadata.attempted_strategies,
        vec!["twitter-api", "dom-attributes", "dom-direct"]
    );
    assert_eq!(lookup.call_count(), 2);

    let chain = result.metadata.central_metrics.unwrap().chain;
    assert_eq!(chain.strategy_retries.get("twitter-api"), Some(&1));
    assert_eq!(chain.failed_strategies[0], "twitter-api");
    service.dispose();
}

#[tokio::test]
async fn lazy_attributes_are_last_resort_and_uncached() {
    let reporter = RecordingReporter::new();
    let service = dom_only_service(&reporter);
    let doc = parse(LAZY_GALLERY, "https://example.com/gallery");
    let clicked = nth(&doc, "span.thumb", 0);

    let result = service
        .extract(&clicked, &ExtractionOptions::default())
        .await
        .unwrap();

    assert!(result.success);
    assert_eq!(result.metadata.strategy, "data-attribute-fallback");
    assert_eq!(result.media_items.len(), 2);
    assert_eq!(result.clicked_index, 0);
    assert!(result.tweet_info.is_none());

    let again = service
        .extract(&clicked, &ExtractionOptions::default())
        .await
        .unwrap();
    assert_eq!(again.metadata.cache_hit, Some(false));
    assert_eq!(service.metrics().success_result_cache_size, 0);
    service.dispose();
}

#[tokio::test]
async fn nothing_found_reports_every_attempt() {
    let reporter = RecordingReporter::new();
    let service = dom_only_service(&reporter);
    let doc = parse(
        "<html><body><p id=\"x\">no media here</p></body></html>",
        "https://example.com/",
    );

    let result = service
        .extract(&nth(&doc, "p", 0), &ExtractionOptions::default())
        .await
        .unwrap();

    assert!(!result.success);
    assert_eq!(result.metadata.attempted_strategies.len(), 4);
    assert_eq!(result.errors.len(), 4);
    assert_eq!(reporter.count("Exhausted"), 1);
    service.dispose();
}

#[test]
fn invalid_selector_is_an_error() {
    let doc = parse(TIMELINE, TIMELINE_URL);
    assert!(matches!(
        doc.select("article[["),
        Err(AppError::InvalidSelector(_))
    ));
}
