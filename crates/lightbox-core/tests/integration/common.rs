use std::sync::Arc;
use std::time::Duration;

use lightbox_core::testutil::{FakeElement, MockStrategy, StaticIdentityResolver};
use lightbox_core::{CacheConfig, ExtractionOrchestrator, SuccessResultCache};

pub fn cache_with_ttl(ttl_ms: u64) -> Arc<SuccessResultCache> {
    Arc::new(SuccessResultCache::new(CacheConfig::new(Duration::from_millis(
        ttl_ms,
    ))))
}

/// An `<img>` inside a tweet container, as a gallery click target.
pub fn tweet_media(tweet_id: &str) -> FakeElement {
    let article = FakeElement::new("article").with_attr("data-tweet-id", tweet_id);
    article.append(FakeElement::new("img").with_attr("data-tweet-id", tweet_id))
}

pub fn orchestrator_with(
    cache: Arc<SuccessResultCache>,
    strategies: &[MockStrategy],
) -> ExtractionOrchestrator<FakeElement> {
    let mut orchestrator = ExtractionOrchestrator::builder(cache)
        .identity_resolver(StaticIdentityResolver::from_attribute("data-tweet-id"))
        .build();
    for strategy in strategies {
        orchestrator.add_strategy(strategy.clone());
    }
    orchestrator
}
