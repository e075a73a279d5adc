use async_trait::async_trait;
use lightbox_core::error::AppError;
use lightbox_core::models::{ExtractionOptions, MediaExtractionResult};
use lightbox_core::traits::{Element, ExtractionStrategy};

use super::{DOM_SOURCE, ScanDepth, attribute_tweet, scan_media};
use crate::identity::{DEFAULT_MAX_LEVELS, DomIdentityResolver, tweet_container};

const NAME: &str = "dom-direct";
const CONFIDENCE: f64 = 0.7;

/// Scans the clicked tweet (or the element itself) for every kind of media
/// markup. Identity is attached when it resolves but is not required.
#[derive(Debug, Clone, Default)]
pub struct DomMediaStrategy {
    resolver: DomIdentityResolver,
}

impl DomMediaStrategy {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl<E: Element> ExtractionStrategy<E> for DomMediaStrategy {
    fn name(&self) -> &str {
        NAME
    }

    fn priority(&self) -> i32 {
        2
    }

    async fn extract(
        &self,
        element: &E,
        _options: &ExtractionOptions,
        _request_id: &str,
    ) -> Result<MediaExtractionResult, AppError> {
        let tweet = attribute_tweet(self.resolver.resolve_tweet(element), NAME, CONFIDENCE);
        let scope = tweet_container(element, DEFAULT_MAX_LEVELS)
            .or_else(|| element.parent())
            .unwrap_or_else(|| element.clone());

        let scan = scan_media(&scope, tweet.as_ref(), ScanDepth::Full);
        if scan.is_empty() {
            return Ok(
                MediaExtractionResult::failure(DOM_SOURCE, NAME, "no media elements found")
                    .with_tweet_info(tweet),
            );
        }
        Ok(scan.into_result(element, NAME, tweet))
    }
}
