use async_trait::async_trait;
use lightbox_core::error::AppError;
use lightbox_core::models::{ExtractionOptions, MediaExtractionResult, TweetInfo, is_valid_tweet_id};
use lightbox_core::traits::{Element, ExtractionStrategy};
use tracing::debug;

use super::{DOM_SOURCE, ScanDepth, scan_media};
use crate::identity::{DEFAULT_MAX_LEVELS, DomIdentityResolver, tweet_container};

const NAME: &str = "dom-attributes";
const CONFIDENCE: f64 = 0.85;
const ID_ATTRIBUTES: &[&str] = &["data-tweet-id", "data-item-id", "data-key"];

/// Tweet id from data attributes on the element or its ancestors, media
/// from the surrounding tweet.
#[derive(Debug, Clone)]
pub struct DomAttributesStrategy {
    max_levels: usize,
    resolver: DomIdentityResolver,
}

impl Default for DomAttributesStrategy {
    fn default() -> Self {
        Self::new()
    }
}

impl DomAttributesStrategy {
    pub fn new() -> Self {
        Self::with_max_levels(DEFAULT_MAX_LEVELS)
    }

    pub fn with_max_levels(max_levels: usize) -> Self {
        Self {
            max_levels,
            resolver: DomIdentityResolver::new().with_max_levels(max_levels),
        }
    }

    /// The id and the element that carries it.
    fn find_id<E: Element>(&self, element: &E) -> Option<(String, E)> {
        std::iter::once(element.clone())
            .chain(element.ancestors(self.max_levels))
            .find_map(|node| {
                ID_ATTRIBUTES
                    .iter()
                    .filter_map(|name| node.attr(name))
                    .find(|value| is_valid_tweet_id(value))
                    .map(|id| (id, node))
            })
    }
}

#[async_trait]
impl<E: Element> ExtractionStrategy<E> for DomAttributesStrategy {
    fn name(&self) -> &str {
        NAME
    }

    fn priority(&self) -> i32 {
        1
    }

    async fn extract(
        &self,
        element: &E,
        _options: &ExtractionOptions,
        request_id: &str,
    ) -> Result<MediaExtractionResult, AppError> {
        let Some((tweet_id, carrier)) = self.find_id(element) else {
            return Ok(MediaExtractionResult::failure(
                DOM_SOURCE,
                NAME,
                "no tweet id in data attributes",
            ));
        };

        let username = self.resolver.find_username(element, &tweet_id);
        let tweet = TweetInfo::new(tweet_id, username, NAME, CONFIDENCE);

        let scope = tweet_container(element, self.max_levels).unwrap_or(carrier);
        let scan = scan_media(&scope, Some(&tweet), ScanDepth::Basic);
        if scan.is_empty() {
            debug!(request_id, tweet_id = %tweet.tweet_id, "No media around data attributes");
            return Ok(MediaExtractionResult::failure(
                DOM_SOURCE,
                NAME,
                "no media in tweet container",
            )
            .with_tweet_info(Some(tweet)));
        }

        Ok(scan.into_result(element, NAME, Some(tweet)))
    }
}
