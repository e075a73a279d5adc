use async_trait::async_trait;
use lightbox_core::error::AppError;
use lightbox_core::media_url::background_image_url;
use lightbox_core::models::{ExtractionOptions, MediaExtractionResult};
use lightbox_core::traits::{Element, ExtractionStrategy};

use super::{DOM_SOURCE, MediaScan, attribute_tweet, self_and_descendants};
use crate::identity::DomIdentityResolver;

const NAME: &str = "data-attribute-fallback";
const CONFIDENCE: f64 = 0.4;
const URL_ATTRIBUTES: &[&str] = &[
    "data-src",
    "data-background-image",
    "data-url",
    "data-image-url",
];
const SELECTOR: &str = "[data-src], [data-background-image], [data-url], [data-image-url]";

/// Last resort: lazy-loading and custom data attributes anywhere in the
/// document.
#[derive(Debug, Clone, Default)]
pub struct DataAttributeFallbackStrategy {
    resolver: DomIdentityResolver,
}

impl DataAttributeFallbackStrategy {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl<E: Element> ExtractionStrategy<E> for DataAttributeFallbackStrategy {
    fn name(&self) -> &str {
        NAME
    }

    fn priority(&self) -> i32 {
        4
    }

    async fn extract(
        &self,
        element: &E,
        _options: &ExtractionOptions,
        _request_id: &str,
    ) -> Result<MediaExtractionResult, AppError> {
        let tweet = attribute_tweet(self.resolver.resolve_tweet(element), NAME, CONFIDENCE);
        let root = element.root();

        let mut scan = MediaScan::empty();
        for node in self_and_descendants(&root, SELECTOR) {
            for name in URL_ATTRIBUTES {
                let Some(value) = node.attr(name) else {
                    continue;
                };
                let url = background_image_url(&value).unwrap_or(value);
                scan.push(&node, &url, tweet.as_ref(), None);
            }
        }

        if scan.is_empty() {
            return Ok(MediaExtractionResult::failure(
                DOM_SOURCE,
                NAME,
                "no media in data attributes",
            )
            .with_tweet_info(tweet));
        }
        Ok(scan.into_result(element, NAME, tweet))
    }
}
