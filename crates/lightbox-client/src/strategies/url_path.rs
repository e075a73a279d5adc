use async_trait::async_trait;
use lightbox_core::error::AppError;
use lightbox_core::media_url::{is_gallery_candidate, media_info_from_url};
use lightbox_core::models::{ExtractionOptions, MediaExtractionResult, MediaInfo, TweetInfo};
use lightbox_core::patterns::{media_index, status_id};
use lightbox_core::traits::{Element, ExtractionStrategy};

use super::DOM_SOURCE;
use crate::identity::{DEFAULT_MAX_LEVELS, DomIdentityResolver};

const NAME: &str = "url-parsing";
const CONFIDENCE: f64 = 0.6;

/// Reads identity and media straight out of URLs: `href`/`src` on the
/// element and its ancestors, then the page location.
#[derive(Debug, Clone)]
pub struct UrlPathStrategy {
    max_levels: usize,
    resolver: DomIdentityResolver,
}

impl Default for UrlPathStrategy {
    fn default() -> Self {
        Self {
            max_levels: DEFAULT_MAX_LEVELS,
            resolver: DomIdentityResolver::new(),
        }
    }
}

impl UrlPathStrategy {
    pub fn new() -> Self {
        Self::default()
    }

    fn candidate_urls<E: Element>(&self, element: &E) -> Vec<String> {
        let mut urls: Vec<String> = std::iter::once(element.clone())
            .chain(element.ancestors(self.max_levels))
            .flat_map(|node| [node.attr("href"), node.attr("src")])
            .flatten()
            .collect();
        urls.extend(element.page_url());
        urls
    }
}

#[async_trait]
impl<E: Element> ExtractionStrategy<E> for UrlPathStrategy {
    fn name(&self) -> &str {
        NAME
    }

    fn priority(&self) -> i32 {
        3
    }

    async fn extract(
        &self,
        element: &E,
        _options: &ExtractionOptions,
        _request_id: &str,
    ) -> Result<MediaExtractionResult, AppError> {
        let urls = self.candidate_urls(element);

        let status_url = urls.iter().find(|url| status_id(url).is_some());
        let tweet = status_url.and_then(|url| {
            let tweet_id = status_id(url)?;
            let username = self.resolver.find_username(element, &tweet_id);
            Some(TweetInfo::new(tweet_id, username, NAME, CONFIDENCE))
        });
        let clicked_index = status_url.and_then(|url| media_index(url)).unwrap_or(0);

        let mut items: Vec<MediaInfo> = Vec::new();
        for url in urls.iter().filter(|url| is_gallery_candidate(url)) {
            if let Some(info) = media_info_from_url(url, items.len(), tweet.as_ref(), None)
                && !items.iter().any(|m| m.url == info.url)
            {
                items.push(info);
            }
        }

        if items.is_empty() {
            return Ok(
                MediaExtractionResult::failure(DOM_SOURCE, NAME, "no media URL on element or page")
                    .with_tweet_info(tweet),
            );
        }
        Ok(MediaExtractionResult::success(
            items,
            clicked_index,
            DOM_SOURCE,
            NAME,
            tweet,
        ))
    }
}
