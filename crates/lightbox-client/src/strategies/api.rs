use async_trait::async_trait;
use lightbox_core::error::AppError;
use lightbox_core::media_url::{clicked_media_position, extension_for, media_filename};
use lightbox_core::models::{
    ApiMedia, ExtractionOptions, MediaExtractionResult, MediaInfo, TweetInfo,
};
use lightbox_core::patterns::{UNKNOWN_USERNAME, tweet_host};
use lightbox_core::traits::{Element, ExtractionStrategy, TweetLookup};
use tracing::debug;

use super::{ScanDepth, scan_media};
use crate::identity::{DEFAULT_MAX_LEVELS, DomIdentityResolver, tweet_container};

const NAME: &str = "twitter-api";
const CONFIDENCE: f64 = 0.95;

/// `source_type` of results built from the tweet lookup API.
pub const API_SOURCE: &str = "api";

/// Resolves the tweet from the DOM, then asks the platform API for its media.
pub struct ApiStrategy<L> {
    lookup: L,
    resolver: DomIdentityResolver,
}

impl<L: TweetLookup> ApiStrategy<L> {
    pub fn new(lookup: L) -> Self {
        Self {
            lookup,
            resolver: DomIdentityResolver::new(),
        }
    }

    pub fn lookup(&self) -> &L {
        &self.lookup
    }
}

fn to_media_info(tweet: &TweetInfo, index: usize, media: ApiMedia) -> MediaInfo {
    let ext = extension_for(&media.url, media.media_type);
    let filename = media_filename(&tweet.username, &tweet.tweet_id, index + 1, &ext);
    let mut info = MediaInfo::new(
        format!("{}_api_{index}", tweet.tweet_id),
        media.url,
        media.media_type,
    )
    .with_filename(filename)
    .with_dimensions(media.width, media.height)
    .with_original_url(media.original_url)
    .with_tweet(Some(tweet));
    if let Some(thumb) = media.thumbnail_url {
        info = info.with_thumbnail(thumb);
    }
    if let Some(alt) = media.alt {
        info = info.with_alt(alt);
    }
    info
}

/// Exact URL, media file name or photo link, then DOM order within the tweet.
fn resolve_clicked_index<E: Element>(element: &E, items: &[MediaInfo]) -> usize {
    clicked_media_position(element, items)
        .or_else(|| {
            tweet_container(element, DEFAULT_MAX_LEVELS).and_then(|container| {
                scan_media(&container, None, ScanDepth::Basic).clicked_index(element)
            })
        })
        .unwrap_or(0)
}

#[async_trait]
impl<E, L> ExtractionStrategy<E> for ApiStrategy<L>
where
    E: Element,
    L: TweetLookup,
{
    fn name(&self) -> &str {
        NAME
    }

    fn priority(&self) -> i32 {
        0
    }

    fn can_handle(&self, element: &E) -> bool {
        self.resolver.find_tweet_id(element).is_some()
    }

    async fn extract(
        &self,
        element: &E,
        options: &ExtractionOptions,
        request_id: &str,
    ) -> Result<MediaExtractionResult, AppError> {
        let Some(resolved) = self.resolver.resolve_tweet(element) else {
            return Ok(MediaExtractionResult::failure(
                API_SOURCE,
                NAME,
                "tweet id not resolvable",
            ));
        };

        let host = element.page_url().and_then(|url| tweet_host(&url));
        let media = self
            .lookup
            .tweet_media(&resolved.tweet_id, host.as_deref(), options)
            .await?;

        let username = if resolved.username == UNKNOWN_USERNAME {
            media
                .iter()
                .find(|m| !m.from_quoted)
                .and_then(|m| m.screen_name.clone())
                .unwrap_or(resolved.username)
        } else {
            resolved.username
        };
        let tweet = TweetInfo::new(resolved.tweet_id, username, NAME, CONFIDENCE);

        if media.is_empty() {
            debug!(request_id, tweet_id = %tweet.tweet_id, "Tweet lookup returned no media");
            return Ok(
                MediaExtractionResult::failure(API_SOURCE, NAME, "tweet has no media")
                    .with_tweet_info(Some(tweet)),
            );
        }

        let items: Vec<MediaInfo> = media
            .into_iter()
            .enumerate()
            .map(|(i, m)| to_media_info(&tweet, i, m))
            .collect();
        let clicked_index = resolve_clicked_index(element, &items);

        Ok(MediaExtractionResult::success(
            items,
            clicked_index,
            API_SOURCE,
            NAME,
            Some(tweet),
        ))
    }
}
