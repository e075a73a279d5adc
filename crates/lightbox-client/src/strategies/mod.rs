//! Concrete extraction strategies, in default chain order.

mod api;
mod data_fallback;
mod dom_attributes;
mod dom_media;
mod url_path;

pub use api::ApiStrategy;
pub use data_fallback::DataAttributeFallbackStrategy;
pub use dom_attributes::DomAttributesStrategy;
pub use dom_media::DomMediaStrategy;
pub use url_path::UrlPathStrategy;

use lightbox_core::media_url::{background_image_url, largest_srcset_candidate, media_info_from_url};
use lightbox_core::models::{MediaExtractionResult, MediaInfo, TweetInfo};
use lightbox_core::traits::Element;

/// `source_type` of every DOM-based strategy.
pub const DOM_SOURCE: &str = "dom";

/// Which media sources a scan reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ScanDepth {
    /// `img[src]` and playable `<video>` sources.
    Basic,
    /// Everything in `Basic` plus `<picture>` sources, inline background
    /// images and `data-image-url`.
    Full,
}

/// Media found under one scope, with the elements that produced each item.
#[derive(Debug)]
pub(crate) struct MediaScan<E> {
    pub items: Vec<MediaInfo>,
    owners: Vec<(E, usize)>,
}

impl<E: Element> MediaScan<E> {
    pub fn empty() -> Self {
        Self {
            items: Vec::new(),
            owners: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Item the user clicked: the element itself, an element inside it, or
    /// the element it wraps.
    pub fn clicked_index(&self, clicked: &E) -> Option<usize> {
        self.owners
            .iter()
            .find(|(owner, _)| owner.is_same_node(clicked))
            .or_else(|| self.owners.iter().find(|(owner, _)| owner.contains(clicked)))
            .or_else(|| self.owners.iter().find(|(owner, _)| clicked.contains(owner)))
            .map(|(_, index)| *index)
    }

    fn push(
        &mut self,
        owner: &E,
        raw_url: &str,
        tweet: Option<&TweetInfo>,
        thumbnail: Option<&str>,
    ) {
        let Some(mut info) = media_info_from_url(raw_url, self.items.len(), tweet, thumbnail)
        else {
            return;
        };
        if let Some(existing) = self.items.iter().position(|m| m.url == info.url) {
            self.owners.push((owner.clone(), existing));
            return;
        }
        if info.width.is_none() {
            info.width = owner.attr("width").and_then(|w| w.parse().ok());
            info.height = owner.attr("height").and_then(|h| h.parse().ok());
        }
        if let Some(alt) = owner.attr("alt").filter(|a| !a.trim().is_empty()) {
            info = info.with_alt(alt);
        }
        self.owners.push((owner.clone(), self.items.len()));
        self.items.push(info);
    }

    pub fn into_result(
        self,
        clicked: &E,
        strategy: &str,
        tweet: Option<TweetInfo>,
    ) -> MediaExtractionResult {
        let clicked_index = self.clicked_index(clicked).unwrap_or(0);
        MediaExtractionResult::success(self.items, clicked_index, DOM_SOURCE, strategy, tweet)
    }
}

/// `scope` itself (when it matches) followed by its matching descendants.
pub(crate) fn self_and_descendants<E: Element>(scope: &E, selector: &str) -> Vec<E> {
    let mut out = Vec::new();
    if scope
        .closest(selector)
        .is_some_and(|found| found.is_same_node(scope))
    {
        out.push(scope.clone());
    }
    out.extend(scope.query_all(selector));
    out
}

/// Collects gallery media under `scope` in document order per source kind.
pub(crate) fn scan_media<E: Element>(
    scope: &E,
    tweet: Option<&TweetInfo>,
    depth: ScanDepth,
) -> MediaScan<E> {
    let mut scan = MediaScan::empty();

    for img in self_and_descendants(scope, "img[src]") {
        if let Some(src) = img.attr("src") {
            scan.push(&img, &src, tweet, None);
        }
    }

    if depth == ScanDepth::Full {
        for source in self_and_descendants(scope, "picture source[srcset]") {
            if let Some(url) = source
                .attr("srcset")
                .and_then(|s| largest_srcset_candidate(&s))
            {
                let owner = source.closest("picture").unwrap_or(source);
                scan.push(&owner, &url, tweet, None);
            }
        }
    }

    for video in self_and_descendants(scope, "video") {
        let poster = video.attr("poster");
        let sources = video
            .attr("src")
            .into_iter()
            .chain(
                video
                    .query_all("source[src]")
                    .into_iter()
                    .filter_map(|s| s.attr("src")),
            );
        for src in sources {
            scan.push(&video, &src, tweet, poster.as_deref());
        }
    }

    if depth == ScanDepth::Full {
        for styled in self_and_descendants(scope, r#"[style*="background-image"]"#) {
            if let Some(url) = styled
                .attr("style")
                .and_then(|style| background_image_url(&style))
            {
                scan.push(&styled, &url, tweet, None);
            }
        }
        for tagged in self_and_descendants(scope, "[data-image-url]") {
            if let Some(url) = tagged.attr("data-image-url") {
                scan.push(&tagged, &url, tweet, None);
            }
        }
    }

    scan
}

/// Relabels a resolved identity with the strategy that used it.
pub(crate) fn attribute_tweet(
    tweet: Option<TweetInfo>,
    method: &str,
    confidence: f64,
) -> Option<TweetInfo> {
    tweet.map(|t| TweetInfo::new(t.tweet_id, t.username, method, confidence))
}
