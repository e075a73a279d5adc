use std::sync::Arc;

use async_trait::async_trait;

use crate::error::AppError;
use crate::models::{ApiMedia, ExtractionOptions, MediaExtractionResult, TweetInfo};

/// Minimal read-only view of a DOM node.
///
/// Strategies only ever navigate and read attributes, so anything that can
/// answer these questions (a parsed HTML snapshot, a test double) can be
/// extracted from. Invalid selectors match nothing.
pub trait Element: Clone + Send + Sync + 'static {
    /// Lowercase tag name.
    fn tag_name(&self) -> String;

    fn attr(&self, name: &str) -> Option<String>;

    fn parent(&self) -> Option<Self>;

    /// Nearest ancestor matching `selector`, starting with the element itself.
    fn closest(&self, selector: &str) -> Option<Self>;

    /// Descendants matching `selector`, in document order. Never includes `self`.
    fn query_all(&self, selector: &str) -> Vec<Self>;

    fn query(&self, selector: &str) -> Option<Self> {
        self.query_all(selector).into_iter().next()
    }

    fn is_same_node(&self, other: &Self) -> bool;

    /// Location of the document the element belongs to.
    fn page_url(&self) -> Option<String>;

    /// True if `other` is `self` or one of its descendants.
    fn contains(&self, other: &Self) -> bool {
        let mut current = Some(other.clone());
        while let Some(node) = current {
            if node.is_same_node(self) {
                return true;
            }
            current = node.parent();
        }
        false
    }

    /// Up to `max_levels` ancestors, nearest first.
    fn ancestors(&self, max_levels: usize) -> Vec<Self> {
        let mut out = Vec::new();
        let mut current = self.parent();
        while let Some(node) = current {
            if out.len() >= max_levels {
                break;
            }
            current = node.parent();
            out.push(node);
        }
        out
    }

    /// Topmost ancestor, or the element itself when detached.
    fn root(&self) -> Self {
        let mut node = self.clone();
        while let Some(parent) = node.parent() {
            node = parent;
        }
        node
    }
}

/// Result of one strategy invocation as seen by the chain.
#[derive(Debug)]
pub struct StrategyReport {
    pub outcome: Result<MediaExtractionResult, AppError>,
    /// Retries consumed. `None` when the strategy is not configured to retry.
    pub retries: Option<u32>,
}

/// One self-contained technique for turning a clicked element into media.
///
/// Expected failures (nothing found, malformed attributes) come back as
/// `Ok` with `success: false`. `Err` is reserved for unexpected faults;
/// the chain treats both the same way and moves on.
#[async_trait]
pub trait ExtractionStrategy<E: Element>: Send + Sync {
    fn name(&self) -> &str;

    fn priority(&self) -> i32;

    /// Cheap pre-check. Strategies that return false are not attempted.
    fn can_handle(&self, _element: &E) -> bool {
        true
    }

    async fn extract(
        &self,
        element: &E,
        options: &ExtractionOptions,
        request_id: &str,
    ) -> Result<MediaExtractionResult, AppError>;

    /// Runs `extract` and reports how many retries it took.
    async fn extract_with_report(
        &self,
        element: &E,
        options: &ExtractionOptions,
        request_id: &str,
    ) -> StrategyReport {
        StrategyReport {
            outcome: self.extract(element, options, request_id).await,
            retries: None,
        }
    }
}

#[async_trait]
impl<E, S> ExtractionStrategy<E> for Arc<S>
where
    E: Element,
    S: ExtractionStrategy<E> + ?Sized,
{
    fn name(&self) -> &str {
        (**self).name()
    }

    fn priority(&self) -> i32 {
        (**self).priority()
    }

    fn can_handle(&self, element: &E) -> bool {
        (**self).can_handle(element)
    }

    async fn extract(
        &self,
        element: &E,
        options: &ExtractionOptions,
        request_id: &str,
    ) -> Result<MediaExtractionResult, AppError> {
        (**self).extract(element, options, request_id).await
    }

    async fn extract_with_report(
        &self,
        element: &E,
        options: &ExtractionOptions,
        request_id: &str,
    ) -> StrategyReport {
        (**self).extract_with_report(element, options, request_id).await
    }
}

/// Cheap identity pre-pass used to derive the cache key before any strategy runs.
pub trait IdentityResolver<E: Element>: Send + Sync {
    fn resolve(&self, element: &E) -> Option<TweetInfo>;
}

/// Looks up the media attached to a tweet through the platform API.
#[async_trait]
pub trait TweetLookup: Send + Sync {
    /// `host_hint` is the host of the page the element came from, if any.
    async fn tweet_media(
        &self,
        tweet_id: &str,
        host_hint: Option<&str>,
        options: &ExtractionOptions,
    ) -> Result<Vec<ApiMedia>, AppError>;
}

#[async_trait]
impl<T: TweetLookup + ?Sized> TweetLookup for Arc<T> {
    async fn tweet_media(
        &self,
        tweet_id: &str,
        host_hint: Option<&str>,
        options: &ExtractionOptions,
    ) -> Result<Vec<ApiMedia>, AppError> {
        (**self).tweet_media(tweet_id, host_hint, options).await
    }
}
