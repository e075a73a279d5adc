//! Cheap tweet identity lookup from the DOM around a clicked element.
//!
//! Used as the orchestrator's pre-pass (to key the success cache) and by
//! the DOM strategies themselves.

use lightbox_core::models::{TweetInfo, is_valid_tweet_id};
use lightbox_core::patterns::{
    UNKNOWN_USERNAME, aria_tweet_id, status_id, username_from_profile_url,
    username_from_status_url,
};
use lightbox_core::traits::{Element, IdentityResolver};

/// Tweet containers on timeline and status pages.
pub const TWEET_CONTAINER: &str = r#"article, [data-testid="tweet"]"#;

/// How far up the tree identity and containers are looked for.
pub const DEFAULT_MAX_LEVELS: usize = 10;

const DATA_ATTRIBUTES: &[&str] = &[
    "data-tweet-id",
    "data-item-id",
    "data-key",
    "data-testid",
    "data-focusable",
];

const STATUS_LINKS: &str = r#"a[href*="/status/"]"#;
const USER_NAME_LINKS: &str = r#"[data-testid="User-Name"] a[href]"#;

/// How an identity was found, with the confidence each source earns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdentitySource {
    DataAttribute,
    AriaLabel,
    Href,
    AncestorContainer,
    PageUrl,
}

impl IdentitySource {
    pub fn method(&self) -> &'static str {
        match self {
            IdentitySource::DataAttribute => "data-attribute",
            IdentitySource::AriaLabel => "aria-labelledby",
            IdentitySource::Href => "href",
            IdentitySource::AncestorContainer => "ancestor-container",
            IdentitySource::PageUrl => "page-url",
        }
    }

    pub fn confidence(&self) -> f64 {
        match self {
            IdentitySource::DataAttribute => 0.95,
            IdentitySource::AriaLabel => 0.9,
            IdentitySource::Href => 0.85,
            IdentitySource::AncestorContainer => 0.8,
            IdentitySource::PageUrl => 0.6,
        }
    }
}

/// Nearest tweet container at most `max_levels` above `element`.
pub fn tweet_container<E: Element>(element: &E, max_levels: usize) -> Option<E> {
    let container = element.closest(TWEET_CONTAINER)?;
    if container.is_same_node(element)
        || element
            .ancestors(max_levels)
            .iter()
            .any(|a| a.is_same_node(&container))
    {
        Some(container)
    } else {
        None
    }
}

/// Resolves tweet identity from attributes, links and the page URL.
#[derive(Debug, Clone)]
pub struct DomIdentityResolver {
    max_levels: usize,
}

impl Default for DomIdentityResolver {
    fn default() -> Self {
        Self {
            max_levels: DEFAULT_MAX_LEVELS,
        }
    }
}

impl DomIdentityResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_levels(mut self, max_levels: usize) -> Self {
        self.max_levels = max_levels;
        self
    }

    /// Tweet id and where it came from, first numeric id wins.
    pub fn find_tweet_id<E: Element>(&self, element: &E) -> Option<(String, IdentitySource)> {
        if let Some(id) = id_from_data_attributes(element) {
            return Some((id, IdentitySource::DataAttribute));
        }
        if let Some(id) = element
            .attr("aria-labelledby")
            .and_then(|v| aria_tweet_id(&v))
        {
            return Some((id, IdentitySource::AriaLabel));
        }
        if let Some(id) = element.attr("href").and_then(|v| status_id(&v)) {
            return Some((id, IdentitySource::Href));
        }
        if let Some(id) =
            tweet_container(element, self.max_levels).and_then(|c| id_from_container(&c))
        {
            return Some((id, IdentitySource::AncestorContainer));
        }
        element
            .page_url()
            .and_then(|url| status_id(&url))
            .map(|id| (id, IdentitySource::PageUrl))
    }

    pub fn resolve_tweet<E: Element>(&self, element: &E) -> Option<TweetInfo> {
        let (tweet_id, source) = self.find_tweet_id(element)?;
        let username = self.find_username(element, &tweet_id);
        Some(TweetInfo::new(
            tweet_id,
            username,
            source.method(),
            source.confidence(),
        ))
    }

    /// Account that posted `tweet_id`, or `unknown`.
    pub fn find_username<E: Element>(&self, element: &E, tweet_id: &str) -> String {
        let scope = tweet_container(element, self.max_levels).unwrap_or_else(|| element.clone());

        let from_user_name = scope
            .query_all(USER_NAME_LINKS)
            .iter()
            .filter_map(|a| a.attr("href"))
            .find_map(|href| username_from_profile_url(&href));

        let from_status_link = || {
            std::iter::once(element.clone())
                .chain(element.ancestors(self.max_levels))
                .chain(scope.query_all(STATUS_LINKS))
                .filter_map(|a| a.attr("href"))
                .filter(|href| status_id(href).as_deref() == Some(tweet_id))
                .find_map(|href| username_from_status_url(&href))
        };

        let from_profile_link = || {
            scope
                .query_all(r#"a[href^="/"]"#)
                .iter()
                .filter_map(|a| a.attr("href"))
                .find_map(|href| username_from_profile_url(&href))
        };

        let from_page_url = || {
            element
                .page_url()
                .and_then(|url| username_from_status_url(&url))
        };

        from_user_name
            .or_else(from_status_link)
            .or_else(from_profile_link)
            .or_else(from_page_url)
            .unwrap_or_else(|| UNKNOWN_USERNAME.to_string())
    }
}

impl<E: Element> IdentityResolver<E> for DomIdentityResolver {
    fn resolve(&self, element: &E) -> Option<TweetInfo> {
        self.resolve_tweet(element)
    }
}

fn id_from_data_attributes<E: Element>(element: &E) -> Option<String> {
    DATA_ATTRIBUTES
        .iter()
        .filter_map(|name| element.attr(name))
        .find(|value| is_valid_tweet_id(value))
}

/// Permalink of the container: links wrapping `<time>` first, then any status link.
fn id_from_container<E: Element>(container: &E) -> Option<String> {
    let links = container.query_all(STATUS_LINKS);
    let permalink = links
        .iter()
        .filter(|a| a.query("time").is_some())
        .find_map(|a| a.attr("href").and_then(|href| status_id(&href)));
    permalink.or_else(|| {
        links
            .iter()
            .find_map(|a| a.attr("href").and_then(|href| status_id(&href)))
    })
}
