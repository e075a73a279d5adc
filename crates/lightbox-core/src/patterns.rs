//! Tweet URL parsing: status ids, photo indices and usernames.

use std::sync::LazyLock;

use regex::Regex;
use url::Url;

static STATUS_ID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"/status(?:es)?/(\d+)").unwrap());
static STATUS_PATH: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^/([A-Za-z0-9_]{1,15})/status(?:es)?/\d+").unwrap());
static MEDIA_INDEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"/(?:photo|video)/(\d+)").unwrap());
static ARIA_ID: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"id__(\d+)").unwrap());
static USERNAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_]{1,15}$").unwrap());

/// First path segments that are site routes rather than accounts.
const RESERVED_PATHS: &[&str] = &[
    "i",
    "home",
    "explore",
    "notifications",
    "messages",
    "bookmarks",
    "lists",
    "profile",
    "more",
    "compose",
    "search",
    "settings",
    "help",
    "display",
    "moments",
    "topics",
    "login",
    "logout",
    "signup",
    "account",
    "privacy",
    "tos",
    "hashtag",
    "intent",
    "share",
];

pub const UNKNOWN_USERNAME: &str = "unknown";

/// Hosts that serve tweet pages.
pub const TWEET_HOSTS: &[&str] = &["x.com", "twitter.com"];

/// Tweet id from a `/status/<id>` URL or path.
pub fn status_id(url: &str) -> Option<String> {
    STATUS_ID.captures(url).map(|caps| caps[1].to_string())
}

/// 0-based media index from a `/photo/<n>` or `/video/<n>` URL.
pub fn media_index(url: &str) -> Option<usize> {
    let n: usize = MEDIA_INDEX.captures(url)?[1].parse().ok()?;
    n.checked_sub(1)
}

/// Tweet id encoded in an `aria-labelledby` list (`id__<digits>`).
pub fn aria_tweet_id(labelledby: &str) -> Option<String> {
    labelledby
        .split_whitespace()
        .find_map(|token| ARIA_ID.captures(token).map(|caps| caps[1].to_string()))
}

pub fn is_valid_username(name: &str) -> bool {
    !RESERVED_PATHS.contains(&name.to_lowercase().as_str()) && USERNAME.is_match(name)
}

fn path_of(href: &str) -> String {
    if href.starts_with('/') {
        return href.split(['?', '#']).next().unwrap_or(href).to_string();
    }
    Url::parse(href)
        .map(|u| u.path().to_string())
        .unwrap_or_default()
}

/// Username from a `/<user>/status/<id>` link.
pub fn username_from_status_url(href: &str) -> Option<String> {
    let path = path_of(href);
    let name = STATUS_PATH.captures(&path)?[1].to_string();
    is_valid_username(&name).then_some(name)
}

/// Username from a bare profile link (`/<user>`).
pub fn username_from_profile_url(href: &str) -> Option<String> {
    let path = path_of(href);
    let mut segments = path.trim_matches('/').split('/');
    let first = segments.next()?;
    if segments.next().is_some() {
        return None;
    }
    is_valid_username(first).then(|| first.to_string())
}

/// Host with `www.`/`mobile.` stripped, when it serves tweets.
pub fn tweet_host(url: &str) -> Option<String> {
    let parsed = Url::parse(url).ok()?;
    let host = parsed.host_str()?;
    let host = host
        .strip_prefix("www.")
        .or_else(|| host.strip_prefix("mobile."))
        .unwrap_or(host);
    TWEET_HOSTS.contains(&host).then(|| host.to_string())
}
