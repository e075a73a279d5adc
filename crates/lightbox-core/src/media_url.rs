//! Media URL rules shared by every strategy: which URLs count as tweet
//! media, how they are upgraded to the original quality, and how items are
//! named, and which item a click lands on.

use std::sync::LazyLock;

use regex::Regex;
use url::Url;

use crate::models::{MediaInfo, MediaType, TweetInfo};
use crate::patterns::media_index;
use crate::traits::Element;

const MAX_URL_LEN: usize = 2048;
const IMAGE_HOST: &str = "pbs.twimg.com";
const VIDEO_HOST: &str = "video.twimg.com";

static EMOJI_HOST: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^abs(-\d+)?\.twimg\.com$").unwrap());
static EMOJI_PATH: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)/emoji/v\d+/(svg|\d+x\d+)/").unwrap());
static VIDEO_THUMB_PATH: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)/(amplify_video_thumb|ext_tw_video_thumb|tweet_video_thumb|ad_img/amplify_video)/",
    )
    .unwrap()
});
static DIMENSIONS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"/(\d{2,6})x(\d{2,6})(?:/|\.|$)").unwrap());
static LEGACY_SUFFIX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(/media/[^/.:]+)\.(jpg|jpeg|png|webp|gif)(?::\w+)?$").unwrap());
static BACKGROUND_URL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"url\(\s*['"]?([^'")]+)['"]?\s*\)"#).unwrap());

fn parse_http(url: &str) -> Option<Url> {
    if url.is_empty() || url.len() > MAX_URL_LEN {
        return None;
    }
    let parsed = Url::parse(url).ok()?;
    matches!(parsed.scheme(), "http" | "https").then_some(parsed)
}

/// Only tweet media on the platform CDNs is accepted. Profile pictures are not.
pub fn is_valid_media_url(url: &str) -> bool {
    let Some(parsed) = parse_http(url) else {
        return false;
    };
    match parsed.host_str() {
        Some(IMAGE_HOST) => {
            let path = parsed.path();
            let is_media = path.contains("/media/");
            let is_thumb = path.contains("/ext_tw_video_thumb/")
                || path.contains("/tweet_video_thumb/")
                || path.contains("/video_thumb/");
            (is_media || is_thumb) && !path.contains("/profile_images/")
        }
        Some(VIDEO_HOST) => true,
        _ => false,
    }
}

pub fn is_emoji_url(url: &str) -> bool {
    let Ok(parsed) = Url::parse(url) else {
        return false;
    };
    let Some(host) = parsed.host_str() else {
        return false;
    };
    EMOJI_HOST.is_match(host)
        && parsed.path().contains("/emoji/")
        && EMOJI_PATH.is_match(parsed.path())
}

pub fn is_video_thumbnail_url(url: &str) -> bool {
    let Ok(parsed) = Url::parse(url) else {
        return false;
    };
    parsed.host_str() == Some(IMAGE_HOST) && VIDEO_THUMB_PATH.is_match(parsed.path())
}

/// A URL that should become a gallery item on its own.
pub fn is_gallery_candidate(url: &str) -> bool {
    is_valid_media_url(url) && !is_emoji_url(url) && !is_video_thumbnail_url(url)
}

/// Upgrades an image URL to `name=orig`, keeping its format.
///
/// Legacy `/media/<id>.jpg` paths are rewritten to `?format=jpg&name=orig`.
/// Non-image URLs and unparsable input are returned unchanged.
pub fn to_original_image_url(url: &str) -> String {
    let Some(mut parsed) = parse_http(url) else {
        return url.to_string();
    };
    if parsed.host_str() != Some(IMAGE_HOST) || !parsed.path().contains("/media/") {
        return url.to_string();
    }

    let mut pairs: Vec<(String, String)> = parsed
        .query_pairs()
        .filter(|(k, _)| k != "name")
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();

    if let Some(caps) = LEGACY_SUFFIX.captures(parsed.path()) {
        let base = caps[1].to_string();
        let format = caps[2].to_lowercase();
        parsed.set_path(&base);
        pairs.retain(|(k, _)| k != "format");
        pairs.insert(0, ("format".to_string(), format));
    }

    pairs.push(("name".to_string(), "orig".to_string()));
    parsed.query_pairs_mut().clear().extend_pairs(pairs);
    parsed.to_string()
}

pub fn detect_media_type(url: &str) -> MediaType {
    let lower = url.to_lowercase();
    if lower.contains("tweet_video") && !lower.contains("tweet_video_thumb") {
        return MediaType::Gif;
    }
    if lower.contains(VIDEO_HOST)
        || lower.contains(".mp4")
        || lower.contains(".m3u8")
        || lower.contains(".webm")
    {
        return MediaType::Video;
    }
    MediaType::Image
}

/// File extension from the `format` query parameter or the path suffix.
pub fn extension_for(url: &str, media_type: MediaType) -> String {
    if let Ok(parsed) = Url::parse(url) {
        if let Some((_, format)) = parsed.query_pairs().find(|(k, _)| k == "format") {
            return format.to_lowercase();
        }
        if let Some(ext) = parsed
            .path()
            .rsplit('/')
            .next()
            .and_then(|segment| segment.rsplit_once('.'))
            .map(|(_, ext)| ext.split(':').next().unwrap_or(ext).to_lowercase())
            && !ext.is_empty()
            && ext.chars().all(|c| c.is_ascii_alphanumeric())
        {
            return ext;
        }
    }
    media_type.default_extension().to_string()
}

/// Last path segment without extension, used as a stable media id.
pub fn media_id_from_url(url: &str) -> Option<String> {
    let parsed = Url::parse(url).ok()?;
    let segment = parsed.path_segments()?.next_back()?;
    let id = segment.split(['.', ':']).next()?;
    (!id.is_empty()).then(|| id.to_string())
}

pub fn dimensions_from_url(url: &str) -> Option<(u32, u32)> {
    let caps = DIMENSIONS.captures(url)?;
    let width = caps[1].parse().ok()?;
    let height = caps[2].parse().ok()?;
    Some((width, height))
}

/// `{username}_{tweetId}_{index}.{ext}`, with a 1-based index.
pub fn media_filename(username: &str, tweet_id: &str, index: usize, ext: &str) -> String {
    format!("{username}_{tweet_id}_{index}.{ext}")
}

/// Largest candidate of a `srcset` attribute (by `w` or `x` descriptor).
pub fn largest_srcset_candidate(srcset: &str) -> Option<String> {
    srcset
        .split(',')
        .filter_map(|candidate| {
            let mut parts = candidate.split_whitespace();
            let url = parts.next()?;
            let weight = parts
                .next()
                .and_then(|d| d.trim_end_matches(['w', 'x']).parse::<f64>().ok())
                .unwrap_or(1.0);
            Some((url.to_string(), weight))
        })
        .max_by(|a, b| a.1.total_cmp(&b.1))
        .map(|(url, _)| url)
}

/// URL inside an inline `background-image: url(...)` declaration.
pub fn background_image_url(style: &str) -> Option<String> {
    BACKGROUND_URL
        .captures(style)
        .map(|caps| caps[1].trim().to_string())
}

/// Builds a gallery item from a raw URL found on the page.
///
/// Returns `None` when the URL is not acceptable tweet media. `index` is the
/// 0-based position the item will take in the result.
pub fn media_info_from_url(
    raw_url: &str,
    index: usize,
    tweet: Option<&TweetInfo>,
    thumbnail: Option<&str>,
) -> Option<MediaInfo> {
    if !is_gallery_candidate(raw_url) {
        return None;
    }
    let media_type = detect_media_type(raw_url);
    let url = match media_type {
        MediaType::Image => to_original_image_url(raw_url),
        MediaType::Video | MediaType::Gif => raw_url.to_string(),
    };
    let ext = extension_for(&url, media_type);
    let media_id = media_id_from_url(&url).unwrap_or_else(|| format!("media{index}"));
    let (username, tweet_id) = match tweet {
        Some(t) => (t.username.as_str(), t.tweet_id.as_str()),
        None => ("unknown", media_id.as_str()),
    };
    let filename = media_filename(username, tweet_id, index + 1, &ext);
    let dims = dimensions_from_url(raw_url);

    let mut info = MediaInfo::new(format!("{tweet_id}_{media_id}"), url, media_type)
        .with_filename(filename)
        .with_dimensions(dims.map(|d| d.0), dims.map(|d| d.1))
        .with_original_url(raw_url)
        .with_tweet(tweet);
    if let Some(thumb) = thumbnail {
        info = info.with_thumbnail(thumb);
    }
    Some(info)
}

/// How far above the clicked element a `/photo/<n>` link is looked for.
const PHOTO_LINK_LEVELS: usize = 3;

/// Source of the clicked media in original quality: the element itself when
/// it is an `<img>`/`<video>`, otherwise the first one inside it.
pub fn clicked_media_url<E: Element>(element: &E) -> Option<String> {
    let media = if matches!(element.tag_name().as_str(), "img" | "video") {
        Some(element.clone())
    } else {
        element.query("img[src], video[src]")
    };
    media
        .and_then(|m| m.attr("src"))
        .map(|src| to_original_image_url(&src))
}

/// Position of the clicked media within `items`: exact URL, then media id,
/// then a `/photo/<n>` link on the element or just above it.
pub fn clicked_media_position<E: Element>(element: &E, items: &[MediaInfo]) -> Option<usize> {
    if let Some(src) = clicked_media_url(element) {
        if let Some(i) = items.iter().position(|m| m.url == src) {
            return Some(i);
        }
        if let Some(media_id) = media_id_from_url(&src)
            && let Some(i) = items
                .iter()
                .position(|m| media_id_from_url(&m.url).as_deref() == Some(media_id.as_str()))
        {
            return Some(i);
        }
    }

    std::iter::once(element.clone())
        .chain(element.ancestors(PHOTO_LINK_LEVELS))
        .filter_map(|node| node.attr("href"))
        .find_map(|href| media_index(&href))
        .filter(|&i| i < items.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::FakeElement;

    #[test]
    fn test_valid_media_urls() {
        assert!(is_valid_media_url(
            "https://pbs.twimg.com/media/GX1abc?format=jpg&name=small"
        ));
        assert!(is_valid_media_url(
            "https://video.twimg.com/ext_tw_video/1/pu/vid/720x1280/a.mp4"
        ));
        assert!(is_valid_media_url(
            "https://pbs.twimg.com/ext_tw_video_thumb/1/pu/img/a.jpg"
        ));
        assert!(!is_valid_media_url(
            "https://pbs.twimg.com/profile_images/1/me_normal.jpg"
        ));
        assert!(!is_valid_media_url("https://evil.com/media/x.jpg"));
        assert!(!is_valid_media_url("ftp://pbs.twimg.com/media/x.jpg"));
        assert!(!is_valid_media_url("blob:https://x.com/1234"));
        assert!(!is_valid_media_url(""));
    }

    #[test]
    fn test_emoji_detection() {
        assert!(is_emoji_url("https://abs.twimg.com/emoji/v2/svg/1f600.svg"));
        assert!(is_emoji_url("https://abs-0.twimg.com/emoji/v1/72x72/1f44d.png"));
        assert!(!is_emoji_url("https://pbs.twimg.com/media/ABC?format=jpg"));
        assert!(!is_emoji_url("https://abs.twimg.com/responsive-web/logo.png"));
    }

    #[test]
    fn test_video_thumbnail_detection() {
        assert!(is_video_thumbnail_url(
            "https://pbs.twimg.com/amplify_video_thumb/193/img/abc.jpg"
        ));
        assert!(is_video_thumbnail_url(
            "https://pbs.twimg.com/tweet_video_thumb/abc.jpg"
        ));
        assert!(!is_video_thumbnail_url("https://pbs.twimg.com/media/ABC?format=jpg"));
        assert!(!is_gallery_candidate(
            "https://pbs.twimg.com/ext_tw_video_thumb/1/pu/img/a.jpg"
        ));
    }

    #[test]
    fn test_original_image_url() {
        assert_eq!(
            to_original_image_url("https://pbs.twimg.com/media/ABC123?format=jpg&name=small"),
            "https://pbs.twimg.com/media/ABC123?format=jpg&name=orig"
        );
        assert_eq!(
            to_original_image_url("https://pbs.twimg.com/media/ABC123?format=webp&name=orig"),
            "https://pbs.twimg.com/media/ABC123?format=webp&name=orig"
        );
        assert_eq!(
            to_original_image_url("https://pbs.twimg.com/media/ABC123.png:large"),
            "https://pbs.twimg.com/media/ABC123?format=png&name=orig"
        );
        assert_eq!(
            to_original_image_url("https://pbs.twimg.com/media/ABC123"),
            "https://pbs.twimg.com/media/ABC123?name=orig"
        );
        let video = "https://video.twimg.com/ext_tw_video/1/pu/vid/a.mp4";
        assert_eq!(to_original_image_url(video), video);
    }

    #[test]
    fn test_media_type_detection() {
        assert_eq!(
            detect_media_type("https://video.twimg.com/tweet_video/abc.mp4"),
            MediaType::Gif
        );
        assert_eq!(
            detect_media_type("https://video.twimg.com/ext_tw_video/1/pu/vid/a.mp4"),
            MediaType::Video
        );
        assert_eq!(
            detect_media_type("https://pbs.twimg.com/media/ABC?format=png"),
            MediaType::Image
        );
    }

    #[test]
    fn test_extension_and_id() {
        let url = "https://pbs.twimg.com/media/ABC123?format=png&name=orig";
        assert_eq!(extension_for(url, MediaType::Image), "png");
        assert_eq!(media_id_from_url(url).as_deref(), Some("ABC123"));
        assert_eq!(
            extension_for("https://video.twimg.com/a/b/clip.mp4?tag=12", MediaType::Video),
            "mp4"
        );
        assert_eq!(
            extension_for("https://pbs.twimg.com/media/ABC123", MediaType::Image),
            "jpg"
        );
    }

    #[test]
    fn test_dimensions_from_url() {
        assert_eq!(
            dimensions_from_url("https://video.twimg.com/ext_tw_video/1/pu/vid/720x1280/a.mp4"),
            Some((720, 1280))
        );
        assert_eq!(dimensions_from_url("https://pbs.twimg.com/media/ABC"), None);
    }

    #[test]
    fn test_srcset_and_background() {
        let srcset = "https://pbs.twimg.com/media/A?name=small 340w, https://pbs.twimg.com/media/A?name=large 1200w";
        assert_eq!(
            largest_srcset_candidate(srcset).as_deref(),
            Some("https://pbs.twimg.com/media/A?name=large")
        );
        assert_eq!(
            background_image_url(r#"background-image: url("https://pbs.twimg.com/media/B?format=jpg");"#)
                .as_deref(),
            Some("https://pbs.twimg.com/media/B?format=jpg")
        );
        assert_eq!(background_image_url("color: red"), None);
    }

    #[test]
    fn test_media_info_from_url_names_file() {
        let tweet = TweetInfo::new("42", "rustlang", "test", 0.9);
        let info = media_info_from_url(
            "https://pbs.twimg.com/media/ABC?format=jpg&name=small",
            1,
            Some(&tweet),
            None,
        )
        .unwrap();
        assert_eq!(info.url, "https://pbs.twimg.com/media/ABC?format=jpg&name=orig");
        assert_eq!(info.filename, "rustlang_42_2.jpg");
        assert_eq!(info.id, "42_ABC");
        assert_eq!(info.tweet_id.as_deref(), Some("42"));

        assert!(
            media_info_from_url("https://pbs.twimg.com/profile_images/1/a.jpg", 0, None, None)
                .is_none()
        );
    }

    #[test]
    fn test_clicked_media_position() {
        let items: Vec<MediaInfo> = ["AAA", "BBB", "CCC"]
            .into_iter()
            .map(|id| {
                MediaInfo::new(
                    id,
                    format!("https://pbs.twimg.com/media/{id}?format=jpg&name=orig"),
                    MediaType::Image,
                )
            })
            .collect();

        let exact = FakeElement::new("img")
            .with_attr("src", "https://pbs.twimg.com/media/BBB?format=jpg&name=small");
        assert_eq!(clicked_media_position(&exact, &items), Some(1));

        let wrapper = FakeElement::new("div");
        wrapper.append(
            FakeElement::new("img").with_attr("src", "https://pbs.twimg.com/media/CCC?format=png"),
        );
        assert_eq!(clicked_media_position(&wrapper, &items), Some(2));

        let link = FakeElement::new("a").with_attr("href", "/ferris/status/1/photo/2");
        let overlay = link.append(FakeElement::new("div"));
        assert_eq!(clicked_media_position(&overlay, &items), Some(1));

        let out_of_range = FakeElement::new("a").with_attr("href", "/ferris/status/1/photo/9");
        assert_eq!(clicked_media_position(&out_of_range, &items), None);
        assert_eq!(clicked_media_position(&FakeElement::new("span"), &items), None);
    }
}
