use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Kind of media item attached to a tweet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaType {
    Image,
    Video,
    Gif,
}

impl MediaType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MediaType::Image => "image",
            MediaType::Video => "video",
            MediaType::Gif => "gif",
        }
    }

    /// File extension used when the URL does not carry one.
    pub fn default_extension(&self) -> &'static str {
        match self {
            MediaType::Image => "jpg",
            MediaType::Video | MediaType::Gif => "mp4",
        }
    }
}

impl fmt::Display for MediaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for MediaType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "image" | "photo" => Ok(MediaType::Image),
            "video" => Ok(MediaType::Video),
            "gif" | "animated_gif" => Ok(MediaType::Gif),
            _ => Err(format!("Unknown media type: {s}")),
        }
    }
}

/// A single extracted media item. Never mutated once a strategy returns it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaInfo {
    pub id: String,
    pub url: String,
    #[serde(rename = "type")]
    pub media_type: MediaType,
    pub filename: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub height: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thumbnail_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub original_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alt: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tweet_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tweet_username: Option<String>,
}

impl MediaInfo {
    pub fn new(id: impl Into<String>, url: impl Into<String>, media_type: MediaType) -> Self {
        Self {
            id: id.into(),
            url: url.into(),
            media_type,
            filename: String::new(),
            width: None,
            height: None,
            size: None,
            thumbnail_url: None,
            original_url: None,
            alt: None,
            tweet_id: None,
            tweet_username: None,
        }
    }

    pub fn with_filename(mut self, filename: impl Into<String>) -> Self {
        self.filename = filename.into();
        self
    }

    pub fn with_dimensions(mut self, width: Option<u32>, height: Option<u32>) -> Self {
        self.width = width;
        self.height = height;
        self
    }

    pub fn with_thumbnail(mut self, url: impl Into<String>) -> Self {
        self.thumbnail_url = Some(url.into());
        self
    }

    pub fn with_original_url(mut self, url: impl Into<String>) -> Self {
        self.original_url = Some(url.into());
        self
    }

    pub fn with_alt(mut self, alt: impl Into<String>) -> Self {
        self.alt = Some(alt.into());
        self
    }

    pub fn with_tweet(mut self, tweet: Option<&TweetInfo>) -> Self {
        if let Some(tweet) = tweet {
            self.tweet_id = Some(tweet.tweet_id.clone());
            self.tweet_username = Some(tweet.username.clone());
        }
        self
    }
}

/// Identity of the tweet a clicked element belongs to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TweetInfo {
    pub tweet_id: String,
    pub username: String,
    pub tweet_url: String,
    pub extraction_method: String,
    /// Heuristic score in `0.0..=1.0` assigned by whoever resolved the identity.
    pub confidence: f64,
}

impl TweetInfo {
    pub fn new(
        tweet_id: impl Into<String>,
        username: impl Into<String>,
        extraction_method: impl Into<String>,
        confidence: f64,
    ) -> Self {
        let tweet_id = tweet_id.into();
        let username = username.into();
        let tweet_url = format!("https://x.com/{username}/status/{tweet_id}");
        Self {
            tweet_id,
            username,
            tweet_url,
            extraction_method: extraction_method.into(),
            confidence: confidence.clamp(0.0, 1.0),
        }
    }

    /// A tweet id is only usable as identity when it is a non-empty run of digits.
    pub fn has_valid_id(&self) -> bool {
        is_valid_tweet_id(&self.tweet_id)
    }
}

pub fn is_valid_tweet_id(id: &str) -> bool {
    !id.is_empty() && id.bytes().all(|b| b.is_ascii_digit())
}

/// Options passed down to every strategy of a chain run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractionOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_retries: Option<u32>,
}

impl ExtractionOptions {
    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = Some(timeout_ms);
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = Some(max_retries);
        self
    }
}

/// Telemetry of one strategy-chain run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChainMetrics {
    pub attempted_strategies: Vec<String>,
    pub success_strategy: Option<String>,
    pub failed_strategies: Vec<String>,
    /// Retries consumed per strategy; only strategies configured to retry appear.
    pub strategy_retries: BTreeMap<String, u32>,
    pub chain_duration_ms: f64,
    #[serde(skip_serializing_if = "is_zero")]
    pub duplicate_skipped: u32,
}

impl ChainMetrics {
    pub fn total_tried(&self) -> usize {
        self.attempted_strategies.len()
    }
}

fn is_zero(n: &u32) -> bool {
    *n == 0
}

/// Orchestrator-lifetime metrics across calls.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregateMetrics {
    pub chain_duration_avg_ms: f64,
    pub chain_duration_max_ms: f64,
    pub success_result_cache_size: usize,
    pub success_result_cache_evictions: u64,
    pub purge_count: u64,
    pub ttl_evictions: u64,
}

/// Per-call and aggregate metrics attached to a result by the orchestrator.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CentralMetrics {
    pub chain: ChainMetrics,
    pub aggregate: AggregateMetrics,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultMetadata {
    pub extracted_at: DateTime<Utc>,
    pub source_type: String,
    pub strategy: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cache_hit: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub central_metrics: Option<CentralMetrics>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub attempted_strategies: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub success_strategy: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
}

impl ResultMetadata {
    pub fn new(source_type: impl Into<String>, strategy: impl Into<String>) -> Self {
        Self {
            extracted_at: Utc::now(),
            source_type: source_type.into(),
            strategy: strategy.into(),
            cache_hit: None,
            central_metrics: None,
            attempted_strategies: Vec::new(),
            success_strategy: None,
            request_id: None,
        }
    }
}

/// Outcome of extracting media for one clicked element.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaExtractionResult {
    pub success: bool,
    pub media_items: Vec<MediaInfo>,
    pub clicked_index: usize,
    pub metadata: ResultMetadata,
    pub tweet_info: Option<TweetInfo>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub errors: Vec<String>,
}

impl MediaExtractionResult {
    /// Successful result. The clicked index is clamped into the item range.
    pub fn success(
        media_items: Vec<MediaInfo>,
        clicked_index: usize,
        source_type: impl Into<String>,
        strategy: impl Into<String>,
        tweet_info: Option<TweetInfo>,
    ) -> Self {
        let clicked_index = clicked_index.min(media_items.len().saturating_sub(1));
        Self {
            success: true,
            media_items,
            clicked_index,
            metadata: ResultMetadata::new(source_type, strategy),
            tweet_info,
            errors: Vec::new(),
        }
    }

    pub fn failure(
        source_type: impl Into<String>,
        strategy: impl Into<String>,
        error: impl Into<String>,
    ) -> Self {
        Self {
            success: false,
            media_items: Vec::new(),
            clicked_index: 0,
            metadata: ResultMetadata::new(source_type, strategy),
            tweet_info: None,
            errors: vec![error.into()],
        }
    }

    pub fn with_tweet_info(mut self, tweet_info: Option<TweetInfo>) -> Self {
        self.tweet_info = tweet_info;
        self
    }

    /// Tweet id this result can be cached under, if any.
    pub fn cache_key(&self) -> Option<&str> {
        self.tweet_info
            .as_ref()
            .filter(|t| t.has_valid_id())
            .map(|t| t.tweet_id.as_str())
    }

    /// First error message, or a generic reason for failures without one.
    pub fn failure_reason(&self) -> String {
        self.errors
            .first()
            .cloned()
            .unwrap_or_else(|| "no media found".to_string())
    }
}

/// Media entry returned by a tweet lookup, before it becomes a `MediaInfo`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiMedia {
    pub media_key: Option<String>,
    #[serde(rename = "type")]
    pub media_type: MediaType,
    /// Best downloadable URL (`name=orig` image or highest-bitrate mp4).
    pub url: String,
    /// URL as it appears on the page (`media_url_https`).
    pub original_url: String,
    pub thumbnail_url: Option<String>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub alt: Option<String>,
    pub screen_name: Option<String>,
    /// True when the media belongs to a quoted tweet.
    pub from_quoted: bool,
}
