//! Tweet lookup through the web client's GraphQL endpoint.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use lightbox_core::error::AppError;
use lightbox_core::media_url::{dimensions_from_url, to_original_image_url};
use lightbox_core::models::{ApiMedia, ExtractionOptions, MediaType, is_valid_tweet_id};
use lightbox_core::patterns::TWEET_HOSTS;
use lightbox_core::traits::TweetLookup;
use moka::future::Cache;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::{Value, json};
use tokio::sync::OnceCell;
use tracing::{debug, warn};
use url::Url;

pub const DEFAULT_QUERY_ID: &str = "zAz9764BcLZOJ0JU2wrd1A";
pub const GUEST_BEARER_TOKEN: &str = "Bearer AAAAAAAAAAAAAAAAAAAAANRILgAAAAAAnNwIzUejRCOuH5E6I8xnZz4puTs%3D1Zv7ttfk8LF81IUq16cHjhLTvJu4FA33AGWWjCpTnA";
pub const GUEST_ACTIVATE_URL: &str = "https://api.x.com/1.1/guest/activate.json";

const RESPONSE_CACHE_SIZE: u64 = 16;
const USER_AGENT: &str = "Lightbox/0.3 (media extraction)";

/// Endpoint and credentials for the tweet lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GraphqlConfig {
    pub supported_hosts: Vec<String>,
    /// Used when the page host is not a supported one.
    pub default_host: String,
    pub query_id: String,
    pub bearer_token: String,
    pub csrf_token: Option<String>,
    /// Skips guest activation when set.
    pub guest_token: Option<String>,
    pub guest_activate_url: String,
    /// Replaces `https://{host}` in the endpoint. Meant for local servers.
    pub base_url: Option<String>,
    pub request_timeout: Duration,
}

impl Default for GraphqlConfig {
    fn default() -> Self {
        Self {
            supported_hosts: TWEET_HOSTS.iter().map(|h| h.to_string()).collect(),
            default_host: "x.com".to_string(),
            query_id: DEFAULT_QUERY_ID.to_string(),
            bearer_token: GUEST_BEARER_TOKEN.to_string(),
            csrf_token: None,
            guest_token: None,
            guest_activate_url: GUEST_ACTIVATE_URL.to_string(),
            base_url: None,
            request_timeout: Duration::from_secs(10),
        }
    }
}

impl GraphqlConfig {
    /// Reads `LIGHTBOX_API_HOST`, `LIGHTBOX_CSRF_TOKEN` and `LIGHTBOX_GUEST_TOKEN`.
    pub fn from_env() -> Result<Self, AppError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, AppError> {
        let mut config = Self::default();

        if let Some(host) = lookup("LIGHTBOX_API_HOST") {
            let host = normalize_host(host.trim());
            if !config.supported_hosts.iter().any(|h| *h == host) {
                return Err(AppError::ConfigError(format!(
                    "LIGHTBOX_API_HOST '{host}' is not one of {}",
                    config.supported_hosts.join(", ")
                )));
            }
            config.default_host = host.to_string();
        }
        config.csrf_token = lookup("LIGHTBOX_CSRF_TOKEN").filter(|t| !t.is_empty());
        config.guest_token = lookup("LIGHTBOX_GUEST_TOKEN").filter(|t| !t.is_empty());
        Ok(config)
    }

    /// The page host when it is supported, otherwise the default host.
    pub fn select_host(&self, host_hint: Option<&str>) -> &str {
        host_hint
            .map(normalize_host)
            .and_then(|hint| self.supported_hosts.iter().find(|h| *h == hint))
            .map(String::as_str)
            .unwrap_or(&self.default_host)
    }
}

fn normalize_host(host: &str) -> &str {
    host.strip_prefix("www.")
        .or_else(|| host.strip_prefix("mobile."))
        .unwrap_or(host)
}

fn features() -> Value {
    json!({
        "creator_subscriptions_tweet_preview_api_enabled": true,
        "premium_content_api_read_enabled": false,
        "communities_web_enable_tweet_community_results_fetch": true,
        "c9s_tweet_anatomy_moderator_badge_enabled": true,
        "responsive_web_grok_analyze_button_fetch_trends_enabled": false,
        "responsive_web_grok_analyze_post_followups_enabled": false,
        "responsive_web_jetfuel_frame": false,
        "responsive_web_grok_share_attachment_enabled": true,
        "articles_preview_enabled": true,
        "responsive_web_edit_tweet_api_enabled": true,
        "graphql_is_translatable_rweb_tweet_is_translatable_enabled": true,
        "view_counts_everywhere_api_enabled": true,
        "longform_notetweets_consumption_enabled": true,
        "responsive_web_twitter_article_tweet_consumption_enabled": true,
        "tweet_awards_web_tipping_enabled": false,
        "responsive_web_grok_show_grok_translated_post": false,
        "responsive_web_grok_analysis_button_from_backend": false,
        "creator_subscriptions_quote_tweet_preview_enabled": false,
        "freedom_of_speech_not_reach_fetch_enabled": true,
        "standardized_nudges_misinfo": true,
        "tweet_with_visibility_results_prefer_gql_limited_actions_policy_enabled": true,
        "longform_notetweets_rich_text_read_enabled": true,
        "longform_notetweets_inline_media_enabled": true,
        "profile_label_improvements_pcf_label_in_post_enabled": true,
        "rweb_tipjar_consumption_enabled": true,
        "verified_phone_label_enabled": false,
        "responsive_web_grok_image_annotation_enabled": true,
        "responsive_web_graphql_skip_user_profile_image_extensions_enabled": false,
        "responsive_web_graphql_timeline_navigation_enabled": true,
        "responsive_web_enhance_cards_enabled": false
    })
}

fn field_toggles() -> Value {
    json!({
        "withArticleRichContentState": true,
        "withArticlePlainText": false,
        "withGrokAnalyze": false,
        "withDisallowedReplyControls": false
    })
}

// ---------------------------------------------------------------------------
// Response shape
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct TweetResponse {
    data: Option<ResponseData>,
    #[serde(default)]
    errors: Vec<GraphqlError>,
}

#[derive(Debug, Deserialize)]
struct GraphqlError {
    message: String,
}

#[derive(Debug, Deserialize)]
struct ResponseData {
    #[serde(rename = "tweetResult")]
    tweet_result: Option<ResultSlot>,
}

#[derive(Debug, Deserialize)]
struct ResultSlot {
    result: Option<Box<TweetNode>>,
}

#[derive(Debug, Deserialize)]
struct TweetNode {
    /// Present on `TweetWithVisibilityResults` wrappers.
    tweet: Option<Box<TweetNode>>,
    legacy: Option<TweetLegacy>,
    core: Option<TweetCore>,
    quoted_status_result: Option<ResultSlot>,
    extended_entities: Option<Entities>,
}

#[derive(Debug, Deserialize)]
struct TweetLegacy {
    extended_entities: Option<Entities>,
}

#[derive(Debug, Deserialize)]
struct TweetCore {
    user_results: Option<UserSlot>,
}

#[derive(Debug, Deserialize)]
struct UserSlot {
    result: Option<UserNode>,
}

#[derive(Debug, Deserialize)]
struct UserNode {
    legacy: Option<ScreenName>,
    core: Option<ScreenName>,
}

#[derive(Debug, Deserialize)]
struct ScreenName {
    screen_name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Entities {
    #[serde(default)]
    media: Vec<RawMedia>,
}

#[derive(Debug, Deserialize)]
struct RawMedia {
    #[serde(rename = "type")]
    kind: String,
    media_key: Option<String>,
    media_url_https: Option<String>,
    original_info: Option<OriginalInfo>,
    video_info: Option<VideoInfo>,
    ext_alt_text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OriginalInfo {
    width: Option<u32>,
    height: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct VideoInfo {
    #[serde(default)]
    variants: Vec<Variant>,
}

#[derive(Debug, Deserialize)]
struct Variant {
    content_type: Option<String>,
    url: String,
    bitrate: Option<u64>,
}

impl TweetNode {
    fn unwrap_visibility(&self) -> &TweetNode {
        self.tweet.as_deref().unwrap_or(self)
    }

    fn screen_name(&self) -> Option<String> {
        let user = self.core.as_ref()?.user_results.as_ref()?.result.as_ref()?;
        user.legacy
            .as_ref()
            .and_then(|l| l.screen_name.clone())
            .or_else(|| user.core.as_ref().and_then(|c| c.screen_name.clone()))
    }

    fn media(&self) -> &[RawMedia] {
        self.legacy
            .as_ref()
            .and_then(|l| l.extended_entities.as_ref())
            .or(self.extended_entities.as_ref())
            .map(|e| e.media.as_slice())
            .unwrap_or_default()
    }
}

/// Highest-bitrate MP4 variant.
fn best_mp4(video: &VideoInfo) -> Option<&str> {
    video
        .variants
        .iter()
        .filter(|v| v.content_type.as_deref() == Some("video/mp4"))
        .max_by_key(|v| v.bitrate.unwrap_or(0))
        .map(|v| v.url.as_str())
}

fn convert(raw: &RawMedia, screen_name: Option<&str>, from_quoted: bool) -> Option<ApiMedia> {
    let preview = raw.media_url_https.as_deref()?;
    let media_type: MediaType = raw.kind.parse().ok()?;
    let (url, thumbnail_url) = match media_type {
        MediaType::Image => (to_original_image_url(preview), None),
        MediaType::Video | MediaType::Gif => (
            best_mp4(raw.video_info.as_ref()?)?.to_string(),
            Some(preview.to_string()),
        ),
    };
    let from_url = dimensions_from_url(&url);
    let original = raw.original_info.as_ref();

    Some(ApiMedia {
        media_key: raw.media_key.clone(),
        media_type,
        original_url: preview.to_string(),
        thumbnail_url,
        width: original
            .and_then(|o| o.width)
            .or(from_url.map(|d| d.0)),
        height: original
            .and_then(|o| o.height)
            .or(from_url.map(|d| d.1)),
        alt: raw.ext_alt_text.clone(),
        screen_name: screen_name.map(str::to_string),
        from_quoted,
        url,
    })
}

/// Media of the tweet followed by the media of the tweet it quotes.
fn parse_tweet_media(response: TweetResponse) -> Result<Vec<ApiMedia>, AppError> {
    let Some(node) = response
        .data
        .and_then(|d| d.tweet_result)
        .and_then(|slot| slot.result)
    else {
        let reason = response
            .errors
            .first()
            .map(|e| e.message.clone())
            .unwrap_or_else(|| "no tweet result".to_string());
        return Err(AppError::ParseError(format!(
            "TweetResultByRestId response: {reason}"
        )));
    };

    let tweet = node.unwrap_visibility();
    let screen_name = tweet.screen_name();
    let mut media: Vec<ApiMedia> = tweet
        .media()
        .iter()
        .filter_map(|raw| convert(raw, screen_name.as_deref(), false))
        .collect();

    if let Some(quoted) = tweet
        .quoted_status_result
        .as_ref()
        .and_then(|slot| slot.result.as_deref())
    {
        let quoted = quoted.unwrap_visibility();
        let quoted_name = quoted.screen_name();
        media.extend(
            quoted
                .media()
                .iter()
                .filter_map(|raw| convert(raw, quoted_name.as_deref(), true)),
        );
    }
    Ok(media)
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct GuestActivation {
    guest_token: Option<String>,
}

/// `TweetResultByRestId` client with a small per-URL response cache.
pub struct GraphqlClient {
    http: Client,
    config: GraphqlConfig,
    guest_token: OnceCell<Option<String>>,
    responses: Cache<String, Arc<Vec<ApiMedia>>>,
}

impl GraphqlClient {
    pub fn new(config: GraphqlConfig) -> Result<Self, AppError> {
        let http = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| AppError::HttpError(e.to_string()))?;
        Ok(Self::with_http_client(config, http))
    }

    pub fn with_http_client(config: GraphqlConfig, http: Client) -> Self {
        let guest_token = match &config.guest_token {
            Some(token) => OnceCell::new_with(Some(Some(token.clone()))),
            None => OnceCell::new(),
        };
        Self {
            http,
            config,
            guest_token,
            responses: Cache::new(RESPONSE_CACHE_SIZE),
        }
    }

    pub fn config(&self) -> &GraphqlConfig {
        &self.config
    }

    pub fn endpoint_url(&self, tweet_id: &str, host_hint: Option<&str>) -> Result<String, AppError> {
        let base = match &self.config.base_url {
            Some(base) => base.trim_end_matches('/').to_string(),
            None => format!("https://{}", self.config.select_host(host_hint)),
        };
        let variables = json!({
            "tweetId": tweet_id,
            "withCommunity": false,
            "includePromotedContent": false,
            "withVoice": false
        });
        let url = Url::parse_with_params(
            &format!(
                "{base}/i/api/graphql/{}/TweetResultByRestId",
                self.config.query_id
            ),
            &[
                ("variables", variables.to_string()),
                ("features", features().to_string()),
                ("fieldToggles", field_toggles().to_string()),
            ],
        )
        .map_err(|e| AppError::HttpError(format!("Invalid URL: {e}")))?;
        Ok(url.to_string())
    }

    pub fn request_headers(&self, guest_token: Option<&str>) -> Vec<(&'static str, String)> {
        let mut headers = vec![
            ("authorization", self.config.bearer_token.clone()),
            (
                "x-csrf-token",
                self.config.csrf_token.clone().unwrap_or_default(),
            ),
            ("x-twitter-client-language", "en".to_string()),
            ("x-twitter-active-user", "yes".to_string()),
            ("content-type", "application/json".to_string()),
        ];
        match guest_token {
            Some(token) => headers.push(("x-guest-token", token.to_string())),
            None => headers.push(("x-twitter-auth-type", "OAuth2Session".to_string())),
        }
        headers
    }

    /// Number of cached lookup responses.
    pub async fn cached_responses(&self) -> u64 {
        self.responses.run_pending_tasks().await;
        self.responses.entry_count()
    }

    async fn guest_token(&self) -> Option<String> {
        self.guest_token
            .get_or_init(|| self.activate_guest_token())
            .await
            .clone()
    }

    /// One activation attempt per client. Failure leaves the session-auth headers in place.
    async fn activate_guest_token(&self) -> Option<String> {
        let response = self
            .http
            .post(&self.config.guest_activate_url)
            .header("authorization", &self.config.bearer_token)
            .send()
            .await;

        match response {
            Ok(response) if response.status().is_success() => {
                let token = response
                    .json::<GuestActivation>()
                    .await
                    .ok()
                    .and_then(|a| a.guest_token);
                debug!(activated = token.is_some(), "Guest token activation");
                token
            }
            Ok(response) => {
                warn!(status = response.status().as_u16(), "Guest token activation rejected");
                None
            }
            Err(e) => {
                warn!(error = %e, "Guest token activation failed");
                None
            }
        }
    }

    async fn fetch(&self, url: &str, timeout: Duration) -> Result<Vec<ApiMedia>, AppError> {
        let guest = self.guest_token().await;
        let mut request = self.http.get(url).timeout(timeout);
        for (name, value) in self.request_headers(guest.as_deref()) {
            request = request.header(name, value);
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                AppError::Timeout(timeout.as_millis() as u64)
            } else if e.is_connect() {
                AppError::NetworkError(format!("Connection failed: {e}"))
            } else {
                AppError::HttpError(e.to_string())
            }
        })?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(AppError::RateLimitExceeded);
        }
        if !status.is_success() {
            return Err(AppError::ApiError {
                message: format!("TweetResultByRestId returned HTTP {}", status.as_u16()),
                status_code: status.as_u16(),
                retryable: status.is_server_error(),
            });
        }

        let body: TweetResponse = response
            .json()
            .await
            .map_err(|e| AppError::ParseError(format!("Invalid tweet response: {e}")))?;
        parse_tweet_media(body)
    }
}

#[async_trait]
impl TweetLookup for GraphqlClient {
    async fn tweet_media(
        &self,
        tweet_id: &str,
        host_hint: Option<&str>,
        options: &ExtractionOptions,
    ) -> Result<Vec<ApiMedia>, AppError> {
        if !is_valid_tweet_id(tweet_id) {
            return Err(AppError::ParseError(format!("Invalid tweet id '{tweet_id}'")));
        }
        let url = self.endpoint_url(tweet_id, host_hint)?;

        if let Some(cached) = self.responses.get(&url).await {
            debug!(tweet_id, "Tweet lookup served from response cache");
            return Ok(cached.as_ref().clone());
        }

        let timeout = options
            .timeout_ms
            .map(Duration::from_millis)
            .unwrap_or(self.config.request_timeout);
        let max_retries = options.max_retries.unwrap_or(0);

        let mut attempt = 0;
        let media = loop {
            match self.fetch(&url, timeout).await {
                Ok(media) => break media,
                Err(e) if e.is_retryable() && attempt < max_retries => {
                    attempt += 1;
                    warn!(tweet_id, attempt, error = %e, "Tweet lookup failed, retrying");
                }
                Err(e) => return Err(e),
            }
        };

        self.responses.insert(url, Arc::new(media.clone())).await;
        Ok(media)
    }
}
