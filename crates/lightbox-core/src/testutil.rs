//! Test utilities: mock implementations of all core traits.
//!
//! Handwritten mocks for dependency injection in unit tests.
//! All mocks use `Arc<Mutex<_>>` for interior mutability, allowing
//! test assertions on recorded calls.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;

use crate::clock::Clock;
use crate::error::AppError;
use crate::models::{
    ApiMedia, ExtractionOptions, MediaExtractionResult, MediaInfo, MediaType, TweetInfo,
};
use crate::reporter::{ExtractionEvent, ExtractionReporter};
use crate::traits::{Element, ExtractionStrategy, IdentityResolver, TweetLookup};

// ---------------------------------------------------------------------------
// FakeElement
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
struct FakeNode {
    tag: String,
    attrs: Vec<(String, String)>,
    parent: Option<usize>,
    children: Vec<usize>,
}

#[derive(Debug, Default)]
struct FakeDocument {
    nodes: Vec<FakeNode>,
    page_url: Option<String>,
}

/// In-memory element tree. Every handle shares its document, so holding
/// any node keeps the whole tree alive.
///
/// Selectors support a tag name or `*`, followed by any number of
/// `[attr]`, `[attr="v"]`, `[attr^="v"]` and `[attr*="v"]` filters,
/// descendant combinators (`a b`) and comma-separated lists. Anything else
/// matches nothing.
#[derive(Clone)]
pub struct FakeElement {
    doc: Arc<Mutex<FakeDocument>>,
    index: usize,
}

impl std::fmt::Debug for FakeElement {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let node = self.node();
        f.debug_struct("FakeElement")
            .field("index", &self.index)
            .field("tag", &node.tag)
            .field("attrs", &node.attrs)
            .finish()
    }
}

impl FakeElement {
    pub fn new(tag: &str) -> Self {
        let doc = FakeDocument {
            nodes: vec![FakeNode {
                tag: tag.to_lowercase(),
                attrs: Vec::new(),
                parent: None,
                children: Vec::new(),
            }],
            page_url: None,
        };
        Self {
            doc: Arc::new(Mutex::new(doc)),
            index: 0,
        }
    }

    fn node(&self) -> FakeNode {
        self.doc.lock().unwrap().nodes[self.index].clone()
    }

    fn handle(&self, index: usize) -> FakeElement {
        FakeElement {
            doc: Arc::clone(&self.doc),
            index,
        }
    }

    pub fn with_attr(self, name: &str, value: &str) -> Self {
        self.doc.lock().unwrap().nodes[self.index]
            .attrs
            .push((name.to_string(), value.to_string()));
        self
    }

    /// Sets the location of the element's document.
    pub fn with_page_url(self, url: &str) -> Self {
        self.doc.lock().unwrap().page_url = Some(url.to_string());
        self
    }

    /// Moves `child` (and its subtree) under `self` and returns the new handle.
    pub fn append(&self, child: FakeElement) -> FakeElement {
        if Arc::ptr_eq(&self.doc, &child.doc) {
            child.detach();
            let mut doc = self.doc.lock().unwrap();
            doc.nodes[child.index].parent = Some(self.index);
            doc.nodes[self.index].children.push(child.index);
            return child;
        }

        let subtree: Vec<(usize, FakeNode)> = {
            let source = child.doc.lock().unwrap();
            let mut order = vec![child.index];
            let mut i = 0;
            while i < order.len() {
                order.extend(source.nodes[order[i]].children.iter().copied());
                i += 1;
            }
            order
                .into_iter()
                .map(|idx| (idx, source.nodes[idx].clone()))
                .collect()
        };

        let mut doc = self.doc.lock().unwrap();
        let base = doc.nodes.len();
        let remap = |old: usize| {
            base + subtree
                .iter()
                .position(|(idx, _)| *idx == old)
                .unwrap_or_default()
        };
        for (old, node) in &subtree {
            let mut node = node.clone();
            node.parent = if *old == child.index {
                Some(self.index)
            } else {
                node.parent.map(remap)
            };
            node.children = node.children.iter().map(|c| remap(*c)).collect();
            doc.nodes.push(node);
        }
        doc.nodes[self.index].children.push(base);
        drop(doc);
        self.handle(base)
    }

    /// Removes the element from its parent.
    pub fn detach(&self) {
        let mut doc = self.doc.lock().unwrap();
        if let Some(parent) = doc.nodes[self.index].parent.take() {
            doc.nodes[parent].children.retain(|c| *c != self.index);
        }
    }

    fn matches(&self, selector: &str) -> bool {
        selector
            .split(',')
            .any(|part| complex_matches(self, part.trim()))
    }

    fn collect_descendants(&self, selector: &str, out: &mut Vec<FakeElement>) {
        for index in self.node().children {
            let child = self.handle(index);
            if child.matches(selector) {
                out.push(child.clone());
            }
            child.collect_descendants(selector, out);
        }
    }
}

/// Matches descendant combinators right to left.
fn complex_matches(element: &FakeElement, selector: &str) -> bool {
    let compounds = split_compounds(selector);
    let Some((last, ancestors)) = compounds.split_last() else {
        return false;
    };
    if !compound_matches(element, last) {
        return false;
    }
    let mut current = element.parent();
    for compound in ancestors.iter().rev() {
        loop {
            let Some(node) = current else {
                return false;
            };
            current = node.parent();
            if compound_matches(&node, compound) {
                break;
            }
        }
    }
    true
}

/// Splits on whitespace outside `[...]`.
fn split_compounds(selector: &str) -> Vec<&str> {
    let mut out = Vec::new();
    let mut depth = 0usize;
    let mut start = None;
    for (i, c) in selector.char_indices() {
        match c {
            '[' => {
                depth += 1;
                start.get_or_insert(i);
            }
            ']' => depth = depth.saturating_sub(1),
            c if c.is_whitespace() && depth == 0 => {
                if let Some(s) = start.take() {
                    out.push(&selector[s..i]);
                }
            }
            _ => {
                start.get_or_insert(i);
            }
        }
    }
    if let Some(s) = start {
        out.push(&selector[s..]);
    }
    out
}

fn compound_matches(element: &FakeElement, selector: &str) -> bool {
    if selector.is_empty() {
        return false;
    }
    let (tag, mut rest) = match selector.find('[') {
        Some(i) => selector.split_at(i),
        None => (selector, ""),
    };
    if tag.contains(|c: char| c.is_whitespace() || c == '>' || c == '.' || c == '#') {
        return false;
    }
    if !tag.is_empty() && tag != "*" && !tag.eq_ignore_ascii_case(&element.tag_name()) {
        return false;
    }

    while !rest.is_empty() {
        let Some(end) = rest.find(']') else {
            return false;
        };
        if !rest.starts_with('[') {
            return false;
        }
        let filter = &rest[1..end];
        rest = &rest[end + 1..];

        let (name, op, expected) = match filter.find('=') {
            None => (filter, "", ""),
            Some(i) => {
                let (lhs, rhs) = filter.split_at(i);
                let rhs = rhs[1..].trim_matches(|c| c == '"' || c == '\'');
                if let Some(name) = lhs.strip_suffix('^') {
                    (name, "^", rhs)
                } else if let Some(name) = lhs.strip_suffix('*') {
                    (name, "*", rhs)
                } else {
                    (lhs, "=", rhs)
                }
            }
        };

        let Some(value) = element.attr(name) else {
            return false;
        };
        let ok = match op {
            "" => true,
            "=" => value == expected,
            "^" => value.starts_with(expected),
            _ => value.contains(expected),
        };
        if !ok {
            return false;
        }
    }
    true
}

impl Element for FakeElement {
    fn tag_name(&self) -> String {
        self.node().tag
    }

    fn attr(&self, name: &str) -> Option<String> {
        self.node()
            .attrs
            .into_iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v)
    }

    fn parent(&self) -> Option<Self> {
        self.node().parent.map(|index| self.handle(index))
    }

    fn closest(&self, selector: &str) -> Option<Self> {
        let mut current = Some(self.clone());
        while let Some(element) = current {
            if element.matches(selector) {
                return Some(element);
            }
            current = element.parent();
        }
        None
    }

    fn query_all(&self, selector: &str) -> Vec<Self> {
        let mut out = Vec::new();
        self.collect_descendants(selector, &mut out);
        out
    }

    fn is_same_node(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.doc, &other.doc) && self.index == other.index
    }

    fn page_url(&self) -> Option<String> {
        self.doc.lock().unwrap().page_url.clone()
    }
}

// ---------------------------------------------------------------------------
// MockStrategy
// ---------------------------------------------------------------------------

/// What a [`MockStrategy`] does on one call.
#[derive(Debug, Clone)]
pub enum MockOutcome {
    Success,
    /// `Ok` with `success: false` and this error message.
    Failure(String),
    /// `Err(AppError::Generic)`.
    Error(String),
    Panic,
}

/// Mock strategy with scripted outcomes and a shared call counter.
///
/// Clones share their script and counter, so a test can keep one clone
/// and hand another to the chain.
#[derive(Clone)]
pub struct MockStrategy {
    name: String,
    priority: i32,
    handles: bool,
    /// Each call pops the first outcome; when empty, `fallback` is used.
    script: Arc<Mutex<VecDeque<MockOutcome>>>,
    fallback: MockOutcome,
    delays: Arc<Mutex<VecDeque<Duration>>>,
    delay: Option<Duration>,
    tweet_id: Option<String>,
    calls: Arc<Mutex<usize>>,
}

impl MockStrategy {
    fn with_script(name: &str, script: Vec<MockOutcome>, fallback: MockOutcome) -> Self {
        Self {
            name: name.to_string(),
            priority: 0,
            handles: true,
            script: Arc::new(Mutex::new(script.into())),
            fallback,
            delays: Arc::new(Mutex::new(VecDeque::new())),
            delay: None,
            tweet_id: None,
            calls: Arc::new(Mutex::new(0)),
        }
    }

    pub fn succeeding(name: &str) -> Self {
        Self::with_script(name, vec![], MockOutcome::Success)
    }

    pub fn failing(name: &str) -> Self {
        Self::with_script(name, vec![], MockOutcome::Failure("no media found".into()))
    }

    /// Plays `outcomes` in order, then keeps repeating the last one.
    pub fn scripted(name: &str, outcomes: Vec<MockOutcome>) -> Self {
        let fallback = outcomes
            .last()
            .cloned()
            .unwrap_or(MockOutcome::Failure("no media found".into()));
        Self::with_script(name, outcomes, fallback)
    }

    /// Always succeeds, sleeping for the next scripted delay on each call.
    pub fn scripted_delays(name: &str, delays: Vec<Duration>) -> Self {
        let strategy = Self::succeeding(name);
        *strategy.delays.lock().unwrap() = delays.into();
        strategy
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Successful results carry a `TweetInfo` with this id.
    pub fn with_tweet(mut self, tweet_id: &str) -> Self {
        self.tweet_id = Some(tweet_id.to_string());
        self
    }

    /// `can_handle` returns false.
    pub fn rejecting(mut self) -> Self {
        self.handles = false;
        self
    }

    pub fn call_count(&self) -> usize {
        *self.calls.lock().unwrap()
    }

    fn success_result(&self) -> MediaExtractionResult {
        let slug: String = self
            .name
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .collect();
        let tweet = self
            .tweet_id
            .as_deref()
            .map(|id| TweetInfo::new(id, "mockuser", self.name.as_str(), 0.9));
        let item = MediaInfo::new(
            format!("{slug}-0"),
            format!("https://pbs.twimg.com/media/{slug}?format=jpg&name=orig"),
            MediaType::Image,
        )
        .with_filename(format!("mockuser_{slug}_1.jpg"))
        .with_tweet(tweet.as_ref());
        MediaExtractionResult::success(vec![item], 0, "mock", self.name.as_str(), tweet)
    }
}

#[async_trait]
impl<E: Element> ExtractionStrategy<E> for MockStrategy {
    fn name(&self) -> &str {
        &self.name
    }

    fn priority(&self) -> i32 {
        self.priority
    }

    fn can_handle(&self, _element: &E) -> bool {
        self.handles
    }

    async fn extract(
        &self,
        _element: &E,
        _options: &ExtractionOptions,
        _request_id: &str,
    ) -> Result<MediaExtractionResult, AppError> {
        *self.calls.lock().unwrap() += 1;

        let delay = self.delays.lock().unwrap().pop_front().or(self.delay);
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let outcome = self
            .script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| self.fallback.clone());

        match outcome {
            MockOutcome::Success => Ok(self.success_result()),
            MockOutcome::Failure(reason) => Ok(MediaExtractionResult::failure(
                "mock",
                self.name.as_str(),
                reason,
            )),
            MockOutcome::Error(message) => Err(AppError::Generic(message)),
            MockOutcome::Panic => panic!("mock strategy '{}' panicked", self.name),
        }
    }
}

// ---------------------------------------------------------------------------
// ManualClock
// ---------------------------------------------------------------------------

/// Clock that only moves when told to.
#[derive(Debug, Clone)]
pub struct ManualClock {
    now: Arc<Mutex<Instant>>,
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            now: Arc::new(Mutex::new(Instant::now())),
        }
    }

    pub fn advance(&self, by: Duration) {
        *self.now.lock().unwrap() += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        *self.now.lock().unwrap()
    }
}

// ---------------------------------------------------------------------------
// StaticIdentityResolver
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
enum IdentitySource {
    Fixed(Option<String>),
    Attribute(String),
}

/// Identity resolver with a fixed answer or a single-attribute lookup.
#[derive(Debug, Clone)]
pub struct StaticIdentityResolver {
    source: IdentitySource,
}

impl StaticIdentityResolver {
    pub fn fixed(tweet_id: &str) -> Self {
        Self {
            source: IdentitySource::Fixed(Some(tweet_id.to_string())),
        }
    }

    pub fn unresolved() -> Self {
        Self {
            source: IdentitySource::Fixed(None),
        }
    }

    /// Reads the tweet id from `attribute` on the element itself.
    pub fn from_attribute(attribute: &str) -> Self {
        Self {
            source: IdentitySource::Attribute(attribute.to_string()),
        }
    }
}

impl<E: Element> IdentityResolver<E> for StaticIdentityResolver {
    fn resolve(&self, element: &E) -> Option<TweetInfo> {
        let id = match &self.source {
            IdentitySource::Fixed(id) => id.clone()?,
            IdentitySource::Attribute(name) => element.attr(name)?,
        };
        Some(TweetInfo::new(id, "mockuser", "static", 1.0))
    }
}

// ---------------------------------------------------------------------------
// RecordingReporter
// ---------------------------------------------------------------------------

/// Reporter that records event kinds.
#[derive(Clone, Default)]
pub struct RecordingReporter {
    pub events: Arc<Mutex<Vec<String>>>,
}

impl RecordingReporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<String> {
        self.events.lock().unwrap().clone()
    }

    pub fn count(&self, kind: &str) -> usize {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter(|e| *e == kind)
            .count()
    }
}

impl ExtractionReporter for RecordingReporter {
    fn report(&self, event: ExtractionEvent<'_>) {
        self.events.lock().unwrap().push(event.kind().to_string());
    }
}

// ---------------------------------------------------------------------------
// MockTweetLookup
// ---------------------------------------------------------------------------

/// Mock tweet lookup that records calls.
#[derive(Clone)]
pub struct MockTweetLookup {
    /// Queue of responses. Each call pops the first element.
    /// If empty, returns `default`.
    responses: Arc<Mutex<Vec<Result<Vec<ApiMedia>, AppError>>>>,
    default: Vec<ApiMedia>,
    /// `(tweet_id, host_hint)` per call.
    pub calls: Arc<Mutex<Vec<(String, Option<String>)>>>,
}

impl MockTweetLookup {
    /// Returns `media` on every call.
    pub fn new(media: Vec<ApiMedia>) -> Self {
        Self {
            responses: Arc::new(Mutex::new(Vec::new())),
            default: media,
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn with_responses(responses: Vec<Result<Vec<ApiMedia>, AppError>>) -> Self {
        Self {
            responses: Arc::new(Mutex::new(responses)),
            default: Vec::new(),
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl TweetLookup for MockTweetLookup {
    async fn tweet_media(
        &self,
        tweet_id: &str,
        host_hint: Option<&str>,
        _options: &ExtractionOptions,
    ) -> Result<Vec<ApiMedia>, AppError> {
        self.calls
            .lock()
            .unwrap()
            .push((tweet_id.to_string(), host_hint.map(str::to_string)));
        let mut responses = self.responses.lock().unwrap();
        if responses.is_empty() {
            Ok(self.default.clone())
        } else {
            responses.remove(0)
        }
    }
}

// ---------------------------------------------------------------------------
// Test helpers
// ---------------------------------------------------------------------------

/// A photo as the tweet lookup would return it.
pub fn api_photo(media_id: &str) -> ApiMedia {
    let original = format!("https://pbs.twimg.com/media/{media_id}.jpg");
    ApiMedia {
        media_key: Some(format!("3_{media_id}")),
        media_type: MediaType::Image,
        url: format!("https://pbs.twimg.com/media/{media_id}?format=jpg&name=orig"),
        original_url: original,
        thumbnail_url: None,
        width: Some(1200),
        height: Some(800),
        alt: None,
        screen_name: Some("mockuser".to_string()),
        from_quoted: false,
    }
}

/// A successful result for `tweet_id` with one image per id in `media_ids`.
pub fn make_success(tweet_id: &str, media_ids: &[&str]) -> MediaExtractionResult {
    let tweet = TweetInfo::new(tweet_id, "mockuser", "test", 1.0);
    let items = media_ids
        .iter()
        .enumerate()
        .map(|(i, id)| {
            MediaInfo::new(
                *id,
                format!("https://pbs.twimg.com/media/{id}?format=jpg&name=orig"),
                MediaType::Image,
            )
            .with_filename(format!("mockuser_{tweet_id}_{}.jpg", i + 1))
            .with_tweet(Some(&tweet))
        })
        .collect();
    MediaExtractionResult::success(items, 0, "test", "test", Some(tweet))
}
