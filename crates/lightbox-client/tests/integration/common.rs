use lightbox_client::{HtmlDocument, HtmlElement, Pipeline};
use lightbox_core::testutil::{MockTweetLookup, RecordingReporter};
use lightbox_core::{MediaExtractionService, OrchestratorConfig, ServiceConfig};

pub const TIMELINE_URL: &str = "https://x.com/home";

/// Home timeline with two photo tweets.
pub const TIMELINE: &str = r#"<!DOCTYPE html>
<html><body><main>
  <article data-testid="tweet">
    <div data-testid="User-Name"><a href="/ferris">Ferris</a></div>
    <a href="/ferris/status/1790000000000000001"><time datetime="2026-01-01T00:00:00Z">Jan 1</time></a>
    <div data-testid="tweetPhoto">
      <a href="/ferris/status/1790000000000000001/photo/1">
        <img alt="crab on a rock" src="https://pbs.twimg.com/media/AAA111?format=jpg&amp;name=small">
      </a>
    </div>
    <div data-testid="tweetPhoto">
      <a href="/ferris/status/1790000000000000001/photo/2">
        <img alt="crab in the sea" src="https://pbs.twimg.com/media/BBB222?format=jpg&amp;name=small">
      </a>
    </div>
  </article>
  <article data-testid="tweet">
    <div data-testid="User-Name"><a href="/corro">Corro</a></div>
    <a href="/corro/status/1790000000000000002"><time datetime="2026-01-02T00:00:00Z">Jan 2</time></a>
    <div data-testid="tweetPhoto">
      <img src="https://pbs.twimg.com/media/CCC333?format=png&amp;name=900x900">
    </div>
  </article>
</main></body></html>"#;

/// The first tweet from `TIMELINE`, re-rendered on its status page.
pub const STATUS_PAGE: &str = r#"<!DOCTYPE html>
<html><body><main>
  <section aria-label="Conversation">
    <div data-testid="tweet">
      <div data-testid="User-Name"><a href="/ferris">Ferris</a></div>
      <a href="/ferris/status/1790000000000000001"><time datetime="2026-01-01T00:00:00Z">Jan 1</time></a>
      <img src="https://pbs.twimg.com/media/AAA111?format=jpg&amp;name=large">
      <img src="https://pbs.twimg.com/media/BBB222?format=jpg&amp;name=large">
    </div>
  </section>
</main></body></html>"#;

/// Media that only exists in lazy-loading attributes, outside any tweet.
pub const LAZY_GALLERY: &str = r#"<!DOCTYPE html>
<html><body>
  <div class="gallery">
    <span class="thumb" data-src="https://pbs.twimg.com/media/LAZY01?format=jpg&amp;name=small"></span>
    <span class="thumb" data-background-image="url('https://pbs.twimg.com/media/LAZY02?format=jpg&amp;name=small')"></span>
  </div>
</body></html>"#;

pub fn parse(source: &str, page_url: &str) -> HtmlDocument {
    HtmlDocument::parse_with_url(source, Some(page_url))
}

/// The `index`-th element matching `selector`, as a click target.
pub fn nth(doc: &HtmlDocument, selector: &str, index: usize) -> HtmlElement {
    doc.select(selector).unwrap().remove(index)
}

pub fn dom_only_service(reporter: &RecordingReporter) -> MediaExtractionService<HtmlElement> {
    Pipeline::new(OrchestratorConfig::default(), ServiceConfig::default())
        .reporter(reporter.clone())
        .build()
}

pub fn api_service(
    lookup: &MockTweetLookup,
    reporter: &RecordingReporter,
) -> MediaExtractionService<HtmlElement> {
    Pipeline::new(OrchestratorConfig::default(), ServiceConfig::default())
        .lookup(lookup.clone())
        .reporter(reporter.clone())
        .build()
}
