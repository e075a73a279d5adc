use std::sync::Arc;
use std::time::Duration;

use crate::config::ServiceConfig;
use crate::error::AppError;
use crate::models::{AggregateMetrics, ExtractionOptions, MediaExtractionResult};
use crate::orchestrator::{ExtractionOrchestrator, new_request_id};
use crate::reporter::{ExtractionEvent, ExtractionReporter, TracingReporter};
use crate::traits::Element;

/// `source_type` stamped on results produced after a primary timeout.
pub const FALLBACK_SOURCE: &str = "dom-fallback";

/// Service boundary above the orchestrator.
///
/// Races the primary chain (API + DOM) against a timeout and, when the
/// deadline passes, reruns extraction with a DOM-only orchestrator. The
/// two orchestrators are expected to share one success cache.
pub struct MediaExtractionService<E: Element> {
    primary: ExtractionOrchestrator<E>,
    fallback: Option<ExtractionOrchestrator<E>>,
    config: ServiceConfig,
    reporter: Arc<dyn ExtractionReporter>,
}

impl<E: Element> MediaExtractionService<E> {
    pub fn new(primary: ExtractionOrchestrator<E>, config: ServiceConfig) -> Self {
        Self {
            primary,
            fallback: None,
            config,
            reporter: Arc::new(TracingReporter),
        }
    }

    pub fn with_fallback(mut self, fallback: ExtractionOrchestrator<E>) -> Self {
        self.fallback = Some(fallback);
        self
    }

    pub fn with_reporter<R: ExtractionReporter + 'static>(mut self, reporter: R) -> Self {
        self.reporter = Arc::new(reporter);
        self
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    pub fn primary(&self) -> &ExtractionOrchestrator<E> {
        &self.primary
    }

    pub fn fallback(&self) -> Option<&ExtractionOrchestrator<E>> {
        self.fallback.as_ref()
    }

    /// Fills unset options from the service defaults.
    pub fn resolve_options(&self, options: &ExtractionOptions) -> ExtractionOptions {
        ExtractionOptions {
            timeout_ms: Some(
                options
                    .timeout_ms
                    .unwrap_or(self.config.default_timeout.as_millis() as u64),
            ),
            max_retries: Some(
                options
                    .max_retries
                    .unwrap_or(self.config.default_max_retries),
            ),
        }
    }

    pub async fn extract(
        &self,
        element: &E,
        options: &ExtractionOptions,
    ) -> Result<MediaExtractionResult, AppError> {
        let options = self.resolve_options(options);
        let timeout_ms = options.timeout_ms.unwrap_or_default();

        let primary = self.primary.extract(element, &options);
        match tokio::time::timeout(Duration::from_millis(timeout_ms), primary).await {
            Ok(result) => result,
            Err(_) => {
                let request_id = new_request_id();
                self.reporter.report(ExtractionEvent::TimedOut {
                    request_id: &request_id,
                    timeout_ms,
                });

                let Some(fallback) = &self.fallback else {
                    let mut result = MediaExtractionResult::failure(
                        FALLBACK_SOURCE,
                        "timeout",
                        AppError::Timeout(timeout_ms).to_string(),
                    );
                    result.metadata.request_id = Some(request_id);
                    return Ok(result);
                };

                let mut result = fallback.extract(element, &options).await?;
                result.metadata.source_type = FALLBACK_SOURCE.to_string();
                self.reporter.report(ExtractionEvent::FallbackUsed {
                    request_id: &request_id,
                    success: result.success,
                });
                Ok(result)
            }
        }
    }

    pub fn metrics(&self) -> AggregateMetrics {
        self.primary.metrics()
    }

    pub fn dispose(&self) {
        self.primary.dispose();
        if let Some(fallback) = &self.fallback {
            fallback.dispose();
        }
    }
}
