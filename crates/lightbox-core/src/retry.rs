//! In-place retry for a single strategy.
//!
//! Wraps any [`ExtractionStrategy`] and re-runs it on failure before the
//! chain moves on. There is no delay between attempts: this is a bounded
//! loop, not network backoff.
//!
//! ```rust,ignore
//! let api = with_retry(ApiStrategy::new(client), 1);
//! let chain = StrategyChain::builder().add(api).add(DomDirectStrategy::new()).build();
//! ```

use async_trait::async_trait;

use crate::error::AppError;
use crate::models::{ExtractionOptions, MediaExtractionResult};
use crate::traits::{Element, ExtractionStrategy, StrategyReport};

/// Wrap `strategy` so it gets up to `max_retries` extra attempts.
pub fn with_retry<S>(strategy: S, max_retries: u32) -> RetryingStrategy<S> {
    RetryingStrategy::new(strategy, max_retries)
}

/// A strategy that keeps the wrapped strategy's name, priority and gate
/// but retries its `extract` until it succeeds or attempts run out.
#[derive(Debug, Clone)]
pub struct RetryingStrategy<S> {
    inner: S,
    max_retries: u32,
}

impl<S> RetryingStrategy<S> {
    pub fn new(inner: S, max_retries: u32) -> Self {
        Self { inner, max_retries }
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }
}

#[async_trait]
impl<E, S> ExtractionStrategy<E> for RetryingStrategy<S>
where
    E: Element,
    S: ExtractionStrategy<E>,
{
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn priority(&self) -> i32 {
        self.inner.priority()
    }

    fn can_handle(&self, element: &E) -> bool {
        self.inner.can_handle(element)
    }

    async fn extract(
        &self,
        element: &E,
        options: &ExtractionOptions,
        request_id: &str,
    ) -> Result<MediaExtractionResult, AppError> {
        self.extract_with_report(element, options, request_id)
            .await
            .outcome
    }

    async fn extract_with_report(
        &self,
        element: &E,
        options: &ExtractionOptions,
        request_id: &str,
    ) -> StrategyReport {
        let mut retries = 0;
        loop {
            let outcome = self.inner.extract(element, options, request_id).await;
            let succeeded = matches!(&outcome, Ok(result) if result.success);

            if succeeded || retries >= self.max_retries {
                return StrategyReport {
                    outcome,
                    retries: (self.max_retries > 0).then_some(retries),
                };
            }

            retries += 1;
            tracing::debug!(
                %request_id,
                strategy = %self.inner.name(),
                attempt = retries + 1,
                max_attempts = self.max_retries + 1,
                "Retrying strategy"
            );
        }
    }
}
