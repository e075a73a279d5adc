//! Ordered fallback chain of extraction strategies.
//!
//! Strategies run strictly one at a time, in the order they were added,
//! until one succeeds. Failures, errors and panics of a single strategy are
//! recorded and the chain moves on.

use std::collections::HashSet;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;

use crate::clock::{Clock, TokioClock, elapsed_ms};
use crate::error::AppError;
use crate::models::{ChainMetrics, ExtractionOptions, MediaExtractionResult};
use crate::traits::{Element, ExtractionStrategy, StrategyReport};

/// Strategy name of the result returned when nothing could run.
pub const CHAIN_FAILED: &str = "strategy-chain-failed";
const CHAIN_SOURCE: &str = "strategy-chain";

/// Whether a strategy should be attempted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MiddlewareDecision {
    Continue,
    Skip,
}

/// Hooks around each strategy attempt.
pub trait ChainMiddleware<E: Element>: Send + Sync {
    fn before(&self, strategy: &str, element: &E, request_id: &str) -> MiddlewareDecision {
        let _ = (strategy, element, request_id);
        MiddlewareDecision::Continue
    }

    fn after(&self, strategy: &str, result: &MediaExtractionResult, request_id: &str) {
        let _ = (strategy, result, request_id);
    }
}

/// What one chain run produced.
#[derive(Debug, Clone)]
pub struct ChainOutcome {
    /// First success, or the last failure on exhaustion.
    pub result: MediaExtractionResult,
    pub metrics: ChainMetrics,
    /// One `"<strategy>: <reason>"` entry per failed strategy, in run order.
    pub failure_reasons: Vec<String>,
}

impl ChainOutcome {
    pub fn succeeded(&self) -> bool {
        self.result.success
    }
}

type DynStrategy<E> = Arc<dyn ExtractionStrategy<E>>;
type DynMiddleware<E> = Arc<dyn ChainMiddleware<E>>;

pub struct StrategyChain<E: Element> {
    strategies: Vec<DynStrategy<E>>,
    middleware: Vec<DynMiddleware<E>>,
    duplicate_guard: bool,
    clock: Arc<dyn Clock>,
}

impl<E: Element> Clone for StrategyChain<E> {
    fn clone(&self) -> Self {
        Self {
            strategies: self.strategies.clone(),
            middleware: self.middleware.clone(),
            duplicate_guard: self.duplicate_guard,
            clock: Arc::clone(&self.clock),
        }
    }
}

impl<E: Element> std::fmt::Debug for StrategyChain<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StrategyChain")
            .field("strategies", &self.strategy_names())
            .field("middleware", &self.middleware.len())
            .field("duplicate_guard", &self.duplicate_guard)
            .finish()
    }
}

impl<E: Element> StrategyChain<E> {
    pub fn builder() -> StrategyChainBuilder<E> {
        StrategyChainBuilder::new()
    }

    /// Appends a strategy after the existing ones.
    pub fn push(&mut self, strategy: DynStrategy<E>) {
        self.strategies.push(strategy);
    }

    pub fn len(&self) -> usize {
        self.strategies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.strategies.is_empty()
    }

    pub fn strategy_names(&self) -> Vec<String> {
        self.strategies.iter().map(|s| s.name().to_string()).collect()
    }

    /// Runs the strategies in list order and stops at the first success.
    pub async fn run(
        &self,
        element: &E,
        options: &ExtractionOptions,
        request_id: &str,
    ) -> ChainOutcome {
        let start = self.clock.now();
        let mut metrics = ChainMetrics::default();
        let mut failure_reasons = Vec::new();
        let mut last_failure: Option<MediaExtractionResult> = None;
        let mut seen = HashSet::new();

        for strategy in &self.strategies {
            let name = strategy.name().to_string();

            if self.duplicate_guard && !seen.insert(name.clone()) {
                metrics.duplicate_skipped += 1;
                tracing::debug!(%request_id, strategy = %name, "Skipping duplicate strategy");
                continue;
            }

            if !strategy.can_handle(element) {
                tracing::debug!(%request_id, strategy = %name, "Strategy cannot handle element");
                continue;
            }

            if self
                .middleware
                .iter()
                .any(|m| m.before(&name, element, request_id) == MiddlewareDecision::Skip)
            {
                tracing::debug!(%request_id, strategy = %name, "Strategy skipped by middleware");
                continue;
            }

            metrics.attempted_strategies.push(name.clone());
            tracing::debug!(%request_id, strategy = %name, "Attempting strategy");

            let report = AssertUnwindSafe(strategy.extract_with_report(element, options, request_id))
                .catch_unwind()
                .await
                .unwrap_or_else(|_| StrategyReport {
                    outcome: Err(AppError::StrategyPanicked(name.clone())),
                    retries: None,
                });

            if let Some(retries) = report.retries {
                metrics.strategy_retries.insert(name.clone(), retries);
            }

            let result = match report.outcome {
                Ok(result) => result,
                Err(e) => {
                    tracing::warn!(%request_id, strategy = %name, error = %e, "Strategy errored");
                    MediaExtractionResult::failure(CHAIN_SOURCE, name.as_str(), e.to_string())
                }
            };

            for m in &self.middleware {
                m.after(&name, &result, request_id);
            }

            if result.success {
                metrics.chain_duration_ms = elapsed_ms(start, self.clock.now());
                tracing::debug!(
                    %request_id,
                    strategy = %name,
                    media_count = result.media_items.len(),
                    duration_ms = metrics.chain_duration_ms,
                    "Strategy succeeded"
                );
                metrics.success_strategy = Some(name);
                return ChainOutcome {
                    result,
                    metrics,
                    failure_reasons,
                };
            }

            let reason = result.failure_reason();
            tracing::debug!(%request_id, strategy = %name, %reason, "Strategy failed");
            failure_reasons.push(format!("{name}: {reason}"));
            metrics.failed_strategies.push(name);
            last_failure = Some(result);
        }

        metrics.chain_duration_ms = elapsed_ms(start, self.clock.now());
        let result = last_failure.unwrap_or_else(|| {
            MediaExtractionResult::failure(
                CHAIN_SOURCE,
                CHAIN_FAILED,
                "No strategy could handle the element",
            )
        });

        ChainOutcome {
            result,
            metrics,
            failure_reasons,
        }
    }
}

/// Builder for [`StrategyChain`]. Insertion order is run order.
pub struct StrategyChainBuilder<E: Element> {
    strategies: Vec<DynStrategy<E>>,
    middleware: Vec<DynMiddleware<E>>,
    duplicate_guard: bool,
    clock: Option<Arc<dyn Clock>>,
}

impl<E: Element> Default for StrategyChainBuilder<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: Element> StrategyChainBuilder<E> {
    pub fn new() -> Self {
        Self {
            strategies: Vec::new(),
            middleware: Vec::new(),
            duplicate_guard: false,
            clock: None,
        }
    }

    pub fn add<S: ExtractionStrategy<E> + 'static>(mut self, strategy: S) -> Self {
        self.strategies.push(Arc::new(strategy));
        self
    }

    pub fn add_shared(mut self, strategy: DynStrategy<E>) -> Self {
        self.strategies.push(strategy);
        self
    }

    /// Skip strategies whose name was already seen in this run.
    pub fn enable_duplicate_guard(mut self) -> Self {
        self.duplicate_guard = true;
        self
    }

    pub fn middleware<M: ChainMiddleware<E> + 'static>(mut self, middleware: M) -> Self {
        self.middleware.push(Arc::new(middleware));
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn build(self) -> StrategyChain<E> {
        StrategyChain {
            strategies: self.strategies,
            middleware: self.middleware,
            duplicate_guard: self.duplicate_guard,
            clock: self.clock.unwrap_or_else(|| Arc::new(TokioClock)),
        }
    }
}
