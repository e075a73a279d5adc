use std::sync::{Arc, Mutex};

use uuid::Uuid;

use crate::cache::SuccessResultCache;
use crate::chain::{ChainOutcome, StrategyChain, StrategyChainBuilder};
use crate::clock::Clock;
use crate::error::AppError;
use crate::media_url::clicked_media_position;
use crate::models::{
    AggregateMetrics, CentralMetrics, ChainMetrics, ExtractionOptions, MediaExtractionResult,
};
use crate::reporter::{ExtractionEvent, ExtractionReporter, TracingReporter};
use crate::traits::{Element, ExtractionStrategy, IdentityResolver};

#[derive(Debug, Default)]
struct DurationStats {
    successes: u64,
    total_ms: f64,
    max_ms: f64,
}

/// Request id attached to every extraction (`extract-<8 hex>`).
pub fn new_request_id() -> String {
    let id = Uuid::new_v4().simple().to_string();
    format!("extract-{}", &id[..8])
}

/// Turns a clicked element into a [`MediaExtractionResult`]:
/// identity pre-pass → success cache → strategy chain → cache population.
///
/// Strategy failures never surface as `Err`; a chain that runs dry comes
/// back as `success: false` with one error per failed strategy.
pub struct ExtractionOrchestrator<E: Element> {
    chain: StrategyChain<E>,
    cache: Arc<SuccessResultCache>,
    identity: Option<Arc<dyn IdentityResolver<E>>>,
    reporter: Arc<dyn ExtractionReporter>,
    stats: Mutex<DurationStats>,
}

impl<E: Element> ExtractionOrchestrator<E> {
    /// Orchestrator without an identity resolver. Nothing can be keyed, so
    /// the cache is neither read nor written; use the builder's
    /// `identity_resolver` to enable it.
    pub fn new(cache: Arc<SuccessResultCache>) -> Self {
        Self::builder(cache).build()
    }

    pub fn builder(cache: Arc<SuccessResultCache>) -> ExtractionOrchestratorBuilder<E> {
        ExtractionOrchestratorBuilder::new(cache)
    }

    /// Appends a strategy to the end of the chain.
    pub fn add_strategy<S: ExtractionStrategy<E> + 'static>(&mut self, strategy: S) {
        self.chain.push(Arc::new(strategy));
    }

    pub fn strategy_names(&self) -> Vec<String> {
        self.chain.strategy_names()
    }

    pub fn cache(&self) -> &Arc<SuccessResultCache> {
        &self.cache
    }

    pub async fn extract(
        &self,
        element: &E,
        options: &ExtractionOptions,
    ) -> Result<MediaExtractionResult, AppError> {
        if self.chain.is_empty() {
            return Err(AppError::ChainNotConfigured);
        }

        let request_id = new_request_id();
        let identity = self
            .identity
            .as_ref()
            .and_then(|resolver| resolver.resolve(element))
            .filter(|t| t.has_valid_id());
        let key = identity.as_ref().map(|t| t.tweet_id.clone());

        self.reporter.report(ExtractionEvent::Started {
            request_id: &request_id,
            tweet_id: key.as_deref(),
        });

        if let Some(key) = key.as_deref()
            && let Some(mut cached) = self.cache.get(key)
        {
            self.reporter.report(ExtractionEvent::CacheHit {
                request_id: &request_id,
                tweet_id: key,
            });
            // Same tweet, possibly another photo of it.
            cached.clicked_index =
                clicked_media_position(element, &cached.media_items).unwrap_or(0);
            cached.metadata.cache_hit = Some(true);
            cached.metadata.request_id = Some(request_id);
            cached.metadata.central_metrics = Some(CentralMetrics {
                chain: ChainMetrics::default(),
                aggregate: self.metrics(),
            });
            return Ok(cached);
        }

        self.reporter.report(ExtractionEvent::CacheMiss {
            request_id: &request_id,
            tweet_id: key.as_deref(),
        });

        let outcome = self.chain.run(element, options, &request_id).await;
        self.report_failures(&request_id, &outcome);

        let ChainOutcome {
            mut result,
            metrics,
            failure_reasons,
        } = outcome;

        if !result.success {
            self.reporter.report(ExtractionEvent::Exhausted {
                request_id: &request_id,
                attempted: &metrics.attempted_strategies,
            });
            if !failure_reasons.is_empty() {
                result.errors = failure_reasons;
            }
            result.metadata.attempted_strategies = metrics.attempted_strategies;
            result.metadata.request_id = Some(request_id);
            return Ok(result);
        }

        if result.tweet_info.is_none() {
            result.tweet_info = identity;
        }
        self.record_duration(metrics.chain_duration_ms);

        result.metadata.cache_hit = Some(false);
        result.metadata.success_strategy = metrics.success_strategy.clone();
        result.metadata.attempted_strategies = metrics.attempted_strategies.clone();
        result.metadata.request_id = Some(request_id.clone());

        // Unresolved identity: key by what the strategy found, so the next
        // lookup that does resolve hits.
        let store_key = key.or_else(|| {
            self.identity
                .as_ref()
                .and(result.cache_key())
                .map(str::to_string)
        });
        if let Some(store_key) = &store_key {
            self.cache.set(store_key, result.clone());
        }

        self.reporter.report(ExtractionEvent::Succeeded {
            request_id: &request_id,
            strategy: &result.metadata.strategy,
            media_count: result.media_items.len(),
            duration_ms: metrics.chain_duration_ms,
        });

        result.metadata.central_metrics = Some(CentralMetrics {
            chain: metrics,
            aggregate: self.metrics(),
        });
        Ok(result)
    }

    fn report_failures(&self, request_id: &str, outcome: &ChainOutcome) {
        for (strategy, reason) in outcome
            .metrics
            .failed_strategies
            .iter()
            .zip(&outcome.failure_reasons)
        {
            let reason = reason
                .strip_prefix(strategy.as_str())
                .and_then(|r| r.strip_prefix(": "))
                .unwrap_or(reason);
            self.reporter.report(ExtractionEvent::StrategyFailed {
                request_id,
                strategy,
                reason,
            });
        }
    }

    fn record_duration(&self, duration_ms: f64) {
        let mut stats = self.stats.lock().unwrap_or_else(|p| p.into_inner());
        stats.successes += 1;
        stats.total_ms += duration_ms;
        stats.max_ms = stats.max_ms.max(duration_ms);
    }

    /// Running mean/max over successful chain runs plus the cache counters.
    pub fn metrics(&self) -> AggregateMetrics {
        let (avg, max) = {
            let stats = self.stats.lock().unwrap_or_else(|p| p.into_inner());
            let avg = if stats.successes == 0 {
                0.0
            } else {
                stats.total_ms / stats.successes as f64
            };
            (avg, stats.max_ms)
        };
        let cache = self.cache.metrics();
        AggregateMetrics {
            chain_duration_avg_ms: avg,
            chain_duration_max_ms: max,
            success_result_cache_size: cache.size,
            success_result_cache_evictions: cache.evictions,
            purge_count: cache.purge_count,
            ttl_evictions: cache.ttl_evictions,
        }
    }

    /// Stops the cache's background purge.
    pub fn dispose(&self) {
        self.cache.dispose();
    }
}

pub struct ExtractionOrchestratorBuilder<E: Element> {
    cache: Arc<SuccessResultCache>,
    chain: StrategyChainBuilder<E>,
    identity: Option<Arc<dyn IdentityResolver<E>>>,
    reporter: Arc<dyn ExtractionReporter>,
}

impl<E: Element> ExtractionOrchestratorBuilder<E> {
    fn new(cache: Arc<SuccessResultCache>) -> Self {
        Self {
            cache,
            chain: StrategyChainBuilder::new(),
            identity: None,
            reporter: Arc::new(TracingReporter),
        }
    }

    pub fn strategy<S: ExtractionStrategy<E> + 'static>(mut self, strategy: S) -> Self {
        self.chain = self.chain.add(strategy);
        self
    }

    pub fn shared_strategy(mut self, strategy: Arc<dyn ExtractionStrategy<E>>) -> Self {
        self.chain = self.chain.add_shared(strategy);
        self
    }

    pub fn identity_resolver<R: IdentityResolver<E> + 'static>(mut self, resolver: R) -> Self {
        self.identity = Some(Arc::new(resolver));
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.chain = self.chain.clock(clock);
        self
    }

    pub fn reporter<R: ExtractionReporter + 'static>(mut self, reporter: R) -> Self {
        self.reporter = Arc::new(reporter);
        self
    }

    pub fn build(self) -> ExtractionOrchestrator<E> {
        ExtractionOrchestrator {
            chain: self.chain.build(),
            cache: self.cache,
            identity: self.identity,
            reporter: self.reporter,
            stats: Mutex::new(DurationStats::default()),
        }
    }
}
