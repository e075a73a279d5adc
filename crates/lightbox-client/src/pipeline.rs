//! Default wiring of strategies, cache and service.

use std::sync::Arc;

use lightbox_core::cache::SuccessResultCache;
use lightbox_core::config::{OrchestratorConfig, ServiceConfig};
use lightbox_core::orchestrator::{ExtractionOrchestrator, ExtractionOrchestratorBuilder};
use lightbox_core::reporter::ExtractionReporter;
use lightbox_core::retry::with_retry;
use lightbox_core::service::MediaExtractionService;
use lightbox_core::traits::{Element, TweetLookup};

use crate::identity::DomIdentityResolver;
use crate::strategies::{
    ApiStrategy, DataAttributeFallbackStrategy, DomAttributesStrategy, DomMediaStrategy,
    UrlPathStrategy,
};

/// Retries the API strategy gets on top of the client's own retries.
pub const API_STRATEGY_RETRIES: u32 = 1;

fn with_dom_strategies<E: Element>(
    builder: ExtractionOrchestratorBuilder<E>,
) -> ExtractionOrchestratorBuilder<E> {
    builder
        .strategy(DomAttributesStrategy::new())
        .strategy(DomMediaStrategy::new())
        .strategy(UrlPathStrategy::new())
        .strategy(DataAttributeFallbackStrategy::new())
}

/// Builds the primary (API + DOM) and DOM-only orchestrators over one cache.
pub struct Pipeline {
    orchestrator: OrchestratorConfig,
    service: ServiceConfig,
    lookup: Option<Arc<dyn TweetLookup>>,
    reporter: Option<Arc<dyn ExtractionReporter>>,
}

impl Pipeline {
    pub fn new(orchestrator: OrchestratorConfig, service: ServiceConfig) -> Self {
        Self {
            orchestrator,
            service,
            lookup: None,
            reporter: None,
        }
    }

    /// Enables the API strategy, unless the service config turns it off.
    pub fn lookup<L: TweetLookup + 'static>(mut self, lookup: L) -> Self {
        self.lookup = Some(Arc::new(lookup));
        self
    }

    pub fn reporter<R: ExtractionReporter + 'static>(mut self, reporter: R) -> Self {
        self.reporter = Some(Arc::new(reporter));
        self
    }

    fn orchestrator_builder<E: Element>(
        &self,
        cache: &Arc<SuccessResultCache>,
    ) -> ExtractionOrchestratorBuilder<E> {
        let builder =
            ExtractionOrchestrator::builder(Arc::clone(cache)).identity_resolver(DomIdentityResolver::new());
        match &self.reporter {
            Some(reporter) => builder.reporter(Arc::clone(reporter)),
            None => builder,
        }
    }

    pub fn build<E: Element>(self) -> MediaExtractionService<E> {
        let cache = Arc::new(SuccessResultCache::new(self.orchestrator.cache_config()));

        let mut primary = self.orchestrator_builder(&cache);
        if self.service.api_enabled
            && let Some(lookup) = &self.lookup
        {
            primary = primary.strategy(with_retry(
                ApiStrategy::new(Arc::clone(lookup)),
                API_STRATEGY_RETRIES,
            ));
        }
        let primary = with_dom_strategies(primary).build();
        let fallback = with_dom_strategies(self.orchestrator_builder(&cache)).build();

        let service = MediaExtractionService::new(primary, self.service.clone()).with_fallback(fallback);
        match self.reporter {
            Some(reporter) => service.with_reporter(reporter),
            None => service,
        }
    }
}
