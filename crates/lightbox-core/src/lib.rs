pub mod cache;
pub mod chain;
pub mod clock;
pub mod config;
pub mod error;
pub mod media_url;
pub mod models;
pub mod orchestrator;
pub mod patterns;
pub mod reporter;
pub mod retry;
pub mod service;
pub mod traits;

#[cfg(any(test, feature = "testutil"))]
pub mod testutil;

pub use cache::{CacheConfig, CacheMetrics, SuccessResultCache};
pub use chain::{ChainMiddleware, ChainOutcome, MiddlewareDecision, StrategyChain};
pub use clock::{Clock, TokioClock};
pub use config::{OrchestratorConfig, ServiceConfig};
pub use error::AppError;
pub use models::{
    AggregateMetrics, ApiMedia, CentralMetrics, ChainMetrics, ExtractionOptions,
    MediaExtractionResult, MediaInfo, MediaType, TweetInfo,
};
pub use orchestrator::ExtractionOrchestrator;
pub use reporter::{ExtractionEvent, ExtractionReporter, TracingReporter};
pub use retry::{RetryingStrategy, with_retry};
pub use service::MediaExtractionService;
pub use traits::{Element, ExtractionStrategy, IdentityResolver, StrategyReport, TweetLookup};
