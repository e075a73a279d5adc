/// Events emitted while extracting, for monitoring/logging.
#[derive(Debug, Clone)]
pub enum ExtractionEvent<'a> {
    Started {
        request_id: &'a str,
        tweet_id: Option<&'a str>,
    },
    CacheHit {
        request_id: &'a str,
        tweet_id: &'a str,
    },
    CacheMiss {
        request_id: &'a str,
        tweet_id: Option<&'a str>,
    },
    StrategyFailed {
        request_id: &'a str,
        strategy: &'a str,
        reason: &'a str,
    },
    Succeeded {
        request_id: &'a str,
        strategy: &'a str,
        media_count: usize,
        duration_ms: f64,
    },
    Exhausted {
        request_id: &'a str,
        attempted: &'a [String],
    },
    TimedOut {
        request_id: &'a str,
        timeout_ms: u64,
    },
    FallbackUsed {
        request_id: &'a str,
        success: bool,
    },
}

impl ExtractionEvent<'_> {
    /// Short label, used by recorders and as a log field.
    pub fn kind(&self) -> &'static str {
        match self {
            ExtractionEvent::Started { .. } => "Started",
            ExtractionEvent::CacheHit { .. } => "CacheHit",
            ExtractionEvent::CacheMiss { .. } => "CacheMiss",
            ExtractionEvent::StrategyFailed { .. } => "StrategyFailed",
            ExtractionEvent::Succeeded { .. } => "Succeeded",
            ExtractionEvent::Exhausted { .. } => "Exhausted",
            ExtractionEvent::TimedOut { .. } => "TimedOut",
            ExtractionEvent::FallbackUsed { .. } => "FallbackUsed",
        }
    }
}

/// Trait for receiving extraction events (decoupled logging).
///
/// Called synchronously on the extraction path, so implementations must not block.
pub trait ExtractionReporter: Send + Sync {
    fn report(&self, event: ExtractionEvent<'_>) {
        let _ = event;
    }
}

/// Reporter that uses the `tracing` crate.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingReporter;

impl ExtractionReporter for TracingReporter {
    fn report(&self, event: ExtractionEvent<'_>) {
        match event {
            ExtractionEvent::Started {
                request_id,
                tweet_id,
            } => {
                tracing::debug!(%request_id, ?tweet_id, "Extraction started");
            }
            ExtractionEvent::CacheHit {
                request_id,
                tweet_id,
            } => {
                tracing::debug!(%request_id, %tweet_id, "Success cache hit");
            }
            ExtractionEvent::CacheMiss {
                request_id,
                tweet_id,
            } => {
                tracing::debug!(%request_id, ?tweet_id, "Success cache miss");
            }
            ExtractionEvent::StrategyFailed {
                request_id,
                strategy,
                reason,
            } => {
                tracing::debug!(%request_id, %strategy, %reason, "Strategy failed");
            }
            ExtractionEvent::Succeeded {
                request_id,
                strategy,
                media_count,
                duration_ms,
            } => {
                tracing::info!(
                    %request_id,
                    %strategy,
                    media_count,
                    duration_ms,
                    "Extraction succeeded"
                );
            }
            ExtractionEvent::Exhausted {
                request_id,
                attempted,
            } => {
                tracing::warn!(%request_id, ?attempted, "All extraction strategies failed");
            }
            ExtractionEvent::TimedOut {
                request_id,
                timeout_ms,
            } => {
                tracing::warn!(%request_id, timeout_ms, "Extraction timed out, using DOM fallback");
            }
            ExtractionEvent::FallbackUsed {
                request_id,
                success,
            } => {
                tracing::info!(%request_id, success, "DOM fallback finished");
            }
        }
    }
}

impl<R: ExtractionReporter + ?Sized> ExtractionReporter for std::sync::Arc<R> {
    fn report(&self, event: ExtractionEvent<'_>) {
        (**self).report(event);
    }
}
