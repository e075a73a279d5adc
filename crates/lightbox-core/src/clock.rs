use std::fmt::Debug;
use std::time::Instant;

/// Source of "now" for TTL and duration math.
pub trait Clock: Send + Sync + Debug {
    fn now(&self) -> Instant;
}

/// Clock backed by the tokio time driver, so paused test time applies.
#[derive(Debug, Default, Clone, Copy)]
pub struct TokioClock;

impl Clock for TokioClock {
    fn now(&self) -> Instant {
        tokio::time::Instant::now().into_std()
    }
}

/// Milliseconds between two instants as a float, saturating at zero.
pub fn elapsed_ms(start: Instant, end: Instant) -> f64 {
    end.saturating_duration_since(start).as_secs_f64() * 1000.0
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_tokio_clock_follows_paused_time() {
        let clock = TokioClock;
        let start = clock.now();
        tokio::time::advance(Duration::from_millis(250)).await;
        let elapsed = elapsed_ms(start, clock.now());
        assert!((elapsed - 250.0).abs() < 1.0, "elapsed = {elapsed}");
    }

    #[test]
    fn test_elapsed_saturates() {
        let now = Instant::now();
        let later = now + Duration::from_millis(5);
        assert_eq!(elapsed_ms(later, now), 0.0);
        assert!((elapsed_ms(now, later) - 5.0).abs() < f64::EPSILON * 1000.0);
    }
}
