//! Spans shared by the sync engines.

use std::time::{Duration, Instant};
use tracing::{info_span, Span};

/// Span around one forward render pass.
pub fn render_pass_span(trigger: &str) -> Span {
    info_span!("render_pass", trigger = %trigger)
}

/// Span around one back-sync replay of `count` commits.
pub fn replay_span(from: &str, to: &str, count: usize) -> Span {
    info_span!("replay", from = %from, to = %to, commits = count)
}

/// Wall-clock timer that logs at debug level when finished.
pub struct Timer {
    start: Instant,
    operation: &'static str,
}

impl Timer {
    /// Start a new timer.
    pub fn start(operation: &'static str) -> Self {
        Self {
            start: Instant::now(),
            operation,
        }
    }

    /// Time elapsed so far.
    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    /// Complete the timer and record duration.
    pub fn finish(self) -> Duration {
        let duration = self.start.elapsed();
        tracing::debug!(
            operation = %self.operation,
            duration_ms = %duration.as_millis(),
            "operation completed"
        );
        duration
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing_subscriber::EnvFilter;

    fn with_subscriber<F>(f: F)
    where
        F: FnOnce(),
    {
        let subscriber = tracing_subscriber::fmt()
            .with_test_writer()
            .with_env_filter(EnvFilter::new("trace"))
            .finish();

        tracing::subscriber::with_default(subscriber, f);
    }

    #[test]
    fn test_nested_spans() {
        with_subscriber(|| {
            let pass = render_pass_span("file change");
            let _outer = pass.enter();
            let replay = replay_span("abc123", "def456", 2);
            let _inner = replay.enter();
            tracing::info!("nested");
        });
    }

    #[test]
    fn test_timer_measures() {
        let timer = Timer::start("sleep");
        std::thread::sleep(Duration::from_millis(10));
        assert!(timer.finish() >= Duration::from_millis(10));
    }
}
