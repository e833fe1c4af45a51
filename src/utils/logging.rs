use log::{log_enabled, warn, Level};
use serde::Serialize;
use std::time::{Duration, Instant};

/// Wall-clock time spent in each phase of one sync pass.
#[derive(Debug, Default, Clone, Copy, PartialEq, Serialize)]
pub struct PassProfile {
    pub traversal: Duration,
    pub motion: Duration,
    pub translate: Duration,
    pub link: Duration,
    pub total: Duration,
}

impl PassProfile {
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// Scoped timer for a sync phase; adds its elapsed time to `output` on drop.
pub struct ScopedTimer<'a> {
    label: &'a str,
    start: Instant,
    output: &'a mut Duration,
}

impl<'a> ScopedTimer<'a> {
    pub fn new(label: &'a str, output: &'a mut Duration) -> Self {
        if log_enabled!(Level::Trace) {
            log::trace!("start {label}");
        }
        Self {
            label,
            start: Instant::now(),
            output,
        }
    }
}

impl<'a> Drop for ScopedTimer<'a> {
    fn drop(&mut self) {
        let elapsed = self.start.elapsed();
        *self.output += elapsed;
        if log_enabled!(Level::Trace) {
            log::trace!("end {} ({} µs)", self.label, elapsed.as_micros());
        }
    }
}

/// Warns when a sync pass exceeds its time budget.
pub fn warn_if_pass_budget_exceeded(duration: Duration, budget_ms: f32) {
    if duration.as_secs_f32() * 1000.0 > budget_ms {
        warn!(
            "Sync pass exceeded budget: {:.2} ms > {:.2} ms",
            duration.as_secs_f32() * 1000.0,
            budget_ms
        );
    }
}
