/// Pass timing and hot-path counters for the occlusion pipeline
/// Timings are emitted as `tracing` debug events when a scope ends
pub mod profiling;

pub use profiling::{CounterSnapshot, OcclusionCounters, OCCLUSION_COUNTERS};

use std::time::{Duration, Instant};

pub struct PerfTimer {
    name: &'static str,
    start: Instant,
}

impl PerfTimer {
    #[inline]
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            start: Instant::now(),
        }
    }

    #[inline]
    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }
}

impl Drop for PerfTimer {
    fn drop(&mut self) {
        let elapsed = self.elapsed();
        tracing::debug!(scope = self.name, elapsed_us = elapsed.as_micros() as u64, "perf");
    }
}

/// Time the rest of the enclosing scope under `$name`
#[macro_export]
macro_rules! perf_scope {
    ($name:expr) => {
        let _timer = $crate::perf::PerfTimer::new($name);
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timer_measures_forward() {
        let timer = PerfTimer::new("test");
        let first = timer.elapsed();
        let second = timer.elapsed();
        assert!(second >= first);
    }
}
