/// Hot-path instrumentation for the occlusion pipeline
/// Counters only advance when the `profiling` feature is enabled
use std::sync::atomic::{AtomicU64, Ordering};

/// Thread-safe counters for binning and rasterization work
pub struct OcclusionCounters {
    // Binning counters
    pub triangles_submitted: AtomicU64,
    pub triangles_binned: AtomicU64,
    pub bin_entries_written: AtomicU64,

    // Rasterization counters
    pub tiles_rasterized: AtomicU64,
    pub triangles_rasterized: AtomicU64,
    pub quads_tested: AtomicU64,
    pub pixels_tested: AtomicU64,

    // Query counters
    pub early_tests: AtomicU64,
    pub full_tests: AtomicU64,
}

impl OcclusionCounters {
    pub const fn new() -> Self {
        Self {
            triangles_submitted: AtomicU64::new(0),
            triangles_binned: AtomicU64::new(0),
            bin_entries_written: AtomicU64::new(0),
            tiles_rasterized: AtomicU64::new(0),
            triangles_rasterized: AtomicU64::new(0),
            quads_tested: AtomicU64::new(0),
            pixels_tested: AtomicU64::new(0),
            early_tests: AtomicU64::new(0),
            full_tests: AtomicU64::new(0),
        }
    }

    /// Zero every counter, e.g. between frames
    pub fn reset(&self) {
        self.triangles_submitted.store(0, Ordering::Relaxed);
        self.triangles_binned.store(0, Ordering::Relaxed);
        self.bin_entries_written.store(0, Ordering::Relaxed);
        self.tiles_rasterized.store(0, Ordering::Relaxed);
        self.triangles_rasterized.store(0, Ordering::Relaxed);
        self.quads_tested.store(0, Ordering::Relaxed);
        self.pixels_tested.store(0, Ordering::Relaxed);
        self.early_tests.store(0, Ordering::Relaxed);
        self.full_tests.store(0, Ordering::Relaxed);
    }

    /// Read every counter (not atomic across counters)
    pub fn snapshot(&self) -> CounterSnapshot {
        CounterSnapshot {
            triangles_submitted: self.triangles_submitted.load(Ordering::Relaxed),
            triangles_binned: self.triangles_binned.load(Ordering::Relaxed),
            bin_entries_written: self.bin_entries_written.load(Ordering::Relaxed),
            tiles_rasterized: self.tiles_rasterized.load(Ordering::Relaxed),
            triangles_rasterized: self.triangles_rasterized.load(Ordering::Relaxed),
            quads_tested: self.quads_tested.load(Ordering::Relaxed),
            pixels_tested: self.pixels_tested.load(Ordering::Relaxed),
            early_tests: self.early_tests.load(Ordering::Relaxed),
            full_tests: self.full_tests.load(Ordering::Relaxed),
        }
    }
}

/// Plain copy of every counter
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CounterSnapshot {
    pub triangles_submitted: u64,
    pub triangles_binned: u64,
    pub bin_entries_written: u64,
    pub tiles_rasterized: u64,
    pub triangles_rasterized: u64,
    pub quads_tested: u64,
    pub pixels_tested: u64,
    pub early_tests: u64,
    pub full_tests: u64,
}

impl CounterSnapshot {
    /// Emit a formatted report at debug level
    pub fn log_report(&self) {
        tracing::debug!(
            submitted = self.triangles_submitted,
            binned = self.triangles_binned,
            bin_entries = self.bin_entries_written,
            "binning counters"
        );
        tracing::debug!(
            tiles = self.tiles_rasterized,
            triangles = self.triangles_rasterized,
            quads = self.quads_tested,
            pixels = self.pixels_tested,
            "rasterization counters"
        );
        tracing::debug!(
            early = self.early_tests,
            full = self.full_tests,
            "query counters"
        );
    }
}

/// Global counters instance
pub static OCCLUSION_COUNTERS: OcclusionCounters = OcclusionCounters::new();

/// Bump a counter by one; compiled out without the `profiling` feature
#[macro_export]
macro_rules! count_call {
    ($counter:expr) => {
        #[cfg(feature = "profiling")]
        {
            $counter.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
        }
    };
}

/// Add `$value` to a counter; compiled out without the `profiling` feature
#[macro_export]
macro_rules! count_add {
    ($counter:expr, $value:expr) => {
        #[cfg(feature = "profiling")]
        {
            $counter.fetch_add($value as u64, std::sync::atomic::Ordering::Relaxed);
        }
    };
}
