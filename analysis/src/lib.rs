//! Statistical comparison of benchmark samples and regression detection.
//!
//! Everything in here is pure computation over already collected numbers, the runner crate
//! decides when samples are produced and where the results go.

pub mod macrobench;
pub mod math;
pub mod metrics;
pub mod microbench;
pub mod stats;

pub use macrobench::{Comparison, Diff, MacroResult, MacroSamples, Qps, StatisticalCompareResults};
pub use metrics::ExecutionMetrics;
pub use microbench::{MicroComparison, MicroSamples};
pub use stats::{
    Comparator, Range, StatisticalResult, StatisticalSummary, Thresholds, DEFAULT_COMPARE_ALPHA,
    DEFAULT_CONFIDENCE,
};
