mod mann_whitney;
#[cfg(test)]
mod stats_test;

use crate::math::{median, sorted_finite};
use serde::{Deserialize, Serialize};
use statrs::distribution::{Binomial, DiscreteCDF};

pub use mann_whitney::{mann_whitney_u, MannWhitney, EXACT_LIMIT};

/// confidence level used for summaries unless configured otherwise
pub const DEFAULT_CONFIDENCE: f64 = 0.95;

/// significance level below which two samples are considered different
pub const DEFAULT_COMPARE_ALPHA: f64 = 0.05;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Thresholds {
    /// p-values above this are reported as insignificant
    #[serde(default = "default_alpha")]
    pub compare_alpha: f64,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            compare_alpha: DEFAULT_COMPARE_ALPHA,
        }
    }
}

fn default_alpha() -> f64 {
    DEFAULT_COMPARE_ALPHA
}

/// Width of a confidence interval relative to its center.
///
/// `value_percent` only carries meaning when neither `infinite` nor `unknown` is set.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Range {
    pub infinite: bool,
    pub unknown: bool,
    pub value_percent: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct StatisticalSummary {
    pub center: f64,
    pub confidence: f64,
    pub range: Range,
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct StatisticalResult {
    pub insignificant: bool,
    pub delta_percent: f64,
    pub p_value: f64,
    pub sample_size_old: usize,
    pub sample_size_new: usize,
    pub old: StatisticalSummary,
    pub new: StatisticalSummary,
}

/// Distribution free comparison of two samples.
///
/// Summaries use the median with an order statistic confidence interval, comparisons use the
/// Mann-Whitney U test. Neither assumes normality, so a few outliers in a benchmark sample do
/// not move the result much.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Comparator {
    pub confidence: f64,
    pub thresholds: Thresholds,
}

impl Default for Comparator {
    fn default() -> Self {
        Self {
            confidence: DEFAULT_CONFIDENCE,
            thresholds: Thresholds::default(),
        }
    }
}

impl Comparator {
    pub fn new(confidence: f64, thresholds: Thresholds) -> Self {
        Self {
            confidence,
            thresholds,
        }
    }

    /// Summarize a sample as its median and a confidence interval around it.
    ///
    /// An empty sample yields a zero center with `unknown` set. Samples too small to reach
    /// the requested confidence (fewer than 6 values at 0.95) get an `infinite` range, this
    /// includes the single value case. NaN values are ignored.
    pub fn summarize(&self, sample: &[f64]) -> StatisticalSummary {
        let sorted = sorted_finite(sample);

        if sorted.is_empty() {
            return StatisticalSummary {
                center: 0.0,
                confidence: self.confidence,
                range: Range {
                    infinite: false,
                    unknown: true,
                    value_percent: 0.0,
                },
            };
        }

        let center = median(&sorted);
        let range = match median_interval(&sorted, self.confidence) {
            None => Range {
                infinite: true,
                unknown: false,
                value_percent: 0.0,
            },
            Some((lo, hi)) => range_of(center, lo, hi),
        };

        StatisticalSummary {
            center,
            confidence: self.confidence,
            range,
        }
    }

    /// Compare an old and a new sample.
    ///
    /// `delta_percent` is `(new / old - 1) * 100` on the medians and is 0 when the old center
    /// is 0 or both centers are equal. Because it is a ratio, swapping the samples does not
    /// exactly negate it: 10 -> 20 is +100% while 20 -> 10 is -50%. Only the sign flips.
    ///
    /// A side with fewer than 2 finite values is never significant (`p_value` 1), the delta of
    /// the medians is still reported.
    pub fn compare(&self, old: &[f64], new: &[f64]) -> StatisticalResult {
        let old_summary = self.summarize(old);
        let new_summary = self.summarize(new);
        let (old_sorted, new_sorted) = (sorted_finite(old), sorted_finite(new));

        // a single value says nothing about spread, however large the other side is
        let degenerate = old_sorted.len() < 2 || new_sorted.len() < 2;
        let test = if degenerate {
            MannWhitney {
                n1: old_sorted.len(),
                n2: new_sorted.len(),
                u: 0.0,
                p_value: 1.0,
            }
        } else {
            mann_whitney_u(&old_sorted, &new_sorted)
        };

        let delta_percent = if old_summary.center == new_summary.center
            || old_summary.center == 0.0
        {
            0.0
        } else {
            ((new_summary.center / old_summary.center) - 1.0) * 100.0
        };

        StatisticalResult {
            insignificant: test.p_value > self.thresholds.compare_alpha,
            delta_percent,
            p_value: test.p_value,
            sample_size_old: test.n1,
            sample_size_new: test.n2,
            old: old_summary,
            new: new_summary,
        }
    }
}

/// Order statistic interval `[x(j), x(n-j+1)]` around the median.
///
/// The number of values below the median is Binomial(n, 1/2), so the interval covers the
/// median with probability `1 - 2 * P(B <= j - 1)`. `j` is picked as large as possible while
/// still reaching `confidence`. Returns `None` if even the full sample range is not enough.
fn median_interval(sorted: &[f64], confidence: f64) -> Option<(f64, f64)> {
    let n = sorted.len();
    let binomial = Binomial::new(0.5, n as u64).ok()?;
    let tail = 1.0 - confidence;

    let mut best = None;
    let mut j = 1;
    while j <= (n + 1) / 2 && 2.0 * binomial.cdf((j - 1) as u64) <= tail {
        best = Some(j);
        j += 1;
    }

    best.map(|j| (sorted[j - 1], sorted[n - j]))
}

fn range_of(center: f64, lo: f64, hi: f64) -> Range {
    // percent of center is meaningless once the bounds cross zero
    if center.is_sign_negative() != lo.is_sign_negative()
        || center.is_sign_negative() != hi.is_sign_negative()
    {
        return Range {
            infinite: false,
            unknown: true,
            value_percent: 0.0,
        };
    }

    let value_percent = if center == 0.0 {
        0.0
    } else {
        f64::max(hi / center - 1.0, 1.0 - lo / center) * 100.0
    };

    Range {
        infinite: false,
        unknown: false,
        value_percent,
    }
}
