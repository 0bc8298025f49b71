#[cfg(test)]
mod macrobench_test;

use crate::{
    math::median_of,
    metrics::{compare_safe, ExecutionMetrics},
    stats::{Comparator, StatisticalResult},
};
use serde::{Deserialize, Serialize};
use std::{collections::BTreeMap, fmt::Write};

/// CPU time increase (percent) reported as a regression
pub const CPU_TIME_THRESHOLD: f64 = 5.0;
/// TPS and QPS decrease (percent) reported as a regression
pub const THROUGHPUT_THRESHOLD: f64 = 10.0;
/// latency increase (percent) reported as a regression
pub const LATENCY_THRESHOLD: f64 = 10.0;

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Qps {
    #[serde(default)]
    pub total: f64,
    #[serde(default)]
    pub reads: f64,
    #[serde(default)]
    pub writes: f64,
    #[serde(default)]
    pub other: f64,
}

/// One iteration of a macro benchmark (OLTP, TPCC, ...)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MacroResult {
    #[serde(default)]
    pub qps: Qps,
    #[serde(default)]
    pub tps: f64,
    #[serde(default)]
    pub latency: f64,
    #[serde(default)]
    pub errors: f64,
    #[serde(default)]
    pub metrics: ExecutionMetrics,
}

/// Column view over many `MacroResult`s, one sample per metric.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MacroSamples {
    pub total_qps: Vec<f64>,
    pub reads_qps: Vec<f64>,
    pub writes_qps: Vec<f64>,
    pub other_qps: Vec<f64>,
    pub tps: Vec<f64>,
    pub latency: Vec<f64>,
    pub errors: Vec<f64>,
    pub total_components_cpu_time: Vec<f64>,
    pub components_cpu_time: BTreeMap<String, Vec<f64>>,
    pub total_components_mem_stats_alloc_bytes: Vec<f64>,
    pub components_mem_stats_alloc_bytes: BTreeMap<String, Vec<f64>>,
}

impl MacroSamples {
    pub fn from_results<'a, I: IntoIterator<Item = &'a MacroResult>>(results: I) -> Self {
        let mut samples = Self::default();

        for result in results {
            samples.total_qps.push(result.qps.total);
            samples.reads_qps.push(result.qps.reads);
            samples.writes_qps.push(result.qps.writes);
            samples.other_qps.push(result.qps.other);
            samples.tps.push(result.tps);
            samples.latency.push(result.latency);
            samples.errors.push(result.errors);
            samples
                .total_components_cpu_time
                .push(result.metrics.total_components_cpu_time);
            samples
                .total_components_mem_stats_alloc_bytes
                .push(result.metrics.total_components_mem_stats_alloc_bytes);

            for (name, value) in result.metrics.components_cpu_time.iter() {
                samples
                    .components_cpu_time
                    .entry(name.clone())
                    .or_default()
                    .push(*value);
            }
            for (name, value) in result.metrics.components_mem_stats_alloc_bytes.iter() {
                samples
                    .components_mem_stats_alloc_bytes
                    .entry(name.clone())
                    .or_default()
                    .push(*value);
            }
        }

        samples
    }

    pub fn len(&self) -> usize {
        self.tps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tps.is_empty()
    }
}

/// Outcome of comparing every metric of two macro benchmark samples.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StatisticalCompareResults {
    pub total_qps: StatisticalResult,
    pub reads_qps: StatisticalResult,
    pub writes_qps: StatisticalResult,
    pub other_qps: StatisticalResult,
    pub tps: StatisticalResult,
    pub latency: StatisticalResult,
    pub errors: StatisticalResult,
    pub total_components_cpu_time: StatisticalResult,
    pub components_cpu_time: BTreeMap<String, StatisticalResult>,
    pub total_components_mem_stats_alloc_bytes: StatisticalResult,
    pub components_mem_stats_alloc_bytes: BTreeMap<String, StatisticalResult>,
}

impl StatisticalCompareResults {
    /// Compare every metric, components are keyed by the old sample.
    pub fn analyze(comparator: &Comparator, old: &MacroSamples, new: &MacroSamples) -> Self {
        let compare_components =
            |old: &BTreeMap<String, Vec<f64>>, new: &BTreeMap<String, Vec<f64>>| {
                old.iter()
                    .map(|(name, values)| {
                        let new_values = new.get(name).map(Vec::as_slice).unwrap_or_default();
                        (name.clone(), comparator.compare(values, new_values))
                    })
                    .collect::<BTreeMap<_, _>>()
            };

        Self {
            total_qps: comparator.compare(&old.total_qps, &new.total_qps),
            reads_qps: comparator.compare(&old.reads_qps, &new.reads_qps),
            writes_qps: comparator.compare(&old.writes_qps, &new.writes_qps),
            other_qps: comparator.compare(&old.other_qps, &new.other_qps),
            tps: comparator.compare(&old.tps, &new.tps),
            latency: comparator.compare(&old.latency, &new.latency),
            errors: comparator.compare(&old.errors, &new.errors),
            total_components_cpu_time: comparator
                .compare(&old.total_components_cpu_time, &new.total_components_cpu_time),
            components_cpu_time: compare_components(
                &old.components_cpu_time,
                &new.components_cpu_time,
            ),
            total_components_mem_stats_alloc_bytes: comparator.compare(
                &old.total_components_mem_stats_alloc_bytes,
                &new.total_components_mem_stats_alloc_bytes,
            ),
            components_mem_stats_alloc_bytes: compare_components(
                &old.components_mem_stats_alloc_bytes,
                &new.components_mem_stats_alloc_bytes,
            ),
        }
    }
}

/// Percent differences of the query results, positive is better.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Diff {
    pub qps: Qps,
    pub tps: f64,
    pub latency: f64,
    pub errors: f64,
}

/// Difference between an old and a new macro benchmark.
///
/// Every field uses the same convention: positive values are improvements and negative
/// values degradations, whatever the direction of the underlying metric. A 10% latency
/// increase is stored as `-10`, a 10% TPS increase as `10`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Comparison {
    pub diff: Diff,
    pub diff_metrics: ExecutionMetrics,
}

/// improvement of a higher-is-better metric, insignificant results count as unchanged
fn gain(result: &StatisticalResult) -> f64 {
    if result.insignificant {
        0.0
    } else {
        result.delta_percent
    }
}

/// improvement of a lower-is-better metric
fn saving(result: &StatisticalResult) -> f64 {
    -gain(result)
}

/// like `compare_safe` but for metrics where more is better
fn compare_safe_higher(old: f64, new: f64) -> f64 {
    -compare_safe(old, new)
}

impl Comparison {
    pub fn from_statistics(results: &StatisticalCompareResults) -> Self {
        Self {
            diff: Diff {
                qps: Qps {
                    total: gain(&results.total_qps),
                    reads: gain(&results.reads_qps),
                    writes: gain(&results.writes_qps),
                    other: gain(&results.other_qps),
                },
                tps: gain(&results.tps),
                latency: saving(&results.latency),
                errors: saving(&results.errors),
            },
            diff_metrics: ExecutionMetrics {
                total_components_cpu_time: saving(&results.total_components_cpu_time),
                components_cpu_time: results
                    .components_cpu_time
                    .iter()
                    .map(|(name, result)| (name.clone(), saving(result)))
                    .collect(),
                total_components_mem_stats_alloc_bytes: saving(
                    &results.total_components_mem_stats_alloc_bytes,
                ),
                components_mem_stats_alloc_bytes: results
                    .components_mem_stats_alloc_bytes
                    .iter()
                    .map(|(name, result)| (name.clone(), saving(result)))
                    .collect(),
            },
        }
    }

    /// Compare the medians of both sides without any significance test.
    pub fn from_medians(old: &[MacroResult], new: &[MacroResult]) -> Self {
        let old_median = median_result(old);
        let new_median = median_result(new);

        Self {
            diff: Diff {
                qps: Qps {
                    total: compare_safe_higher(old_median.qps.total, new_median.qps.total),
                    reads: compare_safe_higher(old_median.qps.reads, new_median.qps.reads),
                    writes: compare_safe_higher(old_median.qps.writes, new_median.qps.writes),
                    other: compare_safe_higher(old_median.qps.other, new_median.qps.other),
                },
                tps: compare_safe_higher(old_median.tps, new_median.tps),
                latency: compare_safe(old_median.latency, new_median.latency),
                errors: compare_safe(old_median.errors, new_median.errors),
            },
            diff_metrics: ExecutionMetrics::compare_two(&old_median.metrics, &new_median.metrics),
        }
    }

    /// Human readable list of regressions, empty if nothing crossed its threshold.
    pub fn regression(&self) -> String {
        let mut reason = String::new();

        if self.diff.tps <= -THROUGHPUT_THRESHOLD {
            let _ = writeln!(reason, "- TPS decreased by {:.2}%", -self.diff.tps);
        }
        if self.diff.qps.total <= -THROUGHPUT_THRESHOLD {
            let _ = writeln!(reason, "- QPS decreased by {:.2}%", -self.diff.qps.total);
        }
        if self.diff.latency <= -LATENCY_THRESHOLD {
            let _ = writeln!(reason, "- Latency increased by {:.2}%", -self.diff.latency);
        }
        if self.diff_metrics.total_components_cpu_time <= -CPU_TIME_THRESHOLD {
            let _ = writeln!(
                reason,
                "- Total CPU time increased by {:.2}%",
                -self.diff_metrics.total_components_cpu_time
            );
        }
        for (component, diff) in self.diff_metrics.components_cpu_time.iter() {
            if *diff <= -CPU_TIME_THRESHOLD {
                let _ = writeln!(reason, "- {component} CPU time increased by {:.2}%", -diff);
            }
        }

        reason
    }
}

fn median_result(results: &[MacroResult]) -> MacroResult {
    let samples = MacroSamples::from_results(results);

    MacroResult {
        qps: Qps {
            total: median_of(&samples.total_qps),
            reads: median_of(&samples.reads_qps),
            writes: median_of(&samples.writes_qps),
            other: median_of(&samples.other_qps),
        },
        tps: median_of(&samples.tps),
        latency: median_of(&samples.latency),
        errors: median_of(&samples.errors),
        metrics: ExecutionMetrics::median(&results.iter().map(|result| &result.metrics).collect::<Vec<_>>()),
    }
}
