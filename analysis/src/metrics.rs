#[cfg(test)]
mod metrics_test;

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Resource usage of the benchmarked components during one run.
///
/// Component names are whatever the workload reports (e.g. `vtgate`, `vttablet`).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ExecutionMetrics {
    #[serde(default)]
    pub total_components_cpu_time: f64,
    #[serde(default)]
    pub components_cpu_time: BTreeMap<String, f64>,
    #[serde(default)]
    pub total_components_mem_stats_alloc_bytes: f64,
    #[serde(default)]
    pub components_mem_stats_alloc_bytes: BTreeMap<String, f64>,
}

impl ExecutionMetrics {
    /// Percent difference between two runs of lower-is-better metrics.
    ///
    /// Positive values are improvements (less CPU time, fewer bytes), negative values are
    /// degradations. See [`compare_safe`].
    pub fn compare_two(left: &Self, right: &Self) -> Self {
        Self {
            total_components_cpu_time: compare_safe(
                left.total_components_cpu_time,
                right.total_components_cpu_time,
            ),
            components_cpu_time: compare_safe_component_map(
                &left.components_cpu_time,
                &right.components_cpu_time,
            ),
            total_components_mem_stats_alloc_bytes: compare_safe(
                left.total_components_mem_stats_alloc_bytes,
                right.total_components_mem_stats_alloc_bytes,
            ),
            components_mem_stats_alloc_bytes: compare_safe_component_map(
                &left.components_mem_stats_alloc_bytes,
                &right.components_mem_stats_alloc_bytes,
            ),
        }
    }

    /// component-wise median over several runs
    pub fn median(runs: &[&Self]) -> Self {
        let total_cpu = runs.iter().map(|run| run.total_components_cpu_time).collect::<Vec<_>>();
        let total_mem = runs
            .iter()
            .map(|run| run.total_components_mem_stats_alloc_bytes)
            .collect::<Vec<_>>();

        Self {
            total_components_cpu_time: crate::math::median_of(&total_cpu),
            components_cpu_time: median_component_map(
                runs.iter().map(|run| &run.components_cpu_time),
            ),
            total_components_mem_stats_alloc_bytes: crate::math::median_of(&total_mem),
            components_mem_stats_alloc_bytes: median_component_map(
                runs.iter().map(|run| &run.components_mem_stats_alloc_bytes),
            ),
        }
    }
}

/// `(left - right) / left * 100`, where `left` is the old value.
///
/// A zero old value is a 100% degradation unless the new value is zero as well.
pub fn compare_safe(left: f64, right: f64) -> f64 {
    if left == 0.0 {
        if right == 0.0 {
            0.0
        } else {
            -100.0
        }
    } else {
        (left - right) / left * 100.0
    }
}

/// Components missing on the right side are reported as unchanged.
pub fn compare_safe_component_map(
    left: &BTreeMap<String, f64>,
    right: &BTreeMap<String, f64>,
) -> BTreeMap<String, f64> {
    left.keys()
        .chain(right.keys())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .map(|name| {
            let diff = match right.get(name) {
                Some(new) => compare_safe(left.get(name).copied().unwrap_or_default(), *new),
                None => 0.0,
            };

            (name.clone(), diff)
        })
        .collect()
}

fn median_component_map<'a, I: Iterator<Item = &'a BTreeMap<String, f64>>>(
    maps: I,
) -> BTreeMap<String, f64> {
    let mut values: BTreeMap<String, Vec<f64>> = BTreeMap::new();

    for map in maps {
        for (name, value) in map {
            values.entry(name.clone()).or_default().push(*value);
        }
    }

    values
        .into_iter()
        .map(|(name, values)| (name, crate::math::median_of(&values)))
        .collect()
}
