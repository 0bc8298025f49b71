use crate::{
    math::median_of,
    metrics::compare_safe,
    stats::{Comparator, StatisticalResult},
};
use serde::{Deserialize, Serialize};
use std::{collections::BTreeMap, fmt::Write};

/// slowdown (percent) of a single micro benchmark reported as a regression
pub const MICRO_THRESHOLD: f64 = 10.0;

/// benchmark name -> ns/op of every iteration
pub type MicroSamples = BTreeMap<String, Vec<f64>>;

/// Per benchmark improvement in percent, positive means faster.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MicroComparison {
    pub diff: BTreeMap<String, f64>,
}

impl MicroComparison {
    /// statistical comparison of every benchmark present in the old sample
    pub fn analyze(
        comparator: &Comparator,
        old: &MicroSamples,
        new: &MicroSamples,
    ) -> BTreeMap<String, StatisticalResult> {
        old.iter()
            .map(|(name, values)| {
                let new_values = new.get(name).map(Vec::as_slice).unwrap_or_default();

                (name.clone(), comparator.compare(values, new_values))
            })
            .collect()
    }

    pub fn from_statistics(results: &BTreeMap<String, StatisticalResult>) -> Self {
        Self {
            diff: results
                .iter()
                .map(|(name, result)| {
                    let diff = if result.insignificant {
                        0.0
                    } else {
                        -result.delta_percent
                    };

                    (name.clone(), diff)
                })
                .collect(),
        }
    }

    pub fn from_medians(old: &MicroSamples, new: &MicroSamples) -> Self {
        Self {
            diff: old
                .iter()
                .filter_map(|(name, values)| {
                    new.get(name).map(|new_values| {
                        (
                            name.clone(),
                            compare_safe(median_of(values), median_of(new_values)),
                        )
                    })
                })
                .collect(),
        }
    }

    pub fn regression(&self) -> String {
        let mut reason = String::new();

        for (name, diff) in self.diff.iter() {
            if *diff <= -MICRO_THRESHOLD {
                let _ = writeln!(reason, "- {name} decreased by {:.2}%", -diff);
            }
        }

        reason
    }
}
