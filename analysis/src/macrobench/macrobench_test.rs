use super::{Comparison, Diff, MacroResult, MacroSamples, Qps, StatisticalCompareResults};
use crate::{
    metrics::ExecutionMetrics,
    stats::{Comparator, StatisticalResult},
};
use std::collections::BTreeMap;

fn cpu(total: f64, components: &[(&str, f64)]) -> Comparison {
    Comparison {
        diff_metrics: ExecutionMetrics {
            total_components_cpu_time: total,
            components_cpu_time: components
                .iter()
                .map(|(name, value)| (name.to_string(), *value))
                .collect(),
            ..Default::default()
        },
        ..Default::default()
    }
}

fn result(diff: Diff) -> Comparison {
    Comparison {
        diff,
        ..Default::default()
    }
}

#[test]
pub fn regression_fixtures() {
    let cases = [
        ("No regression", Comparison::default(), ""),
        (
            "Total CPU time increase (1)",
            cpu(-100.0, &[]),
            "- Total CPU time increased by 100.00%\n",
        ),
        (
            "Total CPU time increase (2)",
            cpu(-5.0, &[]),
            "- Total CPU time increased by 5.00%\n",
        ),
        ("Total CPU time no increase", cpu(-4.0, &[]), ""),
        (
            "VTTablet time increase",
            cpu(0.0, &[("vttablet", -35.0)]),
            "- vttablet CPU time increased by 35.00%\n",
        ),
        ("VTTablet time no increase", cpu(0.0, &[("vttablet", -3.59)]), ""),
        (
            "VTGate time increase",
            cpu(0.0, &[("vtgate", -11.98)]),
            "- vtgate CPU time increased by 11.98%\n",
        ),
        ("VTGate time no increase", cpu(0.0, &[("vtgate", -4.99)]), ""),
        (
            "VTGate and VTTablet times increase",
            cpu(0.0, &[("vtgate", -5.0), ("vttablet", -5.0)]),
            "- vtgate CPU time increased by 5.00%\n- vttablet CPU time increased by 5.00%\n",
        ),
        (
            "TPS decrease",
            result(Diff {
                tps: -50.0,
                ..Default::default()
            }),
            "- TPS decreased by 50.00%\n",
        ),
        (
            "Latency increase",
            result(Diff {
                latency: -15.0,
                ..Default::default()
            }),
            "- Latency increased by 15.00%\n",
        ),
        (
            "QPS decrease",
            result(Diff {
                qps: Qps {
                    total: -10.0,
                    ..Default::default()
                },
                ..Default::default()
            }),
            "- QPS decreased by 10.00%\n",
        ),
        (
            "TPS, QPS decrease and Latency increase",
            result(Diff {
                latency: -10.0,
                tps: -32.5,
                qps: Qps {
                    total: -27.7,
                    ..Default::default()
                },
                ..Default::default()
            }),
            "- TPS decreased by 32.50%\n- QPS decreased by 27.70%\n- Latency increased by 10.00%\n",
        ),
        (
            "Improvements are never listed",
            result(Diff {
                latency: 40.0,
                tps: 50.0,
                qps: Qps {
                    total: 50.0,
                    ..Default::default()
                },
                ..Default::default()
            }),
            "",
        ),
    ];

    for (name, comparison, want) in cases {
        assert_eq!(comparison.regression(), want, "{name}");
    }
}

#[test]
pub fn cpu_threshold_boundary() {
    let five = cpu(-5.0, &[]).regression();
    let four = cpu(-4.0, &[]).regression();

    assert_eq!(five.lines().count(), 1);
    assert!(five.contains("Total CPU time increased by 5.00%"));
    assert!(four.is_empty());
}

fn significant(delta_percent: f64) -> StatisticalResult {
    StatisticalResult {
        delta_percent,
        ..Default::default()
    }
}

#[test]
pub fn statistics_sign_convention() {
    let results = StatisticalCompareResults {
        // throughput dropped, latency and cpu went up
        tps: significant(-20.0),
        total_qps: significant(-12.0),
        latency: significant(15.0),
        total_components_cpu_time: significant(6.0),
        components_cpu_time: BTreeMap::from([("vtgate".to_owned(), significant(8.0))]),
        ..Default::default()
    };
    let comparison = Comparison::from_statistics(&results);

    assert_eq!(comparison.diff.tps, -20.0);
    assert_eq!(comparison.diff.qps.total, -12.0);
    assert_eq!(comparison.diff.latency, -15.0);
    assert_eq!(comparison.diff_metrics.total_components_cpu_time, -6.0);
    assert_eq!(
        comparison.regression(),
        "- TPS decreased by 20.00%\n- QPS decreased by 12.00%\n- Latency increased by 15.00%\n\
         - Total CPU time increased by 6.00%\n- vtgate CPU time increased by 8.00%\n"
    );
}

#[test]
pub fn statistics_improvement_is_positive() {
    let results = StatisticalCompareResults {
        tps: significant(20.0),
        latency: significant(-15.0),
        total_components_cpu_time: significant(-50.0),
        ..Default::default()
    };
    let comparison = Comparison::from_statistics(&results);

    assert_eq!(comparison.diff.tps, 20.0);
    assert_eq!(comparison.diff.latency, 15.0);
    assert_eq!(comparison.diff_metrics.total_components_cpu_time, 50.0);
    assert!(comparison.regression().is_empty());
}

#[test]
pub fn statistics_insignificant_is_never_listed() {
    let results = StatisticalCompareResults {
        tps: StatisticalResult {
            insignificant: true,
            delta_percent: -90.0,
            ..Default::default()
        },
        ..Default::default()
    };

    assert!(Comparison::from_statistics(&results).regression().is_empty());
}

fn macro_result(tps: f64, latency: f64, vtgate: f64, vttablet: f64) -> MacroResult {
    MacroResult {
        qps: Qps {
            total: tps * 20.0,
            reads: tps * 14.0,
            writes: tps * 4.0,
            other: tps * 2.0,
        },
        tps,
        latency,
        errors: 0.0,
        metrics: ExecutionMetrics {
            total_components_cpu_time: vtgate + vttablet,
            components_cpu_time: BTreeMap::from([
                ("vtgate".to_owned(), vtgate),
                ("vttablet".to_owned(), vttablet),
            ]),
            ..Default::default()
        },
    }
}

#[test]
pub fn medians_use_improvement_convention() {
    let old = [macro_result(100.0, 10.0, 20.0, 20.0), macro_result(100.0, 10.0, 20.0, 20.0)];
    let new = [macro_result(80.0, 12.0, 10.0, 10.0), macro_result(80.0, 12.0, 10.0, 10.0)];
    let comparison = Comparison::from_medians(&old, &new);

    assert_eq!(comparison.diff.tps, -20.0);
    assert_eq!(comparison.diff.qps.total, -20.0);
    assert_eq!(comparison.diff.latency, -20.0);
    assert_eq!(comparison.diff_metrics.total_components_cpu_time, 50.0);
    assert_eq!(
        comparison.regression(),
        "- TPS decreased by 20.00%\n- QPS decreased by 20.00%\n- Latency increased by 20.00%\n"
    );
}

#[test]
pub fn analyze_every_metric() {
    let old_runs: Vec<MacroResult> = (0..8)
        .map(|i| macro_result(100.0 + i as f64, 10.0, 20.0 + i as f64 * 0.1, 20.0))
        .collect();
    let new_runs: Vec<MacroResult> = (0..8)
        .map(|i| macro_result(70.0 + i as f64, 10.0, 30.0 + i as f64 * 0.1, 20.0))
        .collect();

    let old = MacroSamples::from_results(&old_runs);
    let new = MacroSamples::from_results(&new_runs);
    assert_eq!(old.len(), 8);

    let results = StatisticalCompareResults::analyze(&Comparator::default(), &old, &new);

    assert!(!results.tps.insignificant);
    assert!(results.tps.delta_percent < -25.0);
    // identical latency on both sides
    assert!(results.latency.insignificant);
    assert_eq!(results.latency.delta_percent, 0.0);
    assert!(!results.components_cpu_time["vtgate"].insignificant);
    assert!(results.components_cpu_time["vttablet"].insignificant);

    let regression = Comparison::from_statistics(&results).regression();
    assert!(regression.contains("- TPS decreased by"));
    assert!(regression.contains("- vtgate CPU time increased by"));
    assert!(!regression.contains("vttablet"));
}
