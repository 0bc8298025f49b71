use super::{compare_safe, compare_safe_component_map, ExecutionMetrics};
use std::collections::BTreeMap;

fn simple_exec_metrics(vtgate: f64, vttablet: f64) -> ExecutionMetrics {
    complex_exec_metrics(vtgate, vttablet, vtgate + vttablet)
}

fn complex_exec_metrics(vtgate: f64, vttablet: f64, all: f64) -> ExecutionMetrics {
    let components = BTreeMap::from([
        ("vtgate".to_owned(), vtgate),
        ("vttablet".to_owned(), vttablet),
    ]);

    ExecutionMetrics {
        total_components_cpu_time: all,
        components_cpu_time: components.clone(),
        total_components_mem_stats_alloc_bytes: all,
        components_mem_stats_alloc_bytes: components,
    }
}

fn map(entries: &[(&str, f64)]) -> BTreeMap<String, f64> {
    entries
        .iter()
        .map(|(name, value)| (name.to_string(), *value))
        .collect()
}

#[test]
pub fn compare_two_fixtures() {
    let cases = [
        (
            "Empty metrics",
            ExecutionMetrics::default(),
            ExecutionMetrics::default(),
            ExecutionMetrics::default(),
        ),
        (
            "Same metrics",
            simple_exec_metrics(9816.56, 15789.36),
            simple_exec_metrics(9816.56, 15789.36),
            simple_exec_metrics(0.0, 0.0),
        ),
        (
            "50% improvement (less CPU time)",
            simple_exec_metrics(20.0, 20.0),
            simple_exec_metrics(10.0, 10.0),
            complex_exec_metrics(50.0, 50.0, 50.0),
        ),
        (
            "100% improvement (zero CPU time)",
            simple_exec_metrics(20.0, 20.0),
            simple_exec_metrics(0.0, 0.0),
            complex_exec_metrics(100.0, 100.0, 100.0),
        ),
        (
            "50% regression (more CPU time)",
            simple_exec_metrics(20.0, 20.0),
            simple_exec_metrics(30.0, 30.0),
            complex_exec_metrics(-50.0, -50.0, -50.0),
        ),
        (
            "100% regression (twice as much CPU time)",
            simple_exec_metrics(20.0, 20.0),
            simple_exec_metrics(40.0, 40.0),
            complex_exec_metrics(-100.0, -100.0, -100.0),
        ),
        (
            "50% vtgate improvement (less CPU time)",
            simple_exec_metrics(20.0, 20.0),
            simple_exec_metrics(10.0, 20.0),
            complex_exec_metrics(50.0, 0.0, 25.0),
        ),
        (
            "50% vttablet regression (more CPU time)",
            simple_exec_metrics(20.0, 20.0),
            simple_exec_metrics(20.0, 30.0),
            complex_exec_metrics(0.0, -50.0, -25.0),
        ),
        (
            "Left with zero values",
            simple_exec_metrics(0.0, 0.0),
            simple_exec_metrics(20.0, 20.0),
            complex_exec_metrics(-100.0, -100.0, -100.0),
        ),
        (
            "Right with zero values",
            simple_exec_metrics(10.0, 10.0),
            simple_exec_metrics(0.0, 0.0),
            complex_exec_metrics(100.0, 100.0, 100.0),
        ),
    ];

    for (name, left, right, want) in cases {
        assert_eq!(ExecutionMetrics::compare_two(&left, &right), want, "{name}");
    }
}

#[test]
pub fn compare_safe_fixtures() {
    assert_eq!(compare_safe(100.0, 50.0), 50.0);
    assert_eq!(compare_safe(50.0, 100.0), -100.0);
    assert_eq!(compare_safe(50.0, 150.0), -200.0);
    assert_eq!(compare_safe(0.0, 100.0), -100.0);
    assert_eq!(compare_safe(100.0, 0.0), 100.0);
    assert_eq!(compare_safe(0.0, 0.0), 0.0);
}

#[test]
pub fn compare_safe_component_map_fixtures() {
    assert_eq!(
        compare_safe_component_map(&map(&[("vtgate", 10.0)]), &map(&[("vtgate", 5.0)])),
        map(&[("vtgate", 50.0)])
    );
    assert_eq!(
        compare_safe_component_map(
            &map(&[("vtgate", 10.0), ("vttablet", 10.0)]),
            &map(&[("vtgate", 5.0), ("vttablet", 20.0)])
        ),
        map(&[("vtgate", 50.0), ("vttablet", -100.0)])
    );
    assert_eq!(
        compare_safe_component_map(&map(&[]), &map(&[("vtgate", 10.0), ("vttablet", 10.0)])),
        map(&[("vtgate", -100.0), ("vttablet", -100.0)])
    );
    assert_eq!(
        compare_safe_component_map(&map(&[("vtgate", 10.0), ("vttablet", 10.0)]), &map(&[])),
        map(&[("vtgate", 0.0), ("vttablet", 0.0)])
    );
}

#[test]
pub fn median_over_runs() {
    let runs = [
        simple_exec_metrics(10.0, 30.0),
        simple_exec_metrics(20.0, 10.0),
        simple_exec_metrics(30.0, 20.0),
    ];
    let median = ExecutionMetrics::median(&runs.iter().collect::<Vec<_>>());

    assert_eq!(median.components_cpu_time, map(&[("vtgate", 20.0), ("vttablet", 20.0)]));
    assert_eq!(median.total_components_cpu_time, 40.0);
}
