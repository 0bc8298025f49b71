use super::{Comparator, Thresholds};

fn sample(values: &[f64]) -> Vec<f64> {
    values.to_vec()
}

#[test]
pub fn summarize_empty_sample() {
    let summary = Comparator::default().summarize(&[]);

    assert_eq!(summary.center, 0.0);
    assert_eq!(summary.confidence, 0.95);
    assert!(summary.range.unknown);
    assert!(!summary.range.infinite);
    assert_eq!(summary.range.value_percent, 0.0);
}

#[test]
pub fn summarize_single_value_is_infinite() {
    let summary = Comparator::default().summarize(&[42.0]);

    assert_eq!(summary.center, 42.0);
    assert!(summary.range.infinite);
    assert!(!summary.range.unknown);
}

#[test]
pub fn summarize_needs_six_values_at_95() {
    let comparator = Comparator::default();

    assert!(comparator
        .summarize(&[1.0, 2.0, 3.0, 4.0, 5.0])
        .range
        .infinite);
    assert!(!comparator
        .summarize(&[1.0, 2.0, 3.0, 4.0, 5.0, 6.0])
        .range
        .infinite);
}

#[test]
pub fn summarize_range_percent() {
    // n = 6 at 0.95 gives the full range [1, 6] around the median 3.5
    let summary = Comparator::default().summarize(&sample(&[6.0, 2.0, 4.0, 1.0, 5.0, 3.0]));

    assert_eq!(summary.center, 3.5);
    let expected = f64::max(6.0 / 3.5 - 1.0, 1.0 - 1.0 / 3.5) * 100.0;
    assert!((summary.range.value_percent - expected).abs() < 1e-9);
}

#[test]
pub fn summarize_interval_narrows_with_more_values() {
    // with 20 values the interval drops the extremes on each side
    let values: Vec<f64> = (1..=20).map(f64::from).collect();
    let mut with_outliers = values.clone();
    with_outliers[0] = -1000.0;
    with_outliers[19] = 1000.0;

    let clean = Comparator::default().summarize(&values);
    let noisy = Comparator::default().summarize(&with_outliers);

    assert_eq!(clean.center, noisy.center);
    assert_eq!(clean.range, noisy.range);
}

#[test]
pub fn summarize_bounds_crossing_zero_are_unknown() {
    let summary = Comparator::default().summarize(&[-3.0, -1.0, 1.0, 2.0, 3.0, 4.0]);

    assert!(summary.range.unknown);
    assert!(!summary.range.infinite);
}

#[test]
pub fn summarize_zero_center_has_zero_percent() {
    let summary = Comparator::default().summarize(&[0.0; 8]);

    assert_eq!(summary.center, 0.0);
    assert!(!summary.range.infinite);
    assert!(!summary.range.unknown);
    assert_eq!(summary.range.value_percent, 0.0);
}

#[test]
pub fn compare_identical_samples() {
    let comparator = Comparator::default();
    let values = [10.0, 12.0, 11.0, 9.5, 10.5, 11.5, 10.2];
    let result = comparator.compare(&values, &values);

    assert!(result.insignificant);
    assert_eq!(result.delta_percent, 0.0);
    assert_eq!(result.sample_size_old, 7);
    assert_eq!(result.sample_size_new, 7);
}

#[test]
pub fn compare_empty_samples() {
    let result = Comparator::default().compare(&[], &[]);

    assert!(result.insignificant);
    assert_eq!(result.delta_percent, 0.0);
    assert_eq!(result.p_value, 1.0);
    assert_eq!(result.sample_size_old, 0);
}

#[test]
pub fn compare_singletons() {
    let result = Comparator::default().compare(&[10.0], &[20.0]);

    assert!(result.insignificant);
    assert_eq!(result.p_value, 1.0);
    assert_eq!(result.delta_percent, 100.0);
    assert!(result.old.range.infinite);
    assert!(result.new.range.infinite);
}

#[test]
pub fn compare_singleton_against_large_sample() {
    let comparator = Comparator::default();

    for size in 40..=50 {
        let large = (2..2 + size).map(|value| value as f64).collect::<Vec<_>>();

        let result = comparator.compare(&[1.0], &large);
        assert!(result.insignificant, "size {size}");
        assert_eq!(result.p_value, 1.0);
        assert_eq!(result.sample_size_old, 1);
        assert_eq!(result.sample_size_new, size);

        let swapped = comparator.compare(&large, &[1.0]);
        assert!(swapped.insignificant, "size {size}");
        assert_eq!(swapped.p_value, 1.0);
    }
}

#[test]
pub fn compare_detects_shift() {
    let old = [100.0, 101.0, 99.0, 100.5, 98.5, 100.2, 99.8, 101.5];
    let new = [120.0, 121.0, 119.0, 120.5, 118.5, 120.2, 119.8, 121.5];
    let result = Comparator::default().compare(&old, &new);

    assert!(!result.insignificant);
    assert!(result.p_value < 0.001);
    assert!(result.delta_percent > 19.0 && result.delta_percent < 21.0);
}

#[test]
pub fn compare_swap_flips_sign_but_not_magnitude() {
    let comparator = Comparator::default();
    let low = [10.0, 10.1, 9.9, 10.2, 9.8, 10.0];
    let high = [20.0, 20.1, 19.9, 20.2, 19.8, 20.0];

    let up = comparator.compare(&low, &high);
    let down = comparator.compare(&high, &low);

    assert!(up.delta_percent > 0.0);
    assert!(down.delta_percent < 0.0);
    // ratio based: +100% one way, -50% the other
    assert!((up.delta_percent - 100.0).abs() < 1e-9);
    assert!((down.delta_percent + 50.0).abs() < 1e-9);
    assert_eq!(up.p_value, down.p_value);
}

#[test]
pub fn compare_zero_old_center() {
    let result = Comparator::default().compare(&[0.0, 0.0, 0.0], &[5.0, 6.0, 7.0]);

    assert_eq!(result.delta_percent, 0.0);
}

#[test]
pub fn compare_alpha_is_configurable() {
    let old = [1.0, 2.0, 3.0, 4.0];
    let new = [5.0, 6.0, 7.0, 8.0];

    // p = 2 / 70
    let strict = Comparator::new(0.95, Thresholds { compare_alpha: 0.01 });
    let loose = Comparator::new(0.95, Thresholds { compare_alpha: 0.05 });

    assert!(strict.compare(&old, &new).insignificant);
    assert!(!loose.compare(&old, &new).insignificant);
}
