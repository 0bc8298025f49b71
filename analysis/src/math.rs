use itertools::Itertools;

/// sort a sample and drop NaN values, which have no place in a rank based test
pub fn sorted_finite(sample: &[f64]) -> Vec<f64> {
    sample
        .iter()
        .copied()
        .filter(|value| !value.is_nan())
        .sorted_by(f64::total_cmp)
        .collect_vec()
}

/// median of an already sorted sample, 0 for an empty one
pub fn median(sorted: &[f64]) -> f64 {
    let len = sorted.len();

    match len {
        0 => 0.0,
        _ if len % 2 == 0 => (sorted[len / 2 - 1] + sorted[len / 2]) / 2.0,
        _ => sorted[len / 2],
    }
}

/// median of an unsorted sample
pub fn median_of(sample: &[f64]) -> f64 {
    median(&sorted_finite(sample))
}
