use statrs::distribution::{ContinuousCDF, Normal};

/// largest sample size (per side) for which the exact U distribution is used
pub const EXACT_LIMIT: usize = 50;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MannWhitney {
    pub n1: usize,
    pub n2: usize,
    /// U statistic of the first sample
    pub u: f64,
    /// two sided p-value
    pub p_value: f64,
}

/// Two sided Mann-Whitney U test on two sorted samples.
///
/// Small samples without ties use the exact distribution of U, everything else the normal
/// approximation with tie and continuity correction. Degenerate inputs (an empty side, or
/// every value tied) produce a p-value of 1.
pub fn mann_whitney_u(x: &[f64], y: &[f64]) -> MannWhitney {
    let (n1, n2) = (x.len(), y.len());

    if n1 == 0 || n2 == 0 {
        return MannWhitney {
            n1,
            n2,
            u: 0.0,
            p_value: 1.0,
        };
    }

    let (rank_sum, tie_term) = rank_x(x, y);
    let u = rank_sum - (n1 * (n1 + 1)) as f64 / 2.0;

    let p_value = if tie_term == 0.0 && n1 <= EXACT_LIMIT && n2 <= EXACT_LIMIT {
        exact_p_value(n1, n2, u)
    } else {
        normal_p_value(n1, n2, u, tie_term)
    };

    MannWhitney {
        n1,
        n2,
        u,
        p_value: p_value.min(1.0),
    }
}

/// sum of the mid-ranks of `x` in the merged sample, and `sum(t^3 - t)` over tie groups
fn rank_x(x: &[f64], y: &[f64]) -> (f64, f64) {
    let mut merged: Vec<(f64, bool)> = x
        .iter()
        .map(|value| (*value, true))
        .chain(y.iter().map(|value| (*value, false)))
        .collect();
    merged.sort_by(|a, b| a.0.total_cmp(&b.0));

    let mut rank_sum = 0.0;
    let mut tie_term = 0.0;
    let mut start = 0;

    while start < merged.len() {
        let mut end = start + 1;
        while end < merged.len() && merged[end].0 == merged[start].0 {
            end += 1;
        }

        // ranks are 1-based, a tie group spanning [start, end) shares the mean rank
        let mid_rank = (start + 1 + end) as f64 / 2.0;
        let in_x = merged[start..end].iter().filter(|(_, is_x)| *is_x).count();
        rank_sum += mid_rank * in_x as f64;

        let t = (end - start) as f64;
        tie_term += t * t * t - t;

        start = end;
    }

    (rank_sum, tie_term)
}

/// Number of arrangements for every value of U.
///
/// These are the coefficients of the Gaussian binomial `[n1 + n2 choose n1]_q`, built as the
/// product of `(1 - q^(n2 + i)) / (1 - q^i)` for `i` in `1..=n1`. With both sides at most
/// `EXACT_LIMIT` the counts stay below `C(100, 50)` and fit an i128.
fn u_distribution(n1: usize, n2: usize) -> Vec<i128> {
    let max = n1 * n2;
    let mut counts = vec![0i128; max + 1];
    counts[0] = 1;

    for i in 1..=n1 {
        let shift = n2 + i;
        if shift <= max {
            for k in (shift..=max).rev() {
                counts[k] -= counts[k - shift];
            }
        }
        for k in i..=max {
            counts[k] += counts[k - i];
        }
    }

    counts
}

fn exact_p_value(n1: usize, n2: usize, u: f64) -> f64 {
    let counts = u_distribution(n1, n2);
    let total: i128 = counts.iter().sum();
    // without ties U is integral
    let u = u.round() as usize;

    let lower: i128 = counts[..=u].iter().sum();
    let upper: i128 = counts[u..].iter().sum();

    2.0 * (lower.min(upper) as f64 / total as f64)
}

fn normal_p_value(n1: usize, n2: usize, u: f64, tie_term: f64) -> f64 {
    let (n1, n2) = (n1 as f64, n2 as f64);
    let n = n1 + n2;
    let mean = n1 * n2 / 2.0;
    let variance = n1 * n2 / 12.0 * ((n + 1.0) - tie_term / (n * (n - 1.0)));

    if variance <= 0.0 {
        return 1.0;
    }

    let z = ((u - mean).abs() - 0.5).max(0.0) / variance.sqrt();

    match Normal::new(0.0, 1.0) {
        Ok(normal) => 2.0 * (1.0 - normal.cdf(z)),
        Err(_) => 1.0,
    }
}
