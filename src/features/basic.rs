//! Basic statistical features for time series.
//!
//! Callers pass series with missing values already filled.

use statrs::statistics::Statistics;

/// Returns the number of elements in the time series.
pub fn length(series: &[f64]) -> f64 {
    series.len() as f64
}

/// Returns the arithmetic mean.
pub fn mean(series: &[f64]) -> f64 {
    if series.is_empty() {
        return f64::NAN;
    }
    series.iter().mean()
}

/// Returns the sample standard deviation (denominator `n - 1`).
pub fn standard_deviation(series: &[f64]) -> f64 {
    if series.len() < 2 {
        return f64::NAN;
    }
    series.iter().std_dev()
}

/// Returns the fraction of observations equal to zero.
pub fn zero_fraction(series: &[f64]) -> f64 {
    if series.is_empty() {
        return f64::NAN;
    }
    series.iter().filter(|v| **v == 0.0).count() as f64 / series.len() as f64
}

/// Returns the mean of the non-zero observations (the demand size of an
/// intermittent series).
pub fn nonzero_mean(series: &[f64]) -> f64 {
    let nonzero: Vec<f64> = series.iter().copied().filter(|v| *v != 0.0).collect();
    mean(&nonzero)
}

/// Length of the longest run of consecutive values satisfying `pred`.
pub fn longest_run<F>(series: &[f64], pred: F) -> usize
where
    F: Fn(f64) -> bool,
{
    let mut best = 0;
    let mut current = 0;
    for &v in series {
        if pred(v) {
            current += 1;
            best = best.max(current);
        } else {
            current = 0;
        }
    }
    best
}

/// Slope of a least-squares line through the series, divided by the
/// series' standard deviation so it is comparable across scales.
///
/// Zero for constant series; `NaN` for fewer than two points.
pub fn trend(series: &[f64]) -> f64 {
    let n = series.len();
    if n < 2 {
        return f64::NAN;
    }
    let t_mean = (n - 1) as f64 / 2.0;
    let y_mean = mean(series);
    let mut sxy = 0.0;
    let mut sxx = 0.0;
    for (t, &y) in series.iter().enumerate() {
        let dt = t as f64 - t_mean;
        sxy += dt * (y - y_mean);
        sxx += dt * dt;
    }
    let sd = standard_deviation(series);
    if sd < 1e-12 {
        return 0.0;
    }
    sxy / sxx / sd
}
