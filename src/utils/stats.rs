//! Summary statistics used by feature extraction and column selection.

/// Calculate the mean of a slice.
pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return f64::NAN;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Pearson correlation of two equally long slices.
///
/// Returns `0.0` when either side is constant.
pub fn pearson(x: &[f64], y: &[f64]) -> f64 {
    let n = x.len().min(y.len());
    if n < 2 {
        return 0.0;
    }
    let (mx, my) = (mean(&x[..n]), mean(&y[..n]));
    let mut sxy = 0.0;
    let mut sxx = 0.0;
    let mut syy = 0.0;
    for i in 0..n {
        let dx = x[i] - mx;
        let dy = y[i] - my;
        sxy += dx * dy;
        sxx += dx * dx;
        syy += dy * dy;
    }
    if sxx <= f64::EPSILON || syy <= f64::EPSILON {
        return 0.0;
    }
    sxy / (sxx * syy).sqrt()
}

/// Univariate F statistic of a regression of `y` on `x` with intercept.
///
/// `F = r² / (1 - r²) · (n - 2)`, capped at `f64::MAX` for a perfect fit.
pub fn f_statistic(x: &[f64], y: &[f64]) -> f64 {
    let n = x.len().min(y.len());
    if n < 3 {
        return 0.0;
    }
    let r2 = pearson(x, y).powi(2);
    if r2 >= 1.0 {
        return f64::MAX;
    }
    r2 / (1.0 - r2) * (n - 2) as f64
}

/// Quantile of a sorted slice with linear interpolation.
pub fn quantile_sorted(sorted: &[f64], q: f64) -> f64 {
    if sorted.is_empty() {
        return f64::NAN;
    }
    let pos = q.clamp(0.0, 1.0) * (sorted.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    sorted[lo] + (sorted[hi] - sorted[lo]) * (pos - lo as f64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn mean_calculates_correctly() {
        assert_relative_eq!(mean(&[1.0, 2.0, 3.0, 4.0, 5.0]), 3.0, epsilon = 1e-10);
        assert!(mean(&[]).is_nan());
    }

    #[test]
    fn pearson_of_linear_relation() {
        let x = [1.0, 2.0, 3.0, 4.0];
        assert_relative_eq!(pearson(&x, &[2.0, 4.0, 6.0, 8.0]), 1.0, epsilon = 1e-12);
        assert_relative_eq!(pearson(&x, &[8.0, 6.0, 4.0, 2.0]), -1.0, epsilon = 1e-12);
        assert_eq!(pearson(&x, &[1.0; 4]), 0.0);
    }

    #[test]
    fn f_statistic_grows_with_fit() {
        let x: Vec<f64> = (0..20).map(f64::from).collect();
        let noisy: Vec<f64> = x.iter().enumerate().map(|(i, v)| v + if i % 2 == 0 { 3.0 } else { -3.0 }).collect();
        let weak: Vec<f64> = x.iter().enumerate().map(|(i, _)| if i % 2 == 0 { 1.0 } else { -1.0 }).collect();
        assert!(f_statistic(&x, &noisy) > f_statistic(&x, &weak));
        assert_eq!(f_statistic(&x, &x), f64::MAX);
    }

    #[test]
    fn quantiles_interpolate() {
        let v = [0.0, 10.0, 20.0];
        assert_relative_eq!(quantile_sorted(&v, 0.25), 5.0);
        assert_relative_eq!(quantile_sorted(&v, 1.0), 20.0);
    }
}
