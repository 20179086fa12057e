//! Autocorrelation-based features for time series.

use super::basic::mean;

/// Returns the autocorrelation at a specific lag.
///
/// Constant series have zero autocorrelation at every positive lag; series
/// not longer than `lag` give `NaN`.
///
/// # Arguments
/// * `series` - Input time series
/// * `lag` - Lag value
pub fn autocorrelation(series: &[f64], lag: usize) -> f64 {
    if series.len() <= lag {
        return f64::NAN;
    }

    let m = mean(series);

    let mut numerator = 0.0;
    let mut denominator = 0.0;
    for (i, &x) in series.iter().enumerate() {
        denominator += (x - m).powi(2);
        if i >= lag {
            numerator += (x - m) * (series[i - lag] - m);
        }
    }

    if denominator < 1e-10 {
        return if lag == 0 { 1.0 } else { 0.0 };
    }

    numerator / denominator
}

/// First autocorrelation coefficient.
pub fn x_acf1(series: &[f64]) -> f64 {
    autocorrelation(series, 1)
}

/// Sum of squares of the first ten autocorrelation coefficients.
///
/// `NaN` when the series is too short for lag 10.
pub fn x_acf10(series: &[f64]) -> f64 {
    (1..=10).map(|lag| autocorrelation(series, lag).powi(2)).sum()
}

/// First autocorrelation coefficient of the differenced series.
pub fn diff1_acf1(series: &[f64]) -> f64 {
    let diff: Vec<f64> = series.windows(2).map(|w| w[1] - w[0]).collect();
    autocorrelation(&diff, 1)
}

/// Autocorrelation at the seasonal lag.
pub fn seas_acf1(series: &[f64], period: usize) -> f64 {
    if period == 0 {
        return f64::NAN;
    }
    autocorrelation(series, period)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn autocorrelation_lag_0() {
        let series = vec![1.0, 2.0, 3.0, 4.0, 5.0];
        assert_relative_eq!(autocorrelation(&series, 0), 1.0, epsilon = 1e-10);
    }

    #[test]
    fn autocorrelation_linear_trend() {
        let series: Vec<f64> = (0..20).map(|i| i as f64).collect();
        let acf1 = x_acf1(&series);
        assert!(acf1 > 0.8, "Expected high ACF(1) for linear trend, got {}", acf1);
    }

    #[test]
    fn autocorrelation_alternating() {
        let series: Vec<f64> = (0..20).map(|i| if i % 2 == 0 { 1.0 } else { -1.0 }).collect();
        let acf1 = x_acf1(&series);
        assert!(acf1 < -0.5, "Expected negative ACF(1) for alternating, got {}", acf1);
    }

    #[test]
    fn seasonal_lag_picks_up_yearly_cycle() {
        let series: Vec<f64> = (0..156)
            .map(|i| 10.0 + 5.0 * (2.0 * std::f64::consts::PI * i as f64 / 52.0).sin())
            .collect();
        assert!(seas_acf1(&series, 52) > 0.55);
        assert!(seas_acf1(&series[..40], 52).is_nan());
    }

    #[test]
    fn acf10_needs_eleven_points() {
        assert!(x_acf10(&[1.0, 2.0, 3.0]).is_nan());
        let series: Vec<f64> = (0..30).map(|i| (i % 3) as f64).collect();
        assert!(x_acf10(&series) > 0.0);
    }

    #[test]
    fn constant_series_has_zero_acf() {
        assert_eq!(x_acf1(&[4.0; 10]), 0.0);
        assert_eq!(diff1_acf1(&[4.0; 10]), 0.0);
    }
}
