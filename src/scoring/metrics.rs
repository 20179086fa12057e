//! Accuracy metrics for forecast evaluation.
//!
//! The competition metric normalizes absolute and signed error sums by the
//! total absolute sales of the group:
//!
//! - `mae = Σ|ŷ - y| / Σ|y|`
//! - `bias = |Σ(ŷ - y)| / Σ|y|`
//! - `score = mae + bias`
//!
//! Sums are taken over the whole group before dividing. Pairs with a missing
//! actual are skipped; a missing prediction only contributes its actual to
//! the denominator. A group without sales yields `NaN`.

use crate::error::{ForecastError, Result};

/// Competition metric of one group.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CompetitionMetrics {
    /// Normalized mean absolute error.
    pub mae: f64,
    /// Normalized absolute bias.
    pub bias: f64,
    /// `mae + bias`.
    pub score: f64,
}

/// Running sums behind [`CompetitionMetrics`].
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct MetricAccumulator {
    abs_error: f64,
    error: f64,
    abs_actual: f64,
}

impl MetricAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add one `(prediction, actual)` pair.
    pub fn push(&mut self, predicted: f64, actual: f64) {
        if actual.is_nan() {
            return;
        }
        self.abs_actual += actual.abs();
        if predicted.is_nan() {
            return;
        }
        let e = predicted - actual;
        self.abs_error += e.abs();
        self.error += e;
    }

    /// Metrics of everything pushed so far.
    pub fn finish(&self) -> CompetitionMetrics {
        if self.abs_actual == 0.0 {
            return CompetitionMetrics {
                mae: f64::NAN,
                bias: f64::NAN,
                score: f64::NAN,
            };
        }
        let mae = self.abs_error / self.abs_actual;
        let bias = self.error.abs() / self.abs_actual;
        CompetitionMetrics {
            mae,
            bias,
            score: mae + bias,
        }
    }
}

/// Competition metric over paired slices.
pub fn competition_metrics(predicted: &[f64], actual: &[f64]) -> Result<CompetitionMetrics> {
    if predicted.len() != actual.len() {
        return Err(ForecastError::DimensionMismatch {
            expected: actual.len(),
            got: predicted.len(),
        });
    }
    if actual.is_empty() {
        return Err(ForecastError::EmptyData);
    }
    let mut acc = MetricAccumulator::new();
    for (&p, &a) in predicted.iter().zip(actual) {
        acc.push(p, a);
    }
    Ok(acc.finish())
}

/// Unnormalized error statistics: `mae = mean|e|`, `bias = mean(e)`,
/// `score = mae + |bias|`. Missing errors are skipped.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ErrorAccumulator {
    abs_error: f64,
    error: f64,
    count: usize,
}

impl ErrorAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, error: f64) {
        if error.is_nan() {
            return;
        }
        self.abs_error += error.abs();
        self.error += error;
        self.count += 1;
    }

    /// `(mae, bias, score)`; all `NaN` when nothing was pushed.
    pub fn finish(&self) -> CompetitionMetrics {
        if self.count == 0 {
            return CompetitionMetrics {
                mae: f64::NAN,
                bias: f64::NAN,
                score: f64::NAN,
            };
        }
        let n = self.count as f64;
        let mae = self.abs_error / n;
        let bias = self.error / n;
        CompetitionMetrics {
            mae,
            bias,
            score: mae + bias.abs(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn perfect_forecast_scores_zero() {
        let m = competition_metrics(&[1.0, 2.0, 3.0], &[1.0, 2.0, 3.0]).unwrap();
        assert_eq!(m.score, 0.0);
    }

    #[test]
    fn sums_before_dividing() {
        // errors +1 and -1 cancel in bias but not in mae
        let m = competition_metrics(&[2.0, 1.0], &[1.0, 2.0]).unwrap();
        assert_relative_eq!(m.mae, 2.0 / 3.0);
        assert_relative_eq!(m.bias, 0.0);
        assert_relative_eq!(m.score, 2.0 / 3.0);

        let m = competition_metrics(&[3.0, 3.0], &[1.0, 3.0]).unwrap();
        assert_relative_eq!(m.mae, 0.5);
        assert_relative_eq!(m.bias, 0.5);
        assert_relative_eq!(m.score, 1.0);
    }

    #[test]
    fn zero_sales_gives_nan() {
        let m = competition_metrics(&[1.0, 0.0], &[0.0, 0.0]).unwrap();
        assert!(m.mae.is_nan());
        assert!(m.bias.is_nan());
        assert!(m.score.is_nan());

        let m = competition_metrics(&[0.0, 0.0], &[0.0, 0.0]).unwrap();
        assert!(m.score.is_nan());
        let m = competition_metrics(&[3.0], &[f64::NAN]).unwrap();
        assert!(m.score.is_nan());
    }

    #[test]
    fn missing_actuals_are_skipped() {
        let m = competition_metrics(&[1.0, 50.0], &[2.0, f64::NAN]).unwrap();
        assert_relative_eq!(m.mae, 0.5);
        let m = competition_metrics(&[f64::NAN, 2.0], &[2.0, 2.0]).unwrap();
        assert_relative_eq!(m.mae, 0.0);
    }

    #[test]
    fn dimension_checks() {
        assert!(competition_metrics(&[1.0], &[1.0, 2.0]).is_err());
        assert!(competition_metrics(&[], &[]).is_err());
    }

    #[test]
    fn error_accumulator_uses_means() {
        let mut acc = ErrorAccumulator::new();
        for e in [2.0, -1.0, f64::NAN, 5.0] {
            acc.push(e);
        }
        let m = acc.finish();
        assert_relative_eq!(m.mae, 8.0 / 3.0);
        assert_relative_eq!(m.bias, 2.0);
        assert_relative_eq!(m.score, 8.0 / 3.0 + 2.0);
        assert!(ErrorAccumulator::new().finish().score.is_nan());
    }
}
