//! Ordinary Least Squares (OLS) regression.
//!
//! Used by the pooled global autoregression and, without intercept, to
//! estimate the noise variance of the information-criterion Lasso.

use crate::error::{ForecastError, Result};
use std::collections::HashMap;

/// OLS regression coefficients and intercept.
#[derive(Debug, Clone, PartialEq)]
pub struct OLSResult {
    /// Regression coefficients (one per regressor).
    pub coefficients: Vec<f64>,
    /// Intercept term (zero when fitted without intercept).
    pub intercept: f64,
    /// Names of regressors in coefficient order.
    pub regressor_names: Vec<String>,
    /// Residual sum of squares on the training data.
    pub rss: f64,
}

impl OLSResult {
    /// Predict one observation given regressor values in `regressor_names` order.
    pub fn predict_row(&self, row: &[f64]) -> f64 {
        self.intercept
            + self
                .coefficients
                .iter()
                .zip(row)
                .map(|(b, x)| b * x)
                .sum::<f64>()
    }
}

/// Fit OLS regression: `y = intercept + X @ coefficients`.
///
/// Regressors are ordered by name so the fit is deterministic.
pub fn ols_fit(y: &[f64], regressors: &HashMap<String, Vec<f64>>) -> Result<OLSResult> {
    let mut regressor_names: Vec<String> = regressors.keys().cloned().collect();
    regressor_names.sort();
    let columns: Vec<&[f64]> = regressor_names
        .iter()
        .map(|name| regressors[name].as_slice())
        .collect();
    let (intercept, coefficients, rss) = least_squares(y, &columns, true)?;
    Ok(OLSResult {
        coefficients,
        intercept,
        regressor_names,
        rss,
    })
}

/// Least squares on column-major regressors.
///
/// Returns `(intercept, coefficients, rss)`; the intercept is zero when
/// `fit_intercept` is false. Uses Cholesky decomposition of the normal
/// equations with a tiny diagonal ridge for numerical stability.
pub fn least_squares(
    y: &[f64],
    columns: &[&[f64]],
    fit_intercept: bool,
) -> Result<(f64, Vec<f64>, f64)> {
    let n = y.len();
    if n == 0 {
        return Err(ForecastError::InsufficientData { needed: 1, got: 0 });
    }
    if let Some(bad) = columns.iter().find(|c| c.len() != n) {
        return Err(ForecastError::DimensionMismatch {
            expected: n,
            got: bad.len(),
        });
    }

    let offset = usize::from(fit_intercept);
    let num_params = columns.len() + offset;
    if num_params == 0 {
        let rss = y.iter().map(|v| v * v).sum();
        return Ok((0.0, Vec::new(), rss));
    }

    let value = |j: usize, obs: usize| -> f64 {
        if fit_intercept && j == 0 {
            1.0
        } else {
            columns[j - offset][obs]
        }
    };

    let mut xtx = vec![vec![0.0; num_params]; num_params];
    let mut xty = vec![0.0; num_params];
    for obs in 0..n {
        for i in 0..num_params {
            let xi = value(i, obs);
            xty[i] += xi * y[obs];
            for j in 0..=i {
                xtx[i][j] += xi * value(j, obs);
            }
        }
    }
    for i in 0..num_params {
        for j in (i + 1)..num_params {
            xtx[i][j] = xtx[j][i];
        }
        xtx[i][i] += 1e-8;
    }

    let beta = solve_symmetric(&xtx, &xty).ok_or_else(|| {
        ForecastError::ComputationError(
            "OLS regression failed: matrix not positive definite".into(),
        )
    })?;

    let rss = (0..n)
        .map(|obs| {
            let fitted: f64 = (0..num_params).map(|j| beta[j] * value(j, obs)).sum();
            (y[obs] - fitted).powi(2)
        })
        .sum();

    let intercept = if fit_intercept { beta[0] } else { 0.0 };
    Ok((intercept, beta[offset..].to_vec(), rss))
}

/// Solve symmetric positive definite system using Cholesky decomposition.
///
/// Solves A @ x = b where A is symmetric positive definite.
pub(crate) fn solve_symmetric(a: &[Vec<f64>], b: &[f64]) -> Option<Vec<f64>> {
    let n = b.len();
    if n == 0 || a.len() != n {
        return None;
    }

    // A = L @ L'
    let mut l = vec![vec![0.0; n]; n];
    for i in 0..n {
        for j in 0..=i {
            let mut sum = a[i][j];
            for k in 0..j {
                sum -= l[i][k] * l[j][k];
            }
            if i == j {
                if sum <= 0.0 {
                    return None;
                }
                l[i][j] = sum.sqrt();
            } else {
                l[i][j] = sum / l[j][j];
            }
        }
    }

    // L @ y = b
    let mut y = vec![0.0; n];
    for i in 0..n {
        let mut sum = b[i];
        for j in 0..i {
            sum -= l[i][j] * y[j];
        }
        y[i] = sum / l[i][i];
    }

    // L' @ x = y
    let mut x = vec![0.0; n];
    for i in (0..n).rev() {
        let mut sum = y[i];
        for j in (i + 1)..n {
            sum -= l[j][i] * x[j];
        }
        x[i] = sum / l[i][i];
    }

    Some(x)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn ols_fit_simple_linear() {
        // y = 2 + 3*x
        let y = vec![5.0, 8.0, 11.0, 14.0, 17.0];
        let mut regressors = HashMap::new();
        regressors.insert("x".to_string(), vec![1.0, 2.0, 3.0, 4.0, 5.0]);

        let result = ols_fit(&y, &regressors).unwrap();

        assert_relative_eq!(result.intercept, 2.0, epsilon = 1e-6);
        assert_relative_eq!(result.coefficients[0], 3.0, epsilon = 1e-6);
        assert!(result.rss < 1e-8);
    }

    #[test]
    fn ols_fit_orders_regressors_by_name() {
        let x1 = vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0];
        let x2 = vec![0.5, 2.5, 1.0, 3.0, 1.5, 3.5, 2.0, 4.0];
        let y: Vec<f64> = x1
            .iter()
            .zip(&x2)
            .map(|(a, b)| 1.0 + 2.0 * a + 3.0 * b)
            .collect();

        let mut regressors = HashMap::new();
        regressors.insert("lag_2".to_string(), x2);
        regressors.insert("lag_1".to_string(), x1);

        let result = ols_fit(&y, &regressors).unwrap();
        assert_eq!(result.regressor_names, vec!["lag_1", "lag_2"]);
        assert_relative_eq!(result.intercept, 1.0, epsilon = 1e-4);
        assert_relative_eq!(result.coefficients[0], 2.0, epsilon = 1e-4);
        assert_relative_eq!(result.coefficients[1], 3.0, epsilon = 1e-4);
        assert_relative_eq!(result.predict_row(&[1.0, 1.0]), 6.0, epsilon = 1e-3);
    }

    #[test]
    fn ols_fit_no_regressors_returns_mean() {
        let y = vec![2.0, 4.0, 6.0, 8.0, 10.0];
        let result = ols_fit(&y, &HashMap::new()).unwrap();
        assert_relative_eq!(result.intercept, 6.0, epsilon = 1e-6);
        assert!(result.coefficients.is_empty());
    }

    #[test]
    fn least_squares_without_intercept() {
        // y = 2*a - b
        let a = [1.0, 2.0, 3.0, 4.0];
        let b = [1.0, 0.0, 2.0, 1.0];
        let y: Vec<f64> = a.iter().zip(&b).map(|(a, b)| 2.0 * a - b).collect();
        let (intercept, coef, rss) = least_squares(&y, &[&a, &b], false).unwrap();
        assert_eq!(intercept, 0.0);
        assert_relative_eq!(coef[0], 2.0, epsilon = 1e-6);
        assert_relative_eq!(coef[1], -1.0, epsilon = 1e-6);
        assert!(rss < 1e-8);
    }

    #[test]
    fn dimension_mismatch_is_reported() {
        let mut regressors = HashMap::new();
        regressors.insert("x".to_string(), vec![1.0, 2.0]);
        assert!(matches!(
            ols_fit(&[1.0, 2.0, 3.0], &regressors),
            Err(ForecastError::DimensionMismatch { .. })
        ));
    }
}
