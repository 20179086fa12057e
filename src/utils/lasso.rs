//! Lasso regression with information-criterion model selection, and the
//! mRMR feature filter used in front of it.
//!
//! The objective is `(1 / 2n) ||y - Xw||² + α ||w||₁` without intercept,
//! solved by cyclic coordinate descent along a log-spaced path of `α`
//! values with warm starts. The selected `α` minimizes
//! `n ln(2πσ²) + RSS/σ² + c·df`, where `σ²` is the noise variance of the
//! unpenalized fit, `df` the number of non-zero coefficients and `c` is `2`
//! for AIC or `ln n` for BIC.

use super::ols::least_squares;
use super::stats::{f_statistic, pearson};
use crate::error::{ForecastError, Result};
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;
use tracing::debug;

/// Criterion used to pick a point on the regularization path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InformationCriterion {
    #[default]
    Aic,
    Bic,
}

/// Lasso with `α` chosen by an information criterion.
#[derive(Debug, Clone, PartialEq)]
pub struct LassoIc {
    pub criterion: InformationCriterion,
    /// Constrain coefficients to be non-negative.
    pub positive: bool,
    pub n_alphas: usize,
    /// Ratio of the smallest to the largest `α` on the path.
    pub eps: f64,
    pub max_iter: usize,
    pub tol: f64,
}

impl Default for LassoIc {
    fn default() -> Self {
        Self {
            criterion: InformationCriterion::Aic,
            positive: false,
            n_alphas: 100,
            eps: 1e-4,
            max_iter: 1000,
            tol: 1e-7,
        }
    }
}

/// Fitted Lasso coefficients at the selected `α`.
#[derive(Debug, Clone, PartialEq)]
pub struct LassoFit {
    pub coefficients: Vec<f64>,
    pub alpha: f64,
    pub criterion: f64,
}

impl LassoFit {
    /// Prediction for one row.
    pub fn predict_row(&self, row: &[f64]) -> f64 {
        self.coefficients.iter().zip(row).map(|(w, x)| w * x).sum()
    }
}

impl LassoIc {
    pub fn positive(mut self) -> Self {
        self.positive = true;
        self
    }

    pub fn with_criterion(mut self, criterion: InformationCriterion) -> Self {
        self.criterion = criterion;
        self
    }

    /// Fit on column-major regressors.
    pub fn fit(&self, columns: &[&[f64]], y: &[f64]) -> Result<LassoFit> {
        let n = y.len();
        let p = columns.len();
        if n == 0 {
            return Err(ForecastError::EmptyData);
        }
        if let Some(bad) = columns.iter().find(|c| c.len() != n) {
            return Err(ForecastError::DimensionMismatch {
                expected: n,
                got: bad.len(),
            });
        }
        if p == 0 {
            return Ok(LassoFit {
                coefficients: Vec::new(),
                alpha: 0.0,
                criterion: f64::NAN,
            });
        }

        let nf = n as f64;
        let sq_norms: Vec<f64> = columns.iter().map(|c| c.iter().map(|v| v * v).sum()).collect();
        let xty: Vec<f64> = columns
            .iter()
            .map(|c| c.iter().zip(y).map(|(a, b)| a * b).sum::<f64>())
            .collect();
        let alpha_max = xty
            .iter()
            .map(|&v| if self.positive { v } else { v.abs() })
            .fold(0.0, f64::max)
            / nf;

        let mut w = vec![0.0; p];
        let mut residual = y.to_vec();
        let mut path: Vec<(f64, Vec<f64>, f64)> = Vec::with_capacity(self.n_alphas);
        if alpha_max <= 0.0 {
            let rss = residual.iter().map(|r| r * r).sum();
            path.push((0.0, w.clone(), rss));
        } else {
            let n_alphas = self.n_alphas.max(1);
            let log_ratio = self.eps.ln();
            for k in 0..n_alphas {
                let frac = if n_alphas == 1 { 0.0 } else { k as f64 / (n_alphas - 1) as f64 };
                let alpha = alpha_max * (log_ratio * frac).exp();
                self.coordinate_descent(columns, &sq_norms, alpha * nf, &mut w, &mut residual);
                let rss = residual.iter().map(|r| r * r).sum();
                path.push((alpha, w.clone(), rss));
            }
        }

        let noise = self.noise_variance(columns, y, &path)?;
        let factor = match self.criterion {
            InformationCriterion::Aic => 2.0,
            InformationCriterion::Bic => nf.ln(),
        };
        let mut best: Option<LassoFit> = None;
        for (alpha, coefs, rss) in path {
            let df = coefs.iter().filter(|c| c.abs() > 0.0).count() as f64;
            let crit = nf * (2.0 * PI * noise).ln() + rss / noise + factor * df;
            if best.as_ref().is_none_or(|b| crit < b.criterion) {
                best = Some(LassoFit {
                    coefficients: coefs,
                    alpha,
                    criterion: crit,
                });
            }
        }
        let best = best.ok_or_else(|| ForecastError::ComputationError("empty lasso path".into()))?;
        debug!(alpha = best.alpha, criterion = best.criterion, "lasso selection");
        Ok(best)
    }

    /// Noise variance from the unpenalized fit, or from the least penalized
    /// path point when that fit is unavailable.
    fn noise_variance(
        &self,
        columns: &[&[f64]],
        y: &[f64],
        path: &[(f64, Vec<f64>, f64)],
    ) -> Result<f64> {
        let n = y.len();
        let p = columns.len();
        let from_ols = if n > p {
            least_squares(y, columns, false)
                .ok()
                .map(|(_, _, rss)| rss / (n - p) as f64)
        } else {
            None
        };
        let variance = match from_ols {
            Some(v) => v,
            None => {
                let (_, coefs, rss) = path
                    .last()
                    .ok_or_else(|| ForecastError::ComputationError("empty lasso path".into()))?;
                let df = coefs.iter().filter(|c| c.abs() > 0.0).count();
                if n <= df {
                    return Err(ForecastError::InsufficientData {
                        needed: df + 1,
                        got: n,
                    });
                }
                rss / (n - df) as f64
            }
        };
        Ok(variance.max(f64::EPSILON))
    }

    /// Coordinate descent at penalty `lambda = n·α`, updating `w` and the
    /// residual `y - Xw` in place.
    fn coordinate_descent(
        &self,
        columns: &[&[f64]],
        sq_norms: &[f64],
        lambda: f64,
        w: &mut [f64],
        residual: &mut [f64],
    ) {
        for _ in 0..self.max_iter {
            let mut max_delta: f64 = 0.0;
            let mut max_w: f64 = 0.0;
            for (j, col) in columns.iter().enumerate() {
                if sq_norms[j] <= 0.0 {
                    continue;
                }
                let old = w[j];
                let rho = col.iter().zip(residual.iter()).map(|(x, r)| x * r).sum::<f64>()
                    + old * sq_norms[j];
                let mut new = soft_threshold(rho, lambda) / sq_norms[j];
                if self.positive {
                    new = new.max(0.0);
                }
                let delta = new - old;
                if delta != 0.0 {
                    for (r, x) in residual.iter_mut().zip(col.iter()) {
                        *r -= delta * x;
                    }
                    w[j] = new;
                }
                max_delta = max_delta.max(delta.abs());
                max_w = max_w.max(new.abs());
            }
            if max_delta <= self.tol * max_w.max(1.0) {
                break;
            }
        }
    }
}

fn soft_threshold(x: f64, lambda: f64) -> f64 {
    if x > lambda {
        x - lambda
    } else if x < -lambda {
        x + lambda
    } else {
        0.0
    }
}

/// Maximum relevance, minimum redundancy selection of `k` columns.
///
/// Relevance is the univariate F statistic against `y`; redundancy is the
/// mean absolute correlation with the already selected columns. Each step
/// picks the column maximizing `relevance / redundancy`, the first pick
/// being the most relevant column. Returns column indices in pick order.
pub fn mrmr_select(columns: &[&[f64]], y: &[f64], k: usize) -> Vec<usize> {
    let relevance: Vec<f64> = columns.iter().map(|c| f_statistic(c, y)).collect();
    let mut selected: Vec<usize> = Vec::with_capacity(k.min(columns.len()));
    let mut redundancy_sum = vec![0.0; columns.len()];

    while selected.len() < k.min(columns.len()) {
        let mut best: Option<(usize, f64)> = None;
        for j in (0..columns.len()).filter(|j| !selected.contains(j)) {
            let score = if selected.is_empty() {
                relevance[j]
            } else {
                let redundancy = redundancy_sum[j] / selected.len() as f64;
                relevance[j] / redundancy.max(1e-12)
            };
            if best.is_none_or(|(_, s)| score > s) {
                best = Some((j, score));
            }
        }
        let Some((pick, _)) = best else { break };
        selected.push(pick);
        for (j, col) in columns.iter().enumerate() {
            redundancy_sum[j] += pearson(col, columns[pick]).abs();
        }
    }
    selected
}
