//! Gradient-learned linear weights over model columns.

use super::{model_columns, output_panel, top_k_suffix, Combiner, EnsembleData, TrainingMatrix};
use crate::core::Panel;
use crate::error::{ForecastError, Result};
use crate::utils::optimization::{minimize_adam, AdamConfig};
use tracing::{debug, warn};

/// Models whose fold-to-fold variance makes their weights unstable.
pub const CENSORED_MODELS: [&str; 14] = [
    "LGBMRegressorDirect",
    "CrostonOptimized",
    "OptimizedTheta",
    "DynamicOptimizedTheta",
    "AutoETS",
    "AutoMFLES",
    "SESOpt",
    "IMAPA",
    "KAN",
    "NHITS",
    "NHITSCustom",
    "LGBMRegressorRecursivePartitioned",
    "WindowAverage",
    "ZeroModel",
];

/// Non-negative weights minimizing the competition score of `X·w` plus
/// `alpha2·mean(w²) + alpha1·mean(|w|)`.
///
/// The score here weighs `mae` and `bias` by one half each.
#[derive(Debug, Clone, PartialEq)]
pub struct OptimizedWeights {
    top_k: Option<usize>,
    excluded: Vec<String>,
    alpha1: f64,
    alpha2: f64,
    optimizer: AdamConfig,
}

impl Default for OptimizedWeights {
    fn default() -> Self {
        Self {
            top_k: None,
            excluded: CENSORED_MODELS.iter().map(|m| m.to_string()).collect(),
            alpha1: 0.0,
            alpha2: 0.1,
            optimizer: AdamConfig::default(),
        }
    }
}

impl OptimizedWeights {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_top_k(mut self, k: usize) -> Self {
        self.top_k = Some(k);
        self
    }

    /// Replace the excluded model list.
    pub fn with_excluded<S: Into<String>>(mut self, models: impl IntoIterator<Item = S>) -> Self {
        self.excluded = models.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_regularization(mut self, alpha1: f64, alpha2: f64) -> Self {
        self.alpha1 = alpha1;
        self.alpha2 = alpha2;
        self
    }

    pub fn with_optimizer(mut self, optimizer: AdamConfig) -> Self {
        self.optimizer = optimizer;
        self
    }

    /// Sorted candidate models after top-k selection and exclusion.
    pub fn models(&self, data: &EnsembleData) -> Result<Vec<String>> {
        let mut models: Vec<String> = data
            .candidate_models(self.top_k)?
            .into_iter()
            .filter(|m| !self.excluded.contains(m))
            .collect();
        models.sort();
        if models.is_empty() {
            return Err(ForecastError::InvalidParameter(
                "no models left after exclusion".into(),
            ));
        }
        Ok(models)
    }

    /// Loss and gradient at `w`.
    fn objective(&self, m: &TrainingMatrix, abs_total: f64, w: &[f64]) -> (f64, Vec<f64>) {
        let p = w.len();
        let n = m.len();
        let mut residual = vec![0.0; n];
        for (col, wj) in m.columns.iter().zip(w) {
            for (r, x) in residual.iter_mut().zip(col) {
                *r += wj * x;
            }
        }
        for (r, y) in residual.iter_mut().zip(&m.target) {
            *r -= y;
        }
        let abs_err: f64 = residual.iter().map(|r| r.abs()).sum();
        let err: f64 = residual.iter().sum();

        let pf = p as f64;
        let loss = 0.5 * abs_err / abs_total
            + 0.5 * err.abs() / abs_total
            + self.alpha2 * w.iter().map(|v| v * v).sum::<f64>() / pf
            + self.alpha1 * w.iter().map(|v| v.abs()).sum::<f64>() / pf;

        let bias_sign = sign(err);
        let grad = m
            .columns
            .iter()
            .zip(w)
            .map(|(col, &wj)| {
                let mae_g: f64 = col.iter().zip(&residual).map(|(x, r)| sign(*r) * x).sum();
                let bias_g: f64 = bias_sign * col.iter().sum::<f64>();
                0.5 * (mae_g + bias_g) / abs_total
                    + self.alpha2 * 2.0 * wj / pf
                    + self.alpha1 * sign(wj) / pf
            })
            .collect();
        (loss, grad)
    }

    /// Learn one weight per column of `m`, starting from `1/p`.
    pub fn fit_weights(&self, m: &TrainingMatrix) -> Result<Vec<f64>> {
        let p = m.columns.len();
        if p == 0 {
            return Err(ForecastError::EmptyData);
        }
        let w0 = vec![1.0 / p as f64; p];
        let abs_total: f64 = m.target.iter().map(|y| y.abs()).sum();
        if abs_total <= 0.0 {
            warn!(rows = m.len(), "no sales to fit weights on; keeping equal weights");
            return Ok(w0);
        }
        let result = minimize_adam(
            |w| self.objective(m, abs_total, w),
            &w0,
            &self.optimizer,
            |w| w.iter_mut().for_each(|v| *v = v.max(0.0)),
        );
        debug!(loss = result.loss, weights = ?result.params, "optimized weights");
        Ok(result.params)
    }
}

fn sign(x: f64) -> f64 {
    if x > 0.0 {
        1.0
    } else if x < 0.0 {
        -1.0
    } else {
        0.0
    }
}

impl Combiner for OptimizedWeights {
    fn name(&self) -> String {
        format!("OptimizedWeights{}Ensemble", top_k_suffix(self.top_k))
    }

    fn fit_predict(&self, train: &EnsembleData, target: &EnsembleData) -> Result<Panel> {
        let models = self.models(train)?;
        let matrix = TrainingMatrix::build(train, &models)?;
        let w = self.fit_weights(&matrix)?;

        let columns = model_columns(&target.forecast, &models)?;
        let values = (0..target.forecast.len())
            .map(|i| {
                let p: f64 = columns
                    .iter()
                    .zip(&w)
                    .map(|(c, wj)| if c[i].is_nan() { 0.0 } else { c[i] * wj })
                    .sum();
                p.max(0.0)
            })
            .collect();
        output_panel(&target.forecast, &self.name(), values)
    }
}
