//! Stacked linear regression from model columns to sales.

use super::{model_columns, output_panel, top_k_suffix, Combiner, EnsembleData, TrainingMatrix};
use crate::core::Panel;
use crate::error::{ForecastError, Result};
use crate::utils::lasso::{mrmr_select, InformationCriterion, LassoIc};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::debug;

/// Sparse stacking regressors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StackingModel {
    /// Lasso with non-negative coefficients.
    LassoIcPositive,
    /// mRMR column filter, then Lasso.
    LassoIcMrmr,
    /// mRMR column filter, then non-negative Lasso.
    LassoIcPositiveMrmr,
}

impl StackingModel {
    pub const ALL: [StackingModel; 3] = [
        StackingModel::LassoIcPositive,
        StackingModel::LassoIcMrmr,
        StackingModel::LassoIcPositiveMrmr,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            StackingModel::LassoIcPositive => "LassoIcPositive",
            StackingModel::LassoIcMrmr => "LassoIcMrmr",
            StackingModel::LassoIcPositiveMrmr => "LassoIcPositiveMrmr",
        }
    }

    fn positive(&self) -> bool {
        matches!(self, StackingModel::LassoIcPositive | StackingModel::LassoIcPositiveMrmr)
    }

    fn uses_mrmr(&self) -> bool {
        matches!(self, StackingModel::LassoIcMrmr | StackingModel::LassoIcPositiveMrmr)
    }
}

impl fmt::Display for StackingModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Stacking combiner: one regressor fitted per fold on the training rows.
#[derive(Debug, Clone, PartialEq)]
pub struct Stacking {
    model: StackingModel,
    top_k: Option<usize>,
    mrmr_k: usize,
    criterion: InformationCriterion,
}

impl Stacking {
    pub fn new(model: StackingModel) -> Self {
        Self {
            model,
            top_k: None,
            mrmr_k: 10,
            criterion: InformationCriterion::Aic,
        }
    }

    /// One combiner per stacking regressor.
    pub fn all() -> Vec<Self> {
        StackingModel::ALL.into_iter().map(Self::new).collect()
    }

    pub fn with_top_k(mut self, k: usize) -> Self {
        self.top_k = Some(k);
        self
    }

    pub fn with_mrmr_k(mut self, k: usize) -> Self {
        self.mrmr_k = k;
        self
    }

    pub fn with_criterion(mut self, criterion: InformationCriterion) -> Self {
        self.criterion = criterion;
        self
    }

    /// Fitted coefficient per model; models dropped by mRMR get zero.
    pub fn fit_coefficients(&self, matrix: &TrainingMatrix) -> Result<Vec<f64>> {
        if matrix.len() == 0 {
            return Err(ForecastError::EmptyData);
        }
        let columns = matrix.column_refs();
        let selected: Vec<usize> = if self.model.uses_mrmr() {
            mrmr_select(&columns, &matrix.target, self.mrmr_k)
        } else {
            (0..columns.len()).collect()
        };
        let chosen: Vec<&[f64]> = selected.iter().map(|&j| columns[j]).collect();

        let mut lasso = LassoIc::default().with_criterion(self.criterion);
        if self.model.positive() {
            lasso = lasso.positive();
        }
        let fit = lasso.fit(&chosen, &matrix.target)?;

        let mut coefficients = vec![0.0; columns.len()];
        for (&j, &c) in selected.iter().zip(&fit.coefficients) {
            coefficients[j] = c;
        }
        Ok(coefficients)
    }
}

impl Combiner for Stacking {
    fn name(&self) -> String {
        format!("Stacking{}{}Ensemble", self.model, top_k_suffix(self.top_k))
    }

    fn fit_predict(&self, train: &EnsembleData, target: &EnsembleData) -> Result<Panel> {
        let models = train.candidate_models(self.top_k)?;
        let matrix = TrainingMatrix::build(train, &models)?;
        let coefficients = self.fit_coefficients(&matrix)?;
        debug!(
            combiner = %self.name(),
            coefficients = ?models.iter().zip(&coefficients).collect::<Vec<_>>(),
            "stacking fit"
        );

        let columns = model_columns(&target.forecast, &models)?;
        let values = (0..target.forecast.len())
            .map(|i| {
                let p: f64 = columns
                    .iter()
                    .zip(&coefficients)
                    .map(|(c, w)| if c[i].is_nan() { 0.0 } else { c[i] * w })
                    .sum();
                p.max(0.0)
            })
            .collect();
        output_panel(&target.forecast, &self.name(), values)
    }
}
