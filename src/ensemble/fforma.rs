//! Feature-based forecast model averaging.
//!
//! A boosted model maps each series' features to one margin per candidate
//! model; softmax of the margins gives the mixing weights. Training pushes
//! weight towards models with a lower fold-level score.

use super::boosting::{BoostingParams, GradientBoosting, MultiOutputObjective};
use super::{model_columns, output_panel, top_k_suffix, Combiner, EnsembleData};
use crate::core::{Frequency, Panel};
use crate::error::{ForecastError, Result};
use crate::features::FeatureTable;
use crate::scoring::{Granularity, Scorer};
use chrono::NaiveDate;
use std::collections::HashMap;
use tracing::debug;

/// Numerically stable softmax.
pub(crate) fn softmax(scores: &[f64]) -> Vec<f64> {
    let max = scores.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let exp: Vec<f64> = scores.iter().map(|s| (s - max).exp()).collect();
    let sum: f64 = exp.iter().sum();
    if sum > 0.0 && sum.is_finite() {
        exp.into_iter().map(|e| e / sum).collect()
    } else {
        vec![1.0 / scores.len() as f64; scores.len()]
    }
}

/// Expected error under softmax weights.
///
/// For errors `e` and weights `w = softmax(F)`:
/// `grad = w (e - mean(e))` and `hess = e w (1 - w) - grad w`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SoftmaxErrorObjective;

impl MultiOutputObjective for SoftmaxErrorObjective {
    fn gradients(&self, margin: &[f64], target: &[f64], grad: &mut [f64], hess: &mut [f64]) {
        let w = softmax(margin);
        let mean_e = target.iter().sum::<f64>() / target.len() as f64;
        for j in 0..margin.len() {
            grad[j] = w[j] * (target[j] - mean_e);
            hess[j] = target[j] * w[j] * (1.0 - w[j]) - grad[j] * w[j];
        }
    }
}

/// FFORMA combiner.
#[derive(Debug, Clone, PartialEq)]
pub struct Fforma {
    top_k: Option<usize>,
    freq: Frequency,
    params: BoostingParams,
}

impl Fforma {
    pub fn new(freq: Frequency) -> Self {
        Self {
            top_k: None,
            freq,
            params: BoostingParams::default(),
        }
    }

    pub fn with_top_k(mut self, k: usize) -> Self {
        self.top_k = Some(k);
        self
    }

    pub fn with_params(mut self, params: BoostingParams) -> Self {
        self.params = params;
        self
    }

    fn features(data: &EnsembleData) -> Result<&FeatureTable> {
        data.features
            .as_ref()
            .ok_or_else(|| ForecastError::InvalidParameter("FFORMA needs a feature table".into()))
    }

    /// Feature rows and clipped score targets of every training key.
    ///
    /// Scores are clipped into `[0, 1]` with missing scores set to `1`.
    fn training_set(
        &self,
        train: &EnsembleData,
        models: &[String],
    ) -> Result<(Vec<Vec<f64>>, Vec<Vec<f64>>)> {
        let features = Self::features(train)?;
        let scores = Scorer::new(self.freq)
            .score(&train.forecast, train.sales()?, Granularity::IdCutoff)?
            .clip_scores(0.0, 1.0, 1.0);

        let mut by_key: HashMap<(&str, NaiveDate), HashMap<&str, f64>> = HashMap::new();
        for r in scores.records() {
            if let (Some(id), Some(cutoff)) = (r.key.id.as_deref(), r.key.cutoff) {
                by_key
                    .entry((id, cutoff))
                    .or_default()
                    .insert(r.model.as_str(), r.metrics.score);
            }
        }
        let index = features.index();
        let keyed_by_cutoff = features.cutoffs().is_some();

        let mut keys: Vec<(&str, NaiveDate)> = by_key.keys().copied().collect();
        keys.sort_by(|a, b| a.1.cmp(&b.1).then_with(|| a.0.cmp(b.0)));
        let mut x = Vec::with_capacity(keys.len());
        let mut y = Vec::with_capacity(keys.len());
        for key in keys {
            let lookup = (key.0, keyed_by_cutoff.then_some(key.1));
            let Some(&row) = index.get(&lookup) else {
                continue;
            };
            let model_scores = &by_key[&key];
            x.push(features.row(row).to_vec());
            y.push(
                models
                    .iter()
                    .map(|m| model_scores.get(m.as_str()).copied().unwrap_or(1.0))
                    .collect(),
            );
        }
        if x.is_empty() {
            return Err(ForecastError::InvalidParameter(
                "no training series with both features and scores".into(),
            ));
        }
        Ok((x, y))
    }

    /// Softmax-weighted sum of the model columns, one weight vector per
    /// `(id, cutoff)` group of the target forecast.
    fn combine(
        &self,
        booster: &GradientBoosting,
        target: &EnsembleData,
        models: &[String],
    ) -> Result<Vec<f64>> {
        let features = Self::features(target)?;
        let index = features.index();
        let keyed_by_cutoff = features.cutoffs().is_some();
        let missing = vec![f64::NAN; features.names().len()];
        let columns = model_columns(&target.forecast, models)?;

        let mut values = vec![f64::NAN; target.forecast.len()];
        for group in target.forecast.groups() {
            let lookup = (group.id, if keyed_by_cutoff { group.cutoff } else { None });
            let row = index.get(&lookup).map_or(missing.as_slice(), |&i| features.row(i));
            let w = softmax(&booster.predict_margin(row));
            for i in group.rows {
                values[i] = columns
                    .iter()
                    .zip(&w)
                    .map(|(c, wj)| if c[i].is_nan() { 0.0 } else { c[i] * wj })
                    .sum();
            }
        }
        Ok(values)
    }
}

impl Combiner for Fforma {
    fn name(&self) -> String {
        format!("FFORMA{}Ensemble", top_k_suffix(self.top_k))
    }

    fn fit_predict(&self, train: &EnsembleData, target: &EnsembleData) -> Result<Panel> {
        let models = train.candidate_models(self.top_k)?;
        let (x, y) = self.training_set(train, &models)?;
        let booster = GradientBoosting::fit(self.params, &x, &y, &SoftmaxErrorObjective)?;
        debug!(rows = x.len(), models = models.len(), "FFORMA fit");
        let values = self.combine(&booster, target, &models)?;
        output_panel(&target.forecast, &self.name(), values)
    }
}
