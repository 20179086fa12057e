//! Ensemble combiners over base model predictions.
//!
//! A [`Combiner`] turns one prediction panel (plus optional actuals,
//! classification, features and leaderboard) into a new prediction panel.
//! Combiners are cross-validated with [`cross_validate_combiner`], which
//! holds out one cutoff at a time: the combiner is fitted on the base
//! predictions of all other cutoffs and predicts the held-out one.

mod boosting;
mod fforma;
mod mixer;
mod optimal_weights;
mod routing;
mod stacking;

pub use boosting::{BoostingParams, GradientBoosting, MultiOutputObjective, RegressionTree};
pub use fforma::{Fforma, SoftmaxErrorObjective};
pub use mixer::MeanMixer;
pub use optimal_weights::{OptimizedWeights, CENSORED_MODELS};
pub use routing::{RouteCondition, RouteRule, RoutedEnsemble};
pub use stacking::{Stacking, StackingModel};

use crate::classification::Classification;
use crate::core::{prediction_column, JoinKeys, JoinKind, Panel, SALES};
use crate::cv::{split_cv_loo, CutoffPartition};
use crate::error::{ForecastError, Result};
use crate::features::FeatureTable;
use crate::scoring::top_k_models;
use chrono::NaiveDate;
use tracing::{debug, info};

/// Inputs of a combiner for one side of a split.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EnsembleData {
    /// Base model predictions.
    pub forecast: Panel,
    /// Actual sales keyed by `(id, date)`; never split by cutoff.
    pub sales: Option<Panel>,
    pub classification: Option<Classification>,
    pub features: Option<FeatureTable>,
    /// Overall model scores, ascending.
    pub leaderboard: Option<Vec<(String, f64)>>,
}

impl EnsembleData {
    pub fn new(forecast: Panel) -> Self {
        Self {
            forecast,
            ..Self::default()
        }
    }

    pub fn with_sales(mut self, sales: Panel) -> Self {
        self.sales = Some(sales);
        self
    }

    pub fn with_classification(mut self, classification: Classification) -> Self {
        self.classification = Some(classification);
        self
    }

    pub fn with_features(mut self, features: FeatureTable) -> Self {
        self.features = Some(features);
        self
    }

    pub fn with_leaderboard(mut self, leaderboard: Vec<(String, f64)>) -> Self {
        self.leaderboard = Some(leaderboard);
        self
    }

    pub(crate) fn sales(&self) -> Result<&Panel> {
        self.sales
            .as_ref()
            .ok_or_else(|| ForecastError::InvalidParameter("combiner needs actual sales".into()))
    }

    /// Candidate model names: the first `k` of the leaderboard present in
    /// the forecast, or every forecast model when there is no leaderboard.
    pub(crate) fn candidate_models(&self, top_k: Option<usize>) -> Result<Vec<String>> {
        let available = self.forecast.model_names();
        match (&self.leaderboard, top_k) {
            (Some(board), k) => {
                let ranked: Vec<(String, f64)> = board
                    .iter()
                    .filter(|(m, _)| available.contains(m))
                    .cloned()
                    .collect();
                Ok(top_k_models(&ranked, k))
            }
            (None, Some(_)) => Err(ForecastError::InvalidParameter(
                "top-k selection needs a leaderboard".into(),
            )),
            (None, None) => Ok(available),
        }
    }
}

fn split_optional<T: CutoffPartition + Clone>(
    table: &Option<T>,
    keyed_by_cutoff: impl Fn(&T) -> bool,
    cutoff: NaiveDate,
) -> Result<(Option<T>, Option<T>)> {
    match table {
        Some(t) if keyed_by_cutoff(t) => {
            let (a, b) = t.partition_cutoff(cutoff)?;
            Ok((Some(a), Some(b)))
        }
        other => Ok((other.clone(), other.clone())),
    }
}

impl CutoffPartition for EnsembleData {
    fn cutoff_dates(&self) -> Result<Vec<NaiveDate>> {
        self.forecast.cutoff_dates()
    }

    fn partition_cutoff(&self, cutoff: NaiveDate) -> Result<(Self, Self)> {
        let (forecast_train, forecast_val) = self.forecast.partition_cutoff(cutoff)?;
        let (class_train, class_val) =
            split_optional(&self.classification, |c| c.cutoffs().is_some(), cutoff)?;
        let (feat_train, feat_val) =
            split_optional(&self.features, |f| f.cutoffs().is_some(), cutoff)?;
        Ok((
            Self {
                forecast: forecast_train,
                sales: self.sales.clone(),
                classification: class_train,
                features: feat_train,
                leaderboard: self.leaderboard.clone(),
            },
            Self {
                forecast: forecast_val,
                sales: self.sales.clone(),
                classification: class_val,
                features: feat_val,
                leaderboard: self.leaderboard.clone(),
            },
        ))
    }
}

/// A strategy combining base predictions into new prediction columns.
pub trait Combiner {
    /// Output model name, without the prediction prefix.
    fn name(&self) -> String;

    /// Learn from `train` and predict every row of `target.forecast`.
    ///
    /// The result has the keys of `target.forecast` and one prediction
    /// column named after [`Combiner::name`].
    fn fit_predict(&self, train: &EnsembleData, target: &EnsembleData) -> Result<Panel>;
}

/// Leave-one-cutoff-out cross-validation of a combiner.
///
/// Every fold's output is stamped with the per-id minimum date as
/// `cutoff_date`; fragments are concatenated once at the end.
pub fn cross_validate_combiner<C: Combiner + ?Sized>(
    combiner: &C,
    data: &EnsembleData,
) -> Result<Panel> {
    let splits = split_cv_loo(data)?;
    let mut fragments = Vec::with_capacity(splits.len());
    for fold in splits {
        let (train, target) = fold.split(data)?;
        if target.forecast.is_empty() {
            continue;
        }
        let preds = combiner
            .fit_predict(&train, &target)?
            .sanitize_predictions()
            .stamp_min_date_cutoff()?;
        info!(
            combiner = %combiner.name(),
            fold = fold.index,
            cutoff = %fold.cutoff,
            train_rows = train.forecast.len(),
            predicted_rows = preds.len(),
            "combiner fold"
        );
        fragments.push(preds);
    }
    Panel::concat(&fragments)
}

/// Fit on all cross-validation data and predict the live forecast.
pub fn live_combine<C: Combiner + ?Sized>(
    combiner: &C,
    cv_data: &EnsembleData,
    live_data: &EnsembleData,
) -> Result<Panel> {
    let preds = combiner.fit_predict(cv_data, live_data)?.sanitize_predictions();
    info!(combiner = %combiner.name(), rows = preds.len(), "live combination");
    Ok(preds)
}

/// `"Top{k}"` or nothing.
pub(crate) fn top_k_suffix(top_k: Option<usize>) -> String {
    top_k.map(|k| format!("Top{k}")).unwrap_or_default()
}

/// Single-column output panel with the keys of `target`.
pub(crate) fn output_panel(target: &Panel, name: &str, values: Vec<f64>) -> Result<Panel> {
    Panel::new(
        target.ids().to_vec(),
        target.dates().to_vec(),
        target.cutoffs().map(<[NaiveDate]>::to_vec),
        vec![(prediction_column(name), values)],
    )
}

/// Prediction columns of `models` in `panel`, in the given order.
pub(crate) fn model_columns<'a>(panel: &'a Panel, models: &[String]) -> Result<Vec<&'a [f64]>> {
    models
        .iter()
        .map(|m| panel.column(&prediction_column(m)))
        .collect()
}

/// Regression design from base predictions to actual sales.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct TrainingMatrix {
    /// One column per model; missing predictions read as zero.
    pub columns: Vec<Vec<f64>>,
    pub target: Vec<f64>,
}

impl TrainingMatrix {
    /// Rows of `data.forecast` that have an actual sales value.
    pub fn build(data: &EnsembleData, models: &[String]) -> Result<Self> {
        let names: Vec<String> = models.iter().map(|m| prediction_column(m)).collect();
        let name_refs: Vec<&str> = names.iter().map(String::as_str).collect();
        let joined = data.forecast.select(&name_refs)?.join(
            &data.sales()?.select(&[SALES])?,
            JoinKeys::IdDate,
            JoinKind::Inner,
        )?;
        let sales = joined.column(SALES)?;
        let rows: Vec<usize> = (0..joined.len()).filter(|&i| !sales[i].is_nan()).collect();

        let columns = name_refs
            .iter()
            .map(|name| {
                let values = joined.column(name)?;
                Ok(rows
                    .iter()
                    .map(|&i| if values[i].is_nan() { 0.0 } else { values[i] })
                    .collect())
            })
            .collect::<Result<Vec<Vec<f64>>>>()?;
        let target = rows.iter().map(|&i| sales[i]).collect();
        debug!(rows = rows.len(), models = models.len(), "training matrix");
        Ok(Self { columns, target })
    }

    pub fn len(&self) -> usize {
        self.target.len()
    }

    pub fn column_refs(&self) -> Vec<&[f64]> {
        self.columns.iter().map(Vec::as_slice).collect()
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::{d, data};
    use super::*;

    /// Predicts the train-set mean of the first model for every row.
    struct TrainMean;

    impl Combiner for TrainMean {
        fn name(&self) -> String {
            "TrainMean".into()
        }

        fn fit_predict(&self, train: &EnsembleData, target: &EnsembleData) -> Result<Panel> {
            let values = train.forecast.column("pred_Exact")?;
            let mean = values.iter().sum::<f64>() / values.len() as f64;
            output_panel(&target.forecast, &self.name(), vec![mean; target.forecast.len()])
        }
    }

    #[test]
    fn loo_holds_out_one_cutoff_per_fold() {
        let data = data();
        let out = cross_validate_combiner(&TrainMean, &data).unwrap();
        assert_eq!(out.len(), data.forecast.len());
        assert_eq!(out.distinct_cutoffs().unwrap(), vec![d(10), d(12), d(14)]);
        assert_eq!(out.model_names(), vec!["TrainMean".to_string()]);

        let first = out.column("pred_TrainMean").unwrap()[0];
        let last = *out.column("pred_TrainMean").unwrap().last().unwrap();
        assert_ne!(first, last);
    }

    #[test]
    fn partition_keeps_sales_whole() {
        let data = data();
        let (train, val) = data.partition_cutoff(d(12)).unwrap();
        assert_eq!(train.forecast.len(), 8);
        assert_eq!(val.forecast.len(), 4);
        assert_eq!(train.sales, data.sales);
        assert_eq!(val.sales, data.sales);
    }

    #[test]
    fn live_combine_keeps_live_keys() {
        let data = data();
        let live = EnsembleData::new(data.forecast.filter_rows(|i| i < 2).without_cutoffs().unwrap());
        let out = live_combine(&TrainMean, &data, &live).unwrap();
        assert!(!out.has_cutoff());
        assert_eq!(out.len(), 2);
    }

    #[test]
    fn candidates_follow_leaderboard() {
        let data = data().with_leaderboard(vec![
            ("High".into(), 0.1),
            ("Missing".into(), 0.2),
            ("Exact".into(), 0.3),
        ]);
        assert_eq!(data.candidate_models(Some(2)).unwrap(), vec!["High", "Exact"]);
        assert_eq!(data.candidate_models(None).unwrap().len(), 2);

        let plain = super::test_support::data();
        assert_eq!(plain.candidate_models(None).unwrap().len(), 3);
        assert!(plain.candidate_models(Some(1)).is_err());
    }

    #[test]
    fn training_matrix_drops_rows_without_sales() {
        let mut data = data();
        let sales = data.sales.take().unwrap();
        let values: Vec<f64> = sales
            .column(SALES)
            .unwrap()
            .iter()
            .enumerate()
            .map(|(i, v)| if i == 10 { f64::NAN } else { *v })
            .collect();
        let data = data.with_sales(sales.with_column(SALES, values).unwrap());
        let m = TrainingMatrix::build(&data, &["Exact".into(), "Zero".into()]).unwrap();
        assert_eq!(m.len(), 11);
        assert_eq!(m.columns.len(), 2);
        assert_eq!(m.columns[0], m.target);
    }
}
