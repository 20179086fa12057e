//! Cross-validation harness for panel forecasters.

use super::{split_cv, CvConfig};
use crate::core::Panel;
use crate::error::Result;
use crate::models::{FitSpec, PanelForecaster, Strategy};
use tracing::{debug, info, warn};

/// When the harness refits the adapter across folds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RefitPolicy {
    /// Fit a fresh model on every fold's training panel.
    #[default]
    EveryFold,
    /// Fit once on the oldest non-empty fold and replay that model on the
    /// later folds, using each fold's train panel as history.
    FitOnce,
    /// Refit every `n` non-empty folds and replay in between.
    Periodic(usize),
}

impl RefitPolicy {
    fn should_refit(&self, folds_since_fit: Option<usize>) -> bool {
        match (self, folds_since_fit) {
            (_, None) => true,
            (RefitPolicy::EveryFold, _) => true,
            (RefitPolicy::FitOnce, _) => false,
            (RefitPolicy::Periodic(n), Some(k)) => k >= (*n).max(1),
        }
    }
}

fn fit_spec<A: PanelForecaster>(adapter: &A, config: &CvConfig) -> FitSpec {
    let spec = FitSpec::sales(config.freq);
    match adapter.strategy() {
        Strategy::Direct => spec.with_max_horizon(config.h),
        Strategy::Recursive => spec,
    }
}

/// Known covariates of the forecast window: the test rows without the target.
fn future_covariates(test: &Panel, target: &str) -> Result<Panel> {
    let names: Vec<&str> = test
        .column_names()
        .into_iter()
        .filter(|n| *n != target)
        .collect();
    test.select(&names)
}

/// Run an adapter through rolling-origin cross-validation.
///
/// Every fold's predictions are sanitized (non-finite and negative values
/// become zero) and stamped with `cutoff_date`, the first predicted date of
/// each id. Fragments are concatenated once after the last fold. Empty
/// folds contribute nothing; adapter errors abort the run.
pub fn cross_validate<A: PanelForecaster>(
    adapter: &A,
    panel: &Panel,
    config: &CvConfig,
    policy: RefitPolicy,
) -> Result<Panel> {
    let spec = fit_spec(adapter, config);
    let mut model: Option<A::Model> = None;
    let mut folds_since_fit: Option<usize> = None;
    let mut fragments = Vec::with_capacity(config.n_windows);

    for fold in split_cv(panel, config)? {
        let fold = fold?;
        if fold.is_empty() {
            warn!(
                adapter = adapter.name(),
                window = fold.window,
                "fold has no entities after train-size filter"
            );
            continue;
        }

        let refit = policy.should_refit(folds_since_fit);
        let fitted: &A::Model = match model {
            Some(ref m) if !refit => m,
            _ => {
                folds_since_fit = Some(0);
                model.insert(adapter.fit(&fold.train, &spec)?)
            }
        };

        let future = future_covariates(&fold.test, &spec.target)?;
        let preds = adapter
            .predict(fitted, &fold.train, config.h, Some(&future))?
            .sanitize_predictions()
            .stamp_min_date_cutoff()?;

        info!(
            adapter = adapter.name(),
            window = fold.window,
            train_rows = fold.train.len(),
            test_rows = fold.test.len(),
            predicted_rows = preds.len(),
            refit,
            "cross-validation fold"
        );
        fragments.push(preds);
        folds_since_fit = folds_since_fit.map(|k| k + 1);
    }

    let out = Panel::concat(&fragments)?;
    debug!(adapter = adapter.name(), rows = out.len(), "cross-validation done");
    Ok(out)
}

/// Fit on the full history and forecast `h` steps past its end.
///
/// The output carries no `cutoff_date`.
pub fn live_forecast<A: PanelForecaster>(
    adapter: &A,
    panel: &Panel,
    config: &CvConfig,
    future: Option<&Panel>,
) -> Result<Panel> {
    config.validate()?;
    let spec = fit_spec(adapter, config);
    let model = adapter.fit(panel, &spec)?;
    let preds = adapter
        .predict(&model, panel, config.h, future)?
        .sanitize_predictions();
    info!(adapter = adapter.name(), rows = preds.len(), "live forecast");
    Ok(preds)
}
