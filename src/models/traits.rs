//! Forecaster traits: the panel-level adapter contract driven by the
//! cross-validation harness, and the per-series interface local models
//! implement.

use crate::core::{Frequency, Panel, SALES};
use crate::error::Result;

/// How a multi-step forecast is produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Strategy {
    /// One-step model applied repeatedly, feeding predictions back in.
    #[default]
    Recursive,
    /// One model per horizon step; needs `max_horizon` at fit time.
    Direct,
}

/// What a panel forecaster is fitted for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FitSpec {
    /// Name of the target column.
    pub target: String,
    /// Calendar unit of the panel.
    pub freq: Frequency,
    /// Forecast horizon; `Some` for direct-strategy adapters.
    pub max_horizon: Option<usize>,
}

impl FitSpec {
    /// Fit spec for the `sales` column.
    pub fn sales(freq: Frequency) -> Self {
        Self {
            target: SALES.to_string(),
            freq,
            max_horizon: None,
        }
    }

    pub fn with_max_horizon(mut self, h: usize) -> Self {
        self.max_horizon = Some(h);
        self
    }
}

/// Adapter contract for any model family that forecasts a whole panel.
///
/// `fit` consumes a training panel and returns an opaque fitted model;
/// `predict` forecasts `horizon` steps past the last date of every id in
/// `history`. Keeping the model separate from the history lets the harness
/// replay one fitted model over later folds.
///
/// Returned panels are keyed by `(id, date)` and carry one
/// [`prediction_column`](crate::core::prediction_column) per model the
/// adapter produces.
pub trait PanelForecaster {
    /// Fitted state.
    type Model;

    /// Adapter name, used in logs.
    fn name(&self) -> &str;

    /// Multi-step strategy of the adapter.
    fn strategy(&self) -> Strategy {
        Strategy::Recursive
    }

    /// Fit on a training panel.
    fn fit(&self, train: &Panel, spec: &FitSpec) -> Result<Self::Model>;

    /// Forecast `horizon` steps after the end of `history`.
    ///
    /// `future` holds known covariates (no target) for the forecast dates.
    fn predict(
        &self,
        model: &Self::Model,
        history: &Panel,
        horizon: usize,
        future: Option<&Panel>,
    ) -> Result<Panel>;
}

/// Common interface for per-series models.
///
/// This trait is object-safe and can be used with `Box<dyn SeriesForecaster>`.
pub trait SeriesForecaster {
    /// Fit the model to the observed values of one series.
    fn fit(&mut self, values: &[f64]) -> Result<()>;

    /// Generate point predictions for the specified horizon.
    fn predict(&self, horizon: usize) -> Result<Vec<f64>>;

    /// Get the model name.
    fn name(&self) -> &str;

    /// Check if the model has been fitted.
    fn is_fitted(&self) -> bool;
}

/// Type alias for boxed per-series forecasters.
pub type BoxedForecaster = Box<dyn SeriesForecaster>;

/// Named factory for a per-series model.
///
/// # Example
///
/// ```
/// use salescast::models::{BoxedForecaster, ModelSpec};
/// use salescast::models::baseline::{Naive, SeasonalNaive};
///
/// let specs = vec![
///     ModelSpec::new("Naive", || Box::new(Naive::new())),
///     ModelSpec::with_period("SeasonalNaive", |p| Box::new(SeasonalNaive::new(p)), 52),
/// ];
///
/// for spec in &specs {
///     let model = spec.create();
///     assert!(!model.is_fitted());
///     assert_eq!(model.name(), spec.name);
/// }
/// ```
pub struct ModelSpec {
    /// Display name of the model, also its prediction column suffix.
    pub name: &'static str,
    factory: Box<dyn Fn() -> BoxedForecaster + Send + Sync>,
}

impl ModelSpec {
    /// Create a model spec with a simple factory.
    pub fn new<F>(name: &'static str, factory: F) -> Self
    where
        F: Fn() -> BoxedForecaster + Send + Sync + 'static,
    {
        Self {
            name,
            factory: Box::new(factory),
        }
    }

    /// Create a model spec with a period (season length or window) parameter.
    pub fn with_period<F>(name: &'static str, factory: F, period: usize) -> Self
    where
        F: Fn(usize) -> BoxedForecaster + Send + Sync + 'static,
    {
        Self {
            name,
            factory: Box::new(move || factory(period)),
        }
    }

    /// Create a new, unfitted model instance.
    pub fn create(&self) -> BoxedForecaster {
        (self.factory)()
    }
}

impl std::fmt::Debug for ModelSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelSpec").field("name", &self.name).finish()
    }
}

/// Ordered collection of model specifications.
#[derive(Debug, Default)]
pub struct ModelRegistry {
    models: Vec<ModelSpec>,
}

impl ModelRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self { models: Vec::new() }
    }

    /// Register a model specification.
    pub fn register(&mut self, spec: ModelSpec) {
        self.models.push(spec);
    }

    /// Builder-style [`register`](Self::register).
    pub fn with(mut self, spec: ModelSpec) -> Self {
        self.register(spec);
        self
    }

    pub fn len(&self) -> usize {
        self.models.len()
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }

    /// Iterate over model specifications in registration order.
    pub fn iter(&self) -> impl Iterator<Item = &ModelSpec> {
        self.models.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::baseline::{HistoricAverage, Naive, SeasonalNaive, WindowAverage};

    #[test]
    fn boxed_forecaster_reports_name() {
        let model: BoxedForecaster = Box::new(Naive::new());
        assert_eq!(model.name(), "Naive");
        assert!(!model.is_fitted());
    }

    #[test]
    fn registry_creates_fresh_instances() {
        let registry = ModelRegistry::new()
            .with(ModelSpec::new("Naive", || Box::new(Naive::new())))
            .with(ModelSpec::with_period(
                "WindowAverage",
                |w| Box::new(WindowAverage::new(w)),
                13,
            ))
            .with(ModelSpec::with_period(
                "SeasonalNaive",
                |p| Box::new(SeasonalNaive::new(p)),
                52,
            ))
            .with(ModelSpec::new("HistoricAverage", || {
                Box::new(HistoricAverage::new())
            }));
        assert_eq!(registry.len(), 4);

        let values: Vec<f64> = (1..=60).map(f64::from).collect();
        for spec in registry.iter() {
            let mut model = spec.create();
            assert_eq!(model.name(), spec.name);
            model.fit(&values).unwrap();
            assert_eq!(model.predict(13).unwrap().len(), 13);
        }
    }

    #[test]
    fn fit_spec_builder() {
        let spec = FitSpec::sales(Frequency::Week).with_max_horizon(13);
        assert_eq!(spec.target, SALES);
        assert_eq!(spec.max_horizon, Some(13));
    }
}
