//! Panel adapter that fits per-series models on every id.

use crate::core::{prediction_column, Frequency, Panel};
use crate::error::{ForecastError, Result};
use crate::models::baseline::{HistoricAverage, Naive, SeasonalNaive, WindowAverage, ZeroModel};
use crate::models::{BoxedForecaster, FitSpec, ModelRegistry, ModelSpec, PanelForecaster};
use chrono::NaiveDate;
use std::collections::HashMap;
use tracing::{debug, warn};

/// Fits every registered [`ModelSpec`] independently on each series.
///
/// A model that fails to fit on a series (for instance a seasonal model on a
/// history shorter than one season) is replaced by the fallback model for
/// that series, and its predictions keep the original model's column name.
pub struct LocalModels {
    registry: ModelRegistry,
    fallback: ModelSpec,
}

/// Fitted state of [`LocalModels`].
pub struct LocalFit {
    freq: Frequency,
    target: String,
    series: HashMap<String, FittedSeries>,
}

struct FittedSeries {
    last_date: NaiveDate,
    models: Vec<BoxedForecaster>,
}

impl LocalFit {
    /// Number of series with fitted models.
    pub fn n_series(&self) -> usize {
        self.series.len()
    }
}

impl LocalModels {
    /// Adapter over `registry` with [`HistoricAverage`] as fallback.
    pub fn new(registry: ModelRegistry) -> Self {
        Self {
            registry,
            fallback: ModelSpec::new("HistoricAverage", || Box::new(HistoricAverage::new())),
        }
    }

    /// Zero, window average, seasonal naive, naive and historic average.
    pub fn baselines(season_length: usize, window: usize) -> Self {
        Self::new(
            ModelRegistry::new()
                .with(ModelSpec::new("ZeroModel", || Box::new(ZeroModel::new())))
                .with(ModelSpec::with_period(
                    "WindowAverage",
                    |w| Box::new(WindowAverage::new(w)),
                    window,
                ))
                .with(ModelSpec::with_period(
                    "SeasonalNaive",
                    |p| Box::new(SeasonalNaive::new(p)),
                    season_length,
                ))
                .with(ModelSpec::new("Naive", || Box::new(Naive::new())))
                .with(ModelSpec::new("HistoricAverage", || {
                    Box::new(HistoricAverage::new())
                })),
        )
    }

    /// Model names in output column order.
    pub fn model_names(&self) -> Vec<&'static str> {
        self.registry.iter().map(|s| s.name).collect()
    }

    fn fit_series(&self, id: &str, values: &[f64]) -> Result<Vec<BoxedForecaster>> {
        self.registry
            .iter()
            .map(|spec| {
                let mut model = spec.create();
                match model.fit(values) {
                    Ok(()) => Ok(model),
                    Err(err) => {
                        debug!(series = id, model = spec.name, error = %err, "falling back");
                        let mut fallback = self.fallback.create();
                        fallback.fit(values)?;
                        Ok(fallback)
                    }
                }
            })
            .collect()
    }
}

/// Target values of a series with missing observations read as zero sales.
fn series_values(panel: &Panel, target: &str, rows: std::ops::Range<usize>) -> Result<Vec<f64>> {
    Ok(panel.column(target)?[rows]
        .iter()
        .map(|v| if v.is_nan() { 0.0 } else { *v })
        .collect())
}

impl PanelForecaster for LocalModels {
    type Model = LocalFit;

    fn name(&self) -> &str {
        "LocalModels"
    }

    fn fit(&self, train: &Panel, spec: &FitSpec) -> Result<LocalFit> {
        if self.registry.is_empty() {
            return Err(ForecastError::InvalidParameter(
                "no local models registered".into(),
            ));
        }
        let mut series = HashMap::new();
        for group in train.groups() {
            let last_date = train.dates()[group.rows.end - 1];
            let values = series_values(train, &spec.target, group.rows)?;
            let models = self.fit_series(group.id, &values)?;
            series.insert(group.id.to_string(), FittedSeries { last_date, models });
        }
        Ok(LocalFit {
            freq: spec.freq,
            target: spec.target.clone(),
            series,
        })
    }

    fn predict(
        &self,
        model: &LocalFit,
        history: &Panel,
        horizon: usize,
        _future: Option<&Panel>,
    ) -> Result<Panel> {
        let names = self.model_names();
        let mut ids = Vec::new();
        let mut dates = Vec::new();
        let mut columns: Vec<Vec<f64>> = vec![Vec::new(); names.len()];

        for group in history.groups() {
            let last_date = history.dates()[group.rows.end - 1];
            let refit;
            let models = match model.series.get(group.id) {
                Some(fitted) if fitted.last_date == last_date => &fitted.models,
                _ => {
                    let values = series_values(history, &model.target, group.rows.clone())?;
                    refit = self.fit_series(group.id, &values)?;
                    &refit
                }
            };
            for (col, m) in columns.iter_mut().zip(models) {
                let forecast = m.predict(horizon)?;
                if forecast.len() != horizon {
                    warn!(series = group.id, model = m.name(), "short forecast");
                    return Err(ForecastError::DimensionMismatch {
                        expected: horizon,
                        got: forecast.len(),
                    });
                }
                col.extend(forecast);
            }
            let start = model.freq.offset(last_date, 1)?;
            dates.extend(model.freq.range(start, horizon)?);
            ids.extend(std::iter::repeat(group.id.to_string()).take(horizon));
        }

        let columns = names
            .iter()
            .map(|n| prediction_column(n))
            .zip(columns)
            .collect();
        Ok(Panel::new(ids, dates, None, columns)?.sanitize_predictions())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::SALES;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn panel() -> Panel {
        Panel::from_series(
            Frequency::Week,
            SALES,
            [
                ("a", d(2024, 1, 1), (1..=60).map(f64::from).collect()),
                ("b", d(2024, 6, 3), vec![2.0, f64::NAN, 4.0]),
            ],
        )
        .unwrap()
    }

    #[test]
    fn predicts_every_model_for_every_series() {
        let adapter = LocalModels::baselines(52, 13);
        let p = panel();
        let fit = adapter.fit(&p, &FitSpec::sales(Frequency::Week)).unwrap();
        assert_eq!(fit.n_series(), 2);

        let out = adapter.predict(&fit, &p, 4, None).unwrap();
        assert_eq!(out.len(), 8);
        assert_eq!(
            out.model_names(),
            vec!["ZeroModel", "WindowAverage", "SeasonalNaive", "Naive", "HistoricAverage"]
        );
        // "a" ends at week 60
        assert_eq!(out.dates()[0], d(2024, 1, 1) + chrono::Duration::weeks(60));
        assert_eq!(out.column("pred_Naive").unwrap()[0], 60.0);
    }

    #[test]
    fn short_series_fall_back_to_historic_average() {
        let adapter = LocalModels::baselines(52, 13);
        let p = panel();
        let fit = adapter.fit(&p, &FitSpec::sales(Frequency::Week)).unwrap();
        let out = adapter.predict(&fit, &p, 2, None).unwrap();
        let b_rows: Vec<usize> = (0..out.len()).filter(|&i| out.ids()[i] == "b").collect();
        let seasonal = out.column("pred_SeasonalNaive").unwrap();
        assert_eq!(seasonal[b_rows[0]], 2.0);
    }

    #[test]
    fn replays_on_newer_history() {
        let adapter = LocalModels::baselines(52, 13);
        let p = panel();
        let old = p.filter_rows(|i| p.ids()[i] == "a" && i < 50);
        let fit = adapter.fit(&old, &FitSpec::sales(Frequency::Week)).unwrap();
        let out = adapter.predict(&fit, &p, 1, None).unwrap();
        let naive = out.column("pred_Naive").unwrap();
        assert_eq!(naive[0], 60.0);
        assert_eq!(out.unique_ids(), vec!["a", "b"]);
    }
}
