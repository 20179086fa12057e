//! Pooled global autoregression.
//!
//! One linear model over lagged target values is fitted across all series
//! of the training panel. The recursive variant learns a one-step model and
//! feeds its predictions back as lags; the direct variant learns one model
//! per horizon step from the lags available at the forecast origin.
//!
//! Optionally the per-series mean of the forward-filled price is added as a
//! static covariate (`price_group`).

use crate::core::{prediction_column, Frequency, Panel, PRICE};
use crate::error::{ForecastError, Result};
use crate::models::{FitSpec, PanelForecaster, Strategy};
use crate::utils::ols::{ols_fit, OLSResult};
use std::collections::HashMap;
use tracing::debug;

const PRICE_GROUP: &str = "price_group";

/// Pooled OLS autoregression across a panel.
#[derive(Debug, Clone)]
pub struct GlobalAutoregression {
    name: String,
    lags: Vec<usize>,
    strategy: Strategy,
    use_price: bool,
}

/// Fitted [`GlobalAutoregression`].
#[derive(Debug, Clone)]
pub struct GlobalArFit {
    freq: Frequency,
    target: String,
    /// One model for recursive, one per step for direct.
    steps: Vec<OLSResult>,
    price_fill: f64,
}

impl GlobalArFit {
    /// Fitted regressions, one per horizon step for the direct strategy.
    pub fn regressions(&self) -> &[OLSResult] {
        &self.steps
    }
}

impl GlobalAutoregression {
    /// Recursive one-step model over `lags`.
    pub fn recursive(lags: Vec<usize>) -> Self {
        Self {
            name: "GlobalARRecursive".into(),
            lags: normalize_lags(lags),
            strategy: Strategy::Recursive,
            use_price: false,
        }
    }

    /// Direct multi-step model over `lags`.
    pub fn direct(lags: Vec<usize>) -> Self {
        Self {
            name: "GlobalARDirect".into(),
            lags: normalize_lags(lags),
            strategy: Strategy::Direct,
            use_price: false,
        }
    }

    /// Add the per-series mean forward-filled price as a covariate.
    pub fn with_price(mut self) -> Self {
        self.use_price = true;
        self
    }

    fn max_lag(&self) -> usize {
        self.lags.last().copied().unwrap_or(0)
    }

    fn feature_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.lags.iter().map(|l| format!("lag_{l:03}")).collect();
        if self.use_price {
            names.push(PRICE_GROUP.to_string());
        }
        names
    }

    /// Features at forecast origin `o` (the last observed index).
    fn features(&self, values: &[f64], origin: usize, price: f64) -> Vec<f64> {
        let mut row: Vec<f64> = self
            .lags
            .iter()
            .map(|&l| {
                if origin + 1 >= l {
                    values[origin + 1 - l]
                } else {
                    f64::NAN
                }
            })
            .collect();
        if self.use_price {
            row.push(price);
        }
        row
    }

    fn price_groups(&self, panel: &Panel) -> Result<HashMap<String, f64>> {
        if !self.use_price {
            return Ok(HashMap::new());
        }
        let filled = panel.forward_fill_by_id(PRICE)?;
        let price = filled.column(PRICE)?;
        Ok(filled
            .groups()
            .into_iter()
            .map(|g| {
                let observed: Vec<f64> =
                    price[g.rows].iter().copied().filter(|p| !p.is_nan()).collect();
                let mean = if observed.is_empty() {
                    f64::NAN
                } else {
                    observed.iter().sum::<f64>() / observed.len() as f64
                };
                (g.id.to_string(), mean)
            })
            .collect())
    }

    /// Fit one regression of `y[o + step]` on the features at origin `o`.
    fn fit_step(
        &self,
        series: &[(Vec<f64>, f64)],
        step: usize,
        names: &[String],
    ) -> Result<OLSResult> {
        let mut columns: Vec<Vec<f64>> = vec![Vec::new(); names.len()];
        let mut y = Vec::new();
        for (values, price) in series {
            let n = values.len();
            if n < self.max_lag() + step {
                continue;
            }
            for origin in (self.max_lag() - 1)..(n - step) {
                let target = values[origin + step];
                let row = self.features(values, origin, *price);
                if target.is_nan() || row.iter().any(|v| v.is_nan()) {
                    continue;
                }
                y.push(target);
                for (col, v) in columns.iter_mut().zip(row) {
                    col.push(v);
                }
            }
        }
        if y.len() <= names.len() {
            return Err(ForecastError::InsufficientData {
                needed: names.len() + 1,
                got: y.len(),
            });
        }
        let regressors: HashMap<String, Vec<f64>> =
            names.iter().cloned().zip(columns).collect();
        ols_fit(&y, &regressors)
    }
}

fn normalize_lags(mut lags: Vec<usize>) -> Vec<usize> {
    lags.retain(|&l| l > 0);
    lags.sort_unstable();
    lags.dedup();
    lags
}

/// Regressor values of `row` reordered to match `result.regressor_names`.
fn aligned(result: &OLSResult, names: &[String], row: &[f64]) -> Vec<f64> {
    result
        .regressor_names
        .iter()
        .map(|r| {
            names
                .iter()
                .position(|n| n == r)
                .map(|i| row[i])
                .unwrap_or(f64::NAN)
        })
        .collect()
}

impl PanelForecaster for GlobalAutoregression {
    type Model = GlobalArFit;

    fn name(&self) -> &str {
        &self.name
    }

    fn strategy(&self) -> Strategy {
        self.strategy
    }

    fn fit(&self, train: &Panel, spec: &FitSpec) -> Result<GlobalArFit> {
        if self.lags.is_empty() {
            return Err(ForecastError::InvalidParameter("no lags given".into()));
        }
        let n_steps = match self.strategy {
            Strategy::Recursive => 1,
            Strategy::Direct => spec.max_horizon.ok_or_else(|| {
                ForecastError::InvalidParameter(
                    "direct strategy needs max_horizon at fit time".into(),
                )
            })?,
        };

        let prices = self.price_groups(train)?;
        let known: Vec<f64> = prices.values().copied().filter(|p| !p.is_nan()).collect();
        let price_fill = if known.is_empty() {
            0.0
        } else {
            known.iter().sum::<f64>() / known.len() as f64
        };

        let target = train.column(&spec.target)?;
        let series: Vec<(Vec<f64>, f64)> = train
            .groups()
            .into_iter()
            .map(|g| {
                let price = prices
                    .get(g.id)
                    .copied()
                    .filter(|p| !p.is_nan())
                    .unwrap_or(price_fill);
                (target[g.rows].to_vec(), price)
            })
            .collect();

        let names = self.feature_names();
        let steps = (1..=n_steps)
            .map(|step| self.fit_step(&series, step, &names))
            .collect::<Result<Vec<_>>>()?;
        debug!(model = %self.name, steps = steps.len(), series = series.len(), "fitted global autoregression");

        Ok(GlobalArFit {
            freq: spec.freq,
            target: spec.target.clone(),
            steps,
            price_fill,
        })
    }

    fn predict(
        &self,
        model: &GlobalArFit,
        history: &Panel,
        horizon: usize,
        _future: Option<&Panel>,
    ) -> Result<Panel> {
        if self.strategy == Strategy::Direct && horizon > model.steps.len() {
            return Err(ForecastError::InvalidParameter(format!(
                "horizon {horizon} exceeds fitted max_horizon {}",
                model.steps.len()
            )));
        }
        let names = self.feature_names();
        let prices = self.price_groups(history)?;
        let target = history.column(&model.target)?;

        let mut ids = Vec::new();
        let mut dates = Vec::new();
        let mut preds = Vec::new();
        for group in history.groups() {
            let price = prices
                .get(group.id)
                .copied()
                .filter(|p| !p.is_nan())
                .unwrap_or(model.price_fill);
            let last_date = history.dates()[group.rows.end - 1];
            let mut values: Vec<f64> = target[group.rows]
                .iter()
                .map(|v| if v.is_nan() { 0.0 } else { *v })
                .collect();
            let origin = values.len() - 1;

            let forecast: Vec<f64> = match self.strategy {
                Strategy::Recursive => {
                    let reg = &model.steps[0];
                    (0..horizon)
                        .map(|_| {
                            let row = self.features(&values, values.len() - 1, price);
                            let row: Vec<f64> = row
                                .into_iter()
                                .map(|v| if v.is_nan() { 0.0 } else { v })
                                .collect();
                            let y = reg.predict_row(&aligned(reg, &names, &row));
                            values.push(y);
                            y
                        })
                        .collect()
                }
                Strategy::Direct => {
                    let row: Vec<f64> = self
                        .features(&values, origin, price)
                        .into_iter()
                        .map(|v| if v.is_nan() { 0.0 } else { v })
                        .collect();
                    model.steps[..horizon]
                        .iter()
                        .map(|reg| reg.predict_row(&aligned(reg, &names, &row)))
                        .collect()
                }
            };

            let start = model.freq.offset(last_date, 1)?;
            dates.extend(model.freq.range(start, horizon)?);
            ids.extend(std::iter::repeat(group.id.to_string()).take(horizon));
            preds.extend(forecast);
        }

        Ok(Panel::new(ids, dates, None, vec![(prediction_column(&self.name), preds)])?
            .sanitize_predictions())
    }
}
