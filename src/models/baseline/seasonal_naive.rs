//! Seasonal Naive forecasting model.
//!
//! Forecasts by repeating the value from the same season in the previous cycle.

use crate::error::{ForecastError, Result};
use crate::models::SeriesForecaster;

/// Seasonal Naive forecaster.
///
/// Each forecast is equal to the observation one seasonal period earlier,
/// cycling through the last observed season.
#[derive(Debug, Clone)]
pub struct SeasonalNaive {
    period: usize,
    last_season: Option<Vec<f64>>,
}

impl SeasonalNaive {
    /// Create a new SeasonalNaive model with the given seasonal period.
    pub fn new(period: usize) -> Self {
        Self {
            period,
            last_season: None,
        }
    }

    /// Get the seasonal period.
    pub fn period(&self) -> usize {
        self.period
    }
}

impl Default for SeasonalNaive {
    fn default() -> Self {
        Self::new(52)
    }
}

impl SeriesForecaster for SeasonalNaive {
    fn fit(&mut self, values: &[f64]) -> Result<()> {
        if self.period == 0 {
            return Err(ForecastError::InvalidParameter(
                "season length must be positive".into(),
            ));
        }
        if values.len() < self.period {
            return Err(ForecastError::InsufficientData {
                needed: self.period,
                got: values.len(),
            });
        }
        self.last_season = Some(values[values.len() - self.period..].to_vec());
        Ok(())
    }

    fn predict(&self, horizon: usize) -> Result<Vec<f64>> {
        let season = self.last_season.as_ref().ok_or(ForecastError::FitRequired)?;
        Ok((0..horizon).map(|h| season[h % self.period]).collect())
    }

    fn name(&self) -> &str {
        "SeasonalNaive"
    }

    fn is_fitted(&self) -> bool {
        self.last_season.is_some()
    }
}
