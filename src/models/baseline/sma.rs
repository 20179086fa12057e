//! Window and historic average forecasting models.
//!
//! - `WindowAverage`: forecasts the mean of the last `window` observations
//! - `HistoricAverage`: forecasts the mean of the whole history

use crate::error::{ForecastError, Result};
use crate::models::SeriesForecaster;

fn mean(values: &[f64]) -> f64 {
    values.iter().sum::<f64>() / values.len() as f64
}

/// Window average forecaster.
#[derive(Debug, Clone)]
pub struct WindowAverage {
    window: usize,
    level: Option<f64>,
}

impl WindowAverage {
    /// Create a new window average over the last `window` observations.
    pub fn new(window: usize) -> Self {
        Self {
            window,
            level: None,
        }
    }

    pub fn window(&self) -> usize {
        self.window
    }
}

impl SeriesForecaster for WindowAverage {
    fn fit(&mut self, values: &[f64]) -> Result<()> {
        if self.window == 0 {
            return Err(ForecastError::InvalidParameter(
                "window must be positive".into(),
            ));
        }
        if values.len() < self.window {
            return Err(ForecastError::InsufficientData {
                needed: self.window,
                got: values.len(),
            });
        }
        self.level = Some(mean(&values[values.len() - self.window..]));
        Ok(())
    }

    fn predict(&self, horizon: usize) -> Result<Vec<f64>> {
        let level = self.level.ok_or(ForecastError::FitRequired)?;
        Ok(vec![level; horizon])
    }

    fn name(&self) -> &str {
        "WindowAverage"
    }

    fn is_fitted(&self) -> bool {
        self.level.is_some()
    }
}

/// Historic average forecaster.
///
/// Used as the fallback when another local model fails to fit.
#[derive(Debug, Clone, Default)]
pub struct HistoricAverage {
    level: Option<f64>,
}

impl HistoricAverage {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SeriesForecaster for HistoricAverage {
    fn fit(&mut self, values: &[f64]) -> Result<()> {
        if values.is_empty() {
            return Err(ForecastError::EmptyData);
        }
        self.level = Some(mean(values));
        Ok(())
    }

    fn predict(&self, horizon: usize) -> Result<Vec<f64>> {
        let level = self.level.ok_or(ForecastError::FitRequired)?;
        Ok(vec![level; horizon])
    }

    fn name(&self) -> &str {
        "HistoricAverage"
    }

    fn is_fitted(&self) -> bool {
        self.level.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn window_average_uses_tail() {
        let mut model = WindowAverage::new(3);
        model.fit(&[100.0, 1.0, 2.0, 3.0]).unwrap();
        let pred = model.predict(2).unwrap();
        assert_relative_eq!(pred[0], 2.0);
        assert_relative_eq!(pred[1], 2.0);
    }

    #[test]
    fn window_average_needs_full_window() {
        let mut model = WindowAverage::new(13);
        assert!(model.fit(&[1.0; 5]).is_err());
    }

    #[test]
    fn historic_average_uses_everything() {
        let mut model = HistoricAverage::new();
        model.fit(&[1.0, 2.0, 3.0, 6.0]).unwrap();
        assert_relative_eq!(model.predict(1).unwrap()[0], 3.0);
    }
}
