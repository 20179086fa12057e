//! Naive and zero forecasting models.

use crate::error::{ForecastError, Result};
use crate::models::SeriesForecaster;

/// Naive forecaster that repeats the last value.
#[derive(Debug, Clone, Default)]
pub struct Naive {
    last_value: Option<f64>,
}

impl Naive {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SeriesForecaster for Naive {
    fn fit(&mut self, values: &[f64]) -> Result<()> {
        let last = values.last().ok_or(ForecastError::EmptyData)?;
        self.last_value = Some(*last);
        Ok(())
    }

    fn predict(&self, horizon: usize) -> Result<Vec<f64>> {
        let last = self.last_value.ok_or(ForecastError::FitRequired)?;
        Ok(vec![last; horizon])
    }

    fn name(&self) -> &str {
        "Naive"
    }

    fn is_fitted(&self) -> bool {
        self.last_value.is_some()
    }
}

/// Forecasts zero for every step.
///
/// The routed ensembles send dead and discontinued series here.
#[derive(Debug, Clone, Default)]
pub struct ZeroModel {
    fitted: bool,
}

impl ZeroModel {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SeriesForecaster for ZeroModel {
    fn fit(&mut self, _values: &[f64]) -> Result<()> {
        self.fitted = true;
        Ok(())
    }

    fn predict(&self, horizon: usize) -> Result<Vec<f64>> {
        if !self.fitted {
            return Err(ForecastError::FitRequired);
        }
        Ok(vec![0.0; horizon])
    }

    fn name(&self) -> &str {
        "ZeroModel"
    }

    fn is_fitted(&self) -> bool {
        self.fitted
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn naive_repeats_last_value() {
        let mut model = Naive::new();
        model.fit(&[1.0, 2.0, 7.0]).unwrap();
        assert_eq!(model.predict(3).unwrap(), vec![7.0, 7.0, 7.0]);
        assert!(model.predict(0).unwrap().is_empty());
    }

    #[test]
    fn naive_requires_data_and_fit() {
        let mut model = Naive::new();
        assert!(matches!(model.predict(1), Err(ForecastError::FitRequired)));
        assert!(matches!(model.fit(&[]), Err(ForecastError::EmptyData)));
    }

    #[test]
    fn zero_model_predicts_zeros() {
        let mut model = ZeroModel::new();
        assert!(model.predict(2).is_err());
        model.fit(&[5.0, 3.0]).unwrap();
        assert_eq!(model.predict(2).unwrap(), vec![0.0, 0.0]);
    }
}
