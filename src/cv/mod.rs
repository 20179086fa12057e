//! Leakage-free fold generation and the cross-validation harness.
//!
//! [`split_cv`] produces rolling-origin folds over a sales panel;
//! [`split_cv_loo`] produces leave-one-cutoff-out folds over tables that
//! already carry a `cutoff_date` (base model predictions, features,
//! classifications, scores). [`cross_validate`] drives a
//! [`PanelForecaster`](crate::models::PanelForecaster) through the
//! rolling-origin folds.

mod folds;
mod harness;

pub use folds::{split_cv, split_cv_loo, CutoffPartition, Fold, LooFold, LooSplits, SplitCv};
pub use harness::{cross_validate, live_forecast, RefitPolicy};

use crate::core::Frequency;
use crate::error::{ForecastError, Result};
use serde::{Deserialize, Serialize};

/// Rolling-origin cross-validation settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CvConfig {
    /// Forecast horizon of every window.
    #[serde(default = "default_h")]
    pub h: usize,
    /// Calendar unit the horizon and step are measured in.
    #[serde(default)]
    pub freq: Frequency,
    /// Number of validation windows.
    #[serde(default = "default_n_windows")]
    pub n_windows: usize,
    /// Distance between consecutive cutoffs; defaults to `h`.
    #[serde(default)]
    pub step: Option<usize>,
    /// Drop entities with fewer training rows than this.
    #[serde(default)]
    pub min_train_size: Option<usize>,
}

fn default_h() -> usize {
    13
}

fn default_n_windows() -> usize {
    3
}

impl Default for CvConfig {
    fn default() -> Self {
        Self {
            h: default_h(),
            freq: Frequency::default(),
            n_windows: default_n_windows(),
            step: None,
            min_train_size: None,
        }
    }
}

impl CvConfig {
    /// Weekly configuration with `n_windows` windows of `h` steps.
    pub fn new(h: usize, n_windows: usize) -> Self {
        Self {
            h,
            n_windows,
            ..Self::default()
        }
    }

    pub fn with_freq(mut self, freq: Frequency) -> Self {
        self.freq = freq;
        self
    }

    pub fn with_step(mut self, step: usize) -> Self {
        self.step = Some(step);
        self
    }

    pub fn with_min_train_size(mut self, min_train_size: usize) -> Self {
        self.min_train_size = Some(min_train_size);
        self
    }

    /// Effective step between windows.
    pub fn step(&self) -> usize {
        self.step.unwrap_or(self.h)
    }

    /// Check that the settings describe at least one non-degenerate window.
    pub fn validate(&self) -> Result<()> {
        if self.h == 0 {
            return Err(ForecastError::InvalidParameter("h must be positive".into()));
        }
        if self.n_windows == 0 {
            return Err(ForecastError::InvalidParameter(
                "n_windows must be positive".into(),
            ));
        }
        if self.step == Some(0) {
            return Err(ForecastError::InvalidParameter(
                "step must be positive".into(),
            ));
        }
        self.window_offsets(0)?;
        Ok(())
    }

    /// `(offset, offset + h)` in frequency units for window `window`,
    /// `0` being the oldest.
    pub(crate) fn window_offsets(&self, window: usize) -> Result<(i64, i64)> {
        let span = || {
            ForecastError::InvalidParameter(format!(
                "h = {}, step = {} and n_windows = {} span more units than a date can hold",
                self.h,
                self.step(),
                self.n_windows
            ))
        };
        let offset = self
            .n_windows
            .checked_sub(1 + window)
            .and_then(|i| i.checked_mul(self.step()))
            .and_then(|o| i64::try_from(o).ok())
            .ok_or_else(span)?;
        let lower = i64::try_from(self.h)
            .ok()
            .and_then(|h| offset.checked_add(h))
            .ok_or_else(span)?;
        Ok((offset, lower))
    }
}
