//! # salescast
//!
//! Cross-validation harness, ensembling and scoring for retail sales
//! forecasting panels.
//!
//! A sales [`Panel`](core::Panel) is split into leakage-free rolling-origin
//! folds, base forecasters are driven through those folds, their
//! predictions are combined by ensemble strategies that are themselves
//! cross-validated leave-one-cutoff-out, and every prediction set is
//! scored with the normalized `mae + |bias|` competition metric.

#![allow(clippy::too_many_arguments)]
#![allow(clippy::type_complexity)]
#![allow(clippy::needless_range_loop)]

pub mod analytics;
pub mod classification;
pub mod config;
pub mod core;
pub mod cv;
pub mod ensemble;
pub mod error;
pub mod features;
pub mod io;
pub mod models;
pub mod postprocess;
pub mod scoring;
pub mod utils;

pub use error::{ForecastError, Result};

pub mod prelude {
    pub use crate::classification::{classify, classify_cv, Classification, SeriesClass};
    pub use crate::config::PipelineConfig;
    pub use crate::core::{Frequency, Panel};
    pub use crate::cv::{cross_validate, live_forecast, split_cv, CvConfig, RefitPolicy};
    pub use crate::ensemble::{cross_validate_combiner, live_combine, Combiner, EnsembleData};
    pub use crate::error::{ForecastError, Result};
    pub use crate::models::{PanelForecaster, SeriesForecaster};
    pub use crate::scoring::{calc_cv_scores, Granularity, ScoreTable, Scorer};
}
