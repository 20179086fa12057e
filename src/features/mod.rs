//! Time series feature extraction.
//!
//! A small tsfeatures-style set of per-series statistics, computed over the
//! whole history for live data or per training fold for cross-validation.
//! The seasonal classification rule and the FFORMA combiner consume them.
//!
//! # Example
//!
//! ```
//! use salescast::features::{autocorrelation, basic};
//!
//! let series = vec![0.0, 3.0, 0.0, 5.0, 4.0];
//!
//! let zeros = basic::zero_fraction(&series);
//! let acf1 = autocorrelation::x_acf1(&series);
//! assert!(zeros > 0.0 && acf1.is_finite());
//! ```

pub mod autocorrelation;
pub mod basic;
mod table;

pub use table::{
    compute_features, compute_features_cv, feature_column, series_features, FeatureTable,
    FEATURE_NAMES, FEATURE_PREFIX,
};
