//! Numerical building blocks shared by the models and combiners.

pub mod lasso;
pub mod ols;
pub mod optimization;
pub mod stats;

pub use lasso::{mrmr_select, InformationCriterion, LassoFit, LassoIc};
pub use ols::{least_squares, ols_fit, OLSResult};
pub use optimization::{
    clip_by_global_norm, minimize_adam, Adam, AdamConfig, AdamResult, WarmupExponentialDecay,
};
pub use stats::{f_statistic, mean, pearson, quantile_sorted};
