//! Baseline forecasting models.
//!
//! Simple per-series methods that serve as benchmarks and as the fallback
//! when a richer model cannot be fitted.

mod naive;
mod seasonal_naive;
mod sma;

pub use naive::{Naive, ZeroModel};
pub use seasonal_naive::SeasonalNaive;
pub use sma::{HistoricAverage, WindowAverage};
