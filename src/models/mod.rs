//! Forecasting models and the adapters the cross-validation harness drives.

mod traits;

pub mod baseline;
pub mod global_ar;
pub mod local;

pub use global_ar::{GlobalArFit, GlobalAutoregression};
pub use local::{LocalFit, LocalModels};
pub use traits::{
    BoxedForecaster, FitSpec, ModelRegistry, ModelSpec, PanelForecaster, SeriesForecaster,
    Strategy,
};
