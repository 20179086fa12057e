//! Core data structures: the long-format panel and its calendar frequency.

mod frequency;
mod panel;

pub use frequency::Frequency;
pub use panel::{
    prediction_column, JoinKeys, JoinKind, Panel, SeriesGroup, PREDICTION_PREFIX, PRICE, SALES,
};
