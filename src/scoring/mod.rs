//! Forecast scoring: the competition metric at several granularities,
//! leaderboards, per-id winners and error reports.

pub mod metrics;
mod reports;
mod scores;

pub use metrics::{competition_metrics, CompetitionMetrics, ErrorAccumulator, MetricAccumulator};
pub use reports::{ErrorRow, ErrorTable};
pub use scores::{
    calc_cv_scores, top_k_models, CvScores, Granularity, GroupKey, ScoreRecord, ScoreTable,
    Scorer, Winner,
};
