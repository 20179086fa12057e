//! Final assembly of prediction panels from independent producers.

use crate::core::{JoinKeys, JoinKind, Panel};
use crate::error::{ForecastError, Result};
use tracing::info;

fn join_all(panels: &[Panel], on: JoinKeys) -> Result<Panel> {
    let counts: Vec<usize> = panels.iter().map(Panel::len).collect();
    let Some((first, rest)) = panels.split_first() else {
        return Err(ForecastError::EmptyData);
    };
    if counts.iter().any(|&c| c != counts[0]) {
        return Err(ForecastError::JoinMismatch(counts));
    }
    let mut joined = first.clone();
    for panel in rest {
        joined = joined.join(panel, on, JoinKind::Inner)?;
    }
    if joined.len() != counts[0] {
        let mut counts = counts;
        counts.push(joined.len());
        return Err(ForecastError::JoinMismatch(counts));
    }
    info!(
        panels = panels.len(),
        rows = joined.len(),
        models = joined.prediction_columns().len(),
        "joined predictions"
    );
    Ok(joined)
}

/// Join cross-validation predictions on `(id, date, cutoff_date)`.
///
/// Every input must have the same number of rows and the join must keep
/// all of them; otherwise the row counts are reported in
/// [`ForecastError::JoinMismatch`], with the joined count last when the
/// inputs agreed but their keys did not.
pub fn join_cv_predictions(panels: &[Panel]) -> Result<Panel> {
    join_all(panels, JoinKeys::IdDateCutoff)
}

/// Join live predictions on `(id, date)`.
pub fn join_live_predictions(panels: &[Panel]) -> Result<Panel> {
    join_all(panels, JoinKeys::IdDate)
}
