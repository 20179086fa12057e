//! Long-format error tables and the error reports built on them.
//!
//! Unlike the competition scores, report metrics are plain means of the
//! per-row error `prediction - sales`.

use super::metrics::ErrorAccumulator;
use super::scores::{with_actuals, GroupKey, Granularity, ScoreRecord, ScoreTable};
use crate::classification::Classification;
use crate::core::{Frequency, Panel, PREDICTION_PREFIX, SALES};
use crate::error::{ForecastError, Result};
use chrono::NaiveDate;
use serde::Serialize;
use std::collections::BTreeMap;

/// One prediction of one model next to its actual.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ErrorRow {
    pub id: String,
    pub date: NaiveDate,
    pub cutoff_date: Option<NaiveDate>,
    pub model: String,
    pub prediction: f64,
    pub sales: f64,
    pub error: f64,
}

/// Error rows of every model, ordered by model then forecast row.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ErrorTable {
    rows: Vec<ErrorRow>,
}

impl ErrorTable {
    /// Melt the prediction columns of `forecast` and attach actual sales.
    pub fn new(forecast: &Panel, sales: &Panel) -> Result<Self> {
        let joined = with_actuals(forecast, sales)?;
        let actual = joined.column(SALES)?;
        let mut rows = Vec::with_capacity(joined.len() * joined.prediction_columns().len());
        for column in joined.prediction_columns() {
            let model = &column[PREDICTION_PREFIX.len()..];
            for (i, &prediction) in joined.column(column)?.iter().enumerate() {
                rows.push(ErrorRow {
                    id: joined.ids()[i].clone(),
                    date: joined.dates()[i],
                    cutoff_date: joined.cutoff(i),
                    model: model.to_string(),
                    prediction,
                    sales: actual[i],
                    error: prediction - actual[i],
                });
            }
        }
        Ok(Self { rows })
    }

    pub fn rows(&self) -> &[ErrorRow] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    fn report(
        &self,
        granularity: Granularity,
        key_of: impl Fn(&ErrorRow) -> Result<GroupKey>,
    ) -> Result<ScoreTable> {
        let mut groups: BTreeMap<(GroupKey, &str), ErrorAccumulator> = BTreeMap::new();
        for row in &self.rows {
            groups
                .entry((key_of(row)?, row.model.as_str()))
                .or_default()
                .push(row.error);
        }
        let records = groups
            .into_iter()
            .map(|((key, model), acc)| ScoreRecord {
                key,
                model: model.to_string(),
                metrics: acc.finish(),
            })
            .collect();
        Ok(ScoreTable::new(granularity, records))
    }

    /// Mean errors per `(model, cutoff_date)`.
    pub fn total_report(&self) -> Result<ScoreTable> {
        self.report(Granularity::Cutoff, |row| {
            Ok(GroupKey {
                cutoff: Some(row.cutoff_date.ok_or(ForecastError::MissingCutoff)?),
                ..GroupKey::default()
            })
        })
    }

    /// Mean errors per `(horizon, model)`; horizon `1` is the cutoff date itself.
    pub fn horizon_report(&self, freq: Frequency) -> Result<ScoreTable> {
        self.report(Granularity::Horizon, |row| {
            let cutoff = row.cutoff_date.ok_or(ForecastError::MissingCutoff)?;
            Ok(GroupKey {
                horizon: Some(freq.steps_between(cutoff, row.date) + 1),
                ..GroupKey::default()
            })
        })
    }

    /// Mean errors per `(cutoff_date, class, model)`.
    ///
    /// Rows without a class in `classification` are grouped under no class.
    pub fn class_report(&self, classification: &Classification) -> Result<ScoreTable> {
        let index = classification.index();
        let keyed_by_cutoff = classification.cutoffs().is_some();
        self.report(Granularity::CutoffClass, |row| {
            let cutoff = row.cutoff_date.ok_or(ForecastError::MissingCutoff)?;
            let lookup = (row.id.as_str(), keyed_by_cutoff.then_some(cutoff));
            Ok(GroupKey {
                cutoff: Some(cutoff),
                class: index.get(&lookup).map(|&i| classification.label(i)),
                ..GroupKey::default()
            })
        })
    }
}
