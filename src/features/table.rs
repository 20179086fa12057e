//! Per-series feature tables for live data and cross-validation folds.

use super::autocorrelation::{diff1_acf1, seas_acf1, x_acf1, x_acf10};
use super::basic::{length, mean, nonzero_mean, standard_deviation, trend, zero_fraction};
use crate::core::{Panel, SALES};
use crate::cv::{split_cv, CutoffPartition, CvConfig};
use crate::error::{ForecastError, Result};
use chrono::NaiveDate;
use std::collections::HashMap;
use tracing::debug;

/// Prefix of every feature column name.
pub const FEATURE_PREFIX: &str = "tsfeat_";

/// Unprefixed names of the computed features, in column order.
pub const FEATURE_NAMES: [&str; 10] = [
    "length",
    "mean",
    "std",
    "zero_fraction",
    "x_acf1",
    "x_acf10",
    "diff1_acf1",
    "seas_acf1",
    "trend",
    "nonzero_mean",
];

/// Prefixed column name of a feature.
pub fn feature_column(name: &str) -> String {
    format!("{FEATURE_PREFIX}{name}")
}

/// Feature row of one series.
///
/// Infinite values are replaced by `NaN`.
pub fn series_features(values: &[f64], season_length: usize) -> Vec<f64> {
    [
        length(values),
        mean(values),
        standard_deviation(values),
        zero_fraction(values),
        x_acf1(values),
        x_acf10(values),
        diff1_acf1(values),
        seas_acf1(values, season_length),
        trend(values),
        nonzero_mean(values),
    ]
    .into_iter()
    .map(|v| if v.is_infinite() { f64::NAN } else { v })
    .collect()
}

/// Table of numeric features keyed by `(id[, cutoff_date])`.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureTable {
    ids: Vec<String>,
    cutoffs: Option<Vec<NaiveDate>>,
    names: Vec<String>,
    rows: Vec<Vec<f64>>,
}

impl FeatureTable {
    /// Create a table; every row must have one value per name and keys must
    /// be unique.
    pub fn new(
        ids: Vec<String>,
        cutoffs: Option<Vec<NaiveDate>>,
        names: Vec<String>,
        rows: Vec<Vec<f64>>,
    ) -> Result<Self> {
        if rows.len() != ids.len() {
            return Err(ForecastError::DimensionMismatch {
                expected: ids.len(),
                got: rows.len(),
            });
        }
        if let Some(c) = &cutoffs {
            if c.len() != ids.len() {
                return Err(ForecastError::DimensionMismatch {
                    expected: ids.len(),
                    got: c.len(),
                });
            }
        }
        if let Some(bad) = rows.iter().find(|r| r.len() != names.len()) {
            return Err(ForecastError::DimensionMismatch {
                expected: names.len(),
                got: bad.len(),
            });
        }
        let table = Self {
            ids,
            cutoffs,
            names,
            rows,
        };
        let index = table.index();
        if index.len() != table.len() {
            return Err(ForecastError::DuplicateKey(
                "feature table has repeated (id, cutoff_date) keys".into(),
            ));
        }
        Ok(table)
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn ids(&self) -> &[String] {
        &self.ids
    }

    pub fn cutoffs(&self) -> Option<&[NaiveDate]> {
        self.cutoffs.as_deref()
    }

    /// Feature column names (prefixed).
    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// Feature values of row `i`.
    pub fn row(&self, i: usize) -> &[f64] {
        &self.rows[i]
    }

    /// Row index by key.
    pub fn index(&self) -> HashMap<(&str, Option<NaiveDate>), usize> {
        (0..self.len())
            .map(|i| ((self.ids[i].as_str(), self.cutoffs.as_ref().map(|c| c[i])), i))
            .collect()
    }

    /// Value of feature `name` for a key, if both exist.
    pub fn get(&self, id: &str, cutoff: Option<NaiveDate>, name: &str) -> Option<f64> {
        let j = self.names.iter().position(|n| n == name)?;
        (0..self.len())
            .find(|&i| self.ids[i] == id && self.cutoffs.as_ref().map(|c| c[i]) == cutoff)
            .map(|i| self.rows[i][j])
    }

    fn filter(&self, keep: impl Fn(usize) -> bool) -> Self {
        let rows: Vec<usize> = (0..self.len()).filter(|&i| keep(i)).collect();
        Self {
            ids: rows.iter().map(|&i| self.ids[i].clone()).collect(),
            cutoffs: self
                .cutoffs
                .as_ref()
                .map(|c| rows.iter().map(|&i| c[i]).collect()),
            names: self.names.clone(),
            rows: rows.iter().map(|&i| self.rows[i].clone()).collect(),
        }
    }

    /// Concatenate tables with identical feature names.
    pub fn concat(tables: Vec<FeatureTable>) -> Result<Self> {
        let mut iter = tables.into_iter().filter(|t| !t.is_empty());
        let Some(mut out) = iter.next() else {
            return Ok(Self {
                ids: Vec::new(),
                cutoffs: None,
                names: FEATURE_NAMES.iter().map(|n| feature_column(n)).collect(),
                rows: Vec::new(),
            });
        };
        for t in iter {
            if t.names != out.names || t.cutoffs.is_some() != out.cutoffs.is_some() {
                return Err(ForecastError::InvalidParameter(
                    "feature tables do not share a schema".into(),
                ));
            }
            out.ids.extend(t.ids);
            if let (Some(a), Some(b)) = (out.cutoffs.as_mut(), t.cutoffs) {
                a.extend(b);
            }
            out.rows.extend(t.rows);
        }
        Self::new(out.ids, out.cutoffs, out.names, out.rows)
    }
}

impl CutoffPartition for FeatureTable {
    fn cutoff_dates(&self) -> Result<Vec<NaiveDate>> {
        let mut c = self.cutoffs.clone().ok_or(ForecastError::MissingCutoff)?;
        c.sort();
        c.dedup();
        Ok(c)
    }

    fn partition_cutoff(&self, cutoff: NaiveDate) -> Result<(Self, Self)> {
        let c = self.cutoffs.as_ref().ok_or(ForecastError::MissingCutoff)?;
        Ok((self.filter(|i| c[i] != cutoff), self.filter(|i| c[i] == cutoff)))
    }
}

/// Sales of every series with missing observations read as zero.
fn sales_by_series(panel: &Panel) -> Result<Vec<(String, NaiveDate, Vec<f64>)>> {
    let sales = panel.column(SALES)?;
    Ok(panel
        .groups()
        .into_iter()
        .map(|g| {
            let last = panel.dates()[g.rows.end - 1];
            let values = sales[g.rows]
                .iter()
                .map(|v| if v.is_nan() { 0.0 } else { *v })
                .collect();
            (g.id.to_string(), last, values)
        })
        .collect())
}

/// Features of every series over its whole history, keyed by `id`.
pub fn compute_features(panel: &Panel, season_length: usize) -> Result<FeatureTable> {
    let series = sales_by_series(panel)?;
    let names = FEATURE_NAMES.iter().map(|n| feature_column(n)).collect();
    let (ids, rows) = series
        .into_iter()
        .map(|(id, _, values)| (id, series_features(&values, season_length)))
        .unzip();
    FeatureTable::new(ids, None, names, rows)
}

/// Features of every training fold, keyed by `(id, cutoff_date)`.
///
/// The cutoff of a series is one unit after its last training date, which
/// is the first date the fold's models predict for it.
pub fn compute_features_cv(
    panel: &Panel,
    config: &CvConfig,
    season_length: usize,
) -> Result<FeatureTable> {
    let mut tables = Vec::with_capacity(config.n_windows);
    for fold in split_cv(panel, config)? {
        let fold = fold?;
        let series = sales_by_series(&fold.train)?;
        let mut ids = Vec::with_capacity(series.len());
        let mut cutoffs = Vec::with_capacity(series.len());
        let mut rows = Vec::with_capacity(series.len());
        for (id, last, values) in series {
            ids.push(id);
            cutoffs.push(config.freq.offset(last, 1)?);
            rows.push(series_features(&values, season_length));
        }
        debug!(window = fold.window, series = ids.len(), "fold features");
        tables.push(FeatureTable::new(
            ids,
            Some(cutoffs),
            FEATURE_NAMES.iter().map(|n| feature_column(n)).collect(),
            rows,
        )?);
    }
    FeatureTable::concat(tables)
}
