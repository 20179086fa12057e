//! Long-format panel of many time series.
//!
//! A [`Panel`] holds one row per `(id, date)` (or `(id, cutoff_date, date)`
//! for cross-validation output) and any number of named `f64` value
//! columns. Missing values are `NaN`. Rows are always stored sorted by
//! `(id, cutoff_date, date)` so every series occupies a contiguous range.

use crate::core::Frequency;
use crate::error::{ForecastError, Result};
use chrono::NaiveDate;
use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};
use std::ops::Range;

/// Prefix that marks a value column as a model prediction.
pub const PREDICTION_PREFIX: &str = "pred_";

/// Name of the target column.
pub const SALES: &str = "sales";

/// Name of the price covariate column.
pub const PRICE: &str = "price";

/// Prediction column name for a model.
pub fn prediction_column(model: &str) -> String {
    format!("{PREDICTION_PREFIX}{model}")
}

/// Keys two panels are joined on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinKeys {
    /// `(id, date)`
    IdDate,
    /// `(id, date, cutoff_date)`; both sides must carry cutoffs.
    IdDateCutoff,
}

/// Which rows a join keeps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinKind {
    /// Only rows whose key is present on both sides.
    Inner,
    /// All rows of the left side; absent right values become `NaN`.
    Left,
}

/// A named value column.
#[derive(Debug, Clone, PartialEq)]
struct Column {
    name: String,
    values: Vec<f64>,
}

/// A contiguous run of rows sharing `(id, cutoff_date)`.
#[derive(Debug, Clone, PartialEq)]
pub struct SeriesGroup<'a> {
    pub id: &'a str,
    pub cutoff: Option<NaiveDate>,
    pub rows: Range<usize>,
}

/// Long-format table of time series observations.
#[derive(Debug, Clone, PartialEq)]
pub struct Panel {
    ids: Vec<String>,
    dates: Vec<NaiveDate>,
    cutoffs: Option<Vec<NaiveDate>>,
    columns: Vec<Column>,
}

impl Default for Panel {
    fn default() -> Self {
        Self::empty(&[])
    }
}

impl Panel {
    /// Create a panel, sorting rows and validating key uniqueness.
    pub fn new(
        ids: Vec<String>,
        dates: Vec<NaiveDate>,
        cutoffs: Option<Vec<NaiveDate>>,
        columns: Vec<(String, Vec<f64>)>,
    ) -> Result<Self> {
        let n = ids.len();
        if dates.len() != n {
            return Err(ForecastError::DimensionMismatch {
                expected: n,
                got: dates.len(),
            });
        }
        if let Some(c) = &cutoffs {
            if c.len() != n {
                return Err(ForecastError::DimensionMismatch {
                    expected: n,
                    got: c.len(),
                });
            }
        }
        let mut seen = HashSet::new();
        for (name, values) in &columns {
            if values.len() != n {
                return Err(ForecastError::DimensionMismatch {
                    expected: n,
                    got: values.len(),
                });
            }
            if !seen.insert(name.as_str()) {
                return Err(ForecastError::InvalidParameter(format!(
                    "column '{name}' given twice"
                )));
            }
        }

        let mut order: Vec<usize> = (0..n).collect();
        order.sort_by(|&a, &b| {
            ids[a]
                .cmp(&ids[b])
                .then_with(|| {
                    cutoffs
                        .as_ref()
                        .map(|c| c[a].cmp(&c[b]))
                        .unwrap_or(Ordering::Equal)
                })
                .then_with(|| dates[a].cmp(&dates[b]))
        });

        let panel = Self {
            ids: order.iter().map(|&i| ids[i].clone()).collect(),
            dates: order.iter().map(|&i| dates[i]).collect(),
            cutoffs: cutoffs.map(|c| order.iter().map(|&i| c[i]).collect()),
            columns: columns
                .into_iter()
                .map(|(name, values)| Column {
                    name,
                    values: order.iter().map(|&i| values[i]).collect(),
                })
                .collect(),
        };

        for i in 1..panel.len() {
            if panel.ids[i] == panel.ids[i - 1]
                && panel.dates[i] == panel.dates[i - 1]
                && panel.cutoff(i) == panel.cutoff(i - 1)
            {
                return Err(ForecastError::DuplicateKey(panel.describe_row(i)));
            }
        }

        Ok(panel)
    }

    /// Empty panel with the given value columns.
    pub fn empty(columns: &[&str]) -> Self {
        Self {
            ids: Vec::new(),
            dates: Vec::new(),
            cutoffs: None,
            columns: columns
                .iter()
                .map(|name| Column {
                    name: name.to_string(),
                    values: Vec::new(),
                })
                .collect(),
        }
    }

    /// Build a panel from whole series sampled at a regular frequency.
    ///
    /// Each entry is `(id, first date, values)`; all values go to `column`.
    pub fn from_series<'a, I>(freq: Frequency, column: &str, series: I) -> Result<Self>
    where
        I: IntoIterator<Item = (&'a str, NaiveDate, Vec<f64>)>,
    {
        let mut ids = Vec::new();
        let mut dates = Vec::new();
        let mut values = Vec::new();
        for (id, start, v) in series {
            dates.extend(freq.range(start, v.len())?);
            ids.extend(std::iter::repeat(id.to_string()).take(v.len()));
            values.extend(v);
        }
        Self::new(ids, dates, None, vec![(column.to_string(), values)])
    }

    /// Number of rows.
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn ids(&self) -> &[String] {
        &self.ids
    }

    pub fn dates(&self) -> &[NaiveDate] {
        &self.dates
    }

    /// Cutoff dates, present on cross-validation output only.
    pub fn cutoffs(&self) -> Option<&[NaiveDate]> {
        self.cutoffs.as_deref()
    }

    pub fn has_cutoff(&self) -> bool {
        self.cutoffs.is_some()
    }

    /// Cutoff of row `i`, if the panel carries cutoffs.
    pub fn cutoff(&self, i: usize) -> Option<NaiveDate> {
        self.cutoffs.as_ref().map(|c| c[i])
    }

    /// Names of the value columns in insertion order.
    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.columns.iter().any(|c| c.name == name)
    }

    /// Values of a column.
    pub fn column(&self, name: &str) -> Result<&[f64]> {
        self.columns
            .iter()
            .find(|c| c.name == name)
            .map(|c| c.values.as_slice())
            .ok_or_else(|| ForecastError::MissingColumn(name.to_string()))
    }

    /// Prediction columns, discovered by prefix.
    pub fn prediction_columns(&self) -> Vec<&str> {
        self.columns
            .iter()
            .map(|c| c.name.as_str())
            .filter(|name| name.starts_with(PREDICTION_PREFIX))
            .collect()
    }

    /// Model names of the prediction columns (prefix stripped).
    pub fn model_names(&self) -> Vec<String> {
        self.prediction_columns()
            .into_iter()
            .map(|name| name[PREDICTION_PREFIX.len()..].to_string())
            .collect()
    }

    /// Contiguous `(id, cutoff)` runs in row order.
    pub fn groups(&self) -> Vec<SeriesGroup<'_>> {
        let mut groups = Vec::new();
        let mut start = 0;
        for i in 1..=self.len() {
            let boundary = i == self.len()
                || self.ids[i] != self.ids[start]
                || self.cutoff(i) != self.cutoff(start);
            if boundary {
                groups.push(SeriesGroup {
                    id: &self.ids[start],
                    cutoff: self.cutoff(start),
                    rows: start..i,
                });
                start = i;
            }
        }
        groups
    }

    /// Distinct ids in sorted order.
    pub fn unique_ids(&self) -> Vec<&str> {
        let mut out: Vec<&str> = Vec::new();
        for id in &self.ids {
            if out.last() != Some(&id.as_str()) {
                out.push(id);
            }
        }
        out
    }

    /// Distinct cutoff dates in ascending order.
    pub fn distinct_cutoffs(&self) -> Result<Vec<NaiveDate>> {
        let cutoffs = self.cutoffs.as_ref().ok_or(ForecastError::MissingCutoff)?;
        let mut out: Vec<NaiveDate> = cutoffs.clone();
        out.sort();
        out.dedup();
        Ok(out)
    }

    /// Last observed date of every id.
    pub fn max_date_by_id(&self) -> HashMap<&str, NaiveDate> {
        let mut out: HashMap<&str, NaiveDate> = HashMap::new();
        for (id, &date) in self.ids.iter().zip(&self.dates) {
            out.entry(id.as_str())
                .and_modify(|d| *d = (*d).max(date))
                .or_insert(date);
        }
        out
    }

    /// First date of every id.
    pub fn min_date_by_id(&self) -> HashMap<&str, NaiveDate> {
        let mut out: HashMap<&str, NaiveDate> = HashMap::new();
        for (id, &date) in self.ids.iter().zip(&self.dates) {
            out.entry(id.as_str())
                .and_modify(|d| *d = (*d).min(date))
                .or_insert(date);
        }
        out
    }

    /// Subset of rows, given in ascending order.
    pub(crate) fn take(&self, rows: &[usize]) -> Self {
        Self {
            ids: rows.iter().map(|&i| self.ids[i].clone()).collect(),
            dates: rows.iter().map(|&i| self.dates[i]).collect(),
            cutoffs: self
                .cutoffs
                .as_ref()
                .map(|c| rows.iter().map(|&i| c[i]).collect()),
            columns: self
                .columns
                .iter()
                .map(|c| Column {
                    name: c.name.clone(),
                    values: rows.iter().map(|&i| c.values[i]).collect(),
                })
                .collect(),
        }
    }

    /// Keep the rows for which `keep(row_index)` is true.
    pub fn filter_rows<F>(&self, mut keep: F) -> Self
    where
        F: FnMut(usize) -> bool,
    {
        let rows: Vec<usize> = (0..self.len()).filter(|&i| keep(i)).collect();
        self.take(&rows)
    }

    /// Keep only the named value columns, in the given order.
    pub fn select(&self, names: &[&str]) -> Result<Self> {
        let columns = names
            .iter()
            .map(|&name| {
                self.column(name).map(|values| Column {
                    name: name.to_string(),
                    values: values.to_vec(),
                })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            ids: self.ids.clone(),
            dates: self.dates.clone(),
            cutoffs: self.cutoffs.clone(),
            columns,
        })
    }

    /// Add a column, replacing any column of the same name.
    pub fn with_column(&self, name: &str, values: Vec<f64>) -> Result<Self> {
        if values.len() != self.len() {
            return Err(ForecastError::DimensionMismatch {
                expected: self.len(),
                got: values.len(),
            });
        }
        let mut out = self.clone();
        match out.columns.iter_mut().find(|c| c.name == name) {
            Some(col) => col.values = values,
            None => out.columns.push(Column {
                name: name.to_string(),
                values,
            }),
        }
        Ok(out)
    }

    /// Rename a value column.
    pub fn rename_column(&self, from: &str, to: &str) -> Result<Self> {
        if from != to && self.has_column(to) {
            return Err(ForecastError::InvalidParameter(format!(
                "column '{to}' already exists"
            )));
        }
        let mut out = self.clone();
        let col = out
            .columns
            .iter_mut()
            .find(|c| c.name == from)
            .ok_or_else(|| ForecastError::MissingColumn(from.to_string()))?;
        col.name = to.to_string();
        Ok(out)
    }

    /// Attach cutoff dates, one per row.
    pub fn with_cutoffs(&self, cutoffs: Vec<NaiveDate>) -> Result<Self> {
        Self::new(
            self.ids.clone(),
            self.dates.clone(),
            Some(cutoffs),
            self.owned_columns(),
        )
    }

    /// Drop the cutoff column.
    pub fn without_cutoffs(&self) -> Result<Self> {
        Self::new(
            self.ids.clone(),
            self.dates.clone(),
            None,
            self.owned_columns(),
        )
    }

    /// Stamp every row with the earliest date of its id as `cutoff_date`.
    ///
    /// For a forecast panel this is the first predicted date, i.e. the
    /// information horizon of the model that produced the rows.
    pub fn stamp_min_date_cutoff(&self) -> Result<Self> {
        let min_dates = self.min_date_by_id();
        let cutoffs = self.ids.iter().map(|id| min_dates[id.as_str()]).collect();
        self.with_cutoffs(cutoffs)
    }

    /// Forward-fill `NaN` values of a column within each id.
    pub fn forward_fill_by_id(&self, name: &str) -> Result<Self> {
        let mut values = self.column(name)?.to_vec();
        for group in self.groups() {
            let mut last = f64::NAN;
            for v in &mut values[group.rows] {
                if v.is_nan() {
                    *v = last;
                } else {
                    last = *v;
                }
            }
        }
        self.with_column(name, values)
    }

    /// Replace non-finite prediction values with zero and clip negatives.
    pub fn sanitize_predictions(&self) -> Self {
        let mut out = self.clone();
        for col in out
            .columns
            .iter_mut()
            .filter(|c| c.name.starts_with(PREDICTION_PREFIX))
        {
            for v in &mut col.values {
                if !v.is_finite() || *v < 0.0 {
                    *v = 0.0;
                }
            }
        }
        out
    }

    /// Vertically concatenate panels with the same columns.
    ///
    /// Empty panels are skipped, so empty fold fragments never constrain
    /// the schema of the result.
    pub fn concat(panels: &[Panel]) -> Result<Self> {
        let non_empty: Vec<&Panel> = panels.iter().filter(|p| !p.is_empty()).collect();
        let Some(first) = non_empty.first() else {
            return Ok(panels.first().cloned().unwrap_or_default());
        };
        let names = first.column_names();
        let with_cutoff = first.has_cutoff();

        let mut ids = Vec::new();
        let mut dates = Vec::new();
        let mut cutoffs = Vec::new();
        let mut columns: Vec<Vec<f64>> = vec![Vec::new(); names.len()];
        for panel in &non_empty {
            if panel.has_cutoff() != with_cutoff {
                return Err(ForecastError::InvalidParameter(
                    "cannot concatenate panels with and without cutoff_date".into(),
                ));
            }
            let mut other = panel.column_names();
            let mut expected = names.clone();
            other.sort_unstable();
            expected.sort_unstable();
            if other != expected {
                return Err(ForecastError::InvalidParameter(format!(
                    "column mismatch in concat: {:?} vs {:?}",
                    names,
                    panel.column_names()
                )));
            }
            ids.extend_from_slice(&panel.ids);
            dates.extend_from_slice(&panel.dates);
            if let Some(c) = &panel.cutoffs {
                cutoffs.extend_from_slice(c);
            }
            for (j, name) in names.iter().enumerate() {
                columns[j].extend_from_slice(panel.column(name)?);
            }
        }

        Self::new(
            ids,
            dates,
            with_cutoff.then_some(cutoffs),
            names
                .iter()
                .map(|n| n.to_string())
                .zip(columns)
                .collect(),
        )
    }

    /// Join the value columns of `other` onto this panel.
    ///
    /// The result keeps this panel's keys (including its cutoffs). Value
    /// columns present on both sides are an error.
    pub fn join(&self, other: &Panel, on: JoinKeys, how: JoinKind) -> Result<Self> {
        if on == JoinKeys::IdDateCutoff && (!self.has_cutoff() || !other.has_cutoff()) {
            return Err(ForecastError::MissingCutoff);
        }
        for name in other.column_names() {
            if self.has_column(name) {
                return Err(ForecastError::InvalidParameter(format!(
                    "column '{name}' present on both sides of join"
                )));
            }
        }

        fn key_of(p: &Panel, i: usize, on: JoinKeys) -> (&str, NaiveDate, Option<NaiveDate>) {
            let cutoff = match on {
                JoinKeys::IdDate => None,
                JoinKeys::IdDateCutoff => p.cutoff(i),
            };
            (p.ids[i].as_str(), p.dates[i], cutoff)
        }
        let mut index = HashMap::with_capacity(other.len());
        for i in 0..other.len() {
            if index.insert(key_of(other, i, on), i).is_some() {
                return Err(ForecastError::DuplicateKey(other.describe_row(i)));
            }
        }

        let mut rows = Vec::new();
        let mut matches = Vec::new();
        for i in 0..self.len() {
            match index.get(&key_of(self, i, on)) {
                Some(&j) => {
                    rows.push(i);
                    matches.push(Some(j));
                }
                None if how == JoinKind::Left => {
                    rows.push(i);
                    matches.push(None);
                }
                None => {}
            }
        }

        let mut out = self.take(&rows);
        for col in &other.columns {
            let values = matches
                .iter()
                .map(|m| m.map(|j| col.values[j]).unwrap_or(f64::NAN))
                .collect();
            out.columns.push(Column {
                name: col.name.clone(),
                values,
            });
        }
        Ok(out)
    }

    fn owned_columns(&self) -> Vec<(String, Vec<f64>)> {
        self.columns
            .iter()
            .map(|c| (c.name.clone(), c.values.clone()))
            .collect()
    }

    fn describe_row(&self, i: usize) -> String {
        match self.cutoff(i) {
            Some(c) => format!("id={} date={} cutoff_date={}", self.ids[i], self.dates[i], c),
            None => format!("id={} date={}", self.ids[i], self.dates[i]),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn sample() -> Panel {
        Panel::from_series(
            Frequency::Week,
            SALES,
            [
                ("b", d(2024, 1, 1), vec![1.0, 2.0, 3.0]),
                ("a", d(2024, 1, 8), vec![4.0, 5.0]),
            ],
        )
        .unwrap()
    }

    #[test]
    fn rows_are_sorted_by_id_then_date() {
        let p = Panel::new(
            vec!["b".into(), "a".into(), "a".into()],
            vec![d(2024, 1, 1), d(2024, 1, 15), d(2024, 1, 8)],
            None,
            vec![(SALES.into(), vec![1.0, 3.0, 2.0])],
        )
        .unwrap();
        assert_eq!(p.ids(), &["a", "a", "b"]);
        assert_eq!(p.dates()[0], d(2024, 1, 8));
        assert_eq!(p.column(SALES).unwrap(), &[2.0, 3.0, 1.0]);
    }

    #[test]
    fn duplicate_keys_are_rejected() {
        let err = Panel::new(
            vec!["a".into(), "a".into()],
            vec![d(2024, 1, 1), d(2024, 1, 1)],
            None,
            vec![(SALES.into(), vec![1.0, 2.0])],
        )
        .unwrap_err();
        assert!(matches!(err, ForecastError::DuplicateKey(_)));
    }

    #[test]
    fn same_date_under_different_cutoffs_is_allowed() {
        let p = Panel::new(
            vec!["a".into(), "a".into()],
            vec![d(2024, 1, 15), d(2024, 1, 15)],
            Some(vec![d(2024, 1, 8), d(2024, 1, 15)]),
            vec![],
        )
        .unwrap();
        assert_eq!(p.distinct_cutoffs().unwrap().len(), 2);
        assert_eq!(p.groups().len(), 2);
    }

    #[test]
    fn cutoff_rows_sort_before_dates_and_join_on_cutoff() {
        let cv = Panel::new(
            vec!["a".into(), "a".into(), "a".into()],
            vec![d(2024, 1, 22), d(2024, 1, 15), d(2024, 1, 15)],
            Some(vec![d(2024, 1, 15), d(2024, 1, 15), d(2024, 1, 8)]),
            vec![("pred_A".into(), vec![3.0, 2.0, 1.0])],
        )
        .unwrap();
        assert_eq!(cv.cutoffs().unwrap(), &[d(2024, 1, 8), d(2024, 1, 15), d(2024, 1, 15)]);
        assert_eq!(cv.column("pred_A").unwrap(), &[1.0, 2.0, 3.0]);

        let other = Panel::new(
            vec!["a".into()],
            vec![d(2024, 1, 15)],
            Some(vec![d(2024, 1, 15)]),
            vec![("pred_B".into(), vec![9.0])],
        )
        .unwrap();
        let joined = cv.join(&other, JoinKeys::IdDateCutoff, JoinKind::Inner).unwrap();
        assert_eq!(joined.len(), 1);
        assert_eq!(joined.column("pred_A").unwrap(), &[2.0]);
        let by_date = cv
            .join(&other.without_cutoffs().unwrap(), JoinKeys::IdDate, JoinKind::Left)
            .unwrap();
        assert_eq!(by_date.column("pred_B").unwrap()[..2], [9.0, 9.0]);
    }

    #[test]
    fn groups_cover_contiguous_rows() {
        let p = sample();
        let groups = p.groups();
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].id, "a");
        assert_eq!(groups[0].rows, 0..2);
        assert_eq!(groups[1].rows, 2..5);
        assert_eq!(p.unique_ids(), vec!["a", "b"]);
    }

    #[test]
    fn prediction_columns_are_discovered_by_prefix() {
        let p = sample()
            .with_column(&prediction_column("Naive"), vec![0.0; 5])
            .unwrap();
        assert_eq!(p.prediction_columns(), vec!["pred_Naive"]);
        assert_eq!(p.model_names(), vec!["Naive".to_string()]);
    }

    #[test]
    fn stamp_min_date_cutoff_uses_first_date_per_id() {
        let p = sample().stamp_min_date_cutoff().unwrap();
        let cutoffs = p.cutoffs().unwrap();
        assert_eq!(cutoffs[0], d(2024, 1, 8));
        assert_eq!(cutoffs[4], d(2024, 1, 1));
    }

    #[test]
    fn forward_fill_stays_within_id() {
        let p = Panel::new(
            vec!["a".into(), "a".into(), "b".into(), "b".into()],
            vec![d(2024, 1, 1), d(2024, 1, 8), d(2024, 1, 1), d(2024, 1, 8)],
            None,
            vec![(PRICE.into(), vec![2.0, f64::NAN, f64::NAN, 3.0])],
        )
        .unwrap();
        let filled = p.forward_fill_by_id(PRICE).unwrap();
        let values = filled.column(PRICE).unwrap();
        assert_eq!(values[1], 2.0);
        assert!(values[2].is_nan());
        assert_eq!(values[3], 3.0);
    }

    #[test]
    fn sanitize_only_touches_prediction_columns() {
        let p = sample()
            .with_column(SALES, vec![-1.0, 1.0, 1.0, 1.0, 1.0])
            .unwrap()
            .with_column("pred_X", vec![-1.0, f64::NAN, f64::INFINITY, 2.0, 0.5])
            .unwrap()
            .sanitize_predictions();
        assert_eq!(p.column("pred_X").unwrap(), &[0.0, 0.0, 0.0, 2.0, 0.5]);
        assert_eq!(p.column(SALES).unwrap()[0], -1.0);
    }

    #[test]
    fn concat_skips_empty_fragments() {
        let p = sample();
        let out = Panel::concat(&[Panel::empty(&["other"]), p.clone()]).unwrap();
        assert_eq!(out, p);
        assert!(Panel::concat(&[]).unwrap().is_empty());
    }

    #[test]
    fn concat_rejects_schema_mismatch() {
        let a = sample();
        let b = sample().rename_column(SALES, "units").unwrap();
        assert!(Panel::concat(&[a, b]).is_err());
    }

    #[test]
    fn inner_and_left_joins() {
        let left = sample();
        let right = Panel::from_series(
            Frequency::Week,
            "pred_Zero",
            [("a", d(2024, 1, 8), vec![0.0, 0.0])],
        )
        .unwrap();

        let inner = left.join(&right, JoinKeys::IdDate, JoinKind::Inner).unwrap();
        assert_eq!(inner.len(), 2);
        assert_eq!(inner.column_names(), vec![SALES, "pred_Zero"]);

        let outer = left.join(&right, JoinKeys::IdDate, JoinKind::Left).unwrap();
        assert_eq!(outer.len(), 5);
        assert!(outer.column("pred_Zero").unwrap()[4].is_nan());
    }

    #[test]
    fn join_requires_cutoffs_for_cutoff_keys() {
        let p = sample();
        assert_eq!(
            p.join(&p.select(&[]).unwrap(), JoinKeys::IdDateCutoff, JoinKind::Inner),
            Err(ForecastError::MissingCutoff)
        );
    }
}
