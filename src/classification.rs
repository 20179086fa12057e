//! Rule-based classification of series by the shape of their sales history.
//!
//! Each series gets a set of boolean flags and a single label: the first
//! flag set in the order all_zero, trailing_zero, sparse, small_sales,
//! seasonal, falling back to regular. The `gaps` flag is reported but does
//! not take part in labelling. Missing sales count as zero.

use crate::core::{Panel, SALES};
use crate::cv::{split_cv, CutoffPartition, CvConfig};
use crate::error::{ForecastError, Result};
use crate::features::{basic::longest_run, feature_column, FeatureTable};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::str::FromStr;
use tracing::{debug, info};

/// Label of a series.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SeriesClass {
    AllZero,
    TrailingZero,
    Sparse,
    SmallSales,
    Seasonal,
    Regular,
}

impl SeriesClass {
    /// All labels in priority order.
    pub const ALL: [SeriesClass; 6] = [
        SeriesClass::AllZero,
        SeriesClass::TrailingZero,
        SeriesClass::Sparse,
        SeriesClass::SmallSales,
        SeriesClass::Seasonal,
        SeriesClass::Regular,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SeriesClass::AllZero => "all_zero",
            SeriesClass::TrailingZero => "trailing_zero",
            SeriesClass::Sparse => "sparse",
            SeriesClass::SmallSales => "small_sales",
            SeriesClass::Seasonal => "seasonal",
            SeriesClass::Regular => "regular",
        }
    }
}

impl fmt::Display for SeriesClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SeriesClass {
    type Err = ForecastError;

    fn from_str(s: &str) -> Result<Self> {
        SeriesClass::ALL
            .into_iter()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| ForecastError::InvalidParameter(format!("unknown series class '{s}'")))
    }
}

/// Thresholds of the classification rules.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationRules {
    /// Trailing window that must be all zero for `all_zero`.
    #[serde(default = "default_all_zero_window")]
    pub all_zero_window: usize,
    /// Trailing window that must be all zero for `trailing_zero`.
    #[serde(default = "default_trailing_zero_window")]
    pub trailing_zero_window: usize,
    /// Longest allowed run of non-zero sales for `sparse`.
    #[serde(default = "default_sparse_max_nonzero_run")]
    pub sparse_max_nonzero_run: usize,
    /// Zero fraction that must be exceeded for `sparse`.
    #[serde(default = "default_sparse_min_zero_fraction")]
    pub sparse_min_zero_fraction: f64,
    /// `small_sales` when the maximum is below this.
    #[serde(default = "default_small_sales_max")]
    pub small_sales_max: f64,
    /// Shortest zero run that counts as a gap.
    #[serde(default = "default_gaps_min_zero_run")]
    pub gaps_min_zero_run: usize,
    /// Seasonal autocorrelation that must be exceeded for `seasonal`.
    #[serde(default = "default_seasonal_min_acf")]
    pub seasonal_min_acf: f64,
    /// History length that must be exceeded for `seasonal`.
    #[serde(default = "default_seasonal_min_length")]
    pub seasonal_min_length: usize,
    /// Feature column holding the seasonal autocorrelation.
    #[serde(default = "default_seasonal_feature")]
    pub seasonal_feature: String,
}

fn default_all_zero_window() -> usize {
    52
}

fn default_trailing_zero_window() -> usize {
    13
}

fn default_sparse_max_nonzero_run() -> usize {
    4
}

fn default_sparse_min_zero_fraction() -> f64 {
    0.4
}

fn default_small_sales_max() -> f64 {
    4.0
}

fn default_gaps_min_zero_run() -> usize {
    13
}

fn default_seasonal_min_acf() -> f64 {
    0.55
}

fn default_seasonal_min_length() -> usize {
    52
}

fn default_seasonal_feature() -> String {
    feature_column("seas_acf1")
}

impl Default for ClassificationRules {
    fn default() -> Self {
        Self {
            all_zero_window: default_all_zero_window(),
            trailing_zero_window: default_trailing_zero_window(),
            sparse_max_nonzero_run: default_sparse_max_nonzero_run(),
            sparse_min_zero_fraction: default_sparse_min_zero_fraction(),
            small_sales_max: default_small_sales_max(),
            gaps_min_zero_run: default_gaps_min_zero_run(),
            seasonal_min_acf: default_seasonal_min_acf(),
            seasonal_min_length: default_seasonal_min_length(),
            seasonal_feature: default_seasonal_feature(),
        }
    }
}

/// Outcome of every rule for one series.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ClassFlags {
    pub all_zero: bool,
    pub trailing_zero: bool,
    pub sparse: bool,
    pub small_sales: bool,
    pub gaps: bool,
    pub seasonal: bool,
}

impl ClassFlags {
    /// First matching label in priority order.
    pub fn label(&self) -> SeriesClass {
        [
            (self.all_zero, SeriesClass::AllZero),
            (self.trailing_zero, SeriesClass::TrailingZero),
            (self.sparse, SeriesClass::Sparse),
            (self.small_sales, SeriesClass::SmallSales),
            (self.seasonal, SeriesClass::Seasonal),
        ]
        .into_iter()
        .find_map(|(hit, class)| hit.then_some(class))
        .unwrap_or(SeriesClass::Regular)
    }
}

fn tail_all_zero(values: &[f64], window: usize) -> bool {
    values[values.len().saturating_sub(window)..]
        .iter()
        .all(|v| *v == 0.0)
}

/// Evaluate every rule on one history.
///
/// `seasonal_acf` is the seasonal autocorrelation feature of the series, if
/// a feature row exists for it; without one the series is not seasonal.
pub fn classify_series(
    values: &[f64],
    seasonal_acf: Option<f64>,
    rules: &ClassificationRules,
) -> ClassFlags {
    let values: Vec<f64> = values
        .iter()
        .map(|v| if v.is_nan() { 0.0 } else { *v })
        .collect();
    let n = values.len();

    let all_zero = tail_all_zero(&values, rules.all_zero_window) || values.iter().all(|v| *v == 0.0);
    let trailing_zero = tail_all_zero(&values, rules.trailing_zero_window);

    let zero_fraction = if n == 0 {
        0.0
    } else {
        values.iter().filter(|v| **v == 0.0).count() as f64 / n as f64
    };
    let sparse = longest_run(&values, |v| v != 0.0) <= rules.sparse_max_nonzero_run
        && zero_fraction > rules.sparse_min_zero_fraction;

    let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let small_sales = max < rules.small_sales_max;

    let gaps = longest_run(&values, |v| v == 0.0) >= rules.gaps_min_zero_run
        && !trailing_zero
        && !sparse;

    let seasonal = seasonal_acf.is_some_and(|acf| acf > rules.seasonal_min_acf)
        && n > rules.seasonal_min_length;

    ClassFlags {
        all_zero,
        trailing_zero,
        sparse,
        small_sales,
        gaps,
        seasonal,
    }
}

/// Classification of every series, keyed by `(id[, cutoff_date])`.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Classification {
    ids: Vec<String>,
    cutoffs: Option<Vec<NaiveDate>>,
    flags: Vec<ClassFlags>,
}

impl Classification {
    /// Build from explicit labels.
    ///
    /// Each label is stored as a flag set that reproduces it.
    pub fn from_labels(
        ids: Vec<String>,
        cutoffs: Option<Vec<NaiveDate>>,
        labels: Vec<SeriesClass>,
    ) -> Result<Self> {
        let flags = labels
            .into_iter()
            .map(|class| {
                let mut f = ClassFlags::default();
                match class {
                    SeriesClass::AllZero => f.all_zero = true,
                    SeriesClass::TrailingZero => f.trailing_zero = true,
                    SeriesClass::Sparse => f.sparse = true,
                    SeriesClass::SmallSales => f.small_sales = true,
                    SeriesClass::Seasonal => f.seasonal = true,
                    SeriesClass::Regular => {}
                }
                f
            })
            .collect();
        Self::new(ids, cutoffs, flags)
    }

    fn new(ids: Vec<String>, cutoffs: Option<Vec<NaiveDate>>, flags: Vec<ClassFlags>) -> Result<Self> {
        if flags.len() != ids.len() {
            return Err(ForecastError::DimensionMismatch {
                expected: ids.len(),
                got: flags.len(),
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
        let out = Self {
            ids,
            cutoffs,
            flags,
        };
        if out.index().len() != out.len() {
            return Err(ForecastError::DuplicateKey(
                "classification has repeated (id, cutoff_date) keys".into(),
            ));
        }
        Ok(out)
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

    pub fn flags(&self) -> &[ClassFlags] {
        &self.flags
    }

    /// Label of row `i`.
    pub fn label(&self, i: usize) -> SeriesClass {
        self.flags[i].label()
    }

    /// Row index by key.
    pub fn index(&self) -> HashMap<(&str, Option<NaiveDate>), usize> {
        (0..self.len())
            .map(|i| ((self.ids[i].as_str(), self.cutoffs.as_ref().map(|c| c[i])), i))
            .collect()
    }

    /// Label of a key.
    pub fn class_of(&self, id: &str, cutoff: Option<NaiveDate>) -> Option<SeriesClass> {
        (0..self.len())
            .find(|&i| self.ids[i] == id && self.cutoffs.as_ref().map(|c| c[i]) == cutoff)
            .map(|i| self.label(i))
    }

    /// Number of series per label.
    pub fn class_counts(&self) -> BTreeMap<SeriesClass, usize> {
        let mut counts = BTreeMap::new();
        for f in &self.flags {
            *counts.entry(f.label()).or_insert(0) += 1;
        }
        counts
    }

    fn filter(&self, keep: impl Fn(usize) -> bool) -> Self {
        let rows: Vec<usize> = (0..self.len()).filter(|&i| keep(i)).collect();
        Self {
            ids: rows.iter().map(|&i| self.ids[i].clone()).collect(),
            cutoffs: self
                .cutoffs
                .as_ref()
                .map(|c| rows.iter().map(|&i| c[i]).collect()),
            flags: rows.iter().map(|&i| self.flags[i]).collect(),
        }
    }
}

impl CutoffPartition for Classification {
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

fn seasonal_acf(
    features: &FeatureTable,
    index: &HashMap<(&str, Option<NaiveDate>), usize>,
    column: Option<usize>,
    id: &str,
    cutoff: Option<NaiveDate>,
) -> Option<f64> {
    let j = column?;
    index.get(&(id, cutoff)).map(|&i| features.row(i)[j])
}

fn classify_panel(
    sales: &Panel,
    features: &FeatureTable,
    cutoff_of: impl Fn(NaiveDate) -> Result<Option<NaiveDate>>,
    rules: &ClassificationRules,
) -> Result<Classification> {
    let values = sales.column(SALES)?;
    let index = features.index();
    let column = features.names().iter().position(|n| *n == rules.seasonal_feature);
    if column.is_none() {
        debug!(feature = %rules.seasonal_feature, "seasonal feature missing, no series will be seasonal");
    }

    let mut ids = Vec::new();
    let mut cutoffs = Vec::new();
    let mut flags = Vec::new();
    for group in sales.groups() {
        let last = sales.dates()[group.rows.end - 1];
        let cutoff = cutoff_of(last)?;
        let acf = seasonal_acf(features, &index, column, group.id, cutoff);
        flags.push(classify_series(&values[group.rows], acf, rules));
        ids.push(group.id.to_string());
        cutoffs.extend(cutoff);
    }
    let has_cutoff = cutoffs.len() == ids.len() && !ids.is_empty();
    Classification::new(ids, has_cutoff.then_some(cutoffs), flags)
}

/// Classify every series on its whole history, with features keyed by `id`.
pub fn classify(
    sales: &Panel,
    features: &FeatureTable,
    rules: &ClassificationRules,
) -> Result<Classification> {
    let out = classify_panel(sales, features, |_| Ok(None), rules)?;
    info!(counts = ?out.class_counts(), "live classification");
    Ok(out)
}

/// Classify every series per training fold.
///
/// The cutoff of a series is one unit after its last training date, and its
/// features are looked up by `(id, cutoff_date)`.
pub fn classify_cv(
    sales: &Panel,
    features: &FeatureTable,
    config: &CvConfig,
    rules: &ClassificationRules,
) -> Result<Classification> {
    let mut ids = Vec::new();
    let mut cutoffs = Vec::new();
    let mut flags = Vec::new();
    for fold in split_cv(sales, config)? {
        let fold = fold?;
        let c = classify_panel(
            &fold.train,
            features,
            |last| config.freq.offset(last, 1).map(Some),
            rules,
        )?;
        debug!(window = fold.window, counts = ?c.class_counts(), "fold classification");
        ids.extend(c.ids);
        cutoffs.extend(c.cutoffs.unwrap_or_default());
        flags.extend(c.flags);
    }
    Classification::new(ids, Some(cutoffs), flags)
}
