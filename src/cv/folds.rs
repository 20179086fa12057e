//! Fold generators.

use super::CvConfig;
use crate::core::Panel;
use crate::error::{ForecastError, Result};
use chrono::NaiveDate;
use std::ops::Range;

/// One rolling-origin validation window.
#[derive(Debug, Clone, PartialEq)]
pub struct Fold {
    /// Window index, `0` for the oldest window.
    pub window: usize,
    /// Rows at or before each entity's lower boundary.
    pub train: Panel,
    /// Rows in `(lower, upper]` for entities that survived the train filter
    /// and have at least one such row.
    pub test: Panel,
}

impl Fold {
    /// True when every entity was removed by the train-size filter.
    pub fn is_empty(&self) -> bool {
        self.train.is_empty()
    }
}

/// Lazy iterator over rolling-origin folds, oldest window first.
///
/// Created by [`split_cv`].
#[derive(Debug)]
pub struct SplitCv<'a> {
    panel: &'a Panel,
    config: CvConfig,
    series: Vec<(Range<usize>, NaiveDate)>,
    remaining: usize,
}

/// Rolling-origin folds over a sales panel.
///
/// For window `i` (counting down from `n_windows - 1`), the boundaries of
/// each entity are measured back from its own last date:
/// `lower = max_date - (i * step + h)` and `upper = max_date - i * step`.
/// The train panel holds the rows with `date <= lower`; the test panel holds
/// rows with `lower < date <= upper` of the entities that kept at least one
/// (or `min_train_size`) training rows. An entity with no row inside
/// `(lower, upper]` is left out of both panels for that window.
///
/// # Example
///
/// ```
/// use chrono::NaiveDate;
/// use salescast::core::{Frequency, Panel, SALES};
/// use salescast::cv::{split_cv, CvConfig};
///
/// let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
/// let panel = Panel::from_series(Frequency::Week, SALES, [("a", start, vec![1.0; 20])]).unwrap();
///
/// let folds: Vec<_> = split_cv(&panel, &CvConfig::new(4, 2))
///     .unwrap()
///     .collect::<Result<_, _>>()
///     .unwrap();
/// assert_eq!(folds.len(), 2);
/// assert_eq!(folds[0].train.len(), 12);
/// assert_eq!(folds[0].test.len(), 4);
/// assert_eq!(folds[1].train.len(), 16);
/// ```
pub fn split_cv<'a>(panel: &'a Panel, config: &CvConfig) -> Result<SplitCv<'a>> {
    config.validate()?;
    if panel.has_cutoff() {
        return Err(ForecastError::InvalidParameter(
            "split_cv expects a panel without cutoff_date".into(),
        ));
    }
    let series = panel
        .groups()
        .into_iter()
        .map(|g| {
            let last = panel.dates()[g.rows.end - 1];
            (g.rows, last)
        })
        .collect();
    Ok(SplitCv {
        panel,
        config: config.clone(),
        series,
        remaining: config.n_windows,
    })
}

impl SplitCv<'_> {
    fn window_fold(&self, window: usize) -> Result<Fold> {
        let cfg = &self.config;
        let (offset, back) = cfg.window_offsets(window)?;
        let dates = self.panel.dates();
        let min_train = cfg.min_train_size.unwrap_or(1).max(1);

        let mut train_rows = Vec::new();
        let mut test_rows = Vec::new();
        for (rows, last) in &self.series {
            let lower = cfg.freq.offset(*last, -back)?;
            let upper = cfg.freq.offset(*last, -offset)?;

            let n_train = rows.clone().filter(|&i| dates[i] <= lower).count();
            if n_train < min_train {
                continue;
            }
            // an entity whose window falls into a gap has nothing to validate
            let n_test = rows
                .clone()
                .filter(|&i| dates[i] > lower && dates[i] <= upper)
                .count();
            if n_test == 0 {
                continue;
            }
            train_rows.extend(rows.clone().filter(|&i| dates[i] <= lower));
            test_rows.extend(
                rows.clone()
                    .filter(|&i| dates[i] > lower && dates[i] <= upper),
            );
        }

        Ok(Fold {
            window,
            train: self.panel.take(&train_rows),
            test: self.panel.take(&test_rows),
        })
    }
}

impl Iterator for SplitCv<'_> {
    type Item = Result<Fold>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }
        let window = self.config.n_windows - self.remaining;
        self.remaining -= 1;
        Some(self.window_fold(window))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl ExactSizeIterator for SplitCv<'_> {}

/// A table whose rows carry a `cutoff_date` and can be split on it.
pub trait CutoffPartition: Sized {
    /// Distinct cutoff dates in ascending order.
    fn cutoff_dates(&self) -> Result<Vec<NaiveDate>>;

    /// Split into `(rows with cutoff != g, rows with cutoff == g)`.
    fn partition_cutoff(&self, cutoff: NaiveDate) -> Result<(Self, Self)>;
}

impl CutoffPartition for Panel {
    fn cutoff_dates(&self) -> Result<Vec<NaiveDate>> {
        self.distinct_cutoffs()
    }

    fn partition_cutoff(&self, cutoff: NaiveDate) -> Result<(Self, Self)> {
        let cutoffs = self.cutoffs().ok_or(ForecastError::MissingCutoff)?;
        Ok((
            self.filter_rows(|i| cutoffs[i] != cutoff),
            self.filter_rows(|i| cutoffs[i] == cutoff),
        ))
    }
}

/// One leave-one-cutoff-out fold.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LooFold {
    pub index: usize,
    /// The held-out cutoff.
    pub cutoff: NaiveDate,
}

impl LooFold {
    /// Split any cutoff-carrying table by this fold's cutoff.
    pub fn split<T: CutoffPartition>(&self, table: &T) -> Result<(T, T)> {
        table.partition_cutoff(self.cutoff)
    }
}

/// Iterator over leave-one-cutoff-out folds, ascending by cutoff.
#[derive(Debug, Clone)]
pub struct LooSplits {
    cutoffs: std::vec::IntoIter<NaiveDate>,
    next_index: usize,
}

impl Iterator for LooSplits {
    type Item = LooFold;

    fn next(&mut self) -> Option<Self::Item> {
        let cutoff = self.cutoffs.next()?;
        let index = self.next_index;
        self.next_index += 1;
        Some(LooFold { index, cutoff })
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.cutoffs.size_hint()
    }
}

impl ExactSizeIterator for LooSplits {}

/// Leave-one-cutoff-out folds anchored on the distinct cutoffs of `anchor`.
///
/// Each yielded [`LooFold`] splits the anchor and any sibling table (features,
/// classifications, scores) by the same cutoff, so the held-out rows of every
/// table describe the same forecast origin.
pub fn split_cv_loo<T: CutoffPartition>(anchor: &T) -> Result<LooSplits> {
    Ok(LooSplits {
        cutoffs: anchor.cutoff_dates()?.into_iter(),
        next_index: 0,
    })
}
