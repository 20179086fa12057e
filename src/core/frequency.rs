//! Calendar frequency of a panel and the date arithmetic fold boundaries use.

use crate::error::{ForecastError, Result};
use chrono::{Datelike, Duration, Months, NaiveDate};
use serde::{Deserialize, Serialize};

/// Calendar unit between consecutive observations of a series.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Frequency {
    #[serde(alias = "d", alias = "1d")]
    Day,
    #[default]
    #[serde(alias = "w", alias = "1w")]
    Week,
    #[serde(alias = "mo", alias = "1mo")]
    Month,
}

impl Frequency {
    /// Shift `date` by `steps` units (negative steps move backwards).
    pub fn offset(&self, date: NaiveDate, steps: i64) -> Result<NaiveDate> {
        let shifted = match self {
            Frequency::Day => Duration::try_days(steps).and_then(|d| date.checked_add_signed(d)),
            Frequency::Week => Duration::try_weeks(steps).and_then(|d| date.checked_add_signed(d)),
            Frequency::Month => {
                let months = Months::new(steps.unsigned_abs().min(u32::MAX as u64) as u32);
                if steps >= 0 {
                    date.checked_add_months(months)
                } else {
                    date.checked_sub_months(months)
                }
            }
        };
        shifted.ok_or_else(|| {
            ForecastError::DateError(format!("cannot shift {date} by {steps} {self:?} steps"))
        })
    }

    /// Number of whole units from `from` to `to`, floored.
    ///
    /// The forecast horizon of a row is `steps_between(cutoff, date) + 1`.
    pub fn steps_between(&self, from: NaiveDate, to: NaiveDate) -> i64 {
        let days = (to - from).num_days();
        match self {
            Frequency::Day => days,
            Frequency::Week => days.div_euclid(7),
            Frequency::Month => {
                let months = (to.year() as i64 * 12 + to.month0() as i64)
                    - (from.year() as i64 * 12 + from.month0() as i64);
                if months > 0 && to.day() < from.day() {
                    months - 1
                } else if months < 0 && to.day() > from.day() {
                    months + 1
                } else {
                    months
                }
            }
        }
    }

    /// Consecutive dates starting at `start`.
    pub fn range(&self, start: NaiveDate, len: usize) -> Result<Vec<NaiveDate>> {
        (0..len as i64).map(|i| self.offset(start, i)).collect()
    }
}
