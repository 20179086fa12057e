//! Multi-granularity score tables.

use super::metrics::{CompetitionMetrics, MetricAccumulator};
use crate::classification::{Classification, SeriesClass};
use crate::core::{Frequency, JoinKeys, JoinKind, Panel, PREDICTION_PREFIX, SALES};
use crate::cv::CutoffPartition;
use crate::error::{ForecastError, Result};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;

/// Level at which scores are aggregated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Granularity {
    /// One score per `(id, cutoff_date)`.
    IdCutoff,
    /// One score per `cutoff_date`.
    Cutoff,
    /// One score per model.
    Overall,
    /// One score per forecast step (`1` is the first predicted date).
    Horizon,
    /// One score per series class.
    Class,
    /// One score per `(cutoff_date, class)`.
    CutoffClass,
}

/// Grouping key of a score record; fields not used by the granularity are `None`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct GroupKey {
    pub id: Option<String>,
    pub cutoff: Option<NaiveDate>,
    pub horizon: Option<i64>,
    pub class: Option<SeriesClass>,
}

/// Score of one model in one group.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoreRecord {
    pub key: GroupKey,
    /// Model name without the prediction prefix.
    pub model: String,
    pub metrics: CompetitionMetrics,
}

/// Scores of every model at one granularity, sorted by `(key, model)`.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoreTable {
    granularity: Granularity,
    records: Vec<ScoreRecord>,
}

/// A model with minimum mean score for an id.
#[derive(Debug, Clone, PartialEq)]
pub struct Winner {
    pub id: String,
    pub model: String,
    pub score: f64,
}

/// NaN-last ascending order.
fn score_order(a: f64, b: f64) -> Ordering {
    match (a.is_nan(), b.is_nan()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Greater,
        (false, true) => Ordering::Less,
        (false, false) => a.total_cmp(&b),
    }
}

impl ScoreTable {
    /// Build from records, sorting them by `(key, model)`.
    pub fn new(granularity: Granularity, mut records: Vec<ScoreRecord>) -> Self {
        records.sort_by(|a, b| a.key.cmp(&b.key).then_with(|| a.model.cmp(&b.model)));
        Self {
            granularity,
            records,
        }
    }

    pub fn granularity(&self) -> Granularity {
        self.granularity
    }

    pub fn records(&self) -> &[ScoreRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Distinct model names, sorted.
    pub fn models(&self) -> Vec<&str> {
        let mut models: Vec<&str> = self.records.iter().map(|r| r.model.as_str()).collect();
        models.sort_unstable();
        models.dedup();
        models
    }

    /// Score of `model` in the group `key`.
    pub fn score(&self, key: &GroupKey, model: &str) -> Option<f64> {
        self.records
            .iter()
            .find(|r| &r.key == key && r.model == model)
            .map(|r| r.metrics.score)
    }

    /// Clip every score into `[lo, hi]`, replacing `NaN` with `nan_fill`.
    ///
    /// `mae` and `bias` are left untouched.
    pub fn clip_scores(&self, lo: f64, hi: f64, nan_fill: f64) -> Self {
        let records = self
            .records
            .iter()
            .cloned()
            .map(|mut r| {
                r.metrics.score = if r.metrics.score.is_nan() {
                    nan_fill
                } else {
                    r.metrics.score.clamp(lo, hi)
                };
                r
            })
            .collect();
        Self {
            granularity: self.granularity,
            records,
        }
    }

    /// Overall scores sorted ascending, `NaN` last.
    pub fn leaderboard(&self) -> Result<Vec<(String, f64)>> {
        if self.granularity != Granularity::Overall {
            return Err(ForecastError::InvalidParameter(
                "leaderboard needs overall scores".into(),
            ));
        }
        let mut board: Vec<(String, f64)> = self
            .records
            .iter()
            .map(|r| (r.model.clone(), r.metrics.score))
            .collect();
        board.sort_by(|a, b| score_order(a.1, b.1).then_with(|| a.0.cmp(&b.0)));
        Ok(board)
    }

    /// Per id, the model(s) with minimum mean `(id, cutoff)` score.
    ///
    /// Ties are all reported; ids whose every mean is `NaN` have no winner.
    pub fn winners(&self) -> Result<Vec<Winner>> {
        if self.granularity != Granularity::IdCutoff {
            return Err(ForecastError::InvalidParameter(
                "winner report needs (id, cutoff) scores".into(),
            ));
        }
        let mut sums: BTreeMap<(&str, &str), (f64, usize)> = BTreeMap::new();
        for r in &self.records {
            let id = r.key.id.as_deref().unwrap_or_default();
            let e = sums.entry((id, r.model.as_str())).or_insert((0.0, 0));
            e.0 += r.metrics.score;
            e.1 += 1;
        }
        let mut by_id: BTreeMap<&str, Vec<(&str, f64)>> = BTreeMap::new();
        for ((id, model), (sum, n)) in sums {
            by_id.entry(id).or_default().push((model, sum / n as f64));
        }

        let mut winners = Vec::new();
        for (id, scores) in by_id {
            let best = scores
                .iter()
                .map(|s| s.1)
                .filter(|s| !s.is_nan())
                .fold(f64::INFINITY, f64::min);
            winners.extend(scores.into_iter().filter(|s| s.1 == best).map(|(model, score)| {
                Winner {
                    id: id.to_string(),
                    model: model.to_string(),
                    score,
                }
            }));
        }
        Ok(winners)
    }

    fn filter(&self, keep: impl Fn(&ScoreRecord) -> bool) -> Self {
        Self {
            granularity: self.granularity,
            records: self.records.iter().filter(|r| keep(r)).cloned().collect(),
        }
    }
}

impl CutoffPartition for ScoreTable {
    fn cutoff_dates(&self) -> Result<Vec<NaiveDate>> {
        let mut c = self
            .records
            .iter()
            .map(|r| r.key.cutoff.ok_or(ForecastError::MissingCutoff))
            .collect::<Result<Vec<_>>>()?;
        c.sort();
        c.dedup();
        Ok(c)
    }

    fn partition_cutoff(&self, cutoff: NaiveDate) -> Result<(Self, Self)> {
        if self.records.iter().any(|r| r.key.cutoff.is_none()) {
            return Err(ForecastError::MissingCutoff);
        }
        Ok((
            self.filter(|r| r.key.cutoff != Some(cutoff)),
            self.filter(|r| r.key.cutoff == Some(cutoff)),
        ))
    }
}

/// Prediction columns of `forecast` joined with the actual sales on `(id, date)`.
///
/// The join is a left join: forecast rows without a sales row keep `NaN`.
pub(crate) fn with_actuals(forecast: &Panel, sales: &Panel) -> Result<Panel> {
    let preds = forecast.select(&forecast.prediction_columns())?;
    let actual = sales.select(&[SALES])?;
    preds.join(&actual, JoinKeys::IdDate, JoinKind::Left)
}

/// Scores forecasts against sales at any granularity.
#[derive(Debug, Clone, Copy)]
pub struct Scorer<'a> {
    freq: Frequency,
    classification: Option<&'a Classification>,
}

impl<'a> Scorer<'a> {
    pub fn new(freq: Frequency) -> Self {
        Self {
            freq,
            classification: None,
        }
    }

    /// Classification used by the class granularities, keyed by `(id, cutoff_date)`.
    pub fn with_classification(mut self, classification: &'a Classification) -> Self {
        self.classification = Some(classification);
        self
    }

    /// Group key of every row of `panel`.
    pub(crate) fn keys(&self, panel: &Panel, granularity: Granularity) -> Result<Vec<GroupKey>> {
        let class_has_cutoff = self.classification.is_some_and(|c| c.cutoffs().is_some());
        let needs_cutoff = match granularity {
            Granularity::Overall => false,
            Granularity::Class => class_has_cutoff,
            _ => true,
        };
        if needs_cutoff && !panel.has_cutoff() {
            return Err(ForecastError::MissingCutoff);
        }
        let classification = match granularity {
            Granularity::Class | Granularity::CutoffClass => {
                Some(self.classification.ok_or_else(|| {
                    ForecastError::InvalidParameter("class scores need a classification".into())
                })?)
            }
            _ => None,
        };
        let index = classification.map(|c| (c, c.index()));

        Ok((0..panel.len())
            .map(|i| {
                let id = panel.ids()[i].as_str();
                let cutoff = panel.cutoff(i);
                let class = index.as_ref().and_then(|(c, index)| {
                    let key = (id, if class_has_cutoff { cutoff } else { None });
                    index.get(&key).map(|&j| c.label(j))
                });
                match granularity {
                    Granularity::IdCutoff => GroupKey {
                        id: Some(id.to_string()),
                        cutoff,
                        ..GroupKey::default()
                    },
                    Granularity::Cutoff => GroupKey {
                        cutoff,
                        ..GroupKey::default()
                    },
                    Granularity::Overall => GroupKey::default(),
                    Granularity::Horizon => GroupKey {
                        horizon: cutoff.map(|c| self.freq.steps_between(c, panel.dates()[i]) + 1),
                        ..GroupKey::default()
                    },
                    Granularity::Class => GroupKey {
                        class,
                        ..GroupKey::default()
                    },
                    Granularity::CutoffClass => GroupKey {
                        cutoff,
                        class,
                        ..GroupKey::default()
                    },
                }
            })
            .collect())
    }

    /// Competition scores of every prediction column of `forecast`.
    pub fn score(
        &self,
        forecast: &Panel,
        sales: &Panel,
        granularity: Granularity,
    ) -> Result<ScoreTable> {
        let joined = with_actuals(forecast, sales)?;
        let actual = joined.column(SALES)?;
        let keys = self.keys(&joined, granularity)?;

        let mut records = Vec::new();
        for column in joined.prediction_columns() {
            let predicted = joined.column(column)?;
            let mut groups: BTreeMap<&GroupKey, MetricAccumulator> = BTreeMap::new();
            for (i, key) in keys.iter().enumerate() {
                groups.entry(key).or_default().push(predicted[i], actual[i]);
            }
            let model = &column[PREDICTION_PREFIX.len()..];
            records.extend(groups.into_iter().map(|(key, acc)| ScoreRecord {
                key: key.clone(),
                model: model.to_string(),
                metrics: acc.finish(),
            }));
        }
        Ok(ScoreTable::new(granularity, records))
    }
}

/// The three standard cross-validation score tables.
#[derive(Debug, Clone, PartialEq)]
pub struct CvScores {
    pub by_id_cutoff: ScoreTable,
    pub by_cutoff: ScoreTable,
    pub overall: ScoreTable,
}

/// Scores per `(id, cutoff)`, per cutoff and overall.
pub fn calc_cv_scores(forecast: &Panel, sales: &Panel, freq: Frequency) -> Result<CvScores> {
    let scorer = Scorer::new(freq);
    Ok(CvScores {
        by_id_cutoff: scorer.score(forecast, sales, Granularity::IdCutoff)?,
        by_cutoff: scorer.score(forecast, sales, Granularity::Cutoff)?,
        overall: scorer.score(forecast, sales, Granularity::Overall)?,
    })
}

/// First `k` models of a leaderboard, or all of them when `k` is `None`.
pub fn top_k_models(leaderboard: &[(String, f64)], k: Option<usize>) -> Vec<String> {
    let k = k.unwrap_or(leaderboard.len());
    leaderboard.iter().take(k).map(|(m, _)| m.clone()).collect()
}
