//! Property-based tests for fold generation and scoring.
//!
//! These tests verify invariants that should hold for all valid inputs,
//! using randomly generated sales panels.

use chrono::{Duration, NaiveDate};
use proptest::prelude::*;
use salescast::core::{Frequency, Panel, SALES};
use salescast::cv::{split_cv, split_cv_loo, CutoffPartition, CvConfig};
use salescast::scoring::competition_metrics;
use std::collections::{BTreeSet, HashMap};

fn start() -> NaiveDate {
    NaiveDate::from_ymd_opt(2023, 1, 2).unwrap()
}

/// Weekly panel from `(start offset in weeks, values)` per entity.
fn make_panel(series: &[(i64, Vec<f64>)]) -> Panel {
    let names: Vec<String> = (0..series.len()).map(|i| format!("s{i}")).collect();
    Panel::from_series(
        Frequency::Week,
        SALES,
        names
            .iter()
            .zip(series)
            .map(|(id, (offset, values))| {
                (id.as_str(), start() + Duration::weeks(*offset), values.clone())
            }),
    )
    .unwrap()
}

/// Strategy for panels of 1-5 entities with ragged starts and lengths.
fn panel_strategy() -> impl Strategy<Value = Vec<(i64, Vec<f64>)>> {
    prop::collection::vec(
        (0..10_i64, prop::collection::vec(0.0..500.0_f64, 1..60)),
        1..5,
    )
}

/// Dates per id in a panel.
fn dates_by_id(panel: &Panel) -> HashMap<String, Vec<NaiveDate>> {
    let mut out: HashMap<String, Vec<NaiveDate>> = HashMap::new();
    for (id, date) in panel.ids().iter().zip(panel.dates()) {
        out.entry(id.clone()).or_default().push(*date);
    }
    out
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// Every test row is strictly after every train row of the same id.
    #[test]
    fn folds_never_leak(series in panel_strategy(), h in 1..8_usize, n in 1..5_usize) {
        let panel = make_panel(&series);
        for fold in split_cv(&panel, &CvConfig::new(h, n)).unwrap() {
            let fold = fold.unwrap();
            let train = dates_by_id(&fold.train);
            for (id, test_dates) in dates_by_id(&fold.test) {
                let last_train = train[&id].iter().max().unwrap();
                prop_assert!(test_dates.iter().all(|d| d > last_train));
                prop_assert!(test_dates.len() <= h);
            }
        }
    }

    /// With `step = h` the test windows of an entity that is long enough are
    /// contiguous, disjoint and cover its last `n_windows * h` weeks.
    #[test]
    fn windows_tile_the_tail(series in panel_strategy(), h in 1..6_usize, n in 1..4_usize) {
        let panel = make_panel(&series);
        let mut tested: HashMap<String, Vec<NaiveDate>> = HashMap::new();
        for fold in split_cv(&panel, &CvConfig::new(h, n)).unwrap() {
            for (id, dates) in dates_by_id(&fold.unwrap().test) {
                tested.entry(id).or_default().extend(dates);
            }
        }
        for (id, dates) in dates_by_id(&panel) {
            if dates.len() <= n * h {
                continue;
            }
            let expected: Vec<NaiveDate> = dates[dates.len() - n * h..].to_vec();
            let got = tested.remove(&id).unwrap_or_default();
            prop_assert_eq!(got, expected);
        }
    }

    /// Every cutoff is held out exactly once and train never sees it.
    #[test]
    fn loo_holds_out_each_cutoff_once(cutoffs in prop::collection::btree_set(0..30_i64, 1..6)) {
        let mut ids = Vec::new();
        let mut dates = Vec::new();
        let mut cuts = Vec::new();
        for &c in &cutoffs {
            for id in ["a", "b"] {
                ids.push(id.to_string());
                dates.push(start() + Duration::weeks(c));
                cuts.push(start() + Duration::weeks(c));
            }
        }
        let n = ids.len();
        let panel = Panel::new(ids, dates, Some(cuts), vec![("pred_A".into(), vec![1.0; n])]).unwrap();

        let mut held_out = BTreeSet::new();
        let mut rows = 0;
        for fold in split_cv_loo(&panel).unwrap() {
            let (train, target) = fold.split(&panel).unwrap();
            prop_assert!(train.cutoffs().unwrap().iter().all(|c| *c != fold.cutoff));
            prop_assert!(target.cutoffs().unwrap().iter().all(|c| *c == fold.cutoff));
            prop_assert_eq!(train.len() + target.len(), n);
            prop_assert!(held_out.insert(fold.cutoff));
            rows += target.len();
        }
        prop_assert_eq!(rows, n);
        prop_assert_eq!(held_out.into_iter().collect::<Vec<_>>(), panel.cutoff_dates().unwrap());
    }

    /// The score is non-negative and zero for a perfect forecast.
    #[test]
    fn score_is_non_negative(
        actual in prop::collection::vec(0.1..100.0_f64, 1..40),
        noise in prop::collection::vec(-10.0..10.0_f64, 40),
    ) {
        let predicted: Vec<f64> = actual.iter().zip(&noise).map(|(a, e)| a + e).collect();
        let m = competition_metrics(&predicted, &actual).unwrap();
        prop_assert!(m.score >= 0.0);
        prop_assert!((m.score - (m.mae + m.bias)).abs() < 1e-12);

        let perfect = competition_metrics(&actual, &actual).unwrap();
        prop_assert!(perfect.score.abs() < 1e-12);
    }
}
