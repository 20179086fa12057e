//! End-to-end run: base forecasters through the harness, prediction joins,
//! features and classification, every combiner, scoring and CSV output.

use chrono::NaiveDate;
use salescast::classification::{classify_cv, ClassificationRules, SeriesClass};
use salescast::config::PipelineConfig;
use salescast::core::{prediction_column, Frequency, Panel, PRICE, SALES};
use salescast::cv::{cross_validate, live_forecast, CvConfig, RefitPolicy};
use salescast::ensemble::{
    cross_validate_combiner, live_combine, Combiner, EnsembleData, Fforma, MeanMixer,
    OptimizedWeights, RoutedEnsemble, Stacking,
};
use salescast::features::{compute_features, compute_features_cv};
use salescast::io::{read_panel_csv, write_panel_csv, write_score_table_csv};
use salescast::models::baseline::{HistoricAverage, Naive, SeasonalNaive, WindowAverage, ZeroModel};
use salescast::models::{GlobalAutoregression, LocalModels, ModelRegistry, ModelSpec};
use salescast::postprocess::{join_cv_predictions, join_live_predictions};
use salescast::scoring::{calc_cv_scores, ErrorTable, Granularity, Scorer};
use std::collections::BTreeMap;
use std::f64::consts::PI;

const WEEKS: usize = 104;
const H: usize = 8;
const WINDOWS: usize = 3;

fn start() -> NaiveDate {
    NaiveDate::from_ymd_opt(2022, 1, 3).unwrap()
}

/// Six weekly series: seasonal, trending, flat, sparse, dead and noisy.
fn sales() -> Panel {
    let seasonal: Vec<f64> = (0..WEEKS)
        .map(|t| 50.0 + 30.0 * (2.0 * PI * t as f64 / 52.0).sin())
        .collect();
    let trend: Vec<f64> = (0..WEEKS).map(|t| 20.0 + 0.5 * t as f64).collect();
    let flat = vec![12.0; WEEKS];
    let sparse: Vec<f64> = (0..WEEKS).map(|t| if t % 7 == 0 { 9.0 } else { 0.0 }).collect();
    let dead: Vec<f64> = (0..WEEKS).map(|t| if t < 60 { 15.0 } else { 0.0 }).collect();
    let noisy: Vec<f64> = (0..WEEKS)
        .map(|t| 40.0 + ((t * 37) % 11) as f64 - 5.0)
        .collect();
    let panel = Panel::from_series(
        Frequency::Week,
        SALES,
        [
            ("seasonal", start(), seasonal),
            ("trend", start(), trend),
            ("flat", start(), flat),
            ("sparse", start(), sparse),
            ("dead", start(), dead),
            ("noisy", start(), noisy),
        ],
    )
    .unwrap();
    let price = (0..panel.len()).map(|i| 1.0 + (i % 3) as f64).collect();
    panel.with_column(PRICE, price).unwrap()
}

fn registry() -> ModelRegistry {
    ModelRegistry::new()
        .with(ModelSpec::new("Naive", || Box::new(Naive::new())))
        .with(ModelSpec::with_period(
            "SeasonalNaive",
            |p| Box::new(SeasonalNaive::new(p)),
            52,
        ))
        .with(ModelSpec::with_period(
            "WindowAverage",
            |w| Box::new(WindowAverage::new(w)),
            13,
        ))
        .with(ModelSpec::new("HistoricAverage", || {
            Box::new(HistoricAverage::new())
        }))
        .with(ModelSpec::new("ZeroModel", || Box::new(ZeroModel::new())))
}

fn cv_config() -> CvConfig {
    CvConfig::new(H, WINDOWS)
}

fn base_cv_forecast(sales: &Panel) -> Panel {
    let cv = cv_config();
    let local = cross_validate(&LocalModels::new(registry()), sales, &cv, RefitPolicy::EveryFold)
        .unwrap();
    let ar = cross_validate(
        &GlobalAutoregression::recursive(vec![1, 2, 4]),
        sales,
        &cv,
        RefitPolicy::FitOnce,
    )
    .unwrap();
    let ar_direct = cross_validate(
        &GlobalAutoregression::direct(vec![1, 2]).with_price(),
        sales,
        &cv,
        RefitPolicy::Periodic(2),
    )
    .unwrap();
    join_cv_predictions(&[local, ar, ar_direct]).unwrap()
}

fn ensemble_data(sales: &Panel, forecast: &Panel) -> EnsembleData {
    let cv = cv_config();
    let features = compute_features_cv(sales, &cv, 52).unwrap();
    let classification =
        classify_cv(sales, &features, &cv, &ClassificationRules::default()).unwrap();
    let leaderboard = calc_cv_scores(forecast, sales, Frequency::Week)
        .unwrap()
        .overall
        .leaderboard()
        .unwrap();
    EnsembleData::new(forecast.clone())
        .with_sales(sales.clone())
        .with_classification(classification)
        .with_features(features)
        .with_leaderboard(leaderboard)
}

#[test]
fn base_forecasts_cover_every_window() {
    let sales = sales();
    let forecast = base_cv_forecast(&sales);
    assert_eq!(forecast.len(), 6 * H * WINDOWS);
    assert_eq!(forecast.distinct_cutoffs().unwrap().len(), WINDOWS);
    for model in [
        "Naive",
        "SeasonalNaive",
        "WindowAverage",
        "HistoricAverage",
        "ZeroModel",
        "GlobalARRecursive",
        "GlobalARDirect",
    ] {
        let values = forecast.column(&prediction_column(model)).unwrap();
        assert!(values.iter().all(|v| v.is_finite() && *v >= 0.0), "{model}");
    }

    let scores = calc_cv_scores(&forecast, &sales, Frequency::Week).unwrap();
    let board = scores.overall.leaderboard().unwrap();
    assert_eq!(board.len(), 7);
    assert_eq!(board.last().unwrap().0, "ZeroModel");
    assert_eq!(scores.by_cutoff.len(), 7 * WINDOWS);
    assert_eq!(scores.by_id_cutoff.len(), 7 * WINDOWS * 6);
}

#[test]
fn combiners_cross_validate_and_join() {
    let sales = sales();
    let forecast = base_cv_forecast(&sales);
    let data = ensemble_data(&sales, &forecast);

    let mut combiners: Vec<Box<dyn Combiner>> = vec![
        Box::new(OptimizedWeights::new()),
        Box::new(MeanMixer::new(["Naive", "WindowAverage"]).unwrap()),
        Box::new(Fforma::new(Frequency::Week).with_top_k(4)),
    ];
    combiners.extend(Stacking::all().into_iter().map(|s| Box::new(s) as Box<dyn Combiner>));

    let mut panels = vec![forecast.clone()];
    for combiner in &combiners {
        let out = cross_validate_combiner(combiner.as_ref(), &data).unwrap();
        assert_eq!(out.len(), forecast.len(), "{}", combiner.name());
        let values = out.column(&prediction_column(&combiner.name())).unwrap();
        assert!(values.iter().all(|v| v.is_finite() && *v >= 0.0));
        panels.push(out);
    }
    let joined = join_cv_predictions(&panels).unwrap();
    assert_eq!(joined.len(), forecast.len());

    let scores = Scorer::new(Frequency::Week)
        .score(&joined, &sales, Granularity::Overall)
        .unwrap();
    let board = scores.leaderboard().unwrap();
    let score_of = |m: &str| board.iter().find(|(n, _)| n == m).unwrap().1;
    assert!(score_of("OptimizedWeightsEnsemble") < score_of("ZeroModel"));
    assert!(score_of("FFORMATop4Ensemble").is_finite());
}

#[test]
fn routed_ensembles_follow_the_classification() {
    let sales = sales();
    let forecast = base_cv_forecast(&sales);
    let data = ensemble_data(&sales, &forecast);
    let classification = data.classification.as_ref().unwrap();
    let counts = classification.class_counts();
    assert!(counts.contains_key(&SeriesClass::TrailingZero), "{counts:?}");

    let weights = cross_validate_combiner(&OptimizedWeights::new(), &data).unwrap();
    let joined = join_cv_predictions(&[forecast, weights]).unwrap();
    let data = EnsembleData {
        forecast: joined,
        ..data
    };

    let mut id_models = BTreeMap::new();
    id_models.insert("flat".to_string(), "Naive".to_string());
    let divine = RoutedEnsemble::divine(
        "OptimizedWeightsEnsemble",
        &id_models,
        &RoutedEnsemble::divine_class_models(),
    );
    let out = cross_validate_combiner(&divine, &data).unwrap();
    let values = out.column("pred_DivineOptimizedWeightsEnsemble").unwrap();
    let naive = data.forecast.column("pred_Naive").unwrap();
    for i in 0..out.len() {
        match out.ids()[i].as_str() {
            "dead" => assert_eq!(values[i], 0.0),
            "flat" => assert_eq!(values[i], naive[i]),
            _ => {}
        }
    }

    let class_models: BTreeMap<SeriesClass, String> = SeriesClass::ALL
        .into_iter()
        .map(|c| (c, "HistoricAverage".to_string()))
        .collect();
    let routed = cross_validate_combiner(&RoutedEnsemble::classification(&class_models), &data)
        .unwrap();
    assert_eq!(
        routed.column("pred_ClassificationEnsemble").unwrap(),
        data.forecast.column("pred_HistoricAverage").unwrap()
    );
}

#[test]
fn live_run_matches_the_cv_schema() {
    let sales = sales();
    let cv = cv_config();
    let forecast = base_cv_forecast(&sales);
    let data = ensemble_data(&sales, &forecast);

    let local = live_forecast(&LocalModels::new(registry()), &sales, &cv, None).unwrap();
    let ar = live_forecast(
        &GlobalAutoregression::recursive(vec![1, 2, 4]),
        &sales,
        &cv,
        None,
    )
    .unwrap();
    let ar_direct =
        live_forecast(&GlobalAutoregression::direct(vec![1, 2]), &sales, &cv, None).unwrap();
    let live = join_live_predictions(&[local, ar, ar_direct]).unwrap();
    assert_eq!(live.len(), 6 * H);
    assert!(!live.has_cutoff());

    let live_data =
        EnsembleData::new(live.clone()).with_features(compute_features(&sales, 52).unwrap());
    let combined = live_combine(&OptimizedWeights::new(), &data, &live_data).unwrap();
    assert_eq!(combined.len(), live.len());
    assert!(!combined.has_cutoff());
    assert_eq!(combined.dates()[0], NaiveDate::from_ymd_opt(2024, 1, 1).unwrap());

    let fforma = Fforma::new(Frequency::Week).with_top_k(3);
    let combined = live_combine(&fforma, &data, &live_data).unwrap();
    let values = combined.column("pred_FFORMATop3Ensemble").unwrap();
    assert!(values.iter().all(|v| v.is_finite() && *v >= 0.0));

    let missing = EnsembleData::new(live.select(&["pred_Naive"]).unwrap());
    assert!(live_combine(&OptimizedWeights::new(), &data, &missing).is_err());
}

#[test]
fn reports_and_files() {
    let sales = sales();
    let forecast = base_cv_forecast(&sales);
    let data = ensemble_data(&sales, &forecast);

    let errors = ErrorTable::new(&forecast, &sales).unwrap();
    assert_eq!(errors.len(), forecast.len() * 7);
    assert_eq!(errors.total_report().unwrap().len(), 7 * WINDOWS);
    assert_eq!(errors.horizon_report(Frequency::Week).unwrap().len(), 7 * H);
    let classes = data.classification.as_ref().unwrap();
    assert!(!errors.class_report(classes).unwrap().is_empty());

    let dir = tempfile::tempdir().unwrap();
    let forecast_path = dir.path().join("cv_forecast.csv");
    write_panel_csv(&forecast, &forecast_path).unwrap();
    let back = read_panel_csv(&forecast_path).unwrap();
    assert_eq!(back.len(), forecast.len());
    assert_eq!(back.column_names(), forecast.column_names());

    let scores = calc_cv_scores(&forecast, &sales, Frequency::Week).unwrap();
    let scores_path = dir.path().join("overall.csv");
    write_score_table_csv(&scores.overall, &scores_path).unwrap();
    let text = std::fs::read_to_string(scores_path).unwrap();
    assert_eq!(text.lines().count(), 8);
}

#[test]
fn shipped_config_parses() {
    let path = concat!(env!("CARGO_MANIFEST_DIR"), "/config/pipeline.toml");
    let config = PipelineConfig::from_path(path).unwrap();
    assert_eq!(config.cv.h, 13);
    assert_eq!(config.cv.n_windows, 4);
    assert_eq!(config.routing.id_models.len(), 24);
    let divine = config.routing.divine_ensembles().unwrap();
    assert_eq!(divine[0].name(), "DivineOptimizedWeightsEnsemble");
    assert_eq!(divine[0].rules().len(), 24 + 3 + 1);
    assert_eq!(
        config.routing.classification_ensemble().unwrap().rules().len(),
        6
    );
    assert_eq!(
        config.ensemble.mean_mixers().unwrap()[0].name(),
        "MixerLgveLgctEnsemble"
    );
}
