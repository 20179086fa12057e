//! Benchmarks for fold generation, the harness and the learned combiners.

use chrono::NaiveDate;
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use salescast::core::{Frequency, Panel, SALES};
use salescast::cv::{cross_validate, split_cv, CvConfig, RefitPolicy};
use salescast::ensemble::{cross_validate_combiner, EnsembleData, OptimizedWeights};
use salescast::models::baseline::{HistoricAverage, Naive, SeasonalNaive};
use salescast::models::{LocalModels, ModelRegistry, ModelSpec};
use salescast::scoring::{calc_cv_scores, Granularity, Scorer};

fn generate_panel(n_series: usize, weeks: usize) -> Panel {
    let start = NaiveDate::from_ymd_opt(2021, 1, 4).unwrap();
    let names: Vec<String> = (0..n_series).map(|i| format!("series-{i}")).collect();
    Panel::from_series(
        Frequency::Week,
        SALES,
        names.iter().enumerate().map(|(k, id)| {
            let values = (0..weeks)
                .map(|t| {
                    let season = (2.0 * std::f64::consts::PI * t as f64 / 52.0).sin();
                    (10.0 + k as f64 % 7.0) * (1.5 + season)
                })
                .collect();
            (id.as_str(), start, values)
        }),
    )
    .unwrap()
}

fn registry() -> ModelRegistry {
    ModelRegistry::new()
        .with(ModelSpec::new("Naive", || Box::new(Naive::new())))
        .with(ModelSpec::with_period(
            "SeasonalNaive",
            |p| Box::new(SeasonalNaive::new(p)),
            52,
        ))
        .with(ModelSpec::new("HistoricAverage", || {
            Box::new(HistoricAverage::new())
        }))
}

fn bench_split_cv(c: &mut Criterion) {
    let mut group = c.benchmark_group("split_cv");
    let config = CvConfig::new(13, 4);
    for n_series in [10, 100, 1000] {
        let panel = generate_panel(n_series, 156);
        group.bench_with_input(BenchmarkId::from_parameter(n_series), &panel, |b, panel| {
            b.iter(|| {
                split_cv(black_box(panel), &config)
                    .unwrap()
                    .map(|f| f.unwrap().test.len())
                    .sum::<usize>()
            })
        });
    }
    group.finish();
}

fn bench_harness_and_scoring(c: &mut Criterion) {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();

    let panel = generate_panel(200, 156);
    let config = CvConfig::new(13, 4);
    let adapter = LocalModels::new(registry());

    c.bench_function("cross_validate_local_200", |b| {
        b.iter(|| cross_validate(&adapter, black_box(&panel), &config, RefitPolicy::EveryFold))
    });

    let forecast = cross_validate(&adapter, &panel, &config, RefitPolicy::EveryFold).unwrap();
    c.bench_function("calc_cv_scores_200", |b| {
        b.iter(|| calc_cv_scores(black_box(&forecast), &panel, Frequency::Week))
    });
    c.bench_function("score_horizon_200", |b| {
        b.iter(|| {
            Scorer::new(Frequency::Week).score(black_box(&forecast), &panel, Granularity::Horizon)
        })
    });

    let data = EnsembleData::new(forecast).with_sales(panel.clone());
    let combiner = OptimizedWeights::new();
    let mut group = c.benchmark_group("combiners");
    group.sample_size(10);
    group.bench_function("optimized_weights_200", |b| {
        b.iter(|| cross_validate_combiner(&combiner, black_box(&data)))
    });
    group.finish();
}

criterion_group!(benches, bench_split_cv, bench_harness_and_scoring);
criterion_main!(benches);
