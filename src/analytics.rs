//! Sales-scale analytics of the series population.

use crate::core::{Panel, SALES};
use crate::error::{ForecastError, Result};
use crate::utils::quantile_sorted;
use serde::Serialize;
use tracing::debug;

/// Sales scale of one series.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScaleCategory {
    pub id: String,
    /// Mean absolute sales, missing values skipped; `NaN` without sales.
    pub sales_scale: f64,
    /// Quantile bin of the scale, `0` being the smallest; `None` without
    /// sales.
    pub bin: Option<usize>,
    /// Share of the total scale.
    pub weight: f64,
}

/// Interior quantile edges of `n_bins` bins with duplicates collapsed.
fn quantile_edges(values: &[f64], n_bins: usize) -> Vec<f64> {
    let mut sorted: Vec<f64> = values.iter().copied().filter(|v| !v.is_nan()).collect();
    sorted.sort_by(f64::total_cmp);
    let mut edges: Vec<f64> = (1..n_bins)
        .map(|i| quantile_sorted(&sorted, i as f64 / n_bins as f64))
        .collect();
    edges.dedup();
    edges
}

/// Bin every series by its mean absolute sales.
///
/// Bins are right-closed intervals between the quantile edges, so a value
/// equal to an edge falls into the lower bin.
pub fn scale_categories(sales: &Panel, n_bins: usize) -> Result<Vec<ScaleCategory>> {
    if n_bins == 0 {
        return Err(ForecastError::InvalidParameter(
            "n_bins must be positive".into(),
        ));
    }
    let values = sales.column(SALES)?;
    let scales: Vec<(String, f64)> = sales
        .groups()
        .into_iter()
        .map(|g| {
            let (sum, n) = values[g.rows]
                .iter()
                .filter(|v| !v.is_nan())
                .fold((0.0, 0usize), |(s, n), v| (s + v.abs(), n + 1));
            let scale = if n == 0 { f64::NAN } else { sum / n as f64 };
            (g.id.to_string(), scale)
        })
        .collect();

    let raw: Vec<f64> = scales.iter().map(|(_, s)| *s).collect();
    let edges = quantile_edges(&raw, n_bins);
    let total: f64 = raw.iter().filter(|s| !s.is_nan()).sum();
    debug!(series = scales.len(), bins = edges.len() + 1, "scale categories");

    Ok(scales
        .into_iter()
        .map(|(id, scale)| ScaleCategory {
            id,
            sales_scale: scale,
            bin: (!scale.is_nan()).then(|| edges.iter().filter(|&&e| scale > e).count()),
            weight: scale / total,
        })
        .collect())
}

/// Series whose scale exceeds `threshold`.
pub fn vip_series(categories: &[ScaleCategory], threshold: f64) -> Vec<&ScaleCategory> {
    categories
        .iter()
        .filter(|c| c.sales_scale > threshold)
        .collect()
}
