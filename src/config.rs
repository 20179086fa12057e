//! Pipeline configuration loaded from TOML.
//!
//! Every section is optional; missing fields take their defaults.
//!
//! ```toml
//! [cv]
//! h = 13
//! freq = "week"
//! n_windows = 4
//!
//! [routing]
//! candidates = ["OptimizedWeightsEnsemble"]
//!
//! [routing.id_models]
//! "0-3-1154" = "SeasonalNaive"
//!
//! [ensemble]
//! top_k = 10
//! seed = 42
//! ```

use crate::classification::{ClassificationRules, SeriesClass};
use crate::core::Frequency;
use crate::cv::CvConfig;
use crate::ensemble::{
    BoostingParams, Fforma, MeanMixer, OptimizedWeights, RoutedEnsemble, Stacking, CENSORED_MODELS,
};
use crate::error::{ForecastError, Result};
use crate::utils::optimization::AdamConfig;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::debug;

/// Top-level configuration of a forecasting run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub cv: CvConfig,
    pub classification: ClassificationRules,
    pub routing: RoutingConfig,
    pub ensemble: EnsembleConfig,
}

/// Model routing of the classification and divine ensembles.
///
/// Class keys are the snake_case class labels (`all_zero`, `seasonal`, ...).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoutingConfig {
    /// Class-to-model map of the classification ensemble.
    #[serde(default = "default_class_models")]
    pub class_models: BTreeMap<String, String>,
    /// Class overrides of the divine ensembles.
    #[serde(default = "default_divine_class_models")]
    pub divine_class_models: BTreeMap<String, String>,
    /// Per-series overrides of the divine ensembles.
    #[serde(default)]
    pub id_models: BTreeMap<String, String>,
    /// Columns the divine ensembles fall back to; one ensemble each.
    #[serde(default = "default_candidates")]
    pub candidates: Vec<String>,
}

fn class_map_strings(map: BTreeMap<SeriesClass, String>) -> BTreeMap<String, String> {
    map.into_iter()
        .map(|(class, model)| (class.as_str().to_string(), model))
        .collect()
}

fn default_class_models() -> BTreeMap<String, String> {
    class_map_strings(RoutedEnsemble::default_class_models())
}

fn default_divine_class_models() -> BTreeMap<String, String> {
    class_map_strings(RoutedEnsemble::divine_class_models())
}

fn default_candidates() -> Vec<String> {
    vec!["OptimizedWeightsEnsemble".to_string()]
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            class_models: default_class_models(),
            divine_class_models: default_divine_class_models(),
            id_models: BTreeMap::new(),
            candidates: default_candidates(),
        }
    }
}

fn parse_class_map(map: &BTreeMap<String, String>) -> Result<BTreeMap<SeriesClass, String>> {
    map.iter()
        .map(|(class, model)| {
            let class: SeriesClass = class
                .parse()
                .map_err(|e: ForecastError| ForecastError::Config(e.to_string()))?;
            Ok((class, model.clone()))
        })
        .collect()
}

impl RoutingConfig {
    /// The `ClassificationEnsemble` described by `class_models`.
    pub fn classification_ensemble(&self) -> Result<RoutedEnsemble> {
        Ok(RoutedEnsemble::classification(&parse_class_map(
            &self.class_models,
        )?))
    }

    /// One `Divine<candidate>` ensemble per candidate.
    pub fn divine_ensembles(&self) -> Result<Vec<RoutedEnsemble>> {
        let class_models = parse_class_map(&self.divine_class_models)?;
        Ok(self
            .candidates
            .iter()
            .map(|c| RoutedEnsemble::divine(c, &self.id_models, &class_models))
            .collect())
    }
}

/// Settings of the learned combiners.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnsembleConfig {
    /// Models never given an optimized weight.
    #[serde(default = "default_excluded_models")]
    pub excluded_models: Vec<String>,
    /// Restrict learned combiners to the best `top_k` models.
    #[serde(default)]
    pub top_k: Option<usize>,
    /// Seed of every stochastic component.
    #[serde(default = "default_seed")]
    pub seed: u64,
    /// Ridge and lasso penalties of the optimized weights.
    #[serde(default)]
    pub alpha1: f64,
    #[serde(default = "default_alpha2")]
    pub alpha2: f64,
    #[serde(default)]
    pub optimizer: AdamConfig,
    #[serde(default)]
    pub boosting: BoostingParams,
    /// Columns kept by the mRMR filter of the stacking regressors.
    #[serde(default = "default_mrmr_k")]
    pub mrmr_k: usize,
    /// Model sets averaged by mean mixers.
    #[serde(default)]
    pub mixers: Vec<Vec<String>>,
}

fn default_excluded_models() -> Vec<String> {
    CENSORED_MODELS.iter().map(|m| m.to_string()).collect()
}

fn default_seed() -> u64 {
    42
}

fn default_alpha2() -> f64 {
    0.1
}

fn default_mrmr_k() -> usize {
    10
}

impl Default for EnsembleConfig {
    fn default() -> Self {
        Self {
            excluded_models: default_excluded_models(),
            top_k: None,
            seed: default_seed(),
            alpha1: 0.0,
            alpha2: default_alpha2(),
            optimizer: AdamConfig::default(),
            boosting: BoostingParams::default(),
            mrmr_k: default_mrmr_k(),
            mixers: Vec::new(),
        }
    }
}

impl EnsembleConfig {
    pub fn optimized_weights(&self) -> OptimizedWeights {
        let combiner = OptimizedWeights::new()
            .with_excluded(self.excluded_models.iter().cloned())
            .with_regularization(self.alpha1, self.alpha2)
            .with_optimizer(self.optimizer);
        match self.top_k {
            Some(k) => combiner.with_top_k(k),
            None => combiner,
        }
    }

    pub fn stacking(&self) -> Vec<Stacking> {
        Stacking::all()
            .into_iter()
            .map(|s| {
                let s = s.with_mrmr_k(self.mrmr_k);
                match self.top_k {
                    Some(k) => s.with_top_k(k),
                    None => s,
                }
            })
            .collect()
    }

    /// FFORMA with the boosting parameters reseeded from `seed`.
    pub fn fforma(&self, freq: Frequency) -> Fforma {
        let params = BoostingParams {
            seed: self.seed,
            ..self.boosting
        };
        let combiner = Fforma::new(freq).with_params(params);
        match self.top_k {
            Some(k) => combiner.with_top_k(k),
            None => combiner,
        }
    }

    pub fn mean_mixers(&self) -> Result<Vec<MeanMixer>> {
        self.mixers
            .iter()
            .map(|models| MeanMixer::new(models.iter().cloned()))
            .collect()
    }
}

impl PipelineConfig {
    /// Parse and validate a TOML document.
    pub fn from_toml_str(s: &str) -> Result<Self> {
        let config: Self = toml::from_str(s).map_err(|e| ForecastError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a TOML file.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| {
            ForecastError::Config(format!("failed to read {}: {e}", path.display()))
        })?;
        let config = Self::from_toml_str(&text)?;
        debug!(path = %path.display(), "loaded pipeline config");
        Ok(config)
    }

    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string(self).map_err(|e| ForecastError::Config(e.to_string()))
    }

    /// Check cross-field consistency.
    pub fn validate(&self) -> Result<()> {
        self.cv
            .validate()
            .map_err(|e| ForecastError::Config(e.to_string()))?;
        parse_class_map(&self.routing.class_models)?;
        parse_class_map(&self.routing.divine_class_models)?;
        if self.routing.candidates.iter().any(|c| c.is_empty()) {
            return Err(ForecastError::Config("empty routing candidate".into()));
        }
        let e = &self.ensemble;
        if e.top_k == Some(0) {
            return Err(ForecastError::Config("top_k must be positive".into()));
        }
        if e.mrmr_k == 0 {
            return Err(ForecastError::Config("mrmr_k must be positive".into()));
        }
        if e.alpha1 < 0.0 || e.alpha2 < 0.0 {
            return Err(ForecastError::Config("penalties must be non-negative".into()));
        }
        if e.optimizer.steps == 0 {
            return Err(ForecastError::Config("optimizer.steps must be positive".into()));
        }
        let b = &e.boosting;
        if b.eta <= 0.0 || !(b.subsample > 0.0 && b.subsample <= 1.0) || b.lambda < 0.0 {
            return Err(ForecastError::Config(
                "boosting needs eta > 0, 0 < subsample <= 1 and lambda >= 0".into(),
            ));
        }
        if e.mixers.iter().any(|m| m.is_empty()) {
            return Err(ForecastError::Config("mixer without models".into()));
        }
        Ok(())
    }
}
