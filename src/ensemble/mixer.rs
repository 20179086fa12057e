//! Arithmetic mean over a fixed set of model columns.

use super::{model_columns, output_panel, Combiner, EnsembleData};
use crate::core::Panel;
use crate::error::{ForecastError, Result};

/// Mean of the named models' predictions, ignoring missing values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MeanMixer {
    models: Vec<String>,
}

/// First letter of every alphabetic run upper case, the rest lower case.
fn title_case(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut prev_alpha = false;
    for c in s.chars() {
        if c.is_alphabetic() {
            if prev_alpha {
                out.extend(c.to_lowercase());
            } else {
                out.extend(c.to_uppercase());
            }
            prev_alpha = true;
        } else {
            out.push(c);
            prev_alpha = false;
        }
    }
    out
}

/// First two and last two characters of a model name, title-cased.
fn abbreviate(model: &str) -> String {
    let chars: Vec<char> = model.chars().collect();
    let head: String = chars.iter().take(2).collect();
    let tail: String = chars[chars.len().saturating_sub(2)..].iter().collect();
    title_case(&format!("{head}{tail}"))
}

impl MeanMixer {
    pub fn new<S: Into<String>>(models: impl IntoIterator<Item = S>) -> Result<Self> {
        let models: Vec<String> = models.into_iter().map(Into::into).collect();
        if models.is_empty() {
            return Err(ForecastError::InvalidParameter(
                "mixer needs at least one model".into(),
            ));
        }
        Ok(Self { models })
    }

    pub fn models(&self) -> &[String] {
        &self.models
    }
}

impl Combiner for MeanMixer {
    /// `Mixer` + abbreviated model names + `Ensemble`, e.g.
    /// `MixerLgveLgctEnsemble` for `LGBMRegressorRecursive` and
    /// `LGBMRegressorDirect`.
    fn name(&self) -> String {
        let parts: String = self.models.iter().map(|m| abbreviate(m)).collect();
        format!("Mixer{parts}Ensemble")
    }

    fn fit_predict(&self, _train: &EnsembleData, target: &EnsembleData) -> Result<Panel> {
        let columns = model_columns(&target.forecast, &self.models)?;
        let values = (0..target.forecast.len())
            .map(|i| {
                let (sum, n) = columns
                    .iter()
                    .map(|c| c[i])
                    .filter(|v| !v.is_nan())
                    .fold((0.0, 0usize), |(s, n), v| (s + v, n + 1));
                if n == 0 {
                    f64::NAN
                } else {
                    sum / n as f64
                }
            })
            .collect();
        output_panel(&target.forecast, &self.name(), values)
    }
}
