//! Rule-routed ensembles: each series takes the prediction of the model its
//! first matching rule names.

use super::{output_panel, Combiner, EnsembleData};
use crate::classification::SeriesClass;
use crate::core::{prediction_column, Panel};
use crate::error::{ForecastError, Result};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use tracing::debug;

/// When a rule applies to a series.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RouteCondition {
    Id(String),
    Class(SeriesClass),
    Always,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteRule {
    pub condition: RouteCondition,
    pub model: String,
}

impl RouteRule {
    pub fn new(condition: RouteCondition, model: impl Into<String>) -> Self {
        Self {
            condition,
            model: model.into(),
        }
    }
}

/// Routes every series to one base model through an ordered rule list.
///
/// Rules are tried in order and the first match wins. A series reaching a
/// class rule without a classification entry is an error, as is a series
/// no rule matches.
#[derive(Debug, Clone, PartialEq)]
pub struct RoutedEnsemble {
    name: String,
    rules: Vec<RouteRule>,
}

impl RoutedEnsemble {
    pub fn new(name: impl Into<String>, rules: Vec<RouteRule>) -> Self {
        Self {
            name: name.into(),
            rules,
        }
    }

    /// Class-to-model routing of the plain classification ensemble.
    pub fn default_class_models() -> BTreeMap<SeriesClass, String> {
        [
            (SeriesClass::AllZero, "ZeroModel"),
            (SeriesClass::TrailingZero, "ZeroModel"),
            (SeriesClass::Regular, "LGBMRegressorRecursive"),
            (SeriesClass::SmallSales, "LGBMRegressorRecursive"),
            (SeriesClass::Sparse, "DynamicOptimizedTheta"),
            (SeriesClass::Seasonal, "SeasonalNaive"),
        ]
        .into_iter()
        .map(|(c, m)| (c, m.to_string()))
        .collect()
    }

    /// Class overrides applied above the candidate in the divine ensemble.
    pub fn divine_class_models() -> BTreeMap<SeriesClass, String> {
        [
            (SeriesClass::AllZero, "ZeroModel"),
            (SeriesClass::TrailingZero, "ZeroModel"),
            (SeriesClass::Seasonal, "SeasonalNaive"),
        ]
        .into_iter()
        .map(|(c, m)| (c, m.to_string()))
        .collect()
    }

    fn class_rules(class_models: &BTreeMap<SeriesClass, String>) -> Vec<RouteRule> {
        class_models
            .iter()
            .map(|(class, model)| RouteRule::new(RouteCondition::Class(*class), model.clone()))
            .collect()
    }

    /// `ClassificationEnsemble`: class rules only.
    pub fn classification(class_models: &BTreeMap<SeriesClass, String>) -> Self {
        Self::new("ClassificationEnsemble", Self::class_rules(class_models))
    }

    /// `Divine<candidate>`: id overrides, then class overrides, then the
    /// candidate column.
    pub fn divine(
        candidate: &str,
        id_models: &BTreeMap<String, String>,
        class_models: &BTreeMap<SeriesClass, String>,
    ) -> Self {
        let mut rules: Vec<RouteRule> = id_models
            .iter()
            .map(|(id, model)| RouteRule::new(RouteCondition::Id(id.clone()), model.clone()))
            .collect();
        rules.extend(Self::class_rules(class_models));
        rules.push(RouteRule::new(RouteCondition::Always, candidate));
        Self::new(format!("Divine{candidate}"), rules)
    }

    pub fn rules(&self) -> &[RouteRule] {
        &self.rules
    }

    /// Model routed to each row of `data.forecast`.
    fn route<'a>(&'a self, data: &EnsembleData) -> Result<Vec<&'a str>> {
        let panel = &data.forecast;
        let index = data.classification.as_ref().map(|c| (c, c.index()));
        let mut cache: HashMap<(&str, Option<NaiveDate>), &'a str> = HashMap::new();
        let mut routed = Vec::with_capacity(panel.len());

        for i in 0..panel.len() {
            let id = panel.ids()[i].as_str();
            let cutoff = panel.cutoff(i);
            if let Some(model) = cache.get(&(id, cutoff)) {
                routed.push(*model);
                continue;
            }
            let class = index.as_ref().and_then(|(c, index)| {
                let key = (id, if c.cutoffs().is_some() { cutoff } else { None });
                index.get(&key).map(|&j| c.label(j))
            });

            let mut chosen = None;
            for rule in &self.rules {
                let matched = match &rule.condition {
                    RouteCondition::Id(rule_id) => rule_id == id,
                    RouteCondition::Class(rule_class) => {
                        let class = class.ok_or_else(|| {
                            ForecastError::MissingClassification(match cutoff {
                                Some(c) => format!("{id} at {c}"),
                                None => id.to_string(),
                            })
                        })?;
                        class == *rule_class
                    }
                    RouteCondition::Always => true,
                };
                if matched {
                    chosen = Some(rule.model.as_str());
                    break;
                }
            }
            let model = chosen.ok_or_else(|| {
                ForecastError::InvalidParameter(format!("no routing rule matches series {id}"))
            })?;
            cache.insert((id, cutoff), model);
            routed.push(model);
        }
        Ok(routed)
    }
}

impl Combiner for RoutedEnsemble {
    fn name(&self) -> String {
        self.name.clone()
    }

    /// Routing is fixed; `train` is not used.
    fn fit_predict(&self, _train: &EnsembleData, target: &EnsembleData) -> Result<Panel> {
        let routed = self.route(target)?;
        let mut columns: HashMap<&str, &[f64]> = HashMap::new();
        for &model in &routed {
            if !columns.contains_key(model) {
                columns.insert(model, target.forecast.column(&prediction_column(model))?);
            }
        }
        let values = routed
            .iter()
            .enumerate()
            .map(|(i, model)| columns[model][i])
            .collect();
        debug!(ensemble = %self.name, rows = routed.len(), "routed predictions");
        output_panel(&target.forecast, &self.name, values)
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::{d, data};
    use super::super::{cross_validate_combiner, live_combine};
    use super::*;
    use crate::classification::Classification;

    fn classification(labels: [SeriesClass; 2]) -> Classification {
        let mut ids = Vec::new();
        let mut cutoffs = Vec::new();
        let mut classes = Vec::new();
        for (id, label) in ["a", "b"].into_iter().zip(labels) {
            for c in [10, 12, 14] {
                ids.push(id.to_string());
                cutoffs.push(d(c));
                classes.push(label);
            }
        }
        Classification::from_labels(ids, Some(cutoffs), classes).unwrap()
    }

    fn class_models() -> BTreeMap<SeriesClass, String> {
        [
            (SeriesClass::Regular, "High".to_string()),
            (SeriesClass::AllZero, "Zero".to_string()),
        ]
        .into_iter()
        .collect()
    }

    #[test]
    fn routes_by_class() {
        let data = data()
            .with_classification(classification([SeriesClass::Regular, SeriesClass::AllZero]));
        let ensemble = RoutedEnsemble::classification(&class_models());
        let out = cross_validate_combiner(&ensemble, &data).unwrap();
        let preds = out.column("pred_ClassificationEnsemble").unwrap();
        let high = data.forecast.column("pred_High").unwrap();
        for i in 0..out.len() {
            if out.ids()[i] == "a" {
                assert_eq!(preds[i], high[i]);
            } else {
                assert_eq!(preds[i], 0.0);
            }
        }
    }

    #[test]
    fn id_overrides_win_over_class() {
        let data = data()
            .with_classification(classification([SeriesClass::Regular, SeriesClass::Regular]));
        let ids: BTreeMap<String, String> = [("b".to_string(), "Zero".to_string())].into();
        let ensemble = RoutedEnsemble::divine("Exact", &ids, &class_models());
        assert_eq!(ensemble.name(), "DivineExact");

        let out = ensemble.fit_predict(&data, &data).unwrap();
        let preds = out.column("pred_DivineExact").unwrap();
        let high = data.forecast.column("pred_High").unwrap();
        for i in 0..out.len() {
            match out.ids()[i].as_str() {
                "a" => assert_eq!(preds[i], high[i]),
                _ => assert_eq!(preds[i], 0.0),
            }
        }
    }

    #[test]
    fn candidate_is_the_fallback() {
        let data = data()
            .with_classification(classification([SeriesClass::Sparse, SeriesClass::Sparse]));
        let ensemble = RoutedEnsemble::divine("Exact", &BTreeMap::new(), &class_models());
        let out = ensemble.fit_predict(&data, &data).unwrap();
        assert_eq!(
            out.column("pred_DivineExact").unwrap(),
            data.forecast.column("pred_Exact").unwrap()
        );
    }

    #[test]
    fn missing_classification_is_an_error() {
        let ensemble = RoutedEnsemble::classification(&class_models());
        let err = ensemble.fit_predict(&data(), &data()).unwrap_err();
        assert!(matches!(err, ForecastError::MissingClassification(_)));

        let ids: BTreeMap<String, String> =
            [("a".to_string(), "Zero".to_string()), ("b".to_string(), "Zero".to_string())].into();
        let only_ids = RoutedEnsemble::divine("Exact", &ids, &class_models());
        assert!(only_ids.fit_predict(&data(), &data()).is_ok());
    }

    #[test]
    fn live_routing_uses_id_keyed_classes() {
        let data = data();
        let live_forecast = data.forecast.filter_rows(|i| i % 6 < 2).without_cutoffs().unwrap();
        let live_class = Classification::from_labels(
            vec!["a".into(), "b".into()],
            None,
            vec![SeriesClass::AllZero, SeriesClass::Regular],
        )
        .unwrap();
        let live = EnsembleData::new(live_forecast).with_classification(live_class);
        let ensemble = RoutedEnsemble::classification(&class_models());
        let out = live_combine(&ensemble, &data, &live).unwrap();
        let preds = out.column("pred_ClassificationEnsemble").unwrap();
        assert_eq!(preds[0], 0.0);
        assert_eq!(preds[2], 7.0);
    }

    #[test]
    fn default_maps_cover_the_documented_classes() {
        assert_eq!(RoutedEnsemble::default_class_models().len(), 6);
        assert_eq!(
            RoutedEnsemble::divine_class_models()[&SeriesClass::Seasonal],
            "SeasonalNaive"
        );
    }
}
