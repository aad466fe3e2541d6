//! Named-row inference on top of a loaded model

use super::ScoringModel;
use crate::config::PredictorConfig;
use crate::error::{Result, ScoringError};
use crate::types::Prediction;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::debug;

/// One input cell: a number, a categorical level, or missing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RowValue {
    Number(f64),
    Level(String),
    Missing,
}

impl From<f64> for RowValue {
    fn from(v: f64) -> Self {
        RowValue::Number(v)
    }
}

impl From<&str> for RowValue {
    fn from(s: &str) -> Self {
        RowValue::Level(s.to_string())
    }
}

/// Input row keyed by column name
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RowData {
    values: HashMap<String, RowValue>,
}

impl RowData {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, column: &str, value: impl Into<RowValue>) -> Self {
        self.insert(column, value);
        self
    }

    pub fn insert(&mut self, column: &str, value: impl Into<RowValue>) {
        self.values.insert(column.to_string(), value.into());
    }

    pub fn get(&self, column: &str) -> Option<&RowValue> {
        self.values.get(column)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Scores named rows and returns typed predictions
pub struct RowPredictor {
    model: Box<dyn ScoringModel>,
    unknown_levels_as_na: bool,
    row: Vec<f64>,
    preds: Vec<f64>,
}

impl RowPredictor {
    pub fn new(model: Box<dyn ScoringModel>, config: &PredictorConfig) -> Self {
        let n_features = model.header().n_features();
        let pred_size = model.pred_size();
        Self {
            model,
            unknown_levels_as_na: config.unknown_levels_as_na,
            row: Vec::with_capacity(n_features),
            preds: vec![0.0; pred_size],
        }
    }

    pub fn model(&self) -> &dyn ScoringModel {
        self.model.as_ref()
    }

    pub fn into_model(self) -> Box<dyn ScoringModel> {
        self.model
    }

    /// Map a named row to the raw row in column order.
    ///
    /// Missing columns become NaN. Level strings are looked up in the column
    /// domain; numbers given for categorical columns are taken as level indices.
    pub fn fill_row(&self, data: &RowData, out: &mut Vec<f64>) -> Result<()> {
        let header = self.model.header();
        out.clear();
        for (idx, name) in header.feature_names().iter().enumerate() {
            let value = match data.get(name) {
                None | Some(RowValue::Missing) => f64::NAN,
                Some(RowValue::Number(v)) => *v,
                Some(RowValue::Level(level)) => {
                    let mapped = match header.domain_values(idx) {
                        Some(_) => header.map_level(idx, level).map(|l| l as f64),
                        None => level.trim().parse::<f64>().ok(),
                    };
                    match mapped {
                        Some(v) => v,
                        None if self.unknown_levels_as_na => f64::NAN,
                        None => {
                            return Err(ScoringError::UnknownCategoricalLevel {
                                column: name.clone(),
                                level: level.clone(),
                            })
                        }
                    }
                }
            };
            out.push(value);
        }
        Ok(())
    }

    /// Score one named row
    pub fn predict(&mut self, data: &RowData) -> Result<Prediction> {
        let mut row = std::mem::take(&mut self.row);
        let filled = self.fill_row(data, &mut row);
        let result = filled.and_then(|()| self.model.score(&row, &mut self.preds).map(|_| ()));
        self.row = row;
        result?;

        let header = self.model.header();
        if !header.is_classifier() {
            return Ok(Prediction::Regression {
                value: self.preds[0],
            });
        }

        let label_index = self.preds[0] as usize;
        let label = header
            .response_domain()
            .and_then(|d| d.get(label_index))
            .cloned()
            .unwrap_or_else(|| label_index.to_string());
        let class_probabilities = self.preds[1..=header.nclasses()].to_vec();
        debug!(label = %label, "Predicted label");

        Ok(if header.nclasses() == 2 {
            Prediction::Binomial {
                label,
                label_index,
                class_probabilities,
            }
        } else {
            Prediction::Multinomial {
                label,
                label_index,
                class_probabilities,
            }
        })
    }
}

impl std::fmt::Debug for RowPredictor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RowPredictor")
            .field("algorithm", &self.model.header().algorithm())
            .field("unknown_levels_as_na", &self.unknown_levels_as_na)
            .finish()
    }
}
