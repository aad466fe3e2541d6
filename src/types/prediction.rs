//! Prediction data structures

use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Kind of problem a model was trained for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ModelCategory {
    Binomial,
    Multinomial,
    Regression,
    Unknown,
}

impl ModelCategory {
    /// Category implied by a class count when the archive does not name one
    pub fn from_class_count(nclasses: usize) -> Self {
        match nclasses {
            0 => ModelCategory::Unknown,
            1 => ModelCategory::Regression,
            2 => ModelCategory::Binomial,
            _ => ModelCategory::Multinomial,
        }
    }

    pub fn is_classification(&self) -> bool {
        matches!(self, ModelCategory::Binomial | ModelCategory::Multinomial)
    }
}

impl FromStr for ModelCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Binomial" => Ok(ModelCategory::Binomial),
            "Multinomial" => Ok(ModelCategory::Multinomial),
            "Regression" => Ok(ModelCategory::Regression),
            "Unknown" => Ok(ModelCategory::Unknown),
            other => Err(format!("unknown model category '{other}'")),
        }
    }
}

/// Typed result of scoring one row through a [`RowPredictor`](crate::models::RowPredictor)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Prediction {
    Regression {
        value: f64,
    },
    Binomial {
        label: String,
        label_index: usize,
        class_probabilities: Vec<f64>,
    },
    Multinomial {
        label: String,
        label_index: usize,
        class_probabilities: Vec<f64>,
    },
}

impl Prediction {
    /// Predicted label for classifiers, `None` for regression
    pub fn label(&self) -> Option<&str> {
        match self {
            Prediction::Regression { .. } => None,
            Prediction::Binomial { label, .. } | Prediction::Multinomial { label, .. } => {
                Some(label.as_str())
            }
        }
    }

    pub fn class_probabilities(&self) -> &[f64] {
        match self {
            Prediction::Regression { .. } => &[],
            Prediction::Binomial {
                class_probabilities,
                ..
            }
            | Prediction::Multinomial {
                class_probabilities,
                ..
            } => class_probabilities,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_category_from_class_count() {
        assert_eq!(ModelCategory::from_class_count(1), ModelCategory::Regression);
        assert_eq!(ModelCategory::from_class_count(2), ModelCategory::Binomial);
        assert_eq!(ModelCategory::from_class_count(5), ModelCategory::Multinomial);
        assert!(ModelCategory::Binomial.is_classification());
        assert!(!ModelCategory::Regression.is_classification());
    }

    #[test]
    fn test_prediction_serializes_with_kind_tag() {
        let p = Prediction::Binomial {
            label: "yes".to_string(),
            label_index: 1,
            class_probabilities: vec![0.3, 0.7],
        };
        let json = serde_json::to_value(&p).unwrap();
        assert_eq!(json["kind"], "binomial");
        assert_eq!(json["label"], "yes");
        assert_eq!(p.label(), Some("yes"));
    }
}
