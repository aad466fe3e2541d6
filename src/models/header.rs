//! Algorithm-independent model attributes

use crate::archive::ModelDescriptor;
use crate::error::{Result, ScoringError};
use crate::types::{ModelCategory, ModelInfo};

/// Columns, domains and class information shared by every model family
#[derive(Debug, Clone)]
pub struct ModelHeader {
    algorithm: String,
    columns: Vec<String>,
    domains: Vec<Option<Vec<String>>>,
    nclasses: usize,
    category: ModelCategory,
    supervised: bool,
    balance_classes: bool,
    default_threshold: f64,
    prior_class_distrib: Option<Vec<f64>>,
    model_class_distrib: Option<Vec<f64>>,
    info: ModelInfo,
}

impl ModelHeader {
    /// Validate and extract the common attributes from a descriptor
    pub fn from_descriptor(descriptor: &ModelDescriptor) -> Result<Self> {
        let info = descriptor.info.clone();
        let algorithm = info
            .str_opt("algorithm")?
            .ok_or_else(|| ScoringError::unsupported(None))?
            .to_string();

        let columns = descriptor.columns.clone();
        let domains = if descriptor.domains.is_empty() {
            vec![None; columns.len()]
        } else {
            descriptor.domains.clone()
        };
        if domains.len() != columns.len() {
            return Err(ScoringError::corrupt(format!(
                "{} domains for {} columns",
                domains.len(),
                columns.len()
            )));
        }

        let nclasses = info.usize_or("n_classes", 1)?;
        if nclasses == 0 {
            return Err(ScoringError::corrupt("n_classes must be at least 1"));
        }

        let category = match info.str_opt("category")? {
            Some(name) => name.parse().map_err(ScoringError::ArchiveCorrupt)?,
            None => ModelCategory::from_class_count(nclasses),
        };

        let prior_class_distrib = class_vector(&info, "prior_class_distrib", nclasses)?;
        let model_class_distrib = class_vector(&info, "model_class_distrib", nclasses)?;

        Ok(Self {
            algorithm,
            columns,
            domains,
            nclasses,
            category,
            supervised: info.bool_or("supervised", true)?,
            balance_classes: info.bool_or("balance_classes", false)?,
            default_threshold: info.double_or("default_threshold", 0.5)?,
            prior_class_distrib,
            model_class_distrib,
            info,
        })
    }

    pub fn algorithm(&self) -> &str {
        &self.algorithm
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn domains(&self) -> &[Option<Vec<String>>] {
        &self.domains
    }

    pub fn nclasses(&self) -> usize {
        self.nclasses
    }

    pub fn category(&self) -> ModelCategory {
        self.category
    }

    pub fn is_classifier(&self) -> bool {
        self.nclasses > 1
    }

    pub fn is_supervised(&self) -> bool {
        self.supervised
    }

    pub fn balance_classes(&self) -> bool {
        self.balance_classes
    }

    pub fn default_threshold(&self) -> f64 {
        self.default_threshold
    }

    pub fn prior_class_distrib(&self) -> Option<&[f64]> {
        self.prior_class_distrib.as_deref()
    }

    pub fn model_class_distrib(&self) -> Option<&[f64]> {
        self.model_class_distrib.as_deref()
    }

    pub fn info(&self) -> &ModelInfo {
        &self.info
    }

    /// Length of the prediction vector: 1 for regression, `nclasses + 1` otherwise
    pub fn pred_size(&self) -> usize {
        if self.is_classifier() {
            self.nclasses + 1
        } else {
            1
        }
    }

    /// Number of input columns (the response column excluded)
    pub fn n_features(&self) -> usize {
        if self.supervised {
            self.columns.len().saturating_sub(1)
        } else {
            self.columns.len()
        }
    }

    pub fn feature_names(&self) -> &[String] {
        &self.columns[..self.n_features()]
    }

    pub fn response_name(&self) -> Option<&str> {
        if self.supervised {
            self.columns.last().map(String::as_str)
        } else {
            None
        }
    }

    pub fn response_domain(&self) -> Option<&[String]> {
        if self.supervised {
            self.domains.last().and_then(|d| d.as_deref())
        } else {
            None
        }
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    pub fn domain_values(&self, column: usize) -> Option<&[String]> {
        self.domains.get(column).and_then(|d| d.as_deref())
    }

    /// Level index of `level` in a categorical column
    pub fn map_level(&self, column: usize, level: &str) -> Option<usize> {
        self.domain_values(column)?.iter().position(|l| l == level)
    }
}

fn class_vector(info: &ModelInfo, key: &str, nclasses: usize) -> Result<Option<Vec<f64>>> {
    let values = info.double_array_opt(key)?;
    if let Some(values) = &values {
        if nclasses > 1 && values.len() != nclasses {
            return Err(ScoringError::corrupt(format!(
                "'{key}' has {} entries for {nclasses} classes",
                values.len()
            )));
        }
    }
    Ok(values)
}
