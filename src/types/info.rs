//! Typed model metadata

use crate::error::{Result, ScoringError};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A single metadata value as stored in the archive descriptor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetaValue {
    Null,
    Bool(bool),
    Int(i64),
    Double(f64),
    Str(String),
    IntArray(Vec<i64>),
    DoubleArray(Vec<f64>),
    StrArray(Vec<String>),
}

impl MetaValue {
    fn type_name(&self) -> &'static str {
        match self {
            MetaValue::Null => "null",
            MetaValue::Bool(_) => "bool",
            MetaValue::Int(_) => "integer",
            MetaValue::Double(_) => "double",
            MetaValue::Str(_) => "string",
            MetaValue::IntArray(_) => "integer array",
            MetaValue::DoubleArray(_) => "double array",
            MetaValue::StrArray(_) => "string array",
        }
    }
}

impl From<bool> for MetaValue {
    fn from(v: bool) -> Self {
        MetaValue::Bool(v)
    }
}

impl From<i64> for MetaValue {
    fn from(v: i64) -> Self {
        MetaValue::Int(v)
    }
}

impl From<f64> for MetaValue {
    fn from(v: f64) -> Self {
        MetaValue::Double(v)
    }
}

impl From<&str> for MetaValue {
    fn from(v: &str) -> Self {
        MetaValue::Str(v.to_string())
    }
}

impl From<Vec<i64>> for MetaValue {
    fn from(v: Vec<i64>) -> Self {
        MetaValue::IntArray(v)
    }
}

impl From<Vec<f64>> for MetaValue {
    fn from(v: Vec<f64>) -> Self {
        MetaValue::DoubleArray(v)
    }
}

/// Option name to value mapping read from the archive.
///
/// Immutable once a model is loaded. Getters fail with
/// [`ScoringError::ArchiveCorrupt`] when a required key is absent or has the
/// wrong type; `null` entries count as absent.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ModelInfo {
    entries: BTreeMap<String, MetaValue>,
}

impl ModelInfo {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert, used when assembling archives in memory
    pub fn with(mut self, key: &str, value: impl Into<MetaValue>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn insert(&mut self, key: &str, value: impl Into<MetaValue>) {
        self.entries.insert(key.to_string(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&MetaValue> {
        match self.entries.get(key) {
            Some(MetaValue::Null) | None => None,
            Some(value) => Some(value),
        }
    }

    pub fn contains(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn str_opt(&self, key: &str) -> Result<Option<&str>> {
        match self.get(key) {
            None => Ok(None),
            Some(MetaValue::Str(s)) => Ok(Some(s.as_str())),
            Some(other) => Err(mistyped(key, "string", other)),
        }
    }

    pub fn require_str(&self, key: &str) -> Result<&str> {
        self.str_opt(key)?.ok_or_else(|| missing(key))
    }

    pub fn int_opt(&self, key: &str) -> Result<Option<i64>> {
        match self.get(key) {
            None => Ok(None),
            Some(MetaValue::Int(v)) => Ok(Some(*v)),
            Some(other) => Err(mistyped(key, "integer", other)),
        }
    }

    pub fn require_int(&self, key: &str) -> Result<i64> {
        self.int_opt(key)?.ok_or_else(|| missing(key))
    }

    pub fn int_or(&self, key: &str, default: i64) -> Result<i64> {
        Ok(self.int_opt(key)?.unwrap_or(default))
    }

    /// Non-negative integer as a count or index
    pub fn usize_or(&self, key: &str, default: usize) -> Result<usize> {
        match self.int_opt(key)? {
            None => Ok(default),
            Some(v) => usize::try_from(v)
                .map_err(|_| ScoringError::corrupt(format!("'{key}' must be non-negative, got {v}"))),
        }
    }

    pub fn require_usize(&self, key: &str) -> Result<usize> {
        if !self.contains(key) {
            return Err(missing(key));
        }
        self.usize_or(key, 0)
    }

    pub fn double_opt(&self, key: &str) -> Result<Option<f64>> {
        match self.get(key) {
            None => Ok(None),
            Some(MetaValue::Double(v)) => Ok(Some(*v)),
            Some(MetaValue::Int(v)) => Ok(Some(*v as f64)),
            Some(other) => Err(mistyped(key, "double", other)),
        }
    }

    pub fn double_or(&self, key: &str, default: f64) -> Result<f64> {
        Ok(self.double_opt(key)?.unwrap_or(default))
    }

    pub fn bool_or(&self, key: &str, default: bool) -> Result<bool> {
        match self.get(key) {
            None => Ok(default),
            Some(MetaValue::Bool(v)) => Ok(*v),
            Some(other) => Err(mistyped(key, "bool", other)),
        }
    }

    pub fn int_array_opt(&self, key: &str) -> Result<Option<Vec<i64>>> {
        match self.get(key) {
            None => Ok(None),
            Some(MetaValue::IntArray(v)) => Ok(Some(v.clone())),
            Some(other) => Err(mistyped(key, "integer array", other)),
        }
    }

    /// Double array; integer arrays are widened.
    ///
    /// An empty array is reported as absent.
    pub fn double_array_opt(&self, key: &str) -> Result<Option<Vec<f64>>> {
        let values = match self.get(key) {
            None => return Ok(None),
            Some(MetaValue::DoubleArray(v)) => v.clone(),
            Some(MetaValue::IntArray(v)) => v.iter().map(|&x| x as f64).collect(),
            Some(other) => return Err(mistyped(key, "double array", other)),
        };
        Ok(if values.is_empty() { None } else { Some(values) })
    }
}

fn missing(key: &str) -> ScoringError {
    ScoringError::corrupt(format!("missing required metadata '{key}'"))
}

fn mistyped(key: &str, expected: &str, found: &MetaValue) -> ScoringError {
    ScoringError::corrupt(format!(
        "metadata '{key}' should be {expected}, found {}",
        found.type_name()
    ))
}
