//! Reader Registry - Maps algorithm identifiers to model readers
//!
//! Every archive names the algorithm that produced it. The registry turns that
//! identifier into the reader able to rebuild the model, so adding an algorithm
//! family is a `register` call plus a reader/model pair.
//!
//! # Example
//!
//! ```rust
//! use mojo_runtime::models::ReaderRegistry;
//!
//! let registry = ReaderRegistry::with_builtin();
//! assert!(registry.get_reader(Some("Deep Water")).is_ok());
//! assert!(registry.get_reader(Some("Stacked Ensemble")).is_err());
//! ```

use super::deepwater::DeepWaterReader;
use super::tree::{DrfReader, GbmReader};
use super::ModelReader;
use crate::error::{Result, ScoringError};
use std::collections::HashMap;
use std::sync::Arc;

/// Registry mapping algorithm identifiers to readers
///
/// Several identifiers may share one reader (historical aliases). Generalized
/// low rank models ("Generalized Low Rank Modeling" / "Generalized Low Rank
/// Model") have no reader and fail with `UnsupportedAlgorithm`.
pub struct ReaderRegistry {
    readers: HashMap<String, Arc<dyn ModelReader>>,
}

impl ReaderRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self {
            readers: HashMap::new(),
        }
    }

    /// Registry with every reader shipped in this crate
    pub fn with_builtin() -> Self {
        let mut registry = Self::new();
        registry.register("Deep Water", DeepWaterReader::new());
        registry.register_aliases(
            &["Gradient Boosting Method", "Gradient Boosting Machine"],
            GbmReader::new(),
        );
        registry.register("Distributed Random Forest", DrfReader::new());
        registry
    }

    /// Register a reader under `name`, replacing any previous one
    pub fn register<R>(&mut self, name: &str, reader: R)
    where
        R: ModelReader + 'static,
    {
        self.readers.insert(name.to_string(), Arc::new(reader));
    }

    /// Register one reader under several identifiers
    pub fn register_aliases<R>(&mut self, names: &[&str], reader: R)
    where
        R: ModelReader + 'static,
    {
        let reader: Arc<dyn ModelReader> = Arc::new(reader);
        for name in names {
            self.readers.insert(name.to_string(), Arc::clone(&reader));
        }
    }

    /// Look up the reader for an algorithm identifier.
    ///
    /// A missing or unregistered identifier is `UnsupportedAlgorithm`.
    pub fn get_reader(&self, algorithm: Option<&str>) -> Result<Arc<dyn ModelReader>> {
        let name = algorithm.ok_or_else(|| ScoringError::unsupported(None))?;
        self.readers
            .get(name)
            .cloned()
            .ok_or_else(|| ScoringError::unsupported(Some(name)))
    }

    /// Check if an identifier is registered
    pub fn contains(&self, name: &str) -> bool {
        self.readers.contains_key(name)
    }

    /// List all registered identifiers, sorted
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.readers.keys().map(|s| s.as_str()).collect();
        names.sort_unstable();
        names
    }

    /// Get the number of registered identifiers
    pub fn len(&self) -> usize {
        self.readers.len()
    }

    /// Check if the registry is empty
    pub fn is_empty(&self) -> bool {
        self.readers.is_empty()
    }
}

impl Default for ReaderRegistry {
    fn default() -> Self {
        Self::with_builtin()
    }
}

impl std::fmt::Debug for ReaderRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReaderRegistry")
            .field("algorithms", &self.names())
            .finish()
    }
}
