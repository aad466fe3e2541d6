//! Model Scoring Runtime Library
//!
//! Loads algorithm-tagged model archives and scores single rows. An archive
//! names the algorithm that produced it; the [`ReaderRegistry`] picks the
//! matching reader, which rebuilds a [`ScoringModel`]. Neural network models
//! delegate the forward pass to an inference backend chosen by name from a
//! [`BackendCatalog`](backend::BackendCatalog).

pub mod archive;
pub mod backend;
pub mod config;
pub mod error;
pub mod feature_encoder;
pub mod metrics;
pub mod models;
pub mod types;

pub use archive::{ArchiveReader, DirArchive, MemoryArchive, ModelDescriptor};
pub use config::RuntimeConfig;
pub use error::{ErrorKind, Result, ScoringError};
pub use feature_encoder::FeatureEncoder;
pub use metrics::ScoringMetrics;
pub use models::{ModelHeader, ModelLoader, ReaderRegistry, RowData, RowPredictor, ScoringModel};
pub use types::{MetaValue, ModelCategory, ModelInfo, Prediction};
