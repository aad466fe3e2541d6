//! Type definitions shared across the runtime

pub mod info;
pub mod prediction;

pub use info::{MetaValue, ModelInfo};
pub use prediction::{ModelCategory, Prediction};
