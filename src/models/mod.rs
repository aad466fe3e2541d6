//! Model contract, readers and the algorithm registry

pub mod decision;
pub mod deepwater;
pub mod header;
pub mod inference;
pub mod loader;
pub mod reconstruct;
pub mod registry;
pub mod tree;

use crate::archive::ArchiveReader;
use crate::backend::{BackendCatalog, BackendParams, ScratchDir};
use crate::error::Result;

pub use deepwater::{DeepWaterModel, DeepWaterReader};
pub use header::ModelHeader;
pub use inference::{RowData, RowPredictor, RowValue};
pub use loader::ModelLoader;
pub use registry::ReaderRegistry;
pub use tree::{DrfReader, GbmReader, TreeEnsembleModel};

/// A loaded model, ready to score single rows.
///
/// Scoring takes `&mut self`: a model serves one call at a time. Wrap it in a
/// `Mutex` to share it between threads.
pub trait ScoringModel: Send {
    fn header(&self) -> &ModelHeader;

    /// Required length of the prediction buffer
    fn pred_size(&self) -> usize {
        self.header().pred_size()
    }

    /// Score `row` into `preds`, returning the filled prefix.
    ///
    /// Classifiers write the label index to `preds[0]` and the class
    /// distribution to `preds[1..=nclasses]`; regressors write one value.
    fn score_with_offset<'a>(
        &mut self,
        row: &[f64],
        offset: f64,
        preds: &'a mut [f64],
    ) -> Result<&'a [f64]>;

    fn score<'a>(&mut self, row: &[f64], preds: &'a mut [f64]) -> Result<&'a [f64]> {
        self.score_with_offset(row, 0.0, preds)
    }
}

/// Shared services a reader may need while building a model
#[derive(Debug, Clone, Copy)]
pub struct LoadContext<'a> {
    pub backends: &'a BackendCatalog,
    pub scratch: &'a ScratchDir,
    pub backend_params: BackendParams,
}

/// Builds one algorithm family's model from an archive
pub trait ModelReader: Send + Sync {
    /// Human-readable family name, used in logs
    fn family(&self) -> &str;

    fn read(
        &self,
        archive: &dyn ArchiveReader,
        header: ModelHeader,
        ctx: &LoadContext<'_>,
    ) -> Result<Box<dyn ScoringModel>>;
}
