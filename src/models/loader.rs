//! Model loader: archive in, scoring model out

use super::header::ModelHeader;
use super::registry::ReaderRegistry;
use super::{LoadContext, ScoringModel};
use crate::archive::{ArchiveReader, DirArchive};
use crate::backend::{BackendCatalog, BackendParams, ScratchDir};
use crate::config::RuntimeConfig;
use crate::error::Result;
use std::path::Path;
use tracing::info;

/// Entry point for loading models.
///
/// Owns the algorithm registry, the backend catalog and the scratch directory
/// used for staged backend artifacts.
#[derive(Debug)]
pub struct ModelLoader {
    registry: ReaderRegistry,
    backends: BackendCatalog,
    scratch: ScratchDir,
    backend_params: BackendParams,
}

impl ModelLoader {
    /// Create a loader with the built-in readers and engines
    pub fn new(config: &RuntimeConfig) -> Result<Self> {
        let scratch = ScratchDir::new(&config.scratch.dir)?;
        let backend_params = BackendParams {
            intra_threads: config.backend.intra_threads.max(1),
            ..BackendParams::default()
        };
        info!(
            scratch = %scratch.path().display(),
            intra_threads = backend_params.intra_threads,
            "Model loader initialized"
        );
        Ok(Self::with_parts(
            ReaderRegistry::with_builtin(),
            BackendCatalog::with_builtin(),
            scratch,
            backend_params,
        ))
    }

    /// Create a loader from explicit parts
    pub fn with_parts(
        registry: ReaderRegistry,
        backends: BackendCatalog,
        scratch: ScratchDir,
        backend_params: BackendParams,
    ) -> Self {
        Self {
            registry,
            backends,
            scratch,
            backend_params,
        }
    }

    pub fn registry(&self) -> &ReaderRegistry {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut ReaderRegistry {
        &mut self.registry
    }

    pub fn backends(&self) -> &BackendCatalog {
        &self.backends
    }

    pub fn backends_mut(&mut self) -> &mut BackendCatalog {
        &mut self.backends
    }

    /// Load a model from any archive
    pub fn load(&self, archive: &dyn ArchiveReader) -> Result<Box<dyn ScoringModel>> {
        let descriptor = archive.descriptor();
        let algorithm = descriptor.info.str_opt("algorithm")?;
        let reader = self.registry.get_reader(algorithm)?;
        let header = ModelHeader::from_descriptor(descriptor)?;

        info!(
            algorithm = %header.algorithm(),
            reader = reader.family(),
            columns = header.columns().len(),
            classes = header.nclasses(),
            "Loading model"
        );

        let ctx = LoadContext {
            backends: &self.backends,
            scratch: &self.scratch,
            backend_params: self.backend_params,
        };
        reader.read(archive, header, &ctx)
    }

    /// Load a model from an archive unpacked into a directory
    pub fn load_dir<P: AsRef<Path>>(&self, path: P) -> Result<Box<dyn ScoringModel>> {
        let archive = DirArchive::open(path)?;
        self.load(&archive)
    }
}
