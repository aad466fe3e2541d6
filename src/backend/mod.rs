//! Backend adapter: inference engine lifecycle.
//!
//! An engine is selected by name from a [`BackendCatalog`], then driven through
//! a fixed sequence: stage blobs to scratch files, build the network, load the
//! optional mean signal, load the parameters. The resulting [`BackendHandle`]
//! owns the loaded network and the staged files.
//!
//! Resolution is forgiving: an unknown selector produces an unavailable handle
//! instead of an error, so a model can still be loaded and inspected. Scoring
//! through such a handle fails fast with [`ScoringError::BackendUnavailable`].

pub mod native;
#[cfg(feature = "onnx")]
pub mod onnx;
pub mod staging;

use crate::error::{Result, ScoringError};
use anyhow::Context;
use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use tracing::{debug, info, warn};

pub use native::NativeBackend;
pub use staging::{ScratchDir, StagedArtifact};

/// Input geometry handed to the engine when building a network
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct InputShape {
    pub width: usize,
    pub height: usize,
    pub channels: usize,
    /// Encoded width for structured inputs, 0 for dense-signal models
    pub features: usize,
}

impl InputShape {
    /// Number of input cells the network consumes per row
    pub fn input_len(&self) -> usize {
        if self.features > 0 {
            self.features
        } else {
            self.width * self.height * self.channels
        }
    }

    /// Single-row tensor dimensions: `[1, features]` for structured inputs,
    /// `[1, channels, height, width]` for dense signals
    pub fn tensor_dims(&self) -> Vec<i64> {
        if self.features > 0 {
            vec![1, self.features as i64]
        } else {
            vec![
                1,
                self.channels as i64,
                self.height as i64,
                self.width as i64,
            ]
        }
    }
}

/// Runtime options for building a network
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RuntimeOptions {
    pub use_gpu: bool,
    pub device_id: u32,
    /// Ignored for inference
    pub seed: u64,
}

impl RuntimeOptions {
    /// CPU-only options used for scoring
    pub fn inference() -> Self {
        Self {
            use_gpu: false,
            device_id: 0,
            seed: 0,
        }
    }
}

/// Engine parameters for building a network
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackendParams {
    pub mini_batch_size: usize,
    pub intra_threads: usize,
}

impl Default for BackendParams {
    fn default() -> Self {
        Self {
            mini_batch_size: 1,
            intra_threads: 1,
        }
    }
}

/// An inference engine implementation
pub trait InferenceBackend: Send + Sync {
    fn name(&self) -> &str;

    /// Build a network from the staged definition at `network_path`
    fn build_network(
        &self,
        shape: &InputShape,
        opts: &RuntimeOptions,
        params: &BackendParams,
        class_count: usize,
        network_path: &Path,
    ) -> anyhow::Result<Box<dyn Network>>;

    /// File suffix for the staged network definition
    fn network_suffix(&self) -> &str {
        ""
    }

    /// Whether networks built by this engine tolerate concurrent forward passes
    fn is_reentrant(&self) -> bool {
        false
    }
}

/// A network built by an [`InferenceBackend`]
pub trait Network: Send {
    fn load_parameters(&mut self, path: &Path) -> anyhow::Result<()>;

    fn load_mean_signal(&mut self, path: &Path) -> anyhow::Result<Vec<f32>>;

    /// Single-row forward pass
    fn predict(&mut self, input: &[f32]) -> anyhow::Result<Vec<f32>>;
}

/// Constructor stored in the catalog
pub type BackendFactory = Box<dyn Fn() -> anyhow::Result<Box<dyn InferenceBackend>> + Send + Sync>;

/// Closed table of selector names to engine constructors
pub struct BackendCatalog {
    factories: HashMap<String, BackendFactory>,
}

impl BackendCatalog {
    /// Create an empty catalog
    pub fn new() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    /// Catalog with the engines compiled into this build
    pub fn with_builtin() -> Self {
        let mut catalog = Self::new();
        catalog.register("native", || Ok(Box::new(NativeBackend::new())));
        #[cfg(feature = "onnx")]
        catalog.register("onnx", || Ok(Box::new(onnx::OrtBackend::new()?)));
        catalog
    }

    /// Register an engine constructor under `name`, replacing any previous one
    pub fn register<F>(&mut self, name: &str, factory: F)
    where
        F: Fn() -> anyhow::Result<Box<dyn InferenceBackend>> + Send + Sync + 'static,
    {
        self.factories.insert(name.to_string(), Box::new(factory));
    }

    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.factories.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Instantiate the engine for `selector`; `None` when unknown or construction fails
    pub fn resolve(&self, selector: &str) -> Option<Box<dyn InferenceBackend>> {
        let Some(factory) = self.factories.get(selector) else {
            warn!(backend = %selector, known = ?self.names(), "Unknown backend selector");
            return None;
        };
        match factory() {
            Ok(backend) => Some(backend),
            Err(e) => {
                warn!(backend = %selector, error = %e, "Backend construction failed");
                None
            }
        }
    }
}

impl Default for BackendCatalog {
    fn default() -> Self {
        Self::with_builtin()
    }
}

impl fmt::Debug for BackendCatalog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BackendCatalog")
            .field("backends", &self.names())
            .finish()
    }
}

/// Blobs handed to the engine at initialization
#[derive(Debug, Clone, Copy)]
pub struct NetworkArtifacts<'a> {
    pub network: &'a [u8],
    pub params: &'a [u8],
    pub mean_signal: Option<&'a [u8]>,
}

struct LoadedNetwork {
    network: Box<dyn Network>,
    reentrant: bool,
    mean_signal: Option<Vec<f32>>,
    // Deleted when the handle is released
    artifacts: Vec<StagedArtifact>,
}

/// Exclusive handle on a loaded network.
///
/// `predict` takes `&mut self`: callers serialize forward passes unless
/// [`is_reentrant`](Self::is_reentrant) says otherwise.
pub struct BackendHandle {
    selector: String,
    loaded: Option<LoadedNetwork>,
}

impl BackendHandle {
    /// Handle for a backend that could not be resolved
    pub fn unavailable(selector: &str) -> Self {
        Self {
            selector: selector.to_string(),
            loaded: None,
        }
    }

    pub fn is_valid(&self) -> bool {
        self.loaded.is_some()
    }

    pub fn selector(&self) -> &str {
        &self.selector
    }

    pub fn is_reentrant(&self) -> bool {
        self.loaded.as_ref().is_some_and(|l| l.reentrant)
    }

    /// Mean signal loaded at initialization, if the model declared one
    pub fn mean_signal(&self) -> Option<&[f32]> {
        self.loaded.as_ref().and_then(|l| l.mean_signal.as_deref())
    }

    /// Paths of the staged files this handle keeps alive
    pub fn artifact_paths(&self) -> Vec<&Path> {
        self.loaded
            .as_ref()
            .map(|l| l.artifacts.iter().map(StagedArtifact::path).collect())
            .unwrap_or_default()
    }

    /// Run a forward pass and check the output length against `expected_len`
    pub fn predict(&mut self, input: &[f32], expected_len: usize) -> Result<Vec<f32>> {
        let loaded = self
            .loaded
            .as_mut()
            .ok_or_else(|| ScoringError::BackendUnavailable(self.selector.clone()))?;

        let output = loaded.network.predict(input).map_err(ScoringError::Backend)?;
        if output.len() != expected_len {
            return Err(ScoringError::BackendContractViolation {
                expected: expected_len,
                actual: output.len(),
            });
        }
        Ok(output)
    }
}

impl Drop for BackendHandle {
    fn drop(&mut self) {
        if let Some(loaded) = &self.loaded {
            debug!(
                backend = %self.selector,
                artifacts = loaded.artifacts.len(),
                "Releasing backend"
            );
        }
    }
}

impl fmt::Debug for BackendHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BackendHandle")
            .field("selector", &self.selector)
            .field("valid", &self.is_valid())
            .finish()
    }
}

/// Settings for [`initialize`]
#[derive(Debug, Clone, Copy)]
pub struct BackendRequest<'a> {
    pub selector: &'a str,
    pub shape: InputShape,
    pub class_count: usize,
    pub params: BackendParams,
}

/// Resolve the engine and bring up a network from the model's blobs.
///
/// An unresolved selector yields [`BackendHandle::unavailable`]. Engine errors
/// once the engine is resolved abort initialization; staged files created so
/// far are deleted on the way out.
pub fn initialize(
    catalog: &BackendCatalog,
    scratch: &ScratchDir,
    request: &BackendRequest<'_>,
    artifacts: NetworkArtifacts<'_>,
) -> Result<BackendHandle> {
    let Some(backend) = catalog.resolve(request.selector) else {
        return Ok(BackendHandle::unavailable(request.selector));
    };

    let opts = RuntimeOptions::inference();
    let mut staged = Vec::with_capacity(3);

    let network_file = scratch.stage("network", backend.network_suffix(), artifacts.network)?;
    let mut network = backend
        .build_network(
            &request.shape,
            &opts,
            &request.params,
            request.class_count,
            network_file.path(),
        )
        .with_context(|| format!("building {} network", backend.name()))
        .map_err(ScoringError::Backend)?;
    staged.push(network_file);

    let mean_signal = match artifacts.mean_signal {
        Some(bytes) => {
            let mean_file = scratch.stage("mean", "", bytes)?;
            let mean = network
                .load_mean_signal(mean_file.path())
                .context("loading mean signal")
                .map_err(ScoringError::Backend)?;
            staged.push(mean_file);
            Some(mean)
        }
        None => None,
    };

    let params_file = scratch.stage("params", "", artifacts.params)?;
    network
        .load_parameters(params_file.path())
        .context("loading parameters")
        .map_err(ScoringError::Backend)?;
    staged.push(params_file);

    info!(
        backend = %request.selector,
        engine = backend.name(),
        inputs = request.shape.input_len(),
        classes = request.class_count,
        "Backend initialized"
    );

    Ok(BackendHandle {
        selector: request.selector.to_string(),
        loaded: Some(LoadedNetwork {
            network,
            reentrant: backend.is_reentrant(),
            mean_signal,
            artifacts: staged,
        }),
    })
}

/// Read a little-endian `f32` array from a file
pub fn read_f32_le(path: &Path) -> anyhow::Result<Vec<f32>> {
    let bytes = std::fs::read(path).with_context(|| format!("reading {}", path.display()))?;
    decode_f32_le(&bytes)
}

/// Decode little-endian `f32` values
pub fn decode_f32_le(bytes: &[u8]) -> anyhow::Result<Vec<f32>> {
    if bytes.len() % 4 != 0 {
        anyhow::bail!("{} bytes is not a whole number of f32 values", bytes.len());
    }
    Ok(bytes
        .chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect())
}

/// Encode `f32` values as little-endian bytes
pub fn encode_f32_le(values: &[f32]) -> Vec<u8> {
    values.iter().flat_map(|v| v.to_le_bytes()).collect()
}
