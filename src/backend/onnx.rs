//! ONNX Runtime engine behind the `onnx` selector.
//!
//! ONNX models embed their weights, so the staged parameter artifact must be
//! empty; the network artifact is the complete model.

use super::{read_f32_le, BackendParams, InferenceBackend, InputShape, Network, RuntimeOptions};
use anyhow::{bail, Context, Result};
use ort::session::{builder::GraphOptimizationLevel, Session};
use ort::value::Tensor;
use std::path::Path;
use tracing::info;

/// Engine constructor; initializes the ONNX Runtime environment
pub struct OrtBackend;

impl OrtBackend {
    pub fn new() -> Result<Self> {
        ort::init().commit()?;
        Ok(Self)
    }
}

impl InferenceBackend for OrtBackend {
    fn name(&self) -> &str {
        "onnx"
    }

    fn build_network(
        &self,
        shape: &InputShape,
        _opts: &RuntimeOptions,
        params: &BackendParams,
        class_count: usize,
        network_path: &Path,
    ) -> Result<Box<dyn Network>> {
        let session = Session::builder()?
            .with_optimization_level(GraphOptimizationLevel::Level3)?
            .with_intra_threads(params.intra_threads)?
            .commit_from_file(network_path)
            .with_context(|| format!("Failed to load model from {:?}", network_path))?;

        let input_name = session
            .inputs
            .first()
            .map(|i| i.name.clone())
            .unwrap_or_else(|| "input".to_string());

        let output_name = session
            .outputs
            .iter()
            .find(|o| o.name.contains("prob") || o.name.contains("output"))
            .map(|o| o.name.clone())
            .unwrap_or_else(|| {
                session
                    .outputs
                    .last()
                    .map(|o| o.name.clone())
                    .unwrap_or_else(|| "output".to_string())
            });

        info!(
            input = %input_name,
            output = %output_name,
            threads = params.intra_threads,
            classes = class_count,
            "ONNX session created"
        );

        Ok(Box::new(OrtNetwork {
            session,
            inputs: shape.input_len(),
            dims: shape.tensor_dims(),
            input_name,
            output_name,
        }))
    }

    fn network_suffix(&self) -> &str {
        ".onnx"
    }
}

struct OrtNetwork {
    session: Session,
    inputs: usize,
    dims: Vec<i64>,
    input_name: String,
    output_name: String,
}

impl Network for OrtNetwork {
    fn load_parameters(&mut self, path: &Path) -> Result<()> {
        let len = std::fs::metadata(path)?.len();
        if len != 0 {
            bail!("ONNX models embed their weights; got a {len}-byte parameter artifact");
        }
        Ok(())
    }

    fn load_mean_signal(&mut self, path: &Path) -> Result<Vec<f32>> {
        read_f32_le(path)
    }

    fn predict(&mut self, input: &[f32]) -> Result<Vec<f32>> {
        if input.len() != self.inputs {
            bail!(
                "input holds {} values, network takes {}",
                input.len(),
                self.inputs
            );
        }

        let input_tensor = Tensor::from_array((self.dims.clone(), input.to_vec()))
            .context("Failed to create input tensor")?;

        let outputs = self
            .session
            .run(ort::inputs![self.input_name.as_str() => input_tensor])?;

        let output = outputs
            .get(self.output_name.as_str())
            .with_context(|| format!("missing output '{}'", self.output_name))?;
        let (_, data) = output.try_extract_tensor::<f32>()?;
        Ok(data.to_vec())
    }
}
