//! Pure-Rust dense feed-forward engine.
//!
//! Network definition (JSON):
//!
//! ```json
//! {"layers": [{"units": 16, "activation": "relu"}, {"units": 3, "activation": "softmax"}]}
//! ```
//!
//! Parameters are little-endian `f32`, layer by layer: the `units x inputs`
//! weight matrix in row-major order followed by `units` biases.

use super::{read_f32_le, BackendParams, InferenceBackend, InputShape, Network, RuntimeOptions};
use anyhow::{bail, Context, Result};
use ndarray::{Array1, Array2, ArrayView1};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::debug;

/// Layer activation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Activation {
    Linear,
    Relu,
    Tanh,
    Sigmoid,
    Softmax,
}

impl Activation {
    fn apply(self, z: &mut Array1<f32>) {
        match self {
            Activation::Linear => {}
            Activation::Relu => z.mapv_inplace(|v| v.max(0.0)),
            Activation::Tanh => z.mapv_inplace(f32::tanh),
            Activation::Sigmoid => z.mapv_inplace(|v| 1.0 / (1.0 + (-v).exp())),
            Activation::Softmax => {
                let max = z.fold(f32::NEG_INFINITY, |m, &v| m.max(v));
                z.mapv_inplace(|v| (v - max).exp());
                let sum = z.sum();
                if sum > 0.0 {
                    z.mapv_inplace(|v| v / sum);
                }
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayerSpec {
    pub units: usize,
    pub activation: Activation,
}

/// Serialized network definition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkSpec {
    pub layers: Vec<LayerSpec>,
}

impl NetworkSpec {
    /// Total `f32` parameter count for a given input width
    pub fn parameter_count(&self, inputs: usize) -> usize {
        let mut fan_in = inputs;
        let mut total = 0;
        for layer in &self.layers {
            total += layer.units * fan_in + layer.units;
            fan_in = layer.units;
        }
        total
    }
}

/// Engine behind the `native` selector
#[derive(Debug, Default)]
pub struct NativeBackend;

impl NativeBackend {
    pub fn new() -> Self {
        Self
    }
}

impl InferenceBackend for NativeBackend {
    fn name(&self) -> &str {
        "native"
    }

    fn build_network(
        &self,
        shape: &InputShape,
        _opts: &RuntimeOptions,
        _params: &BackendParams,
        class_count: usize,
        network_path: &Path,
    ) -> Result<Box<dyn Network>> {
        let bytes = std::fs::read(network_path)
            .with_context(|| format!("reading {}", network_path.display()))?;
        let spec: NetworkSpec =
            serde_json::from_slice(&bytes).context("parsing network definition")?;
        if spec.layers.is_empty() {
            bail!("network definition has no layers");
        }
        if let Some(layer) = spec.layers.iter().find(|l| l.units == 0) {
            bail!("layer with zero units ({:?})", layer.activation);
        }

        let inputs = shape.input_len();
        if inputs == 0 {
            bail!("input shape declares no input cells");
        }
        debug!(
            inputs,
            layers = spec.layers.len(),
            classes = class_count,
            "Built native network"
        );

        Ok(Box::new(DenseNetwork {
            inputs,
            spec,
            layers: Vec::new(),
        }))
    }

    fn network_suffix(&self) -> &str {
        ".json"
    }

    fn is_reentrant(&self) -> bool {
        true
    }
}

struct DenseLayer {
    weights: Array2<f32>,
    bias: Array1<f32>,
    activation: Activation,
}

/// Network built by [`NativeBackend`]; weights arrive with `load_parameters`
pub struct DenseNetwork {
    inputs: usize,
    spec: NetworkSpec,
    layers: Vec<DenseLayer>,
}

impl Network for DenseNetwork {
    fn load_parameters(&mut self, path: &Path) -> Result<()> {
        let values = read_f32_le(path)?;
        let expected = self.spec.parameter_count(self.inputs);
        if values.len() != expected {
            bail!(
                "parameter file holds {} values, network needs {expected}",
                values.len()
            );
        }

        let mut layers = Vec::with_capacity(self.spec.layers.len());
        let mut cursor = 0;
        let mut fan_in = self.inputs;
        for layer in &self.spec.layers {
            let n_weights = layer.units * fan_in;
            let weights = Array2::from_shape_vec(
                (layer.units, fan_in),
                values[cursor..cursor + n_weights].to_vec(),
            )?;
            cursor += n_weights;
            let bias = Array1::from(values[cursor..cursor + layer.units].to_vec());
            cursor += layer.units;

            layers.push(DenseLayer {
                weights,
                bias,
                activation: layer.activation,
            });
            fan_in = layer.units;
        }

        self.layers = layers;
        Ok(())
    }

    fn load_mean_signal(&mut self, path: &Path) -> Result<Vec<f32>> {
        let mean = read_f32_le(path)?;
        if mean.len() != self.inputs {
            bail!(
                "mean signal holds {} values, network takes {}",
                mean.len(),
                self.inputs
            );
        }
        Ok(mean)
    }

    fn predict(&mut self, input: &[f32]) -> Result<Vec<f32>> {
        if self.layers.is_empty() {
            bail!("parameters not loaded");
        }
        if input.len() != self.inputs {
            bail!(
                "input holds {} values, network takes {}",
                input.len(),
                self.inputs
            );
        }

        let mut x = ArrayView1::from(input).to_owned();
        for layer in &self.layers {
            let mut z = layer.weights.dot(&x) + &layer.bias;
            layer.activation.apply(&mut z);
            x = z;
        }
        Ok(x.to_vec())
    }
}
