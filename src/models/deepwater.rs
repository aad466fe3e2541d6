//! Deep Water models: neural networks scored through an inference backend

use super::header::ModelHeader;
use super::reconstruct::{reconstruct, ResponseNormalization};
use super::{LoadContext, ModelReader, ScoringModel};
use crate::archive::ArchiveReader;
use crate::backend::{self, BackendHandle, BackendParams, BackendRequest, InputShape, NetworkArtifacts};
use crate::error::{Result, ScoringError};
use crate::feature_encoder::{DenseEncoder, FeatureEncoder, Normalization, StructuredEncoder};
use crate::types::ModelInfo;
use tracing::{debug, info};

/// Blob holding the serialized network definition
pub const NETWORK_BLOB: &str = "model_network";
/// Blob holding the trained parameters
pub const PARAMS_BLOB: &str = "model_params";

/// A Deep Water model bound to its backend network
pub struct DeepWaterModel {
    header: ModelHeader,
    problem_type: String,
    mini_batch_size: usize,
    encoder: FeatureEncoder,
    response_norm: Option<ResponseNormalization>,
    backend: BackendHandle,
    // Reused across calls
    encoded: Vec<f32>,
}

impl DeepWaterModel {
    pub fn backend(&self) -> &BackendHandle {
        &self.backend
    }

    pub fn encoder(&self) -> &FeatureEncoder {
        &self.encoder
    }

    pub fn problem_type(&self) -> &str {
        &self.problem_type
    }

    /// Batch size the network was trained with; scoring always runs one row
    pub fn mini_batch_size(&self) -> usize {
        self.mini_batch_size
    }
}

impl ScoringModel for DeepWaterModel {
    fn header(&self) -> &ModelHeader {
        &self.header
    }

    // The offset is not used by neural networks
    fn score_with_offset<'a>(
        &mut self,
        row: &[f64],
        _offset: f64,
        preds: &'a mut [f64],
    ) -> Result<&'a [f64]> {
        self.encoder.encode_into(row, &mut self.encoded)?;
        let raw = self.backend.predict(&self.encoded, self.header.nclasses())?;
        let out = reconstruct(&raw, &self.header, self.response_norm.as_ref(), row, preds)?;
        debug!(backend = %self.backend.selector(), prediction = out[0], "Scored row");
        Ok(out)
    }
}

impl std::fmt::Debug for DeepWaterModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeepWaterModel")
            .field("problem_type", &self.problem_type)
            .field("encoder", &self.encoder)
            .field("backend", &self.backend)
            .finish()
    }
}

/// Encoder settings read from metadata before the backend comes up
enum EncoderPlan {
    Structured(StructuredEncoder),
    Dense { declared_len: Option<usize> },
}

impl EncoderPlan {
    fn from_info(info: &ModelInfo, shape: &InputShape) -> Result<Self> {
        let nums = info.require_usize("nums")?;
        let cats = info.require_usize("cats")?;

        if nums == 0 && cats == 0 {
            let declared = shape.width * shape.height * shape.channels;
            return Ok(Self::Dense {
                declared_len: (declared > 0).then_some(declared),
            });
        }

        let cat_offsets = match info.int_array_opt("cat_offsets")? {
            Some(offsets) => offsets
                .into_iter()
                .map(|o| {
                    usize::try_from(o)
                        .map_err(|_| ScoringError::corrupt(format!("negative cat offset {o}")))
                })
                .collect::<Result<Vec<_>>>()?,
            None if cats > 0 => {
                return Err(ScoringError::corrupt("missing 'cat_offsets'"));
            }
            None => Vec::new(),
        };
        let norm = Normalization::from_parts(
            info.double_array_opt("norm_mul")?,
            info.double_array_opt("norm_sub")?,
        );
        let use_all = info.bool_or("use_all_factor_levels", true)?;

        Ok(Self::Structured(StructuredEncoder::new(
            nums,
            cats,
            cat_offsets,
            norm,
            use_all,
        )?))
    }

    fn input_shape(&self, mut shape: InputShape) -> InputShape {
        if let Self::Structured(enc) = self {
            shape.features = enc.width();
        }
        shape
    }

    fn finish(self, mean: Option<&[f32]>) -> Result<FeatureEncoder> {
        match self {
            Self::Structured(enc) => Ok(FeatureEncoder::Structured(enc)),
            Self::Dense { declared_len } => Ok(FeatureEncoder::Dense(DenseEncoder::new(
                declared_len,
                mean.map(<[f32]>::to_vec),
            )?)),
        }
    }
}

/// Reader for the `Deep Water` algorithm
#[derive(Debug, Default)]
pub struct DeepWaterReader;

impl DeepWaterReader {
    pub fn new() -> Self {
        Self
    }
}

impl ModelReader for DeepWaterReader {
    fn family(&self) -> &str {
        "Deep Water"
    }

    fn read(
        &self,
        archive: &dyn ArchiveReader,
        header: ModelHeader,
        ctx: &LoadContext<'_>,
    ) -> Result<Box<dyn ScoringModel>> {
        let info = header.info();
        let network = archive.binary_file(NETWORK_BLOB)?;
        let params = archive.binary_file(PARAMS_BLOB)?;

        let selector = info.require_str("backend")?.to_string();
        let problem_type = info.str_opt("problem_type")?.unwrap_or("dataset").to_string();
        let mini_batch_size = info.usize_or("mini_batch_size", 1)?;
        let shape = InputShape {
            width: info.usize_or("width", 0)?,
            height: info.usize_or("height", 0)?,
            channels: info.usize_or("channels", 0)?,
            features: 0,
        };

        let plan = EncoderPlan::from_info(info, &shape)?;
        let response_norm = ResponseNormalization::from_parts(
            info.double_array_opt("norm_resp_mul")?,
            info.double_array_opt("norm_resp_sub")?,
        );

        let mean_signal = match info.str_opt("mean_image_file")? {
            Some(key) => Some(archive.binary_file(key)?),
            None => None,
        };

        let request = BackendRequest {
            selector: &selector,
            shape: plan.input_shape(shape),
            class_count: header.nclasses(),
            params: BackendParams {
                mini_batch_size: 1,
                ..ctx.backend_params
            },
        };
        let handle = backend::initialize(
            ctx.backends,
            ctx.scratch,
            &request,
            NetworkArtifacts {
                network: &network,
                params: &params,
                mean_signal: mean_signal.as_deref(),
            },
        )?;
        let encoder = plan.finish(handle.mean_signal())?;

        info!(
            backend = %selector,
            available = handle.is_valid(),
            problem_type = %problem_type,
            classes = header.nclasses(),
            inputs = ?encoder.width(),
            "Deep Water model loaded"
        );

        Ok(Box::new(DeepWaterModel {
            header,
            problem_type,
            mini_batch_size,
            encoder,
            response_norm,
            backend: handle,
            encoded: Vec::new(),
        }))
    }
}
