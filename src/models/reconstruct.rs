//! Maps raw backend outputs to the caller-visible prediction vector

use super::decision::predicted_label;
use super::header::ModelHeader;
use crate::error::{Result, ScoringError};

/// Affine response denormalization for regression, `raw * mul + sub`
#[derive(Debug, Clone, PartialEq)]
pub struct ResponseNormalization {
    mul: f64,
    sub: f64,
}

impl ResponseNormalization {
    /// Only present when both vectors are present and non-empty
    pub fn from_parts(mul: Option<Vec<f64>>, sub: Option<Vec<f64>>) -> Option<Self> {
        match (mul?.first(), sub?.first()) {
            (Some(&mul), Some(&sub)) => Some(Self { mul, sub }),
            _ => None,
        }
    }

    pub fn apply(&self, raw: f64) -> f64 {
        raw * self.mul + self.sub
    }
}

/// Write the prediction for `raw` into `preds`.
///
/// Both the backend output length and the buffer length are checked before
/// anything is written, so a failed call leaves `preds` untouched.
pub fn reconstruct<'a>(
    raw: &[f32],
    header: &ModelHeader,
    response_norm: Option<&ResponseNormalization>,
    row: &[f64],
    preds: &'a mut [f64],
) -> Result<&'a [f64]> {
    let nclasses = header.nclasses();
    if raw.len() != nclasses {
        return Err(ScoringError::BackendContractViolation {
            expected: nclasses,
            actual: raw.len(),
        });
    }
    let size = header.pred_size();
    if preds.len() < size {
        return Err(ScoringError::PredictionBuffer {
            expected: size,
            actual: preds.len(),
        });
    }

    if header.is_classifier() {
        for (slot, &p) in preds[1..size].iter_mut().zip(raw) {
            *slot = f64::from(p);
        }
        preds[0] = predicted_label(
            &preds[..size],
            header.prior_class_distrib(),
            row,
            header.default_threshold(),
        ) as f64;
    } else {
        let value = f64::from(raw[0]);
        preds[0] = match response_norm {
            Some(norm) => norm.apply(value),
            None => value,
        };
    }
    Ok(&preds[..size])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::ModelDescriptor;
    use crate::types::ModelInfo;

    fn header(nclasses: i64) -> ModelHeader {
        let descriptor = ModelDescriptor {
            columns: vec!["x".into(), "y".into()],
            domains: vec![None, None],
            info: ModelInfo::new()
                .with("algorithm", "Deep Water")
                .with("n_classes", nclasses),
        };
        ModelHeader::from_descriptor(&descriptor).unwrap()
    }

    #[test]
    fn test_regression_denormalization() {
        let norm = ResponseNormalization::from_parts(Some(vec![2.0]), Some(vec![1.0])).unwrap();
        let mut preds = [0.0];
        let out = reconstruct(&[3.0], &header(1), Some(&norm), &[0.0], &mut preds).unwrap();
        assert_eq!(out, &[7.0]);

        let mut preds = [0.0];
        let out = reconstruct(&[3.0], &header(1), None, &[0.0], &mut preds).unwrap();
        assert_eq!(out, &[3.0]);
    }

    #[test]
    fn test_partial_response_norm_is_identity() {
        assert!(ResponseNormalization::from_parts(Some(vec![2.0]), None).is_none());
        assert!(ResponseNormalization::from_parts(Some(vec![]), Some(vec![1.0])).is_none());
    }

    #[test]
    fn test_classification_copies_distribution() {
        let mut preds = [9.0; 4];
        let out = reconstruct(&[0.1, 0.7, 0.2], &header(3), None, &[1.0], &mut preds).unwrap();
        assert_eq!(out.len(), 4);
        assert_eq!(out[0], 1.0);
        assert_eq!(&out[1..], &[0.1f32 as f64, 0.7f32 as f64, 0.2f32 as f64]);
    }

    #[test]
    fn test_contract_violation_leaves_buffer_untouched() {
        let mut preds = [9.0; 3];
        let err = reconstruct(&[0.7], &header(2), None, &[1.0], &mut preds).unwrap_err();
        assert!(matches!(
            err,
            ScoringError::BackendContractViolation {
                expected: 2,
                actual: 1
            }
        ));
        assert_eq!(preds, [9.0; 3]);
    }

    #[test]
    fn test_short_buffer_rejected() {
        let mut preds = [9.0; 2];
        let err = reconstruct(&[0.3, 0.7], &header(2), None, &[1.0], &mut preds).unwrap_err();
        assert!(matches!(err, ScoringError::PredictionBuffer { expected: 3, actual: 2 }));
        assert_eq!(preds, [9.0; 2]);
    }
}
