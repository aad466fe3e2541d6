//! Feature encoding for backend inference.
//!
//! Transforms a raw feature row into the flat `f32` input the backend network
//! was trained on. The layout must match the training-side encoding exactly:
//! a mismatch never crashes, it silently corrupts predictions.
//!
//! Two modes:
//!
//! - **structured**: `nums` numeric columns (normalized) followed by one one-hot
//!   block per categorical column, placed at `nums + cat_offsets[k]`;
//! - **dense**: the row is a flat signal (e.g. pixels), optionally centered by a
//!   mean signal.

use crate::error::{Result, ScoringError};

/// Per-column affine normalization, `value * mul - sub`
#[derive(Debug, Clone, PartialEq)]
pub struct Normalization {
    mul: Vec<f64>,
    sub: Vec<f64>,
}

impl Normalization {
    /// Build from optional vectors; only present when both are.
    pub fn from_parts(mul: Option<Vec<f64>>, sub: Option<Vec<f64>>) -> Option<Self> {
        match (mul, sub) {
            (Some(mul), Some(sub)) => Some(Self { mul, sub }),
            _ => None,
        }
    }

    #[inline]
    fn apply(&self, i: usize, value: f64) -> f64 {
        value * self.mul[i] - self.sub[i]
    }
}

/// Encoder for models declaring numeric and/or categorical columns
#[derive(Debug, Clone, PartialEq)]
pub struct StructuredEncoder {
    nums: usize,
    cats: usize,
    cat_offsets: Vec<usize>,
    norm: Option<Normalization>,
    use_all_factor_levels: bool,
}

impl StructuredEncoder {
    /// Create an encoder from precomputed cumulative categorical offsets.
    ///
    /// `cat_offsets` has `cats + 1` entries starting at 0; an empty slice is
    /// accepted when there are no categorical columns.
    pub fn new(
        nums: usize,
        cats: usize,
        cat_offsets: Vec<usize>,
        norm: Option<Normalization>,
        use_all_factor_levels: bool,
    ) -> Result<Self> {
        let cat_offsets = if cats == 0 && cat_offsets.is_empty() {
            vec![0]
        } else {
            cat_offsets
        };

        if cat_offsets.len() != cats + 1 {
            return Err(ScoringError::corrupt(format!(
                "cat_offsets has {} entries, expected {}",
                cat_offsets.len(),
                cats + 1
            )));
        }
        if cat_offsets[0] != 0 {
            return Err(ScoringError::corrupt("cat_offsets must start at 0"));
        }
        if cat_offsets.windows(2).any(|w| w[1] < w[0]) {
            return Err(ScoringError::corrupt("cat_offsets must be non-decreasing"));
        }
        if let Some(norm) = &norm {
            if norm.mul.len() != nums || norm.sub.len() != nums {
                return Err(ScoringError::corrupt(format!(
                    "normalization vectors have {}/{} entries, expected {}",
                    norm.mul.len(),
                    norm.sub.len(),
                    nums
                )));
            }
        }

        Ok(Self {
            nums,
            cats,
            cat_offsets,
            norm,
            use_all_factor_levels,
        })
    }

    /// Create an encoder from one-hot block widths, one per categorical column
    pub fn from_cardinalities(
        nums: usize,
        cardinalities: &[usize],
        norm: Option<Normalization>,
        use_all_factor_levels: bool,
    ) -> Result<Self> {
        Self::new(
            nums,
            cardinalities.len(),
            cumulative_offsets(cardinalities),
            norm,
            use_all_factor_levels,
        )
    }

    pub fn nums(&self) -> usize {
        self.nums
    }

    pub fn cats(&self) -> usize {
        self.cats
    }

    pub fn cat_offsets(&self) -> &[usize] {
        &self.cat_offsets
    }

    /// Total one-hot width across all categorical columns
    pub fn categorical_width(&self) -> usize {
        self.cat_offsets[self.cats]
    }

    /// Expected raw row length
    pub fn row_len(&self) -> usize {
        self.nums + self.cats
    }

    /// Encoded width, `nums + cat_offsets[cats]`
    pub fn width(&self) -> usize {
        self.nums + self.categorical_width()
    }

    fn encode_into(&self, row: &[f64], out: &mut Vec<f32>) -> Result<()> {
        if row.len() != self.row_len() {
            return Err(ScoringError::shape(self.row_len(), row.len()));
        }

        out.clear();
        out.resize(self.width(), 0.0);

        for (i, &value) in row[..self.nums].iter().enumerate() {
            let value = match &self.norm {
                Some(norm) => norm.apply(i, value),
                None => value,
            };
            // NaN stays NaN through normalization; missing numerics encode as 0
            out[i] = if value.is_nan() { 0.0 } else { value as f32 };
        }

        for (k, &level) in row[self.nums..].iter().enumerate() {
            if let Some(slot) = self.categorical_slot(k, level) {
                out[self.nums + slot] = 1.0;
            }
        }

        Ok(())
    }

    /// Offset of the one-hot bit for `level` of categorical column `k`, relative
    /// to the start of the categorical block. `None` for the omitted reference level.
    fn categorical_slot(&self, k: usize, level: f64) -> Option<usize> {
        let start = self.cat_offsets[k];
        let end = self.cat_offsets[k + 1];
        if end == start {
            return None;
        }
        // Last slot of each block holds missing and unseen levels
        let last = end - 1;

        // NaN, infinities and negative levels are all unseen
        let level = level.trunc();
        if !level.is_finite() || level < 0.0 {
            return Some(last);
        }
        // Saturates for huge values, which then fall through as unseen
        let c = level as usize;

        let slot = if self.use_all_factor_levels {
            c
        } else if c != 0 {
            c - 1
        } else {
            return None;
        };

        if slot >= end - start {
            return Some(last);
        }
        Some(start + slot)
    }
}

/// Encoder for dense-signal models (no structured columns)
#[derive(Debug, Clone, PartialEq)]
pub struct DenseEncoder {
    declared_len: Option<usize>,
    mean: Option<Vec<f32>>,
}

impl DenseEncoder {
    /// `declared_len` is `width * height * channels` when the model declares it
    pub fn new(declared_len: Option<usize>, mean: Option<Vec<f32>>) -> Result<Self> {
        if let (Some(len), Some(mean)) = (declared_len, &mean) {
            if mean.len() != len {
                return Err(ScoringError::corrupt(format!(
                    "mean signal has {} values, expected {len}",
                    mean.len()
                )));
            }
        }
        Ok(Self { declared_len, mean })
    }

    pub fn mean(&self) -> Option<&[f32]> {
        self.mean.as_deref()
    }

    fn expected_len(&self) -> Option<usize> {
        self.declared_len
            .or_else(|| self.mean.as_ref().map(Vec::len))
    }

    fn encode_into(&self, row: &[f64], out: &mut Vec<f32>) -> Result<()> {
        if let Some(expected) = self.expected_len() {
            if row.len() != expected {
                return Err(ScoringError::shape(expected, row.len()));
            }
        }

        out.clear();
        match &self.mean {
            Some(mean) => out.extend(row.iter().zip(mean).map(|(&v, &m)| v as f32 - m)),
            None => out.extend(row.iter().map(|&v| v as f32)),
        }
        Ok(())
    }
}

/// Feature encoder selected per model at load time
#[derive(Debug, Clone, PartialEq)]
pub enum FeatureEncoder {
    Structured(StructuredEncoder),
    Dense(DenseEncoder),
}

impl FeatureEncoder {
    /// Encode a row into a fresh buffer
    pub fn encode(&self, row: &[f64]) -> Result<Vec<f32>> {
        let mut out = Vec::new();
        self.encode_into(row, &mut out)?;
        Ok(out)
    }

    /// Encode a row, reusing `out`'s allocation.
    ///
    /// On error `out` may have been cleared but is never partially encoded.
    pub fn encode_into(&self, row: &[f64], out: &mut Vec<f32>) -> Result<()> {
        match self {
            FeatureEncoder::Structured(enc) => enc.encode_into(row, out),
            FeatureEncoder::Dense(enc) => enc.encode_into(row, out),
        }
    }

    /// Encoded width, when known before seeing a row
    pub fn width(&self) -> Option<usize> {
        match self {
            FeatureEncoder::Structured(enc) => Some(enc.width()),
            FeatureEncoder::Dense(enc) => enc.expected_len(),
        }
    }
}

/// Cumulative offsets for one-hot blocks: `offsets[k] = sum(c_0..c_{k-1})`
pub fn cumulative_offsets(cardinalities: &[usize]) -> Vec<usize> {
    let mut offsets = Vec::with_capacity(cardinalities.len() + 1);
    let mut total = 0;
    offsets.push(total);
    for &c in cardinalities {
        total += c;
        offsets.push(total);
    }
    offsets
}

#[cfg(test)]
mod tests {
    use super::*;

    fn structured(nums: usize, cards: &[usize], use_all: bool) -> FeatureEncoder {
        FeatureEncoder::Structured(
            StructuredEncoder::from_cardinalities(nums, cards, None, use_all).unwrap(),
        )
    }

    #[test]
    fn test_cumulative_offsets() {
        assert_eq!(cumulative_offsets(&[3, 2, 4]), vec![0, 3, 5, 9]);
        assert_eq!(cumulative_offsets(&[]), vec![0]);
    }

    #[test]
    fn test_numeric_then_one_hot_layout() {
        let enc = structured(2, &[3, 2], true);
        let out = enc.encode(&[1.5, -2.0, 1.0, 0.0]).unwrap();
        assert_eq!(out, vec![1.5, -2.0, 0.0, 1.0, 0.0, 1.0, 0.0]);
    }

    #[test]
    fn test_first_level_sets_bit_at_offset() {
        let enc = StructuredEncoder::from_cardinalities(1, &[3, 4, 2], None, true).unwrap();
        let offsets = enc.cat_offsets().to_vec();
        assert_eq!(offsets, vec![0, 3, 7, 9]);
        assert_eq!(enc.categorical_width(), 9);

        let out = FeatureEncoder::Structured(enc).encode(&[0.0, 2.0, 0.0, 1.0]).unwrap();
        let block = &out[1..];
        assert_eq!(block[offsets[1]], 1.0);
        assert_eq!(block[offsets[1]..offsets[2]].iter().sum::<f32>(), 1.0);
    }

    #[test]
    fn test_reference_level_dropped_without_all_factor_levels() {
        let enc = structured(0, &[3], false);
        assert_eq!(enc.encode(&[0.0]).unwrap(), vec![0.0, 0.0, 0.0]);
        assert_eq!(enc.encode(&[1.0]).unwrap(), vec![1.0, 0.0, 0.0]);
        assert_eq!(enc.encode(&[2.0]).unwrap(), vec![0.0, 1.0, 0.0]);
    }

    #[test]
    fn test_missing_and_unseen_levels_use_last_slot() {
        let enc = structured(0, &[3], true);
        assert_eq!(enc.encode(&[f64::NAN]).unwrap(), vec![0.0, 0.0, 1.0]);
        assert_eq!(enc.encode(&[17.0]).unwrap(), vec![0.0, 0.0, 1.0]);
        assert_eq!(enc.encode(&[-3.0]).unwrap(), vec![0.0, 0.0, 1.0]);
    }

    #[test]
    fn test_extreme_levels_use_last_slot() {
        for use_all in [true, false] {
            let enc = structured(1, &[2, 3], use_all);
            let width = enc.width().unwrap();
            for level in [f64::INFINITY, f64::NEG_INFINITY, 1e300, -1e300] {
                let out = enc.encode(&[0.0, 0.0, level]).unwrap();
                assert_eq!(out.len(), width);
                assert_eq!(out[width - 1], 1.0, "level {level}, use_all {use_all}");
                assert_eq!(out[1 + 2..width - 1].iter().sum::<f32>(), 0.0);
            }
        }
    }

    #[test]
    fn test_normalization() {
        let norm = Normalization::from_parts(Some(vec![2.0, 0.5]), Some(vec![1.0, 3.0]));
        let enc = FeatureEncoder::Structured(StructuredEncoder::new(2, 0, vec![0], norm, true).unwrap());
        assert_eq!(enc.encode(&[3.0, 10.0]).unwrap(), vec![5.0, 2.0]);
        // Missing numeric value
        assert_eq!(enc.encode(&[f64::NAN, 10.0]).unwrap(), vec![0.0, 2.0]);
    }

    #[test]
    fn test_identity_normalization_keeps_numeric_prefix() {
        let norm = Normalization::from_parts(Some(vec![1.0; 3]), Some(vec![0.0; 3]));
        let enc = FeatureEncoder::Structured(
            StructuredEncoder::new(3, 1, vec![0, 2], norm, true).unwrap(),
        );
        let row = [0.25, -7.5, 1e3, 1.0];
        let out = enc.encode(&row).unwrap();
        assert_eq!(&out[..3], &[0.25f32, -7.5, 1000.0]);
    }

    #[test]
    fn test_encoding_is_deterministic() {
        let enc = structured(2, &[3, 2], false);
        let row = [0.1, 0.2, 2.0, f64::NAN];
        let a = enc.encode(&row).unwrap();
        let b = enc.encode(&row).unwrap();
        let bits = |v: &[f32]| v.iter().map(|x| x.to_bits()).collect::<Vec<_>>();
        assert_eq!(bits(&a), bits(&b));
    }

    #[test]
    fn test_shape_mismatch() {
        let enc = structured(2, &[3], true);
        assert!(matches!(
            enc.encode(&[1.0, 2.0]),
            Err(ScoringError::FeatureShape {
                expected: 3,
                actual: 2
            })
        ));
    }

    #[test]
    fn test_invalid_offsets_rejected() {
        assert!(StructuredEncoder::new(1, 2, vec![0, 3], None, true).is_err());
        assert!(StructuredEncoder::new(1, 2, vec![1, 3, 4], None, true).is_err());
        assert!(StructuredEncoder::new(1, 2, vec![0, 3, 2], None, true).is_err());
        let norm = Normalization::from_parts(Some(vec![1.0]), Some(vec![0.0]));
        assert!(StructuredEncoder::new(2, 0, vec![0], norm, true).is_err());
    }

    #[test]
    fn test_dense_mean_subtraction() {
        let enc = FeatureEncoder::Dense(DenseEncoder::new(Some(3), Some(vec![0.5, 1.0, 1.5])).unwrap());
        assert_eq!(enc.encode(&[1.0, 1.0, 1.0]).unwrap(), vec![0.5, 0.0, -0.5]);
        assert!(matches!(
            enc.encode(&[1.0, 1.0]),
            Err(ScoringError::FeatureShape { .. })
        ));
    }

    #[test]
    fn test_dense_without_mean_passes_through() {
        let enc = FeatureEncoder::Dense(DenseEncoder::new(None, None).unwrap());
        assert_eq!(enc.encode(&[3.0, 4.0]).unwrap(), vec![3.0, 4.0]);
        assert_eq!(enc.width(), None);
    }

    #[test]
    fn test_dense_mean_length_checked() {
        assert!(DenseEncoder::new(Some(4), Some(vec![0.0; 3])).is_err());
    }
}
