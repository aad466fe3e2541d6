//! Tree ensemble models: gradient boosting and random forest.
//!
//! Both families share one archive layout, a JSON blob named `trees`:
//!
//! ```json
//! {"groups": [[{"nodes": [
//!     {"column": 0, "threshold": 2.5, "na_left": true, "left": 1, "right": 2},
//!     {"leaf": -1.0},
//!     {"column": 1, "left_levels": [0, 2], "na_left": false, "left": 3, "right": 4},
//!     {"leaf": 0.5},
//!     {"leaf": 1.5}
//! ]}]]}
//! ```
//!
//! One group per output class (a single group for regression and binomial
//! models). The root is node 0 and children always come after their parent.

use super::decision::{correct_probabilities, predicted_label};
use super::header::ModelHeader;
use super::{LoadContext, ModelReader, ScoringModel};
use crate::archive::ArchiveReader;
use crate::error::{Result, ScoringError};
use serde::Deserialize;
use std::str::FromStr;
use tracing::{debug, info};

/// Blob holding the serialized ensemble
pub const TREES_BLOB: &str = "trees";

// =============================================================================
// Serialized form
// =============================================================================

#[derive(Debug, Deserialize)]
struct EnsembleDef {
    groups: Vec<Vec<TreeDef>>,
}

#[derive(Debug, Deserialize)]
struct TreeDef {
    nodes: Vec<NodeDef>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum NodeDef {
    Leaf {
        leaf: f64,
    },
    Categorical {
        column: usize,
        left_levels: Vec<u32>,
        #[serde(default)]
        na_left: bool,
        left: usize,
        right: usize,
    },
    Numeric {
        column: usize,
        threshold: f64,
        #[serde(default)]
        na_left: bool,
        left: usize,
        right: usize,
    },
}

// =============================================================================
// SoA tree storage
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum NodeKind {
    Leaf,
    Numeric,
    Categorical,
}

/// Levels sent left by a categorical split, as a bitset slice
#[derive(Debug, Clone, Copy, Default)]
struct LevelSet {
    start: u32,
    words: u32,
    /// Domain size of the split column; larger levels were never seen in training
    cardinality: u32,
}

/// One tree in flat arrays; `values` holds the threshold for numeric splits
/// and the prediction for leaves.
#[derive(Debug, Clone)]
pub struct TreeStorage {
    kinds: Box<[NodeKind]>,
    columns: Box<[u32]>,
    values: Box<[f64]>,
    left: Box<[u32]>,
    right: Box<[u32]>,
    na_left: Box<[bool]>,
    level_sets: Box<[LevelSet]>,
    level_words: Box<[u64]>,
}

impl TreeStorage {
    fn build(def: TreeDef, header: &ModelHeader) -> Result<Self> {
        let n = def.nodes.len();
        if n == 0 {
            return Err(ScoringError::corrupt("tree has no nodes"));
        }
        let n_features = header.n_features();

        let mut kinds = Vec::with_capacity(n);
        let mut columns = vec![0u32; n];
        let mut values = vec![0.0; n];
        let mut left = vec![0u32; n];
        let mut right = vec![0u32; n];
        let mut na_left = vec![false; n];
        let mut level_sets = vec![LevelSet::default(); n];
        let mut level_words = Vec::new();

        let check_children = |idx: usize, l: usize, r: usize| -> Result<()> {
            for child in [l, r] {
                if child <= idx || child >= n {
                    return Err(ScoringError::corrupt(format!(
                        "node {idx} has invalid child {child} ({n} nodes)"
                    )));
                }
            }
            Ok(())
        };
        let check_column = |idx: usize, column: usize| -> Result<()> {
            if column >= n_features {
                return Err(ScoringError::corrupt(format!(
                    "node {idx} splits on column {column}, model has {n_features} features"
                )));
            }
            Ok(())
        };

        for (idx, node) in def.nodes.into_iter().enumerate() {
            match node {
                NodeDef::Leaf { leaf } => {
                    kinds.push(NodeKind::Leaf);
                    values[idx] = leaf;
                }
                NodeDef::Numeric {
                    column,
                    threshold,
                    na_left: nl,
                    left: l,
                    right: r,
                } => {
                    check_column(idx, column)?;
                    check_children(idx, l, r)?;
                    kinds.push(NodeKind::Numeric);
                    columns[idx] = column as u32;
                    values[idx] = threshold;
                    left[idx] = l as u32;
                    right[idx] = r as u32;
                    na_left[idx] = nl;
                }
                NodeDef::Categorical {
                    column,
                    left_levels,
                    na_left: nl,
                    left: l,
                    right: r,
                } => {
                    check_column(idx, column)?;
                    check_children(idx, l, r)?;
                    let cardinality = header
                        .domain_values(column)
                        .map(<[String]>::len)
                        .ok_or_else(|| {
                            ScoringError::corrupt(format!(
                                "node {idx} has a categorical split on numeric column {column}"
                            ))
                        })?;
                    if let Some(level) = left_levels.iter().find(|&&lv| lv as usize >= cardinality) {
                        return Err(ScoringError::corrupt(format!(
                            "node {idx} sends level {level} left, column {column} has {cardinality} levels"
                        )));
                    }

                    let words = cardinality.div_ceil(64);
                    let start = level_words.len();
                    level_words.resize(start + words, 0u64);
                    for level in left_levels {
                        let level = level as usize;
                        level_words[start + level / 64] |= 1u64 << (level % 64);
                    }

                    kinds.push(NodeKind::Categorical);
                    columns[idx] = column as u32;
                    left[idx] = l as u32;
                    right[idx] = r as u32;
                    na_left[idx] = nl;
                    level_sets[idx] = LevelSet {
                        start: start as u32,
                        words: words as u32,
                        cardinality: cardinality as u32,
                    };
                }
            }
        }

        Ok(Self {
            kinds: kinds.into_boxed_slice(),
            columns: columns.into_boxed_slice(),
            values: values.into_boxed_slice(),
            left: left.into_boxed_slice(),
            right: right.into_boxed_slice(),
            na_left: na_left.into_boxed_slice(),
            level_sets: level_sets.into_boxed_slice(),
            level_words: level_words.into_boxed_slice(),
        })
    }

    pub fn num_nodes(&self) -> usize {
        self.kinds.len()
    }

    /// Whether a known categorical level is in the node's left set.
    /// `None` for levels the split never saw.
    fn level_goes_left(&self, idx: usize, value: f64) -> Option<bool> {
        let set = self.level_sets[idx];
        if value < 0.0 || value.fract() != 0.0 || value >= f64::from(set.cardinality) {
            return None;
        }
        let level = value as usize;
        let word = self.level_words[set.start as usize + level / 64];
        debug_assert!(level / 64 < set.words as usize);
        Some(word & (1u64 << (level % 64)) != 0)
    }

    /// Walk from the root to a leaf and return its value
    pub fn predict_row(&self, row: &[f64]) -> f64 {
        let mut idx = 0usize;
        loop {
            let kind = self.kinds[idx];
            if kind == NodeKind::Leaf {
                return self.values[idx];
            }

            let value = row[self.columns[idx] as usize];
            let go_left = if value.is_nan() {
                self.na_left[idx]
            } else {
                match kind {
                    NodeKind::Numeric => value < self.values[idx],
                    _ => self
                        .level_goes_left(idx, value)
                        .unwrap_or(self.na_left[idx]),
                }
            };
            let next = if go_left { self.left[idx] } else { self.right[idx] };
            idx = next as usize;
        }
    }
}

/// Trees grouped by output class
#[derive(Debug, Clone)]
pub struct TreeEnsemble {
    groups: Vec<Vec<TreeStorage>>,
}

impl TreeEnsemble {
    /// Parse and validate the `trees` blob against the model header
    pub fn parse(bytes: &[u8], header: &ModelHeader) -> Result<Self> {
        let def: EnsembleDef = serde_json::from_slice(bytes)
            .map_err(|e| ScoringError::corrupt(format!("invalid tree ensemble: {e}")))?;
        if def.groups.is_empty() {
            return Err(ScoringError::corrupt("tree ensemble has no groups"));
        }

        let groups = def
            .groups
            .into_iter()
            .map(|trees| {
                trees
                    .into_iter()
                    .map(|tree| TreeStorage::build(tree, header))
                    .collect::<Result<Vec<_>>>()
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { groups })
    }

    pub fn group_count(&self) -> usize {
        self.groups.len()
    }

    /// Trees in the first group (boosting iterations or forest size)
    pub fn tree_count(&self) -> usize {
        self.groups[0].len()
    }

    /// Sum of leaf values per group
    fn group_sums(&self, row: &[f64], out: &mut [f64]) {
        for (sum, trees) in out.iter_mut().zip(&self.groups) {
            *sum = trees.iter().map(|t| t.predict_row(row)).sum();
        }
    }
}

// =============================================================================
// Families
// =============================================================================

/// Loss function a boosting model was trained with
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Distribution {
    Gaussian,
    Bernoulli,
    Quasibinomial,
    ModifiedHuber,
    Multinomial,
    Poisson,
    Gamma,
    Tweedie,
    Laplace,
    Quantile,
    Huber,
}

impl Distribution {
    /// Default for `AUTO` by class count
    pub fn for_classes(nclasses: usize) -> Self {
        match nclasses {
            1 => Distribution::Gaussian,
            2 => Distribution::Bernoulli,
            _ => Distribution::Multinomial,
        }
    }

    fn is_binomial(self) -> bool {
        matches!(
            self,
            Distribution::Bernoulli | Distribution::Quasibinomial | Distribution::ModifiedHuber
        )
    }

    /// Inverse link: margin to response scale
    pub fn link_inv(self, f: f64) -> f64 {
        match self {
            Distribution::Poisson | Distribution::Gamma | Distribution::Tweedie => f.exp(),
            Distribution::Bernoulli | Distribution::Quasibinomial | Distribution::ModifiedHuber => {
                1.0 / (1.0 + (-f).exp())
            }
            _ => f,
        }
    }
}

impl FromStr for Distribution {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "gaussian" => Ok(Distribution::Gaussian),
            "bernoulli" => Ok(Distribution::Bernoulli),
            "quasibinomial" => Ok(Distribution::Quasibinomial),
            "modified_huber" => Ok(Distribution::ModifiedHuber),
            "multinomial" => Ok(Distribution::Multinomial),
            "poisson" => Ok(Distribution::Poisson),
            "gamma" => Ok(Distribution::Gamma),
            "tweedie" => Ok(Distribution::Tweedie),
            "laplace" => Ok(Distribution::Laplace),
            "quantile" => Ok(Distribution::Quantile),
            "huber" => Ok(Distribution::Huber),
            other => Err(format!("unknown distribution '{other}'")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum EnsembleKind {
    Gbm {
        distribution: Distribution,
        init_f: f64,
    },
    Drf,
}

/// A GBM or DRF model
#[derive(Debug)]
pub struct TreeEnsembleModel {
    header: ModelHeader,
    kind: EnsembleKind,
    ensemble: TreeEnsemble,
    // Reused across calls
    sums: Vec<f64>,
}

impl TreeEnsembleModel {
    pub fn kind(&self) -> EnsembleKind {
        self.kind
    }

    pub fn ensemble(&self) -> &TreeEnsemble {
        &self.ensemble
    }

    fn unify_gbm(&self, distribution: Distribution, init_f: f64, offset: f64, preds: &mut [f64]) {
        let sums = &self.sums;
        let nclasses = self.header.nclasses();

        if nclasses == 1 {
            preds[0] = distribution.link_inv(sums[0] + init_f + offset);
        } else if distribution.is_binomial() {
            let p1 = distribution.link_inv(sums[0] + init_f + offset);
            preds[1] = 1.0 - p1;
            preds[2] = p1;
        } else {
            if nclasses == 2 && sums.len() == 1 {
                let f = sums[0] + init_f + offset;
                preds[1] = f;
                preds[2] = -f;
            } else {
                preds[1..=nclasses].copy_from_slice(sums);
            }
            softmax(&mut preds[1..=nclasses]);
        }
    }

    fn unify_drf(&self, preds: &mut [f64]) {
        let sums = &self.sums;
        let nclasses = self.header.nclasses();
        let ntrees = self.ensemble.tree_count() as f64;

        if nclasses == 1 {
            preds[0] = sums[0] / ntrees;
        } else if nclasses == 2 && sums.len() == 1 {
            preds[1] = sums[0] / ntrees;
            preds[2] = 1.0 - preds[1];
        } else {
            let total: f64 = sums.iter().sum();
            for (p, &s) in preds[1..=nclasses].iter_mut().zip(sums) {
                *p = if total > 0.0 { s / total } else { 0.0 };
            }
        }
    }
}

fn softmax(values: &mut [f64]) {
    let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let mut sum = 0.0;
    for v in values.iter_mut() {
        *v = (*v - max).exp();
        sum += *v;
    }
    for v in values.iter_mut() {
        *v /= sum;
    }
}

impl ScoringModel for TreeEnsembleModel {
    fn header(&self) -> &ModelHeader {
        &self.header
    }

    fn score_with_offset<'a>(
        &mut self,
        row: &[f64],
        offset: f64,
        preds: &'a mut [f64],
    ) -> Result<&'a [f64]> {
        let n_features = self.header.n_features();
        if row.len() != n_features {
            return Err(ScoringError::shape(n_features, row.len()));
        }
        let size = self.header.pred_size();
        if preds.len() < size {
            return Err(ScoringError::PredictionBuffer {
                expected: size,
                actual: preds.len(),
            });
        }

        self.ensemble.group_sums(row, &mut self.sums);

        match self.kind {
            EnsembleKind::Gbm {
                distribution,
                init_f,
            } => self.unify_gbm(distribution, init_f, offset, preds),
            EnsembleKind::Drf => self.unify_drf(preds),
        }

        let header = &self.header;
        if header.is_classifier() {
            if header.balance_classes() {
                if let (Some(prior), Some(model)) =
                    (header.prior_class_distrib(), header.model_class_distrib())
                {
                    correct_probabilities(&mut preds[..size], prior, model);
                }
            }
            preds[0] = predicted_label(
                &preds[..size],
                header.prior_class_distrib(),
                row,
                header.default_threshold(),
            ) as f64;
        }

        debug!(algorithm = %header.algorithm(), prediction = preds[0], "Scored row");
        Ok(&preds[..size])
    }
}

fn expected_groups(header: &ModelHeader, kind: &EnsembleKind, groups: usize) -> bool {
    match (header.nclasses(), kind) {
        (1, _) => groups == 1,
        (2, EnsembleKind::Gbm { distribution, .. }) if distribution.is_binomial() => groups == 1,
        (2, _) => groups == 1 || groups == 2,
        (n, _) => groups == n,
    }
}

fn read_ensemble(
    archive: &dyn ArchiveReader,
    header: ModelHeader,
    kind: EnsembleKind,
) -> Result<TreeEnsembleModel> {
    let ensemble = TreeEnsemble::parse(&archive.binary_file(TREES_BLOB)?, &header)?;
    if !expected_groups(&header, &kind, ensemble.group_count()) {
        return Err(ScoringError::corrupt(format!(
            "{} tree groups for a {}-class model",
            ensemble.group_count(),
            header.nclasses()
        )));
    }

    info!(
        algorithm = %header.algorithm(),
        groups = ensemble.group_count(),
        trees = ensemble.tree_count(),
        classes = header.nclasses(),
        "Tree ensemble loaded"
    );

    let sums = vec![0.0; ensemble.group_count()];
    Ok(TreeEnsembleModel {
        header,
        kind,
        ensemble,
        sums,
    })
}

/// Reader for gradient boosting models
#[derive(Debug, Default)]
pub struct GbmReader;

impl GbmReader {
    pub fn new() -> Self {
        Self
    }
}

impl ModelReader for GbmReader {
    fn family(&self) -> &str {
        "Gradient Boosting Machine"
    }

    fn read(
        &self,
        archive: &dyn ArchiveReader,
        header: ModelHeader,
        _ctx: &LoadContext<'_>,
    ) -> Result<Box<dyn ScoringModel>> {
        let info = header.info();
        let distribution = match info.str_opt("distribution")? {
            None => Distribution::for_classes(header.nclasses()),
            Some(name) if name.eq_ignore_ascii_case("auto") => {
                Distribution::for_classes(header.nclasses())
            }
            Some(name) => name.parse().map_err(ScoringError::ArchiveCorrupt)?,
        };
        let init_f = info.double_or("init_f", 0.0)?;

        let kind = EnsembleKind::Gbm {
            distribution,
            init_f,
        };
        Ok(Box::new(read_ensemble(archive, header, kind)?))
    }
}

/// Reader for random forest models
#[derive(Debug, Default)]
pub struct DrfReader;

impl DrfReader {
    pub fn new() -> Self {
        Self
    }
}

impl ModelReader for DrfReader {
    fn family(&self) -> &str {
        "Distributed Random Forest"
    }

    fn read(
        &self,
        archive: &dyn ArchiveReader,
        header: ModelHeader,
        _ctx: &LoadContext<'_>,
    ) -> Result<Box<dyn ScoringModel>> {
        let double_trees = header.info().bool_or("binomial_double_trees", false)?;
        let model = read_ensemble(archive, header, EnsembleKind::Drf)?;

        if model.ensemble.tree_count() == 0 {
            return Err(ScoringError::corrupt("random forest has no trees"));
        }
        if model.header.nclasses() == 2 && double_trees != (model.ensemble.group_count() == 2) {
            return Err(ScoringError::corrupt(
                "binomial_double_trees disagrees with the number of tree groups",
            ));
        }
        Ok(Box::new(model))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::{MemoryArchive, ModelDescriptor};
    use crate::backend::{BackendCatalog, BackendParams, ScratchDir};
    use crate::types::ModelInfo;
    use approx::assert_abs_diff_eq;

    const SPLIT_TREE: &str = r#"{"nodes": [
        {"column": 0, "threshold": 2.5, "na_left": true, "left": 1, "right": 2},
        {"leaf": -1.0},
        {"column": 1, "left_levels": [0, 2], "na_left": false, "left": 3, "right": 4},
        {"leaf": 0.5},
        {"leaf": 1.5}
    ]}"#;

    fn leaf(v: f64) -> String {
        format!(r#"{{"nodes": [{{"leaf": {v}}}]}}"#)
    }

    fn archive(response: Option<Vec<&str>>, info: ModelInfo, groups: &[Vec<String>]) -> MemoryArchive {
        let groups: Vec<String> = groups.iter().map(|g| format!("[{}]", g.join(","))).collect();
        let blob = format!(r#"{{"groups": [{}]}}"#, groups.join(","));
        let descriptor = ModelDescriptor {
            columns: vec!["x".into(), "color".into(), "y".into()],
            domains: vec![
                None,
                Some(vec!["a".into(), "b".into(), "c".into()]),
                response.map(|d| d.into_iter().map(String::from).collect()),
            ],
            info,
        };
        MemoryArchive::new(descriptor).with_blob(TREES_BLOB, blob)
    }

    fn load(reader: &dyn ModelReader, archive: &MemoryArchive) -> Result<Box<dyn ScoringModel>> {
        let dir = tempfile::tempdir().unwrap();
        let catalog = BackendCatalog::new();
        let scratch = ScratchDir::new(dir.path()).unwrap();
        let ctx = LoadContext {
            backends: &catalog,
            scratch: &scratch,
            backend_params: BackendParams::default(),
        };
        let header = ModelHeader::from_descriptor(archive.descriptor())?;
        reader.read(archive, header, &ctx)
    }

    fn gbm(info: ModelInfo) -> ModelInfo {
        info.with("algorithm", "Gradient Boosting Machine")
    }

    fn drf(info: ModelInfo) -> ModelInfo {
        info.with("algorithm", "Distributed Random Forest")
    }

    #[test]
    fn test_tree_traversal() {
        let a = archive(None, gbm(ModelInfo::new()), &[vec![SPLIT_TREE.to_string()]]);
        let mut model = load(&GbmReader::new(), &a).unwrap();
        let mut preds = [0.0];

        let mut score = |row: [f64; 2]| model.score(&row, &mut preds).unwrap()[0];
        assert_eq!(score([1.0, 0.0]), -1.0);
        assert_eq!(score([3.0, 0.0]), 0.5);
        assert_eq!(score([3.0, 2.0]), 0.5);
        assert_eq!(score([3.0, 1.0]), 1.5);
        // Missing goes the NA direction; unseen levels follow it too
        assert_eq!(score([f64::NAN, 0.0]), -1.0);
        assert_eq!(score([3.0, f64::NAN]), 1.5);
        assert_eq!(score([3.0, 7.0]), 1.5);
    }

    #[test]
    fn test_gbm_regression_links() {
        let info = gbm(ModelInfo::new()).with("init_f", 10.0);
        let a = archive(None, info, &[vec![SPLIT_TREE.to_string()]]);
        let mut model = load(&GbmReader::new(), &a).unwrap();
        let mut preds = [0.0];
        assert_eq!(model.score(&[3.0, 0.0], &mut preds).unwrap(), &[10.5]);
        assert_eq!(model.score_with_offset(&[3.0, 0.0], 1.0, &mut preds).unwrap(), &[11.5]);

        let info = gbm(ModelInfo::new()).with("distribution", "poisson");
        let a = archive(None, info, &[vec![SPLIT_TREE.to_string()]]);
        let mut model = load(&GbmReader::new(), &a).unwrap();
        assert_abs_diff_eq!(
            model.score(&[1.0, 0.0], &mut preds).unwrap()[0],
            (-1.0f64).exp(),
            epsilon = 1e-12
        );
    }

    #[test]
    fn test_gbm_bernoulli() {
        let info = gbm(ModelInfo::new()).with("n_classes", 2i64);
        let a = archive(Some(vec!["no", "yes"]), info, &[vec![SPLIT_TREE.to_string()]]);
        let mut model = load(&GbmReader::new(), &a).unwrap();
        let mut preds = [0.0; 3];

        let out = model.score(&[1.0, 0.0], &mut preds).unwrap();
        let p1 = 1.0 / (1.0 + 1.0f64.exp());
        assert_eq!(out[0], 0.0);
        assert_abs_diff_eq!(out[2], p1, epsilon = 1e-12);
        assert_abs_diff_eq!(out[1], 1.0 - p1, epsilon = 1e-12);

        let out = model.score(&[3.0, 1.0], &mut preds).unwrap();
        assert_eq!(out[0], 1.0);
    }

    #[test]
    fn test_gbm_multinomial_softmax() {
        let info = gbm(ModelInfo::new()).with("n_classes", 3i64);
        let groups = [vec![leaf(1.0)], vec![leaf(2.0)], vec![leaf(0.0)]];
        let a = archive(Some(vec!["r", "g", "b"]), info, &groups);
        let mut model = load(&GbmReader::new(), &a).unwrap();
        let mut preds = [0.0; 4];

        let out = model.score(&[0.0, 0.0], &mut preds).unwrap();
        let z = 1.0f64.exp() + 2.0f64.exp() + 1.0;
        assert_eq!(out[0], 1.0);
        assert_abs_diff_eq!(out[1], 1.0f64.exp() / z, epsilon = 1e-12);
        assert_abs_diff_eq!(out[2], 2.0f64.exp() / z, epsilon = 1e-12);
        assert_abs_diff_eq!(out[3], 1.0 / z, epsilon = 1e-12);
    }

    #[test]
    fn test_gbm_two_class_multinomial_single_group() {
        let info = gbm(ModelInfo::new())
            .with("n_classes", 2i64)
            .with("distribution", "multinomial");
        let a = archive(Some(vec!["no", "yes"]), info, &[vec![leaf(0.5)]]);
        let mut model = load(&GbmReader::new(), &a).unwrap();
        let mut preds = [0.0; 3];

        let out = model.score(&[0.0, 0.0], &mut preds).unwrap();
        let z = 0.5f64.exp() + (-0.5f64).exp();
        assert_abs_diff_eq!(out[1], 0.5f64.exp() / z, epsilon = 1e-12);
        assert_eq!(out[0], 0.0);
    }

    #[test]
    fn test_drf_regression_average() {
        let a = archive(
            None,
            drf(ModelInfo::new()),
            &[vec![SPLIT_TREE.to_string(), leaf(2.0)]],
        );
        let mut model = load(&DrfReader::new(), &a).unwrap();
        let mut preds = [0.0];
        assert_eq!(model.score(&[3.0, 0.0], &mut preds).unwrap(), &[1.25]);
    }

    #[test]
    fn test_drf_binomial_and_balance() {
        let info = drf(ModelInfo::new()).with("n_classes", 2i64);
        let a = archive(Some(vec!["no", "yes"]), info, &[vec![leaf(0.8), leaf(0.6)]]);
        let mut model = load(&DrfReader::new(), &a).unwrap();
        let mut preds = [0.0; 3];
        let out = model.score(&[0.0, 0.0], &mut preds).unwrap();
        assert_abs_diff_eq!(out[1], 0.7, epsilon = 1e-12);
        assert_abs_diff_eq!(out[2], 0.3, epsilon = 1e-12);
        assert_eq!(out[0], 0.0);

        let info = drf(ModelInfo::new())
            .with("n_classes", 2i64)
            .with("balance_classes", true)
            .with("prior_class_distrib", vec![0.9, 0.1])
            .with("model_class_distrib", vec![0.5, 0.5]);
        let a = archive(Some(vec!["no", "yes"]), info, &[vec![leaf(0.8), leaf(0.6)]]);
        let mut model = load(&DrfReader::new(), &a).unwrap();
        let out = model.score(&[0.0, 0.0], &mut preds).unwrap();
        assert_abs_diff_eq!(out[2], 0.03 / 0.66, epsilon = 1e-12);
        assert_abs_diff_eq!(out[1] + out[2], 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_drf_multinomial_normalizes() {
        let info = drf(ModelInfo::new()).with("n_classes", 3i64);
        let groups = [vec![leaf(1.0)], vec![leaf(3.0)], vec![leaf(0.0)]];
        let a = archive(Some(vec!["r", "g", "b"]), info, &groups);
        let mut model = load(&DrfReader::new(), &a).unwrap();
        let mut preds = [0.0; 4];
        assert_eq!(model.score(&[0.0, 0.0], &mut preds).unwrap(), &[1.0, 0.25, 0.75, 0.0]);
    }

    #[test]
    fn test_scoring_errors() {
        let a = archive(None, gbm(ModelInfo::new()), &[vec![SPLIT_TREE.to_string()]]);
        let mut model = load(&GbmReader::new(), &a).unwrap();
        let mut preds = [0.0];
        assert!(matches!(
            model.score(&[1.0, 0.0, 0.0], &mut preds),
            Err(ScoringError::FeatureShape { expected: 2, actual: 3 })
        ));
        assert!(matches!(
            model.score(&[1.0, 0.0], &mut []),
            Err(ScoringError::PredictionBuffer { expected: 1, actual: 0 })
        ));
    }

    #[test]
    fn test_invalid_ensembles_are_corrupt() {
        let cases = [
            // Child pointing backwards
            r#"{"nodes": [{"column": 0, "threshold": 1.0, "left": 0, "right": 1}, {"leaf": 1.0}]}"#,
            // Column out of range
            r#"{"nodes": [{"column": 5, "threshold": 1.0, "left": 1, "right": 2}, {"leaf": 1.0}, {"leaf": 2.0}]}"#,
            // Categorical split on a numeric column
            r#"{"nodes": [{"column": 0, "left_levels": [0], "left": 1, "right": 2}, {"leaf": 1.0}, {"leaf": 2.0}]}"#,
            // Level outside the domain
            r#"{"nodes": [{"column": 1, "left_levels": [3], "left": 1, "right": 2}, {"leaf": 1.0}, {"leaf": 2.0}]}"#,
            r#"{"nodes": []}"#,
        ];
        for tree in cases {
            let a = archive(None, gbm(ModelInfo::new()), &[vec![tree.to_string()]]);
            assert!(
                matches!(load(&GbmReader::new(), &a), Err(ScoringError::ArchiveCorrupt(_))),
                "{tree}"
            );
        }

        // Two groups for a regression model
        let a = archive(None, gbm(ModelInfo::new()), &[vec![leaf(1.0)], vec![leaf(1.0)]]);
        assert!(matches!(load(&GbmReader::new(), &a), Err(ScoringError::ArchiveCorrupt(_))));

        // Forest without trees
        let a = archive(None, drf(ModelInfo::new()), &[vec![]]);
        assert!(matches!(load(&DrfReader::new(), &a), Err(ScoringError::ArchiveCorrupt(_))));

        let a = archive(None, gbm(ModelInfo::new()).with("distribution", "cauchy"), &[vec![leaf(1.0)]]);
        assert!(matches!(load(&GbmReader::new(), &a), Err(ScoringError::ArchiveCorrupt(_))));
    }
}
