//! Model archive access
//!
//! Readers only need two things from an archive: the descriptor (columns,
//! domains and the metadata mapping) and named binary blobs.

use crate::error::{Result, ScoringError};
use crate::types::ModelInfo;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};
use tracing::debug;

/// File holding the descriptor inside a directory archive
pub const DESCRIPTOR_FILE: &str = "model.json";

/// Algorithm-independent description of an archived model
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ModelDescriptor {
    /// Column names in row order; the response comes last for supervised models
    pub columns: Vec<String>,
    /// Per-column categorical levels, `None` for numeric columns
    #[serde(default)]
    pub domains: Vec<Option<Vec<String>>>,
    /// Option name to typed value
    #[serde(default)]
    pub info: ModelInfo,
}

/// Read access to a serialized model
pub trait ArchiveReader {
    fn descriptor(&self) -> &ModelDescriptor;

    /// Fetch a binary blob, failing with `ArchiveCorrupt` when it is absent
    fn binary_file(&self, key: &str) -> Result<Vec<u8>>;

    fn contains(&self, key: &str) -> bool;
}

/// Archive unpacked into a directory: `model.json` plus one file per blob
#[derive(Debug, Clone)]
pub struct DirArchive {
    root: PathBuf,
    descriptor: ModelDescriptor,
}

impl DirArchive {
    pub fn open<P: AsRef<Path>>(root: P) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        let descriptor_path = root.join(DESCRIPTOR_FILE);

        let bytes = std::fs::read(&descriptor_path).map_err(|e| match e.kind() {
            ErrorKind::NotFound => ScoringError::corrupt(format!(
                "descriptor {} not found",
                descriptor_path.display()
            )),
            _ => ScoringError::Io(e),
        })?;
        let descriptor: ModelDescriptor = serde_json::from_slice(&bytes)
            .map_err(|e| ScoringError::corrupt(format!("invalid descriptor: {e}")))?;

        debug!(path = %root.display(), columns = descriptor.columns.len(), "Opened archive directory");

        Ok(Self { root, descriptor })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn blob_path(&self, key: &str) -> Result<PathBuf> {
        let relative = Path::new(key);
        let plain = !key.is_empty()
            && relative
                .components()
                .all(|c| matches!(c, Component::Normal(_)));
        if !plain {
            return Err(ScoringError::corrupt(format!("invalid blob key '{key}'")));
        }
        Ok(self.root.join(relative))
    }
}

impl ArchiveReader for DirArchive {
    fn descriptor(&self) -> &ModelDescriptor {
        &self.descriptor
    }

    fn binary_file(&self, key: &str) -> Result<Vec<u8>> {
        let path = self.blob_path(key)?;
        std::fs::read(&path).map_err(|e| match e.kind() {
            ErrorKind::NotFound => ScoringError::corrupt(format!("missing blob '{key}'")),
            _ => ScoringError::Io(e),
        })
    }

    fn contains(&self, key: &str) -> bool {
        self.blob_path(key).map(|p| p.is_file()).unwrap_or(false)
    }
}

/// Archive held entirely in memory
#[derive(Debug, Clone, Default)]
pub struct MemoryArchive {
    descriptor: ModelDescriptor,
    blobs: HashMap<String, Vec<u8>>,
}

impl MemoryArchive {
    pub fn new(descriptor: ModelDescriptor) -> Self {
        Self {
            descriptor,
            blobs: HashMap::new(),
        }
    }

    pub fn with_blob(mut self, key: &str, bytes: impl Into<Vec<u8>>) -> Self {
        self.insert_blob(key, bytes);
        self
    }

    pub fn insert_blob(&mut self, key: &str, bytes: impl Into<Vec<u8>>) {
        self.blobs.insert(key.to_string(), bytes.into());
    }

    pub fn descriptor_mut(&mut self) -> &mut ModelDescriptor {
        &mut self.descriptor
    }
}

impl ArchiveReader for MemoryArchive {
    fn descriptor(&self) -> &ModelDescriptor {
        &self.descriptor
    }

    fn binary_file(&self, key: &str) -> Result<Vec<u8>> {
        self.blobs
            .get(key)
            .cloned()
            .ok_or_else(|| ScoringError::corrupt(format!("missing blob '{key}'")))
    }

    fn contains(&self, key: &str) -> bool {
        self.blobs.contains_key(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn descriptor() -> ModelDescriptor {
        ModelDescriptor {
            columns: vec!["x".into(), "y".into()],
            domains: vec![None, None],
            info: ModelInfo::new().with("algorithm", "Deep Water"),
        }
    }

    #[test]
    fn test_memory_archive_blobs() {
        let archive = MemoryArchive::new(descriptor()).with_blob("model_network", b"{}".to_vec());

        assert!(archive.contains("model_network"));
        assert_eq!(archive.binary_file("model_network").unwrap(), b"{}");
        assert!(matches!(
            archive.binary_file("model_params"),
            Err(ScoringError::ArchiveCorrupt(_))
        ));
    }

    #[test]
    fn test_dir_archive_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join(DESCRIPTOR_FILE),
            serde_json::to_vec(&descriptor()).unwrap(),
        )
        .unwrap();
        std::fs::write(dir.path().join("model_params"), [1u8, 2, 3]).unwrap();

        let archive = DirArchive::open(dir.path()).unwrap();
        assert_eq!(archive.descriptor().columns, vec!["x", "y"]);
        assert_eq!(
            archive.descriptor().info.require_str("algorithm").unwrap(),
            "Deep Water"
        );
        assert_eq!(archive.binary_file("model_params").unwrap(), vec![1, 2, 3]);
        assert!(!archive.contains("model_network"));
        assert!(matches!(
            archive.binary_file("model_network"),
            Err(ScoringError::ArchiveCorrupt(_))
        ));
    }

    #[test]
    fn test_dir_archive_rejects_escaping_keys() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join(DESCRIPTOR_FILE),
            serde_json::to_vec(&descriptor()).unwrap(),
        )
        .unwrap();

        let archive = DirArchive::open(dir.path()).unwrap();
        assert!(archive.binary_file("../secret").is_err());
        assert!(archive.binary_file("/etc/passwd").is_err());
        assert!(!archive.contains(""));
    }

    #[test]
    fn test_missing_descriptor_is_corrupt() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            DirArchive::open(dir.path()),
            Err(ScoringError::ArchiveCorrupt(_))
        ));
    }

    #[test]
    fn test_malformed_descriptor_is_corrupt() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(DESCRIPTOR_FILE), b"{\"columns\": 7").unwrap();
        let err = DirArchive::open(dir.path()).unwrap_err();
        assert!(matches!(err, ScoringError::ArchiveCorrupt(ref msg) if msg.contains("invalid descriptor")));
        assert!(!err.is_per_call());
    }
}
