//! Configuration management for the scoring runtime

use anyhow::{Context, Result};
use config::{Config, Environment, File, FileFormat};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Main runtime configuration
#[derive(Debug, Clone, Deserialize)]
pub struct RuntimeConfig {
    #[serde(default)]
    pub scratch: ScratchConfig,
    #[serde(default)]
    pub backend: BackendConfig,
    #[serde(default)]
    pub predictor: PredictorConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Where staged backend artifacts are written
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ScratchConfig {
    /// Directory for uniquely named temporary artifacts (created on demand)
    pub dir: PathBuf,
}

impl Default for ScratchConfig {
    fn default() -> Self {
        Self {
            dir: std::env::temp_dir().join("mojo-runtime"),
        }
    }
}

/// Inference engine settings
#[derive(Debug, Clone, Deserialize)]
pub struct BackendConfig {
    /// Threads the engine may use for one forward pass (default: 1)
    #[serde(default = "default_intra_threads")]
    pub intra_threads: usize,
}

fn default_intra_threads() -> usize {
    1
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            intra_threads: default_intra_threads(),
        }
    }
}

/// Named-row prediction settings
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PredictorConfig {
    /// Score unknown categorical levels as missing instead of failing
    #[serde(default)]
    pub unknown_levels_as_na: bool,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,
    /// Log format (json, pretty)
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}

impl RuntimeConfig {
    /// Load configuration from `config/runtime.toml` if present, plus
    /// environment overrides
    pub fn load() -> Result<Self> {
        Self::build(File::new("config/runtime.toml", FileFormat::Toml).required(false))
    }

    /// Load configuration from a specific path.
    ///
    /// `MOJO__`-prefixed environment variables override file values, e.g.
    /// `MOJO__SCRATCH__DIR=/var/tmp/mojo`.
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::build(File::from(path.as_ref()))
    }

    fn build<S>(file: S) -> Result<Self>
    where
        S: config::Source + Send + Sync + 'static,
    {
        let config = Config::builder()
            .add_source(file)
            .add_source(Environment::with_prefix("MOJO").separator("__"))
            .build()
            .context("Failed to build configuration")?;

        config
            .try_deserialize()
            .context("Failed to deserialize configuration")
    }
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            scratch: ScratchConfig::default(),
            backend: BackendConfig::default(),
            predictor: PredictorConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = RuntimeConfig::default();
        assert_eq!(config.backend.intra_threads, 1);
        assert!(!config.predictor.unknown_levels_as_na);
        assert_eq!(config.logging.level, "info");
        assert!(config.scratch.dir.ends_with("mojo-runtime"));
    }

    #[test]
    fn test_load_from_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("runtime.toml");
        std::fs::write(
            &path,
            r#"
[scratch]
dir = "/var/tmp/mojo-scratch"

[backend]
intra_threads = 4

[logging]
level = "debug"
format = "json"
"#,
        )
        .unwrap();

        let config = RuntimeConfig::load_from_path(&path).unwrap();
        assert_eq!(config.scratch.dir, PathBuf::from("/var/tmp/mojo-scratch"));
        assert_eq!(config.backend.intra_threads, 4);
        assert_eq!(config.logging.format, "json");
        assert!(!config.predictor.unknown_levels_as_na);
    }

    #[test]
    fn test_env_overrides_without_file() {
        // The shipped config/runtime.toml, if found, leaves these at their defaults
        std::env::set_var("MOJO__LOGGING__LEVEL", "trace");
        let config = RuntimeConfig::load();
        std::env::remove_var("MOJO__LOGGING__LEVEL");

        let config = config.unwrap();
        assert_eq!(config.logging.level, "trace");
        assert_eq!(config.logging.format, "pretty");
        assert_eq!(config.backend.intra_threads, 1);
    }

    #[test]
    fn test_missing_file_fails() {
        assert!(RuntimeConfig::load_from_path("does/not/exist.toml").is_err());
    }
}
