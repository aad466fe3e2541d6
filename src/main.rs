//! Model Scoring Runtime - Main Entry Point
//!
//! Loads a model archive, then reads one JSON object per line from stdin
//! (column name to number or level string) and writes one JSON prediction per
//! line to stdout.
//!
//! Usage: `mojo-runtime <archive-dir> [config.toml]`

use anyhow::{Context, Result};
use mojo_runtime::{
    config::RuntimeConfig, metrics::ScoringMetrics, models::ModelLoader, RowData, RowPredictor,
};
use std::io::{BufRead, BufWriter, Write};
use std::time::Instant;
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    let mut args = std::env::args().skip(1);
    let archive_dir = args
        .next()
        .context("usage: mojo-runtime <archive-dir> [config.toml]")?;

    // Load configuration
    let config = match args.next() {
        Some(path) => RuntimeConfig::load_from_path(&path)?,
        None => RuntimeConfig::load()?,
    };

    init_logging(&config)?;
    info!("Starting model scoring runtime");
    info!(
        scratch = %config.scratch.dir.display(),
        intra_threads = config.backend.intra_threads,
        "Configuration loaded"
    );

    let loader = ModelLoader::new(&config)?;
    let model = loader
        .load_dir(&archive_dir)
        .with_context(|| format!("loading model from {archive_dir}"))?;
    info!(
        algorithm = %model.header().algorithm(),
        category = ?model.header().category(),
        features = model.header().n_features(),
        "Model ready"
    );

    let mut predictor = RowPredictor::new(model, &config.predictor);
    let metrics = ScoringMetrics::new();

    let stdin = std::io::stdin();
    let mut out = BufWriter::new(std::io::stdout().lock());

    for (line_no, line) in stdin.lock().lines().enumerate() {
        let line = line.context("reading stdin")?;
        if line.trim().is_empty() {
            continue;
        }

        let row: RowData = match serde_json::from_str(&line) {
            Ok(row) => row,
            Err(e) => {
                warn!(line = line_no + 1, error = %e, "Failed to parse row");
                continue;
            }
        };

        let start_time = Instant::now();
        match predictor.predict(&row) {
            Ok(prediction) => {
                metrics.record_success(start_time.elapsed(), prediction.label());
                serde_json::to_writer(&mut out, &prediction)?;
                out.write_all(b"\n")?;
                debug!(line = line_no + 1, "Row scored");
            }
            Err(e) => {
                metrics.record_failure(&e);
                if e.is_per_call() {
                    warn!(line = line_no + 1, kind = %e.kind(), error = %e, "Row rejected");
                } else {
                    error!(line = line_no + 1, error = %e, "Scoring failed");
                    out.flush()?;
                    metrics.log_summary();
                    return Err(e.into());
                }
            }
        }
    }
    out.flush()?;

    info!("Input exhausted, shutting down");
    metrics.log_summary();

    Ok(())
}

fn init_logging(config: &RuntimeConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().or_else(|_| {
        EnvFilter::try_new(format!("mojo_runtime={}", config.logging.level))
    })?;

    // Logs go to stderr; stdout carries predictions
    if config.logging.format == "json" {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    }
    Ok(())
}
