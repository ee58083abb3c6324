//! Tab-separated prediction output

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::info;

use crate::types::Prediction;

/// Output file name used when none is configured.
pub const DEFAULT_OUTPUT_FILE: &str = "mysatrn-output-managerv0.csv";

/// Writes `<path>\t<prediction>` lines, without a header, once per run.
#[derive(Debug, Clone)]
pub struct ResultWriter {
    dir: PathBuf,
    file_name: String,
}

impl ResultWriter {
    pub fn new(dir: impl Into<PathBuf>, file_name: impl Into<String>) -> Self {
        Self {
            dir: dir.into(),
            file_name: file_name.into(),
        }
    }

    pub fn output_path(&self) -> PathBuf {
        self.dir.join(&self.file_name)
    }

    /// Create the output directory if needed and write every prediction.
    pub fn write(&self, predictions: &[Prediction]) -> Result<PathBuf> {
        std::fs::create_dir_all(&self.dir)
            .with_context(|| format!("Failed to create output directory {}", self.dir.display()))?;

        let path = self.output_path();
        let file = File::create(&path)
            .with_context(|| format!("Failed to create output file {}", path.display()))?;
        write_rows(BufWriter::new(file), predictions)
            .with_context(|| format!("Failed to write predictions to {}", path.display()))?;

        info!(path = %path.display(), rows = predictions.len(), "Predictions written");
        Ok(path)
    }
}

fn write_rows<W: Write>(mut out: W, predictions: &[Prediction]) -> std::io::Result<()> {
    for prediction in predictions {
        writeln!(out, "{}\t{}", prediction.file_path, prediction.text)?;
    }
    out.flush()
}

/// Read back an output file as `(path, prediction)` pairs.
pub fn read_predictions(path: &Path) -> Result<Vec<(String, String)>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    Ok(content
        .lines()
        .map(|line| match line.split_once('\t') {
            Some((file, text)) => (file.to_string(), text.to_string()),
            None => (line.to_string(), String::new()),
        })
        .collect())
}
