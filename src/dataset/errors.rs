use std::path::PathBuf;

use thiserror::Error;

/// Errors produced while reading the evaluation set.
#[derive(Debug, Error)]
pub enum DatasetError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("{path} has no \"{column}\" column")]
    MissingColumn { path: PathBuf, column: &'static str },
    #[error("{path} line {line}: invalid fold value \"{value}\"")]
    InvalidFold {
        path: PathBuf,
        line: usize,
        value: String,
    },
    #[error("failed to decode image {path}: {source}")]
    Image {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
    #[error("cannot collate an empty batch")]
    EmptyBatch,
    #[error("batch size must be greater than zero")]
    ZeroBatchSize,
}
