use std::path::PathBuf;

use thiserror::Error;

use crate::dataset::DatasetError;
use crate::types::VocabError;

/// Errors produced while loading a checkpoint from disk.
#[derive(Debug, Error)]
pub enum CheckpointError {
    #[error("failed to read checkpoint {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse checkpoint {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("checkpoint {checkpoint} points at missing model file {model}")]
    MissingModel { checkpoint: PathBuf, model: PathBuf },
    #[error("checkpoint {path} has an invalid vocabulary: {source}")]
    Vocab {
        path: PathBuf,
        #[source]
        source: VocabError,
    },
    #[error("checkpoint {path} has an invalid configs.{key}: {source}")]
    InvalidConfig {
        path: PathBuf,
        key: &'static str,
        #[source]
        source: serde_json::Error,
    },
}

/// Errors produced while running the ensemble.
#[derive(Debug, Error)]
pub enum EnsembleError {
    #[error("ensemble has no members")]
    NoMembers,
    #[error("model \"{model}\" produced shape {actual:?} but the ensemble expects {expected:?}")]
    ShapeMismatch {
        model: String,
        expected: Vec<usize>,
        actual: Vec<usize>,
    },
    #[error("model \"{model}\" uses a different vocabulary than \"{reference}\"")]
    VocabularyMismatch { model: String, reference: String },
    #[error("loader for \"{model}\" yields {actual} batches but the first loader yields {expected}")]
    LoaderLengthMismatch {
        model: String,
        expected: usize,
        actual: usize,
    },
    #[error("loader for \"{model}\" ran out of batches at batch {batch}")]
    LoaderExhausted { model: String, batch: usize },
    #[error("batch {batch} of \"{model}\" holds different samples than the first loader")]
    BatchMisaligned { model: String, batch: usize },
    #[error("model \"{model}\" has an unusable signature: {message}")]
    ModelSignature { model: String, message: String },
    #[error("model \"{model}\" returned an unexpected output: {message}")]
    UnexpectedOutput { model: String, message: String },
    #[error("inference failed for model \"{model}\": {source}")]
    Inference {
        model: String,
        #[source]
        source: ort::Error,
    },
    #[error(transparent)]
    Dataset(#[from] DatasetError),
}
