//! Checkpoint loader
//!
//! A checkpoint is a directory holding `checkpoint.json` (vocabulary and
//! training configuration) next to the ONNX graph it names.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::info;

use super::errors::CheckpointError;
use crate::dataset::InputSize;
use crate::types::Vocabulary;

/// File name looked up when a checkpoint path is a directory.
pub const CHECKPOINT_FILE: &str = "checkpoint.json";

fn default_model_file() -> String {
    "model.onnx".to_string()
}

#[derive(Debug, Deserialize)]
struct CheckpointFile {
    #[serde(default)]
    network: Option<String>,
    #[serde(default = "default_model_file")]
    model: String,
    token_to_id: HashMap<String, usize>,
    id_to_token: HashMap<usize, String>,
    #[serde(default)]
    configs: serde_json::Value,
}

/// A loaded checkpoint: vocabulary, model weights location and training configuration.
#[derive(Debug, Clone)]
pub struct Checkpoint {
    /// Display name, taken from the checkpoint directory
    pub name: String,
    /// Path of the parsed `checkpoint.json`
    pub path: PathBuf,
    /// Architecture name recorded at training time
    pub network: String,
    /// ONNX graph holding the weights
    pub model_path: PathBuf,
    pub vocabulary: Vocabulary,
    /// Training configuration, kept verbatim
    pub configs: serde_json::Value,
}

impl Checkpoint {
    /// Load a checkpoint from a directory or directly from its JSON file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, CheckpointError> {
        let path = path.as_ref();
        let file_path = if path.is_dir() {
            path.join(CHECKPOINT_FILE)
        } else {
            path.to_path_buf()
        };

        let content = std::fs::read_to_string(&file_path).map_err(|source| CheckpointError::Io {
            path: file_path.clone(),
            source,
        })?;
        let raw: CheckpointFile =
            serde_json::from_str(&content).map_err(|source| CheckpointError::Parse {
                path: file_path.clone(),
                source,
            })?;

        let vocabulary = Vocabulary::from_maps(raw.token_to_id, raw.id_to_token).map_err(
            |source| CheckpointError::Vocab {
                path: file_path.clone(),
                source,
            },
        )?;

        let base = file_path.parent().unwrap_or_else(|| Path::new(""));
        let model_path = base.join(&raw.model);
        if !model_path.is_file() {
            return Err(CheckpointError::MissingModel {
                checkpoint: file_path,
                model: model_path,
            });
        }

        let name = checkpoint_name(path, &file_path);
        let network = raw.network.unwrap_or_else(|| "unknown".to_string());

        info!(
            checkpoint = %name,
            network = %network,
            vocab_size = vocabulary.len(),
            model = %model_path.display(),
            "Checkpoint loaded"
        );

        Ok(Self {
            name,
            path: file_path,
            network,
            model_path,
            vocabulary,
            configs: raw.configs,
        })
    }

    /// Input resolution recorded in `configs.input_size`, if any. A value
    /// that is present but not a `{height, width}` pair is an error.
    pub fn input_size(&self) -> Result<Option<InputSize>, CheckpointError> {
        let Some(size) = self.configs.get("input_size") else {
            return Ok(None);
        };
        serde_json::from_value(size.clone())
            .map(Some)
            .map_err(|source| CheckpointError::InvalidConfig {
                path: self.path.clone(),
                key: "input_size",
                source,
            })
    }
}

fn checkpoint_name(given: &Path, file_path: &Path) -> String {
    let source = if given.is_dir() {
        given
    } else {
        file_path.parent().unwrap_or(file_path)
    };
    source
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| given.display().to_string())
}
