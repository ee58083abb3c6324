//! Evaluation samples and the predictions produced for them

use std::path::PathBuf;

/// Token repeated to build the placeholder target sequence.
pub const DUMMY_TOKEN: &str = "\\sin";

/// One image taking part in the evaluation run.
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    /// Full path of the image on disk
    pub path: PathBuf,
    /// Image file name as listed in the manifest
    pub image_id: String,
    /// Placeholder target fed to the decoder; never scored
    pub dummy_truth: String,
    /// Reference label from the manifest, when it has one
    pub label: Option<String>,
}

impl Sample {
    /// Create a sample with a dummy target of `max_sequence` filler tokens.
    pub fn new(path: PathBuf, image_id: impl Into<String>, max_sequence: usize) -> Self {
        Self {
            path,
            image_id: image_id.into(),
            dummy_truth: dummy_truth(max_sequence),
            label: None,
        }
    }

    /// Attach the manifest label.
    pub fn with_label(mut self, label: Option<String>) -> Self {
        self.label = label;
        self
    }

    /// Path rendered the way it is written to the output file.
    pub fn display_path(&self) -> String {
        self.path.to_string_lossy().into_owned()
    }
}

/// Builds the placeholder target: `max_sequence` filler tokens separated by spaces.
pub fn dummy_truth(max_sequence: usize) -> String {
    format!("{DUMMY_TOKEN} ").repeat(max_sequence)
}

/// Decoded output for one sample.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prediction {
    /// Image path exactly as it appears in the output file
    pub file_path: String,
    /// Image file name from the manifest
    pub image_id: String,
    /// Space-separated predicted tokens
    pub text: String,
}
