//! Evaluation set: manifest, fold selection, image transforms and batching

pub mod errors;
pub mod fold;
pub mod loader;
pub mod manifest;
pub mod transform;

use std::collections::HashSet;
use std::path::{Path, PathBuf};

pub use errors::DatasetError;
pub use fold::FoldIndex;
pub use loader::{collate, Batch, EvalDataLoader};
pub use manifest::{Manifest, ManifestEntry};
pub use transform::{ImageTransform, InputSize};

use crate::types::Sample;

/// Manifest and image locations derived from the configured manifest path.
///
/// The manifest is always read as `gt.txt` next to `file_path`, and images
/// live in the sibling `images/` directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataLayout {
    pub manifest: PathBuf,
    pub images_root: PathBuf,
}

impl DataLayout {
    pub fn from_file_path(file_path: &Path) -> Self {
        let base = file_path.parent().unwrap_or_else(|| Path::new(""));
        Self {
            manifest: base.join("gt.txt"),
            images_root: base.join("images"),
        }
    }
}

/// Keep the manifest rows selected by `fold_images`, in manifest order.
pub fn build_samples(
    manifest: &Manifest,
    fold_images: &HashSet<String>,
    images_root: &Path,
    max_sequence: usize,
) -> Vec<Sample> {
    manifest
        .entries()
        .iter()
        .filter(|entry| fold_images.contains(&entry.image_name))
        .map(|entry| {
            Sample::new(
                images_root.join(&entry.image_name),
                entry.image_name.clone(),
                max_sequence,
            )
            .with_label(entry.label.clone())
        })
        .collect()
}
