//! Batch collation and the per-model evaluation loader

use std::sync::Arc;

use ndarray::{s, Array2, Array3, Array4};
use rayon::prelude::*;
use tracing::debug;

use super::errors::DatasetError;
use super::transform::ImageTransform;
use crate::types::{Sample, Vocabulary};

/// Collated batch ready for a forward pass.
#[derive(Debug, Clone)]
pub struct Batch {
    /// Images, shape `(N, 3, H, W)`
    pub images: Array4<f32>,
    /// Encoded dummy targets, shape `(N, L)`, padded with `<PAD>`
    pub targets: Array2<i64>,
    /// Output paths of the samples in this batch, in order
    pub file_paths: Vec<String>,
    /// Manifest image names of the samples in this batch, in order
    pub image_ids: Vec<String>,
}

impl Batch {
    pub fn len(&self) -> usize {
        self.file_paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.file_paths.is_empty()
    }
}

/// Stack transformed images and encode the samples' dummy targets.
///
/// Images smaller than the largest one in the batch are zero padded at the
/// bottom and right.
pub fn collate(
    samples: &[Sample],
    images: Vec<Array3<f32>>,
    vocab: &Vocabulary,
) -> Result<Batch, DatasetError> {
    if samples.is_empty() || images.len() != samples.len() {
        return Err(DatasetError::EmptyBatch);
    }

    let channels = images.iter().map(|i| i.shape()[0]).max().unwrap_or(0);
    let height = images.iter().map(|i| i.shape()[1]).max().unwrap_or(0);
    let width = images.iter().map(|i| i.shape()[2]).max().unwrap_or(0);

    let mut stacked = Array4::<f32>::zeros((images.len(), channels, height, width));
    for (idx, img) in images.iter().enumerate() {
        let (c, h, w) = img.dim();
        stacked.slice_mut(s![idx, ..c, ..h, ..w]).assign(img);
    }

    let encoded: Vec<Vec<i64>> = samples
        .iter()
        .map(|sample| vocab.encode_target(&sample.dummy_truth))
        .collect();
    let max_len = encoded.iter().map(Vec::len).max().unwrap_or(0);
    let mut targets = Array2::<i64>::from_elem((samples.len(), max_len), vocab.pad_id() as i64);
    for (row, ids) in encoded.iter().enumerate() {
        for (col, &id) in ids.iter().enumerate() {
            targets[[row, col]] = id;
        }
    }

    Ok(Batch {
        images: stacked,
        targets,
        file_paths: samples.iter().map(Sample::display_path).collect(),
        image_ids: samples.iter().map(|s| s.image_id.clone()).collect(),
    })
}

/// Unshuffled loader producing one [`Batch`] per `batch_size` samples.
///
/// Every ensemble member gets its own loader over the same shared sample
/// list, so batches at the same index always hold the same samples.
#[derive(Debug, Clone)]
pub struct EvalDataLoader {
    samples: Arc<Vec<Sample>>,
    transform: ImageTransform,
    vocab: Arc<Vocabulary>,
    batch_size: usize,
    cursor: usize,
}

impl EvalDataLoader {
    pub fn new(
        samples: Arc<Vec<Sample>>,
        transform: ImageTransform,
        vocab: Arc<Vocabulary>,
        batch_size: usize,
    ) -> Result<Self, DatasetError> {
        if batch_size == 0 {
            return Err(DatasetError::ZeroBatchSize);
        }
        Ok(Self {
            samples,
            transform,
            vocab,
            batch_size,
            cursor: 0,
        })
    }

    /// Total number of batches this loader yields from the start.
    pub fn num_batches(&self) -> usize {
        self.samples.len().div_ceil(self.batch_size)
    }

    pub fn num_samples(&self) -> usize {
        self.samples.len()
    }

    pub fn transform(&self) -> &ImageTransform {
        &self.transform
    }

    fn load_batch(&self, start: usize, end: usize) -> Result<Batch, DatasetError> {
        let chunk = &self.samples[start..end];
        let images = chunk
            .par_iter()
            .map(|sample| self.transform.load(&sample.path))
            .collect::<Result<Vec<_>, _>>()?;

        debug!(
            start = start,
            size = chunk.len(),
            input_size = %self.transform.size(),
            "Loaded batch"
        );

        collate(chunk, images, &self.vocab)
    }
}

impl Iterator for EvalDataLoader {
    type Item = Result<Batch, DatasetError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.cursor >= self.samples.len() {
            return None;
        }
        let start = self.cursor;
        let end = (start + self.batch_size).min(self.samples.len());
        self.cursor = end;
        Some(self.load_batch(start, end))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = (self.samples.len() - self.cursor).div_ceil(self.batch_size);
        (remaining, Some(remaining))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::transform::InputSize;
    use crate::types::{END, PAD, START};
    use image::RgbImage;
    use std::path::PathBuf;
    use tempfile::TempDir;

    fn vocab() -> Arc<Vocabulary> {
        Arc::new(Vocabulary::from_tokens([START, END, PAD, "\\sin"]).unwrap())
    }

    fn write_images(dir: &TempDir, count: usize) -> Vec<Sample> {
        (0..count)
            .map(|i| {
                let name = format!("img_{i}.png");
                let path = dir.path().join(&name);
                RgbImage::new(12 + i as u32, 6).save(&path).unwrap();
                Sample::new(path, name, 3)
            })
            .collect()
    }

    #[test]
    fn test_collate_pads_targets_and_images() {
        let vocab = vocab();
        let samples = vec![
            Sample::new(PathBuf::from("a.png"), "a.png", 2),
            Sample::new(PathBuf::from("b.png"), "b.png", 0),
        ];
        let images = vec![Array3::ones((3, 4, 6)), Array3::ones((3, 2, 3))];

        let batch = collate(&samples, images, &vocab).unwrap();

        assert_eq!(batch.images.shape(), &[2, 3, 4, 6]);
        assert_eq!(batch.images[[1, 0, 3, 5]], 0.0);
        assert_eq!(batch.targets.shape(), &[2, 4]);
        assert_eq!(batch.targets.row(0).to_vec(), vec![0, 3, 3, 1]);
        assert_eq!(batch.targets.row(1).to_vec(), vec![0, 1, 2, 2]);
        assert_eq!(batch.file_paths, vec!["a.png", "b.png"]);
    }

    #[test]
    fn test_collate_rejects_empty() {
        let err = collate(&[], Vec::new(), &vocab()).unwrap_err();
        assert!(matches!(err, DatasetError::EmptyBatch));
    }

    #[test]
    fn test_loader_yields_ceil_batches_in_order() {
        let dir = TempDir::new().unwrap();
        let samples = Arc::new(write_images(&dir, 5));
        let transform = ImageTransform::new(InputSize::new(8, 16));

        let loader = EvalDataLoader::new(samples.clone(), transform, vocab(), 2).unwrap();
        assert_eq!(loader.num_batches(), 3);

        let batches: Vec<Batch> = loader.map(|b| b.unwrap()).collect();
        assert_eq!(batches.len(), 3);
        assert_eq!(batches[0].images.shape(), &[2, 3, 8, 16]);
        assert_eq!(batches[2].len(), 1);

        let ids: Vec<String> = batches.iter().flat_map(|b| b.image_ids.clone()).collect();
        let expected: Vec<String> = samples.iter().map(|s| s.image_id.clone()).collect();
        assert_eq!(ids, expected);
    }

    #[test]
    fn test_loader_rejects_zero_batch_size() {
        let transform = ImageTransform::new(InputSize::DEFAULT);
        let err = EvalDataLoader::new(Arc::new(Vec::new()), transform, vocab(), 0).unwrap_err();
        assert!(matches!(err, DatasetError::ZeroBatchSize));
    }

    #[test]
    fn test_missing_image_is_an_error() {
        let transform = ImageTransform::new(InputSize::new(4, 4));
        let samples = Arc::new(vec![Sample::new(
            PathBuf::from("/nonexistent/img.png"),
            "img.png",
            1,
        )]);
        let mut loader = EvalDataLoader::new(samples, transform, vocab(), 4).unwrap();

        assert!(matches!(loader.next(), Some(Err(DatasetError::Image { .. }))));
        assert!(loader.next().is_none());
    }
}
