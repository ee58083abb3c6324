//! Full runs over a small on-disk dataset with stand-in recognizers.

use std::path::{Path, PathBuf};

use image::RgbImage;
use mer_ensemble::models::{CheckpointError, EnsembleError, SequenceRecognizer};
use mer_ensemble::writer::read_predictions;
use mer_ensemble::{run_with, AppConfig};
use ndarray::{Array2, Array3, Array4};
use serde_json::json;
use tempfile::TempDir;

const TOKENS: [&str; 6] = ["<SOS>", "<EOS>", "<PAD>", "\\sin", "x", "y"];

/// Predicts the same sequence for every image, checking the batch it receives.
struct FixedRecognizer {
    name: String,
    sequence: Vec<usize>,
    expected_height: usize,
}

impl SequenceRecognizer for FixedRecognizer {
    fn name(&self) -> &str {
        &self.name
    }

    fn forward(
        &mut self,
        images: &Array4<f32>,
        targets: &Array2<i64>,
    ) -> Result<Array3<f32>, EnsembleError> {
        assert_eq!(images.shape()[1], 3);
        assert_eq!(images.shape()[2], self.expected_height);
        assert_eq!(targets.shape()[0], images.shape()[0]);
        // <SOS>, 5 filler tokens, <EOS>
        assert_eq!(targets.shape()[1], 7);

        Ok(Array3::from_shape_fn(
            (images.shape()[0], self.sequence.len(), TOKENS.len()),
            |(_, p, c)| if self.sequence[p] == c { 0.7 } else { 0.06 },
        ))
    }
}

struct Fixture {
    _dir: TempDir,
    root: PathBuf,
}

impl Fixture {
    /// `gt.txt`, `images/` and `data_info.txt` with three fold-0 images and
    /// one fold-1 image.
    fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let root = dir.path().to_path_buf();
        let data = root.join("train_dataset");
        std::fs::create_dir_all(data.join("images")).unwrap();

        for name in ["train_0.jpg", "train_1.jpg", "train_2.jpg", "train_3.jpg"] {
            RgbImage::from_pixel(40, 20, image::Rgb([200, 200, 200]))
                .save(data.join("images").join(name))
                .unwrap();
        }
        std::fs::write(
            data.join("gt.txt"),
            "train_0.jpg\tx\ntrain_1.jpg\tx + 1\ntrain_2.jpg\ty\ntrain_3.jpg\tx\n",
        )
        .unwrap();
        std::fs::write(
            root.join("data_info.txt"),
            "image_name,fold\ntrain_0.jpg,0\ntrain_1.jpg,0\ntrain_3.jpg,1\ntrain_2.jpg,0\n",
        )
        .unwrap();

        Self { _dir: dir, root }
    }

    fn checkpoint(&self, name: &str, tokens: &[&str], input_size: Option<(u32, u32)>) -> String {
        let dir = self.root.join("checkpoints").join(name);
        std::fs::create_dir_all(&dir).unwrap();

        let token_to_id: serde_json::Map<String, serde_json::Value> = tokens
            .iter()
            .enumerate()
            .map(|(id, token)| (token.to_string(), json!(id)))
            .collect();
        let id_to_token: serde_json::Map<String, serde_json::Value> = tokens
            .iter()
            .enumerate()
            .map(|(id, token)| (id.to_string(), json!(token)))
            .collect();
        let configs = match input_size {
            Some((height, width)) => json!({"input_size": {"height": height, "width": width}}),
            None => json!({}),
        };

        let body = json!({
            "network": "SATRN",
            "token_to_id": token_to_id,
            "id_to_token": id_to_token,
            "configs": configs,
        });
        std::fs::write(dir.join("checkpoint.json"), body.to_string()).unwrap();
        std::fs::write(dir.join("model.onnx"), b"stand-in").unwrap();
        dir.to_string_lossy().into_owned()
    }

    fn config(&self, models: Vec<String>) -> AppConfig {
        let mut config = AppConfig::defaults_from(|_| None);
        config.models.paths = models;
        config.data.file_path = self.root.join("train_dataset").join("gt.txt");
        config.data.data_info = self.root.join("data_info.txt");
        config.data.max_sequence = 5;
        config.data.batch_size = 2;
        config.data.workers = 2;
        config.output.dir = self.root.join("submit");
        config
    }
}

fn image_path(root: &Path, name: &str) -> String {
    root.join("train_dataset")
        .join("images")
        .join(name)
        .to_string_lossy()
        .into_owned()
}

#[test]
fn single_checkpoint_writes_one_line_per_fold_image() {
    let fixture = Fixture::new();
    let model = fixture.checkpoint("solo", &TOKENS, Some((32, 64)));
    let config = fixture.config(vec![model]);

    let summary = run_with(&config, |checkpoint| {
        Ok(Box::new(FixedRecognizer {
            name: checkpoint.name.clone(),
            sequence: vec![4, 5, 1, 2],
            expected_height: 32,
        }) as Box<dyn SequenceRecognizer>)
    })
    .unwrap();

    assert_eq!(summary.batches, 2);
    assert_eq!(summary.predictions, 3);
    assert_eq!(summary.members, vec!["solo".to_string()]);
    assert_eq!(
        summary.output_path,
        fixture.root.join("submit").join("mysatrn-output-managerv0.csv")
    );

    let rows = read_predictions(&summary.output_path).unwrap();
    let expected_paths: Vec<String> = ["train_0.jpg", "train_1.jpg", "train_2.jpg"]
        .iter()
        .map(|name| image_path(&fixture.root, name))
        .collect();
    let paths: Vec<String> = rows.iter().map(|(path, _)| path.clone()).collect();
    assert_eq!(paths, expected_paths);
    assert!(rows.iter().all(|(_, text)| text == "x y "));
    assert!(!paths.iter().any(|p| p.ends_with("train_3.jpg")));
}

#[test]
fn ensemble_averages_members_at_their_own_resolution() {
    let fixture = Fixture::new();
    let first = fixture.checkpoint("first", &TOKENS, Some((32, 64)));
    let second = fixture.checkpoint("second", &TOKENS, None);
    let third = fixture.checkpoint("third", &TOKENS, None);
    let mut config = fixture.config(vec![first, second, third]);
    config.models.heights = vec![32, 16, 24];
    config.models.widths = vec![48];
    config.run.evaluate = true;

    let summary = run_with(&config, |checkpoint| {
        let (sequence, expected_height) = match checkpoint.name.as_str() {
            "first" => (vec![4, 1], 32),
            "second" => (vec![4, 1], 16),
            _ => (vec![5, 1], 24),
        };
        Ok(Box::new(FixedRecognizer {
            name: checkpoint.name.clone(),
            sequence,
            expected_height,
        }) as Box<dyn SequenceRecognizer>)
    })
    .unwrap();

    let rows = read_predictions(&summary.output_path).unwrap();
    assert_eq!(rows.len(), 3);
    assert!(rows.iter().all(|(_, text)| text == "x "));

    let report = summary.evaluation.unwrap();
    assert_eq!(report.scored, 3);
    assert!((report.sentence_accuracy - 1.0 / 3.0).abs() < 1e-9);
}

#[test]
fn members_with_different_vocabularies_are_rejected() {
    let fixture = Fixture::new();
    let first = fixture.checkpoint("first", &TOKENS, None);
    let second = fixture.checkpoint("second", &["<SOS>", "<EOS>", "<PAD>", "\\sin", "y", "x"], None);
    let config = fixture.config(vec![first, second]);

    let err = run_with(&config, |checkpoint| {
        Ok(Box::new(FixedRecognizer {
            name: checkpoint.name.clone(),
            sequence: vec![1],
            expected_height: 256,
        }) as Box<dyn SequenceRecognizer>)
    })
    .unwrap_err();

    assert!(matches!(
        err.downcast_ref::<EnsembleError>(),
        Some(EnsembleError::VocabularyMismatch { .. })
    ));
}

#[test]
fn missing_fold_file_is_fatal() {
    let fixture = Fixture::new();
    let model = fixture.checkpoint("solo", &TOKENS, None);
    let mut config = fixture.config(vec![model]);
    config.data.data_info = fixture.root.join("missing.txt");

    let result = run_with(&config, |checkpoint| {
        Ok(Box::new(FixedRecognizer {
            name: checkpoint.name.clone(),
            sequence: vec![1],
            expected_height: 256,
        }) as Box<dyn SequenceRecognizer>)
    });

    assert!(result.is_err());
    assert!(!fixture.root.join("submit").exists());
}

#[test]
fn malformed_input_size_is_fatal() {
    let fixture = Fixture::new();
    let model = fixture.checkpoint("solo", &TOKENS, None);
    let json_path = Path::new(&model).join("checkpoint.json");
    let mut body: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&json_path).unwrap()).unwrap();
    body["configs"] = json!({"input_size": {"height": "256", "width": 512}});
    std::fs::write(&json_path, body.to_string()).unwrap();
    let config = fixture.config(vec![model]);

    let err = run_with(&config, |checkpoint| {
        Ok(Box::new(FixedRecognizer {
            name: checkpoint.name.clone(),
            sequence: vec![1],
            expected_height: 256,
        }) as Box<dyn SequenceRecognizer>)
    })
    .unwrap_err();

    assert!(matches!(
        err.downcast_ref::<CheckpointError>(),
        Some(CheckpointError::InvalidConfig { .. })
    ));
    assert!(!fixture.root.join("submit").exists());
}
