//! End-to-end inference run: checkpoints in, prediction file out

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{debug, info, warn};

use crate::config::AppConfig;
use crate::dataset::{build_samples, DataLayout, EvalDataLoader, FoldIndex, ImageTransform, Manifest};
use crate::evaluation::{evaluate, EvaluationReport};
use crate::metrics::RunMetrics;
use crate::models::{
    Checkpoint, EnsembleError, EnsembleMember, EnsembleRunner, OnnxRecognizer, SequenceRecognizer,
};
use crate::types::{Sample, Vocabulary};
use crate::writer::ResultWriter;

/// What a finished run produced
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub output_path: PathBuf,
    pub predictions: usize,
    pub batches: u64,
    pub members: Vec<String>,
    pub evaluation: Option<EvaluationReport>,
}

/// Run the ensemble with ONNX Runtime recognizers.
pub fn run(config: &AppConfig) -> Result<RunSummary> {
    let threads = config.models.onnx_threads;
    run_with(config, |checkpoint| {
        let recognizer = OnnxRecognizer::load(&checkpoint.model_path, &checkpoint.name, threads)
            .with_context(|| format!("Failed to load model for {}", checkpoint.name))?;
        Ok(Box::new(recognizer) as Box<dyn SequenceRecognizer>)
    })
}

/// Run the ensemble, building each member's recognizer with `load_recognizer`.
pub fn run_with<F>(config: &AppConfig, mut load_recognizer: F) -> Result<RunSummary>
where
    F: FnMut(&Checkpoint) -> Result<Box<dyn SequenceRecognizer>>,
{
    config.validate()?;
    info!(
        members = config.models.paths.len(),
        seed = config.run.seed,
        batch_size = config.data.batch_size,
        "Starting ensemble inference run"
    );
    init_thread_pool(config.data.workers);

    let checkpoints = load_checkpoints(&config.models.paths)?;
    let vocab = Arc::new(shared_vocabulary(&checkpoints)?);

    let recorded = checkpoints
        .iter()
        .map(Checkpoint::input_size)
        .collect::<Result<Vec<_>, _>>()?;
    let sizes = config.resolve_input_sizes(&recorded)?;

    let samples = Arc::new(select_samples(config)?);

    let metrics = Arc::new(RunMetrics::new());
    let mut members = Vec::with_capacity(checkpoints.len());
    for (checkpoint, size) in checkpoints.iter().zip(&sizes) {
        let recognizer = load_recognizer(checkpoint)?;
        let loader = EvalDataLoader::new(
            samples.clone(),
            ImageTransform::new(*size),
            vocab.clone(),
            config.data.batch_size,
        )?;
        info!(
            model = %checkpoint.name,
            network = %checkpoint.network,
            input_size = %size,
            batches = loader.num_batches(),
            "Ensemble member ready"
        );
        members.push(EnsembleMember::new(recognizer, loader));
    }

    let mut runner = EnsembleRunner::new(members, vocab, metrics.clone())
        .with_progress_every(config.run.progress_every);
    let member_names = runner.member_names();
    let predictions = runner.run()?;

    let writer = ResultWriter::new(&config.output.dir, config.output.file_name.clone());
    let output_path = writer.write(&predictions)?;

    let evaluation = config.run.evaluate.then(|| {
        let report = evaluate(&predictions, &labels_by_image(&samples));
        report.log();
        report
    });

    metrics.print_summary();

    Ok(RunSummary {
        output_path,
        predictions: predictions.len(),
        batches: metrics.batches(),
        members: member_names,
        evaluation,
    })
}

fn init_thread_pool(workers: usize) {
    if let Err(e) = rayon::ThreadPoolBuilder::new()
        .num_threads(workers)
        .build_global()
    {
        debug!(error = %e, "Image decoding pool already initialized");
    }
}

fn load_checkpoints(paths: &[String]) -> Result<Vec<Checkpoint>> {
    paths
        .iter()
        .map(|path| {
            Checkpoint::load(path).with_context(|| format!("Failed to load checkpoint {path}"))
        })
        .collect()
}

/// Every member must decode with the same vocabulary.
fn shared_vocabulary(checkpoints: &[Checkpoint]) -> Result<Vocabulary> {
    let reference = checkpoints.first().ok_or(EnsembleError::NoMembers)?;
    for checkpoint in &checkpoints[1..] {
        if checkpoint.vocabulary != reference.vocabulary {
            return Err(EnsembleError::VocabularyMismatch {
                model: checkpoint.name.clone(),
                reference: reference.name.clone(),
            }
            .into());
        }
    }
    Ok(reference.vocabulary.clone())
}

/// Manifest rows that belong to the configured fold, in manifest order.
fn select_samples(config: &AppConfig) -> Result<Vec<Sample>> {
    let layout = DataLayout::from_file_path(&config.data.file_path);
    let manifest = Manifest::load(&layout.manifest)
        .with_context(|| format!("Failed to load manifest {}", layout.manifest.display()))?;
    let folds = FoldIndex::load(&config.data.data_info).with_context(|| {
        format!("Failed to load fold file {}", config.data.data_info.display())
    })?;

    let fold_images = folds.images_in(config.data.fold);
    let samples = build_samples(
        &manifest,
        &fold_images,
        &layout.images_root,
        config.data.max_sequence,
    );

    info!(
        manifest_rows = manifest.len(),
        fold = config.data.fold,
        fold_images = fold_images.len(),
        selected = samples.len(),
        "Evaluation set selected"
    );
    if samples.is_empty() {
        warn!(fold = config.data.fold, "No manifest rows belong to the selected fold");
    }
    Ok(samples)
}

fn labels_by_image(samples: &[Sample]) -> HashMap<String, String> {
    samples
        .iter()
        .filter_map(|s| s.label.clone().map(|label| (s.image_id.clone(), label)))
        .collect()
}
