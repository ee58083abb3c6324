//! Lockstep ensemble runner

use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, info};

use super::aggregator::{agreement, align_class_axis, argmax_classes, DistributionAverager};
use super::decoder::GreedyDecoder;
use super::errors::EnsembleError;
use super::recognizer::SequenceRecognizer;
use crate::dataset::EvalDataLoader;
use crate::metrics::RunMetrics;
use crate::types::{Prediction, Vocabulary};

/// One ensemble member: a recognizer paired with the loader built for its input size.
pub struct EnsembleMember {
    pub recognizer: Box<dyn SequenceRecognizer>,
    pub loader: EvalDataLoader,
}

impl EnsembleMember {
    pub fn new(recognizer: Box<dyn SequenceRecognizer>, loader: EvalDataLoader) -> Self {
        Self { recognizer, loader }
    }

    pub fn name(&self) -> &str {
        self.recognizer.name()
    }
}

/// Drives every member's loader in lockstep, averages the members' outputs
/// per batch and decodes the average greedily.
pub struct EnsembleRunner {
    members: Vec<EnsembleMember>,
    decoder: GreedyDecoder,
    metrics: Arc<RunMetrics>,
    progress_every: usize,
}

impl EnsembleRunner {
    pub fn new(
        members: Vec<EnsembleMember>,
        vocab: Arc<Vocabulary>,
        metrics: Arc<RunMetrics>,
    ) -> Self {
        Self {
            members,
            decoder: GreedyDecoder::new(vocab),
            metrics,
            progress_every: 10,
        }
    }

    /// Log progress every `batches` batches; zero disables progress logs.
    pub fn with_progress_every(mut self, batches: usize) -> Self {
        self.progress_every = batches;
        self
    }

    pub fn member_count(&self) -> usize {
        self.members.len()
    }

    pub fn member_names(&self) -> Vec<String> {
        self.members.iter().map(|m| m.name().to_string()).collect()
    }

    /// Number of batches each loader will yield.
    ///
    /// Fails when the loaders disagree.
    pub fn num_batches(&self) -> Result<usize, EnsembleError> {
        let first = self.members.first().ok_or(EnsembleError::NoMembers)?;
        let expected = first.loader.num_batches();
        for member in &self.members[1..] {
            let actual = member.loader.num_batches();
            if actual != expected {
                return Err(EnsembleError::LoaderLengthMismatch {
                    model: member.name().to_string(),
                    expected,
                    actual,
                });
            }
        }
        Ok(expected)
    }

    /// Run every batch through every member and return one prediction per
    /// sample, in dataset order.
    pub fn run(&mut self) -> Result<Vec<Prediction>, EnsembleError> {
        let total = self.num_batches()?;
        let capacity = self.members[0].loader.num_samples();
        let mut predictions = Vec::with_capacity(capacity);

        info!(
            members = self.members.len(),
            batches = total,
            samples = capacity,
            "Starting ensemble inference"
        );

        let track_agreement = self.members.len() > 1;
        let end_id = self.decoder.vocabulary().end_id();
        for batch_idx in 0..total {
            let mut averager = DistributionAverager::new();
            let mut member_ids = Vec::with_capacity(self.members.len());
            let mut reference: Option<(Vec<String>, Vec<String>)> = None;

            for member in self.members.iter_mut() {
                let name = member.recognizer.name().to_string();
                let batch = member
                    .loader
                    .next()
                    .ok_or_else(|| EnsembleError::LoaderExhausted {
                        model: name.clone(),
                        batch: batch_idx,
                    })??;

                match &reference {
                    Some((paths, _)) if *paths != batch.file_paths => {
                        return Err(EnsembleError::BatchMisaligned {
                            model: name,
                            batch: batch_idx,
                        });
                    }
                    Some(_) => {}
                    None => {
                        reference = Some((batch.file_paths.clone(), batch.image_ids.clone()));
                    }
                }

                let started = Instant::now();
                let output = member.recognizer.forward(&batch.images, &batch.targets)?;
                self.metrics.record_model_time(&name, started.elapsed());

                if output.shape()[0] != batch.len() {
                    return Err(EnsembleError::UnexpectedOutput {
                        model: name,
                        message: format!(
                            "batch holds {} samples but the output has {} rows",
                            batch.len(),
                            output.shape()[0]
                        ),
                    });
                }

                if track_agreement {
                    member_ids.push((name.clone(), argmax_classes(&align_class_axis(&output))));
                }
                averager.accumulate(&name, &output)?;
            }

            let averaged = averager.finish()?;
            let ensemble_ids = argmax_classes(&averaged);
            for (name, ids) in &member_ids {
                let (agree, positions) = agreement(ids, &ensemble_ids, end_id);
                self.metrics.record_agreement(name, agree, positions);
            }

            let (file_paths, image_ids) = reference.ok_or(EnsembleError::NoMembers)?;
            let batch_size = file_paths.len();
            let rows = file_paths.into_iter().zip(image_ids).zip(&ensemble_ids);
            for ((file_path, image_id), ids) in rows {
                predictions.push(Prediction {
                    file_path,
                    image_id,
                    text: self.decoder.decode_ids(ids),
                });
            }

            self.metrics.record_batch(batch_size);
            debug!(batch = batch_idx, size = batch_size, "Batch decoded");
            if self.progress_every > 0 && (batch_idx + 1) % self.progress_every == 0 {
                self.metrics.log_progress(batch_idx + 1, total);
            }
        }

        info!(predictions = predictions.len(), "Ensemble inference complete");
        Ok(predictions)
    }
}
