//! Checkpoints, recognizers and the ensemble built from them

pub mod aggregator;
pub mod checkpoint;
pub mod decoder;
pub mod errors;
pub mod inference;
pub mod recognizer;

pub use aggregator::{argmax_classes, DistributionAverager};
pub use checkpoint::Checkpoint;
pub use decoder::GreedyDecoder;
pub use errors::{CheckpointError, EnsembleError};
pub use inference::{EnsembleMember, EnsembleRunner};
pub use recognizer::{OnnxRecognizer, SequenceRecognizer};
