//! Ensembled batch inference for handwritten math expression recognition
//!
//! Loads trained recognition checkpoints, averages their per-token output
//! distributions over a held-out image set, decodes the average greedily and
//! writes one tab-separated prediction per image.

pub mod cli;
pub mod config;
pub mod dataset;
pub mod evaluation;
pub mod metrics;
pub mod models;
pub mod pipeline;
pub mod types;
pub mod writer;

pub use cli::Cli;
pub use config::AppConfig;
pub use models::{Checkpoint, EnsembleRunner, SequenceRecognizer};
pub use pipeline::{run, run_with, RunSummary};
pub use types::{Prediction, Sample, Vocabulary};
