//! Type definitions shared across the inference pipeline

pub mod sample;
pub mod vocab;

pub use sample::{Prediction, Sample};
pub use vocab::{VocabError, Vocabulary, END, PAD, START};
