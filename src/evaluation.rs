//! Scoring predictions against manifest labels

use std::collections::HashMap;

use serde::Serialize;
use tracing::{info, warn};

use crate::types::Prediction;

/// Aggregate scores over the labelled predictions.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EvaluationReport {
    /// Predictions compared against a label
    pub scored: usize,
    /// Predictions skipped because their sample has no label
    pub unlabelled: usize,
    /// Fraction of exact token-sequence matches
    pub sentence_accuracy: f64,
    /// Token edit distance over total label tokens
    pub word_error_rate: f64,
}

impl EvaluationReport {
    pub fn log(&self) {
        info!(
            scored = self.scored,
            unlabelled = self.unlabelled,
            sentence_accuracy = %format!("{:.4}", self.sentence_accuracy),
            word_error_rate = %format!("{:.4}", self.word_error_rate),
            "Evaluation against manifest labels"
        );
    }
}

/// Levenshtein distance between two token sequences.
pub fn edit_distance<T: PartialEq>(a: &[T], b: &[T]) -> usize {
    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut curr = vec![0; b.len() + 1];
    for (i, x) in a.iter().enumerate() {
        curr[0] = i + 1;
        for (j, y) in b.iter().enumerate() {
            let substitution = prev[j] + usize::from(x != y);
            curr[j + 1] = substitution.min(prev[j + 1] + 1).min(curr[j] + 1);
        }
        std::mem::swap(&mut prev, &mut curr);
    }
    prev[b.len()]
}

/// Fraction of pairs whose whitespace-split tokens match exactly.
pub fn sentence_accuracy(pairs: &[(&str, &str)]) -> f64 {
    if pairs.is_empty() {
        return 0.0;
    }
    let correct = pairs
        .iter()
        .filter(|(predicted, label)| {
            predicted.split_whitespace().eq(label.split_whitespace())
        })
        .count();
    correct as f64 / pairs.len() as f64
}

/// Total token edit distance divided by total label tokens.
pub fn word_error_rate(pairs: &[(&str, &str)]) -> f64 {
    let mut distance = 0;
    let mut reference_len = 0;
    for (predicted, label) in pairs {
        let predicted: Vec<&str> = predicted.split_whitespace().collect();
        let label: Vec<&str> = label.split_whitespace().collect();
        distance += edit_distance(&predicted, &label);
        reference_len += label.len();
    }
    if reference_len == 0 {
        return 0.0;
    }
    distance as f64 / reference_len as f64
}

/// Score predictions against labels keyed by image id.
pub fn evaluate(predictions: &[Prediction], labels: &HashMap<String, String>) -> EvaluationReport {
    let mut pairs = Vec::with_capacity(predictions.len());
    let mut unlabelled = 0;
    for prediction in predictions {
        match labels.get(&prediction.image_id) {
            Some(label) => pairs.push((prediction.text.as_str(), label.as_str())),
            None => unlabelled += 1,
        }
    }

    if unlabelled > 0 {
        warn!(unlabelled = unlabelled, "Samples without a label were not scored");
    }

    EvaluationReport {
        scored: pairs.len(),
        unlabelled,
        sentence_accuracy: sentence_accuracy(&pairs),
        word_error_rate: word_error_rate(&pairs),
    }
}
