//! Greedy decoding of averaged class distributions

use std::sync::Arc;

use ndarray::Array3;
use tracing::warn;

use super::aggregator::argmax_classes;
use crate::types::Vocabulary;

/// Top-1 decoder: picks the best class at every position independently.
#[derive(Debug, Clone)]
pub struct GreedyDecoder {
    vocab: Arc<Vocabulary>,
}

impl GreedyDecoder {
    pub fn new(vocab: Arc<Vocabulary>) -> Self {
        Self { vocab }
    }

    pub fn vocabulary(&self) -> &Vocabulary {
        &self.vocab
    }

    /// Turn one id sequence into text.
    ///
    /// Stops at the first `<EOS>`, skips `<SOS>` and `<PAD>`, and writes
    /// each remaining token followed by a single space.
    pub fn decode_ids(&self, ids: &[usize]) -> String {
        let vocab = &self.vocab;
        let mut text = String::new();
        for &id in ids {
            if id == vocab.end_id() {
                break;
            }
            if id == vocab.start_id() || id == vocab.pad_id() {
                continue;
            }
            match vocab.token(id) {
                Some(token) => {
                    text.push_str(token);
                    text.push(' ');
                }
                None => warn!(id = id, vocab_size = vocab.len(), "Predicted id outside vocabulary"),
            }
        }
        text
    }

    /// Decode every sample of a `(batch, class, position)` tensor.
    pub fn decode_batch(&self, scores: &Array3<f32>) -> Vec<String> {
        argmax_classes(scores)
            .iter()
            .map(|ids| self.decode_ids(ids))
            .collect()
    }
}
