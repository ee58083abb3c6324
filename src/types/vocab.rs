//! Token vocabulary shared by every ensemble member

use std::collections::HashMap;
use thiserror::Error;

/// Start-of-sequence marker.
pub const START: &str = "<SOS>";
/// End-of-sequence marker.
pub const END: &str = "<EOS>";
/// Padding token.
pub const PAD: &str = "<PAD>";

/// Errors raised while building a vocabulary.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum VocabError {
    #[error("vocabulary ids are not dense: id {missing} is missing (size {size})")]
    NotDense { missing: usize, size: usize },
    #[error("id {id} is assigned to both \"{first}\" and \"{second}\"")]
    DuplicateId {
        id: usize,
        first: String,
        second: String,
    },
    #[error("token \"{token}\" appears at both id {first} and id {second}")]
    DuplicateToken {
        token: String,
        first: usize,
        second: usize,
    },
    #[error("token_to_id and id_to_token disagree on \"{token}\"")]
    Inconsistent { token: String },
    #[error("vocabulary is missing reserved token {0}")]
    MissingSpecial(&'static str),
}

/// Bidirectional token <-> id mapping.
///
/// Ids are dense (`0..len`), unique, and both directions agree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Vocabulary {
    id_to_token: Vec<String>,
    token_to_id: HashMap<String, usize>,
    start_id: usize,
    end_id: usize,
    pad_id: usize,
}

impl Vocabulary {
    /// Build a vocabulary where each token's id is its position.
    pub fn from_tokens<I, S>(tokens: I) -> Result<Self, VocabError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let id_to_token: Vec<String> = tokens.into_iter().map(Into::into).collect();
        let mut token_to_id = HashMap::with_capacity(id_to_token.len());
        for (id, token) in id_to_token.iter().enumerate() {
            if let Some(previous) = token_to_id.insert(token.clone(), id) {
                return Err(VocabError::DuplicateToken {
                    token: token.clone(),
                    first: previous,
                    second: id,
                });
            }
        }
        Self::finish(id_to_token, token_to_id)
    }

    /// Build a vocabulary from the two maps stored in a checkpoint, checking
    /// that they describe the same dense mapping.
    pub fn from_maps(
        token_to_id: HashMap<String, usize>,
        id_to_token: HashMap<usize, String>,
    ) -> Result<Self, VocabError> {
        let size = id_to_token.len();
        let mut ordered = Vec::with_capacity(size);
        for id in 0..size {
            let token = id_to_token
                .get(&id)
                .ok_or(VocabError::NotDense { missing: id, size })?;
            ordered.push(token.clone());
        }

        let mut seen: HashMap<usize, &str> = HashMap::with_capacity(token_to_id.len());
        for (token, &id) in &token_to_id {
            if let Some(first) = seen.insert(id, token) {
                return Err(VocabError::DuplicateId {
                    id,
                    first: first.to_string(),
                    second: token.clone(),
                });
            }
            if ordered.get(id) != Some(token) {
                return Err(VocabError::Inconsistent {
                    token: token.clone(),
                });
            }
        }
        if token_to_id.len() != size {
            // Every map entry matched, so some id_to_token entry has no reverse mapping.
            let token = ordered
                .iter()
                .find(|t| !token_to_id.contains_key(*t))
                .cloned()
                .unwrap_or_default();
            return Err(VocabError::Inconsistent { token });
        }

        Self::finish(ordered, token_to_id)
    }

    fn finish(
        id_to_token: Vec<String>,
        token_to_id: HashMap<String, usize>,
    ) -> Result<Self, VocabError> {
        let lookup = |token: &'static str| {
            token_to_id
                .get(token)
                .copied()
                .ok_or(VocabError::MissingSpecial(token))
        };
        let start_id = lookup(START)?;
        let end_id = lookup(END)?;
        let pad_id = lookup(PAD)?;

        Ok(Self {
            id_to_token,
            token_to_id,
            start_id,
            end_id,
            pad_id,
        })
    }

    /// Number of tokens, which is also the number of output classes.
    pub fn len(&self) -> usize {
        self.id_to_token.len()
    }

    pub fn is_empty(&self) -> bool {
        self.id_to_token.is_empty()
    }

    pub fn id(&self, token: &str) -> Option<usize> {
        self.token_to_id.get(token).copied()
    }

    pub fn token(&self, id: usize) -> Option<&str> {
        self.id_to_token.get(id).map(String::as_str)
    }

    pub fn start_id(&self) -> usize {
        self.start_id
    }

    pub fn end_id(&self) -> usize {
        self.end_id
    }

    pub fn pad_id(&self) -> usize {
        self.pad_id
    }

    /// Encode a whitespace-separated target as `<SOS> tokens... <EOS>`.
    ///
    /// Tokens missing from the vocabulary encode as `<PAD>`.
    pub fn encode_target(&self, text: &str) -> Vec<i64> {
        let mut ids = Vec::with_capacity(text.len() / 2 + 2);
        ids.push(self.start_id as i64);
        ids.extend(
            text.split_whitespace()
                .map(|token| self.id(token).unwrap_or(self.pad_id) as i64),
        );
        ids.push(self.end_id as i64);
        ids
    }
}
