//! Ground-truth manifest (`gt.txt`) parsing

use std::path::Path;

use tracing::debug;

use super::errors::DatasetError;

/// One manifest row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestEntry {
    pub image_name: String,
    pub label: Option<String>,
}

/// Tab-separated list of `image_name<TAB>label` rows.
#[derive(Debug, Clone, Default)]
pub struct Manifest {
    entries: Vec<ManifestEntry>,
}

impl Manifest {
    /// Read and parse a manifest file.
    pub fn load(path: &Path) -> Result<Self, DatasetError> {
        let content = std::fs::read_to_string(path).map_err(|source| DatasetError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&content)
    }

    /// Parse manifest text. Blank lines are skipped; surrounding whitespace
    /// on each line is ignored, as is anything after the second field.
    pub fn parse(content: &str) -> Result<Self, DatasetError> {
        let mut entries = Vec::new();
        for (index, raw) in content.lines().enumerate() {
            let line = raw.trim();
            if line.is_empty() {
                continue;
            }

            let mut fields = line.split('\t');
            let image_name = fields.next().unwrap_or_default().to_string();
            let label = fields.next().map(str::to_string);
            let extra = fields.count();
            if extra > 0 {
                debug!(line = index + 1, extra, "Ignoring extra manifest fields");
            }

            entries.push(ManifestEntry { image_name, label });
        }
        Ok(Self { entries })
    }

    pub fn entries(&self) -> &[ManifestEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
