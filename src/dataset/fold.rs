//! Fold assignments (`data_info.txt`) used to select the held-out images

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use super::errors::DatasetError;

const IMAGE_COLUMN: &str = "image_name";
const FOLD_COLUMN: &str = "fold";

/// Image name to fold assignments read from a comma-separated file with a header row.
#[derive(Debug, Clone, Default)]
pub struct FoldIndex {
    rows: Vec<(String, i64)>,
}

impl FoldIndex {
    pub fn load(path: &Path) -> Result<Self, DatasetError> {
        let content = std::fs::read_to_string(path).map_err(|source| DatasetError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&content, path)
    }

    /// Parse fold assignments. `origin` is only used in error messages.
    pub fn parse(content: &str, origin: &Path) -> Result<Self, DatasetError> {
        let mut lines = content
            .lines()
            .enumerate()
            .filter(|(_, line)| !line.trim().is_empty());

        let header: Vec<&str> = match lines.next() {
            Some((_, line)) => line.split(',').map(str::trim).collect(),
            None => {
                return Err(DatasetError::MissingColumn {
                    path: origin.to_path_buf(),
                    column: IMAGE_COLUMN,
                })
            }
        };
        let column = |name: &'static str| {
            header
                .iter()
                .position(|h| *h == name)
                .ok_or_else(|| DatasetError::MissingColumn {
                    path: origin.to_path_buf(),
                    column: name,
                })
        };
        let image_idx = column(IMAGE_COLUMN)?;
        let fold_idx = column(FOLD_COLUMN)?;

        let mut rows = Vec::new();
        for (index, line) in lines {
            let fields: Vec<&str> = line.split(',').map(str::trim).collect();
            let invalid = |value: &str| DatasetError::InvalidFold {
                path: origin.to_path_buf(),
                line: index + 1,
                value: value.to_string(),
            };
            let image = fields.get(image_idx).ok_or_else(|| invalid(line))?;
            let fold_raw = fields.get(fold_idx).ok_or_else(|| invalid(line))?;
            let fold = parse_fold(fold_raw).ok_or_else(|| invalid(fold_raw))?;
            rows.push((image.to_string(), fold));
        }

        Ok(Self { rows })
    }

    /// Names of every image assigned to `fold`.
    pub fn images_in(&self, fold: i64) -> HashSet<String> {
        self.rows
            .iter()
            .filter(|(_, f)| *f == fold)
            .map(|(name, _)| name.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

// Folds written by dataframe tools may come out as floats ("0.0").
fn parse_fold(value: &str) -> Option<i64> {
    if let Ok(fold) = value.parse::<i64>() {
        return Some(fold);
    }
    let float = value.parse::<f64>().ok()?;
    (float.fract() == 0.0 && float.is_finite()).then_some(float as i64)
}

/// Default location of the fold file, relative to the working directory.
pub fn default_fold_path() -> PathBuf {
    PathBuf::from("configs/data_info.txt")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn origin() -> &'static Path {
        Path::new("data_info.txt")
    }

    #[test]
    fn test_images_in_fold() {
        let index = FoldIndex::parse(
            "image_name,fold,source\na.jpg,0,1\nb.jpg,1,0\nc.jpg,0.0,1\n",
            origin(),
        )
        .unwrap();

        assert_eq!(index.len(), 3);
        let fold0 = index.images_in(0);
        assert_eq!(fold0.len(), 2);
        assert!(fold0.contains("a.jpg"));
        assert!(fold0.contains("c.jpg"));
        assert!(!fold0.contains("b.jpg"));
    }

    #[test]
    fn test_columns_found_by_name() {
        let index = FoldIndex::parse("fold,image_name\n2,z.png\n", origin()).unwrap();
        assert!(index.images_in(2).contains("z.png"));
    }

    #[test]
    fn test_missing_fold_column() {
        let err = FoldIndex::parse("image_name,source\na.jpg,1\n", origin()).unwrap_err();
        assert!(matches!(
            err,
            DatasetError::MissingColumn { column: "fold", .. }
        ));
    }

    #[test]
    fn test_invalid_fold_value() {
        let err = FoldIndex::parse("image_name,fold\na.jpg,zero\n", origin()).unwrap_err();
        assert!(matches!(err, DatasetError::InvalidFold { line: 2, .. }));
    }
}
