// ============================================================
// Layer 4 — Column Loader
// ============================================================
// Reads a training file of named 2-D arrays:
//
//   {
//     "x":    [[0.1, 0.2, ...], ...],   signal
//     "tau":  [[...], ...],             condition slots
//     "cond": [[...], ...],
//     "y":    [[0.1, 0.2, ...], ...]    reconstruction target
//   }
//
// The file is parsed with serde_json straight into the Columns
// map. Shape checks happen later, against the model's layout.

use anyhow::{Context, Result};
use std::{fs, path::{Path, PathBuf}};

use crate::data::dataset::TrainingSet;
use crate::domain::traits::{ColumnSource, Columns};

/// A JSON file holding one object of named 2-D arrays.
pub struct JsonColumnFile {
    path: PathBuf,
}

impl JsonColumnFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl ColumnSource for JsonColumnFile {
    fn load_columns(&self) -> Result<Columns> {
        let json = fs::read_to_string(&self.path)
            .with_context(|| format!("Cannot read data file '{}'", self.path.display()))?;

        let columns: Columns = serde_json::from_str(&json)
            .with_context(|| format!("'{}' is not an object of named 2-D arrays", self.path.display()))?;

        tracing::debug!(
            "Loaded {} columns from '{}': {:?}",
            columns.len(),
            self.path.display(),
            columns.keys().collect::<Vec<_>>()
        );
        Ok(columns)
    }
}

/// Read a JSON training file and check the training-call contract.
pub fn load_training_set(path: &Path) -> Result<TrainingSet> {
    let columns = JsonColumnFile::new(path).load_columns()?;
    let set = TrainingSet::from_columns(columns)
        .with_context(|| format!("Invalid training data in '{}'", path.display()))?;
    tracing::info!("Training data: {} rows from '{}'", set.rows(), path.display());
    Ok(set)
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_load_named_arrays() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"x": [[1.0, 2.0]], "cond": [[0.5]], "y": [[1.0, 2.0]]}}"#).unwrap();

        let set = load_training_set(file.path()).unwrap();
        assert_eq!(set.rows(), 1);
        assert_eq!(set.column_names(), vec!["cond", "x", "y"]);
    }

    #[test]
    fn test_single_column_is_rejected() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"x": [[1.0]]}}"#).unwrap();

        let err = load_training_set(file.path()).unwrap_err();
        assert!(format!("{err:#}").contains("at least 2 columns"));
    }

    #[test]
    fn test_missing_file_has_context() {
        let err = JsonColumnFile::new("/nonexistent/train.json").load_columns().unwrap_err();
        assert!(err.to_string().contains("Cannot read data file"));
    }
}
