// ============================================================
// Layer 4 — Training Set and Samples
// ============================================================
// TrainingSet holds the raw named columns and enforces the
// training-call contract: at least two columns, one of them the
// signal "x" and one the target "y".
//
// into_samples() then reads the columns in the order the model's
// InputLayout asks for, checking every width and row count, and
// produces one CvaeSample per row.

use burn::data::dataset::Dataset;
use serde::{Deserialize, Serialize};

use crate::domain::{
    layout::{InputLayout, SIGNAL_KEY, TARGET_KEY},
    traits::Columns,
};
use crate::error::DataError;

#[derive(Debug, Clone, PartialEq)]
pub struct TrainingSet {
    columns: Columns,
}

impl TrainingSet {
    pub fn from_columns(columns: Columns) -> Result<Self, DataError> {
        if columns.len() < 2 {
            return Err(DataError::TooFewColumns { found: columns.len() });
        }
        for key in [SIGNAL_KEY, TARGET_KEY] {
            if !columns.contains_key(key) {
                return Err(DataError::MissingColumn(key.to_string()));
            }
        }
        Ok(Self { columns })
    }

    /// Row count of the signal column.
    pub fn rows(&self) -> usize {
        self.columns.get(SIGNAL_KEY).map_or(0, Vec::len)
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.keys().map(String::as_str).collect()
    }

    pub fn into_samples(&self, layout: &InputLayout) -> Result<Vec<CvaeSample>, DataError> {
        let rows = self.rows();
        let signal_width = layout.signal_width();

        let signal = self.column(SIGNAL_KEY, signal_width, rows)?;
        let target = self.column(TARGET_KEY, signal_width, rows)?;
        let conditions = layout
            .conditions()
            .iter()
            .map(|slot| self.column(&slot.name, slot.width, rows))
            .collect::<Result<Vec<_>, _>>()?;

        let unused: Vec<&str> = self
            .column_names()
            .into_iter()
            .filter(|name| *name != TARGET_KEY && !layout.slots().iter().any(|s| s.name == *name))
            .collect();
        if !unused.is_empty() {
            tracing::debug!("Ignoring columns not consumed by the model: {:?}", unused);
        }

        Ok((0..rows)
            .map(|row| CvaeSample {
                signal:     signal[row].clone(),
                conditions: conditions.iter().map(|c| c[row].clone()).collect(),
                target:     target[row].clone(),
            })
            .collect())
    }

    fn column(&self, name: &str, width: usize, rows: usize) -> Result<&[Vec<f32>], DataError> {
        let column = self
            .columns
            .get(name)
            .ok_or_else(|| DataError::MissingColumn(name.to_string()))?;

        if column.len() != rows {
            return Err(DataError::RowCountMismatch {
                column:   name.to_string(),
                expected: rows,
                actual:   column.len(),
            });
        }
        if let Some((row, values)) = column.iter().enumerate().find(|(_, v)| v.len() != width) {
            return Err(DataError::WidthMismatch {
                column: name.to_string(),
                row,
                expected: width,
                actual: values.len(),
            });
        }
        Ok(column)
    }
}

/// One training row: signal, condition slots in layout order, target.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CvaeSample {
    pub signal:     Vec<f32>,
    pub conditions: Vec<Vec<f32>>,
    pub target:     Vec<f32>,
}

/// Samples plus the layout they were read with.
#[derive(Debug, Clone)]
pub struct CvaeDataset {
    layout:  InputLayout,
    samples: Vec<CvaeSample>,
}

impl CvaeDataset {
    pub fn new(layout: InputLayout, samples: Vec<CvaeSample>) -> Self {
        Self { layout, samples }
    }

    pub fn from_training_set(set: &TrainingSet, layout: InputLayout) -> Result<Self, DataError> {
        let samples = set.into_samples(&layout)?;
        Ok(Self { layout, samples })
    }

    pub fn layout(&self) -> &InputLayout {
        &self.layout
    }

    pub fn samples(&self) -> &[CvaeSample] {
        &self.samples
    }

    pub fn into_samples(self) -> Vec<CvaeSample> {
        self.samples
    }

    pub fn sample_count(&self) -> usize {
        self.samples.len()
    }
}

impl Dataset<CvaeSample> for CvaeDataset {
    fn get(&self, index: usize) -> Option<CvaeSample> {
        self.samples.get(index).cloned()
    }

    fn len(&self) -> usize {
        self.samples.len()
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;

    fn columns(entries: &[(&str, Vec<Vec<f32>>)]) -> Columns {
        entries.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
    }

    fn layout() -> InputLayout {
        InputLayout::with_signal(2).push("tau", 1).push("cond", 3)
    }

    #[test]
    fn test_contract_checks() {
        let only_x = columns(&[("x", vec![vec![1.0]])]);
        assert_eq!(TrainingSet::from_columns(only_x), Err(DataError::TooFewColumns { found: 1 }));

        let no_target = columns(&[("x", vec![vec![1.0]]), ("cond", vec![vec![1.0]])]);
        assert_eq!(TrainingSet::from_columns(no_target), Err(DataError::MissingColumn("y".into())));
    }

    #[test]
    fn test_samples_follow_layout_order() {
        let set = TrainingSet::from_columns(columns(&[
            ("x",    vec![vec![1.0, 2.0], vec![3.0, 4.0]]),
            ("y",    vec![vec![1.0, 2.0], vec![3.0, 4.0]]),
            ("cond", vec![vec![0.1, 0.2, 0.3], vec![0.4, 0.5, 0.6]]),
            ("tau",  vec![vec![7.0], vec![8.0]]),
            ("notes", vec![vec![0.0], vec![0.0]]),
        ]))
        .unwrap();

        let ds = CvaeDataset::from_training_set(&set, layout()).unwrap();
        assert_eq!(ds.len(), 2);
        let second = ds.get(1).unwrap();
        assert_eq!(second.signal, vec![3.0, 4.0]);
        assert_eq!(second.conditions, vec![vec![8.0], vec![0.4, 0.5, 0.6]]);
        assert!(ds.get(2).is_none());
    }

    #[test]
    fn test_width_and_row_mismatches() {
        let bad_width = TrainingSet::from_columns(columns(&[
            ("x",    vec![vec![1.0, 2.0]]),
            ("y",    vec![vec![1.0, 2.0]]),
            ("tau",  vec![vec![7.0]]),
            ("cond", vec![vec![0.1, 0.2]]),
        ]))
        .unwrap();
        assert!(matches!(
            bad_width.into_samples(&layout()),
            Err(DataError::WidthMismatch { ref column, row: 0, expected: 3, actual: 2 }) if column == "cond"
        ));

        let bad_rows = TrainingSet::from_columns(columns(&[
            ("x",   vec![vec![1.0, 2.0], vec![1.0, 2.0]]),
            ("y",   vec![vec![1.0, 2.0]]),
        ]))
        .unwrap();
        assert!(matches!(
            bad_rows.into_samples(&InputLayout::with_signal(2)),
            Err(DataError::RowCountMismatch { expected: 2, actual: 1, .. })
        ));
    }

    #[test]
    fn test_missing_condition_column() {
        let set = TrainingSet::from_columns(columns(&[
            ("x", vec![vec![1.0, 2.0]]),
            ("y", vec![vec![1.0, 2.0]]),
        ]))
        .unwrap();
        assert_eq!(set.into_samples(&layout()), Err(DataError::MissingColumn("tau".into())));
    }
}
