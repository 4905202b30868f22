// ============================================================
// Layer 3 — Core Traits (Abstractions)
// ============================================================
// Training data reaches the model as named 2-D columns:
// "x" (signal), "y" (target) and one column per condition slot.
//
// Where the columns come from is hidden behind ColumnSource, so
// the application layer works the same for a JSON file today and
// any other store later.

use anyhow::Result;
use std::collections::BTreeMap;

/// Column name → rows, each row one sample's feature vector.
pub type Columns = BTreeMap<String, Vec<Vec<f32>>>;

// ─── ColumnSource ─────────────────────────────────────────────────────────────
/// Anything that can produce a named column mapping.
///
/// Implementations:
///   - JsonColumnFile → a JSON object of named 2-D arrays
pub trait ColumnSource {
    fn load_columns(&self) -> Result<Columns>;
}
