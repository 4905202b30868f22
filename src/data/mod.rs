// ============================================================
// Layer 4 — Data Pipeline
// ============================================================
// Everything between a training file and tensor batches:
//
//   train.json (named 2-D arrays)
//       │
//       ▼
//   JsonColumnFile    → reads the named columns
//       │
//       ▼
//   TrainingSet       → checks x / y are present, ≥ 2 columns
//       │
//       ▼
//   CvaeDataset       → rows in the model's input layout,
//       │               implements Burn's Dataset trait
//       ▼
//   split_holdout /   → train / validation sets
//   split_tail
//       │
//       ▼
//   CvaeBatcher       → Burn Batcher; stacks samples into tensor batches
//                       and builds the DataLoaders
//
// Each step is independently testable.

/// Reads JSON column files
pub mod loader;

/// Training-call contract, samples and Burn Dataset impl
pub mod dataset;

/// Stacks samples into tensor batches
pub mod batcher;

/// Seeded and tail train/validation splits
pub mod splitter;
