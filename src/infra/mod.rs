// ============================================================
// Layer 6 — Infrastructure Layer
// ============================================================
// Cross-cutting persistence that no single layer owns:
//
//   checkpoint.rs per-sub-graph weight files
//                   Burn's NamedMpkGzFileRecorder at full
//                   precision, plus the model config as JSON
//                   so a run can be rebuilt before loading.
//
//   history.rs    per-epoch loss sequences (history.json)
//
//   metrics.rs    one CSV row per epoch (metrics.csv),
//                   hooked into training as a callback
//
// Reference: Burn Book §5 (Checkpointing)

/// Sub-graph weight files and model config
pub mod checkpoint;

/// Loss-name → per-epoch values
pub mod history;

/// Training metrics CSV logger
pub mod metrics;
