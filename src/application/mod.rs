// ============================================================
// Layer 2 — Application / Use Cases
// ============================================================
// This layer orchestrates all the other layers to accomplish
// a specific goal (training a model or encoding a dataset).
//
// Rules for this layer:
//   - No ML math or model code here
//   - No UI or printing here (that's Layer 1)
//   - Errors are anyhow with context for the user
//   - Only workflow coordination
//
// Think of this layer as the "director": it tells other
// layers what to do but doesn't do the work itself.

// The training workflow
pub mod train_use_case;

// Latent export of a trained run
pub mod encode_use_case;
