// ============================================================
// Layer 3 — Domain Layer
// ============================================================
// Plain Rust types that name the concepts of the system:
// which prior the latent space follows, which named parts the
// trainable graph is made of, which inputs a variant consumes.
//
// Rules for this layer:
//   - NO Burn framework types allowed here
//   - NO file I/O
//   - Only plain structs, enums and their parsing

/// Latent prior family (Gaussian | Laplace)
pub mod prior;

/// Reconstruction norm and batch-norm placement
pub mod options;

/// Named, independently persistable parts of the model
pub mod subgraph;

/// Ordered input slots consumed by a model variant
pub mod layout;

/// Where training columns come from
pub mod traits;
