// ============================================================
// Layer 5 — ML / Model Layer (Burn)
// ============================================================
// All tensor and autodiff code lives here. Layers above only
// see configs, samples and plain loss numbers.
//
// Building blocks, bottom-up:
//
//   config.rs     CvaeConfig (burn Config) and the variants
//   layers.rs     dense ReLU stacks, hard sigmoid
//   sampling.rs   reparameterisation for Gaussian / Laplace
//   leap.rs       LEAP gating block
//   embedding.rs  condition embedding (branches + reduction)
//   encoder.rs    Guided / LEAP / conditional encoders
//   decoder.rs    residual decoder
//   loss.rs       reconstruction, KL, MMD and their weighting
//   model.rs      the composed Cvae module
//   trainer.rs    compile, freeze, train, save / load
//   callbacks.rs  per-epoch hooks (early stopping, KL warm-up)
//
// Reference: Burn Book §3 (Building Blocks), §5 (Training)
//            Kingma & Welling (2014) Auto-Encoding Variational Bayes
//            Zhao et al. (2019) InfoVAE

/// Model hyperparameters and conditioning variants
pub mod config;

/// Dense stacks and activations shared by every sub-graph
pub mod layers;

/// Latent distributions and the reparameterisation trick
pub mod sampling;

/// Multiplicative condition gate on the latent mean
pub mod leap;

/// Condition embedding module
pub mod embedding;

pub mod encoder;

pub mod decoder;

/// Loss terms and weights
pub mod loss;

/// The composed CVAE
pub mod model;

/// Trainable graph: optimiser, freezing, training loop
pub mod trainer;

/// Epoch callbacks
pub mod callbacks;
