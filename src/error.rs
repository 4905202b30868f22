// ============================================================
// Error Types
// ============================================================
// Typed errors for the library layers (domain, data, ml, infra).
// The application and CLI layers wrap these in anyhow with context.
//
// Three families:
//   ConfigError the architecture cannot be built as described
//   DataError   a dataset does not match what the model consumes
//   CvaeError   everything else (persistence, sub-graph lookup)

use std::path::PathBuf;
use thiserror::Error;

use crate::domain::subgraph::SubGraph;

/// Construction-time misconfiguration. Raised before any layer is built.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("a model name is required")]
    MissingName,

    #[error("{what} must be at least 1, got 0")]
    ZeroWidth { what: String },

    #[error(
        "embedding has {inputs} condition inputs but {layers} branch width sequences; \
         dimensions of the embedding conditions are incoherent"
    )]
    EmbeddingBranchMismatch { inputs: usize, layers: usize },

    #[error("anisotropic prior has {actual} entries, latent width is {expected}")]
    AnisotropicPriorWidth { expected: usize, actual: usize },

    #[error("LEAP embedding variant needs a pre-condition or at least one reduction step")]
    EmptyConditions,

    #[error("loss weight {name} must be finite and non-negative, got {value}")]
    InvalidLossWeight { name: &'static str, value: f64 },

    #[error("learning rate must be finite and positive, got {0}")]
    InvalidLearningRate(f64),

    #[error("MMD kernel bandwidth must be finite and positive, got {0}")]
    InvalidBandwidth(f64),
}

/// A dataset that cannot be fed to the model.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DataError {
    #[error("training data needs at least 2 columns (signal and target), found {found}")]
    TooFewColumns { found: usize },

    #[error("training data is missing column '{0}'")]
    MissingColumn(String),

    #[error("column '{column}' row {row} has width {actual}, expected {expected}")]
    WidthMismatch { column: String, row: usize, expected: usize, actual: usize },

    #[error("column '{column}' has {actual} rows, expected {expected}")]
    RowCountMismatch { column: String, expected: usize, actual: usize },

    #[error("dataset is empty")]
    EmptyDataset,

    #[error("dataset layout [{found}] does not match model inputs [{expected}]")]
    LayoutMismatch { expected: String, found: String },

    #[error("batch size must be at least 1")]
    ZeroBatchSize,
}

#[derive(Error, Debug)]
pub enum CvaeError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Data(#[from] DataError),

    #[error("unknown sub-graph '{0}' (expected cvae, encoder, decoder, embedding_enc or embedding_dec)")]
    UnknownSubGraph(String),

    #[error("sub-graph '{0}' does not exist in this model")]
    MissingSubGraph(SubGraph),

    #[error("cannot persist '{path}': {reason}")]
    Record { path: PathBuf, reason: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

pub type CvaeResult<T> = Result<T, CvaeError>;
