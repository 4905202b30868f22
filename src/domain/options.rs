// ============================================================
// Layer 3 — Architecture Options
// ============================================================
// Small closed choices that shape the graph or the loss but
// carry no tensor code themselves.

use serde::{Deserialize, Serialize};

/// Reconstruction error summed over feature dimensions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum ReconstructionKind {
    /// Sum of squared errors.
    #[default]
    L2,
    /// Sum of absolute errors.
    L1,
}

impl ReconstructionKind {
    pub fn from_l2_flag(is_l2: bool) -> Self {
        if is_l2 { ReconstructionKind::L2 } else { ReconstructionKind::L1 }
    }
}

/// Where batch normalisation is inserted in the condition embedding.
///
/// Numeric levels follow the historical `has_BN` switch:
///   0 → none, 1 → reduction steps only, 2 → reduction steps and
///   the last layer of every embedding branch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum BatchNormLevel {
    None,
    #[default]
    Reduction,
    ReductionAndBranches,
}

impl BatchNormLevel {
    pub fn from_level(level: u8) -> Self {
        match level {
            0 => BatchNormLevel::None,
            1 => BatchNormLevel::Reduction,
            _ => BatchNormLevel::ReductionAndBranches,
        }
    }

    pub fn on_reduction(&self) -> bool {
        !matches!(self, BatchNormLevel::None)
    }

    pub fn on_branches(&self) -> bool {
        matches!(self, BatchNormLevel::ReductionAndBranches)
    }
}
