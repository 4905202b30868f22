// ============================================================
// Layer 3 — Prior Family
// ============================================================
// The latent prior the model is regularised towards.
//
// The family decides two things at once, and they must agree:
//   - how a latent sample is drawn (reparameterisation)
//   - which closed-form KL divergence is charged
//
// The encoder's second head ("log_dispersion") means different
// things per family:
//   Gaussian → log of the variance      (sigma²)
//   Laplace  → log of the scale          (b)
//
// Adding a family means adding a variant here; every `match`
// over Prior in the ml layer then fails to compile until the
// new arm is written.

use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

/// Latent prior family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Prior {
    /// N(0, 1) per dimension; dispersion head is log-variance.
    Gaussian,
    /// Laplace(0, 1) per dimension; dispersion head is log-scale.
    Laplace,
}

impl Prior {
    pub const ALL: [Prior; 2] = [Prior::Gaussian, Prior::Laplace];

    pub fn name(&self) -> &'static str {
        match self {
            Prior::Gaussian => "Gaussian",
            Prior::Laplace  => "Laplace",
        }
    }

    /// What the encoder's dispersion head encodes for this family.
    pub fn dispersion_meaning(&self) -> &'static str {
        match self {
            Prior::Gaussian => "log-variance",
            Prior::Laplace  => "log-scale",
        }
    }
}

impl Default for Prior {
    fn default() -> Self {
        Prior::Gaussian
    }
}

impl fmt::Display for Prior {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Prior {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "gaussian" | "normal" => Ok(Prior::Gaussian),
            "laplace"  | "laplacian" => Ok(Prior::Laplace),
            other => Err(format!("unknown prior '{other}', expected Gaussian or Laplace")),
        }
    }
}
