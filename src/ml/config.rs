// ============================================================
// Layer 5 — Model Configuration
// ============================================================
// Every architecture hyperparameter lives in one Burn Config.
// The config is validated once, then frozen: changing it means
// building a new model.
//
// The conditioning scheme is a closed enum. Each variant decides
// which condition tensors exist and where they enter the graph:
//
//   Guided          per-branch latent corrections, gated per class
//   Leap            one LEAP correction of mu, plain decoder
//   LeapConditional LEAP gated by tau, cond injected into encoder
//                   layers and decoder input
//   LeapEmbedding   LeapConditional with cond = [cond_pre, emb(..)]

use burn::prelude::*;
use serde::{Deserialize, Serialize};

use crate::domain::{
    layout::InputLayout,
    options::{BatchNormLevel, ReconstructionKind},
    prior::Prior,
};
use crate::error::ConfigError;
use crate::ml::loss::LossWeights;

/// One guided condition branch: raw width and its hidden stack.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GuidedBranchSpec {
    pub width:       usize,
    pub hidden_dims: Vec<usize>,
}

/// Condition embedding: one stack per raw condition input, then a
/// shared reduction down to the embedding width.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbeddingSpec {
    /// Raw width of every embedded condition input.
    pub input_dims:     Vec<usize>,
    /// Hidden widths per input; an empty entry keeps the raw width.
    pub branch_dims:    Vec<Vec<usize>>,
    /// Shared reduction widths applied after concatenation.
    pub reduction_dims: Vec<usize>,
    /// Encoder and decoder use the same embedding weights.
    #[serde(default = "default_shared")]
    pub shared:         bool,
}

fn default_shared() -> bool {
    true
}

impl EmbeddingSpec {
    /// The variant has an embedding module at all.
    pub fn is_active(&self) -> bool {
        !self.reduction_dims.is_empty()
    }

    pub fn output_width(&self) -> usize {
        self.reduction_dims.last().copied().unwrap_or(0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Conditioning {
    Guided {
        branches: Vec<GuidedBranchSpec>,
    },
    Leap {
        cond_dim:  usize,
        leap_dims: Vec<usize>,
    },
    LeapConditional {
        tau_dim:   usize,
        cond_dim:  usize,
        leap_dims: Vec<usize>,
    },
    LeapEmbedding {
        tau_dim:      usize,
        cond_pre_dim: usize,
        leap_dims:    Vec<usize>,
        embedding:    EmbeddingSpec,
    },
}

impl Conditioning {
    pub fn name(&self) -> &'static str {
        match self {
            Conditioning::Guided { .. }          => "guided",
            Conditioning::Leap { .. }            => "leap",
            Conditioning::LeapConditional { .. } => "leap_conditional",
            Conditioning::LeapEmbedding { .. }   => "leap_embedding",
        }
    }

    /// Width of the condition tensor fed to a conditioned decoder
    /// (and to every hidden layer of a conditioned encoder).
    pub fn residual_width(&self) -> usize {
        match self {
            Conditioning::Guided { .. } | Conditioning::Leap { .. } => 0,
            Conditioning::LeapConditional { cond_dim, .. } => *cond_dim,
            Conditioning::LeapEmbedding { cond_pre_dim, embedding, .. } => {
                cond_pre_dim + embedding.output_width()
            }
        }
    }

    /// Width of the tensor that gates the LEAP block, if any.
    pub fn gate_width(&self) -> Option<usize> {
        match self {
            Conditioning::Guided { .. } => None,
            Conditioning::Leap { cond_dim, .. } => Some(*cond_dim),
            Conditioning::LeapConditional { tau_dim, .. }
            | Conditioning::LeapEmbedding { tau_dim, .. } => Some(*tau_dim),
        }
    }

    pub fn leap_dims(&self) -> &[usize] {
        match self {
            Conditioning::Guided { .. } => &[],
            Conditioning::Leap { leap_dims, .. }
            | Conditioning::LeapConditional { leap_dims, .. }
            | Conditioning::LeapEmbedding { leap_dims, .. } => leap_dims,
        }
    }

    pub fn embedding(&self) -> Option<&EmbeddingSpec> {
        match self {
            Conditioning::LeapEmbedding { embedding, .. } if embedding.is_active() => Some(embedding),
            _ => None,
        }
    }
}

#[derive(Config, Debug)]
pub struct CvaeConfig {
    /// Signal width.
    pub input_dim: usize,
    /// Latent width.
    pub z_dim: usize,
    pub conditioning: Conditioning,
    #[config(default = "vec![24]")]
    pub e_dims: Vec<usize>,
    /// Decoder widths, traversed in reverse order.
    #[config(default = "vec![24]")]
    pub d_dims: Vec<usize>,
    #[config(default = "Prior::Gaussian")]
    pub prior: Prior,
    /// Fixed per-dimension prior dispersion (log-variance for Gaussian,
    /// log-scale for Laplace). Never trained.
    pub anisotropic_prior: Option<Vec<f32>>,
    #[config(default = 1.0)]
    pub alpha: f64,
    #[config(default = 1.0)]
    pub beta: f64,
    #[config(default = 0.0)]
    pub gamma: f64,
    /// Adds the MMD distribution-matching term (InfoVAE).
    #[config(default = false)]
    pub info_vae: bool,
    /// Kernel bandwidth of the MMD term; `z_dim / 2` when unset.
    pub info_bandwidth: Option<f64>,
    #[config(default = "ReconstructionKind::L2")]
    pub reconstruction: ReconstructionKind,
    #[config(default = true)]
    pub has_skip: bool,
    #[config(default = "BatchNormLevel::Reduction")]
    pub batch_norm: BatchNormLevel,
    /// Last decoder step concatenates the condition instead of the
    /// full representation.
    #[config(default = false)]
    pub embedding_before_latent: bool,
    #[config(default = 1e-3)]
    pub lr: f64,
    pub grad_clip_norm: Option<f32>,
}

impl CvaeConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        nonzero("input_dim", self.input_dim)?;
        nonzero("z_dim", self.z_dim)?;
        all_nonzero("e_dims", &self.e_dims)?;
        all_nonzero("d_dims", &self.d_dims)?;

        match &self.conditioning {
            Conditioning::Guided { branches } => {
                for (i, branch) in branches.iter().enumerate() {
                    nonzero(&format!("guided branch {} width", i + 1), branch.width)?;
                    all_nonzero(&format!("guided branch {} hidden_dims", i + 1), &branch.hidden_dims)?;
                }
            }
            Conditioning::Leap { cond_dim, leap_dims } => {
                nonzero("cond_dim", *cond_dim)?;
                all_nonzero("leap_dims", leap_dims)?;
            }
            Conditioning::LeapConditional { tau_dim, cond_dim, leap_dims } => {
                nonzero("tau_dim", *tau_dim)?;
                nonzero("cond_dim", *cond_dim)?;
                all_nonzero("leap_dims", leap_dims)?;
            }
            Conditioning::LeapEmbedding { tau_dim, cond_pre_dim, leap_dims, embedding } => {
                nonzero("tau_dim", *tau_dim)?;
                all_nonzero("leap_dims", leap_dims)?;
                if embedding.is_active() {
                    if embedding.input_dims.len() != embedding.branch_dims.len() {
                        return Err(ConfigError::EmbeddingBranchMismatch {
                            inputs: embedding.input_dims.len(),
                            layers: embedding.branch_dims.len(),
                        });
                    }
                    if embedding.input_dims.is_empty() {
                        return Err(ConfigError::ZeroWidth { what: "embedding inputs".into() });
                    }
                    all_nonzero("embedding input_dims", &embedding.input_dims)?;
                    for (j, dims) in embedding.branch_dims.iter().enumerate() {
                        all_nonzero(&format!("embedding branch {j}"), dims)?;
                    }
                    all_nonzero("embedding reduction_dims", &embedding.reduction_dims)?;
                } else if *cond_pre_dim == 0 {
                    return Err(ConfigError::EmptyConditions);
                }
            }
        }

        if let Some(prior) = &self.anisotropic_prior {
            if prior.len() != self.z_dim {
                return Err(ConfigError::AnisotropicPriorWidth {
                    expected: self.z_dim,
                    actual:   prior.len(),
                });
            }
        }

        for (name, value) in [("alpha", self.alpha), ("beta", self.beta), ("gamma", self.gamma)] {
            if !value.is_finite() || value < 0.0 {
                return Err(ConfigError::InvalidLossWeight { name, value });
            }
        }
        if !self.lr.is_finite() || self.lr <= 0.0 {
            return Err(ConfigError::InvalidLearningRate(self.lr));
        }
        if let Some(h) = self.info_bandwidth {
            if !h.is_finite() || h <= 0.0 {
                return Err(ConfigError::InvalidBandwidth(h));
            }
        }
        Ok(())
    }

    /// Named inputs, in the order the model consumes them.
    pub fn input_layout(&self) -> InputLayout {
        let layout = InputLayout::with_signal(self.input_dim);
        match &self.conditioning {
            Conditioning::Guided { branches } => branches
                .iter()
                .enumerate()
                .fold(layout, |l, (i, b)| l.push(format!("cond_{}", i + 1), b.width)),
            Conditioning::Leap { cond_dim, .. } => layout.push("cond", *cond_dim),
            Conditioning::LeapConditional { tau_dim, cond_dim, .. } => {
                layout.push("tau", *tau_dim).push("cond", *cond_dim)
            }
            Conditioning::LeapEmbedding { tau_dim, cond_pre_dim, embedding, .. } => {
                let mut layout = layout.push("tau", *tau_dim);
                if *cond_pre_dim > 0 {
                    layout = layout.push("cond_pre", *cond_pre_dim);
                }
                if embedding.is_active() {
                    for (j, width) in embedding.input_dims.iter().enumerate() {
                        layout = layout.push(format!("emb_{j}"), *width);
                    }
                }
                layout
            }
        }
    }

    pub fn loss_weights(&self) -> LossWeights {
        LossWeights {
            alpha: self.alpha,
            beta:  self.beta,
            gamma: if self.info_vae { self.gamma } else { 0.0 },
        }
    }

    pub fn mmd_bandwidth(&self) -> f64 {
        self.info_bandwidth.unwrap_or(self.z_dim as f64 / 2.0)
    }
}

fn nonzero(what: &str, value: usize) -> Result<(), ConfigError> {
    if value == 0 {
        return Err(ConfigError::ZeroWidth { what: what.to_string() });
    }
    Ok(())
}

fn all_nonzero(what: &str, values: &[usize]) -> Result<(), ConfigError> {
    values.iter().try_for_each(|&v| nonzero(what, v))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn embedding_config(input_dims: Vec<usize>, branch_dims: Vec<Vec<usize>>) -> CvaeConfig {
        CvaeConfig::new(
            6,
            2,
            Conditioning::LeapEmbedding {
                tau_dim:      2,
                cond_pre_dim: 1,
                leap_dims:    vec![3],
                embedding: EmbeddingSpec {
                    input_dims,
                    branch_dims,
                    reduction_dims: vec![4, 3],
                    shared: true,
                },
            },
        )
    }

    #[test]
    fn test_defaults_validate() {
        let cfg = CvaeConfig::new(96, 2, Conditioning::Leap { cond_dim: 12, leap_dims: vec![3] });
        assert!(cfg.validate().is_ok());
        assert_eq!(cfg.e_dims, vec![24]);
        assert_eq!(cfg.prior, Prior::Gaussian);
        assert_eq!(cfg.mmd_bandwidth(), 1.0);
    }

    #[test]
    fn test_embedding_branch_mismatch_is_an_error() {
        let cfg = embedding_config(vec![3, 5], vec![vec![4]]);
        assert_eq!(
            cfg.validate(),
            Err(ConfigError::EmbeddingBranchMismatch { inputs: 2, layers: 1 })
        );
    }

    #[test]
    fn test_zero_width_condition_is_an_error() {
        let cfg = CvaeConfig::new(
            4,
            2,
            Conditioning::LeapConditional { tau_dim: 2, cond_dim: 0, leap_dims: vec![3] },
        );
        assert_eq!(cfg.validate(), Err(ConfigError::ZeroWidth { what: "cond_dim".into() }));
    }

    #[test]
    fn test_zero_input_and_hidden_widths_are_errors() {
        let leap = Conditioning::Leap { cond_dim: 2, leap_dims: vec![3] };
        assert_eq!(
            CvaeConfig::new(0, 2, leap.clone()).validate(),
            Err(ConfigError::ZeroWidth { what: "input_dim".into() })
        );
        let cfg = CvaeConfig::new(4, 2, leap).with_d_dims(vec![8, 0]);
        assert!(matches!(cfg.validate(), Err(ConfigError::ZeroWidth { .. })));
    }

    #[test]
    fn test_embedding_without_any_condition_is_an_error() {
        let cfg = CvaeConfig::new(
            4,
            2,
            Conditioning::LeapEmbedding {
                tau_dim:      2,
                cond_pre_dim: 0,
                leap_dims:    vec![],
                embedding: EmbeddingSpec {
                    input_dims:     vec![1],
                    branch_dims:    vec![vec![]],
                    reduction_dims: vec![],
                    shared:         true,
                },
            },
        );
        assert_eq!(cfg.validate(), Err(ConfigError::EmptyConditions));
    }

    #[test]
    fn test_anisotropic_prior_must_match_latent_width() {
        let cfg = CvaeConfig::new(4, 3, Conditioning::Guided { branches: vec![] })
            .with_anisotropic_prior(Some(vec![0.0, 0.5]));
        assert_eq!(
            cfg.validate(),
            Err(ConfigError::AnisotropicPriorWidth { expected: 3, actual: 2 })
        );
    }

    #[test]
    fn test_negative_weight_and_bad_lr_are_rejected() {
        let base = CvaeConfig::new(4, 2, Conditioning::Guided { branches: vec![] });
        assert!(matches!(
            base.clone().with_beta(-1.0).validate(),
            Err(ConfigError::InvalidLossWeight { name: "beta", .. })
        ));
        assert!(matches!(
            base.with_lr(0.0).validate(),
            Err(ConfigError::InvalidLearningRate(_))
        ));
    }

    #[test]
    fn test_embedding_layout_and_residual_width() {
        let cfg = embedding_config(vec![3, 5], vec![vec![4], vec![]]);
        assert!(cfg.validate().is_ok());
        assert_eq!(cfg.input_layout().describe(), "x:6, tau:2, cond_pre:1, emb_0:3, emb_1:5");
        assert_eq!(cfg.conditioning.residual_width(), 1 + 3);
        assert_eq!(cfg.conditioning.gate_width(), Some(2));
    }

    #[test]
    fn test_guided_layout_numbers_branches_from_one() {
        let cfg = CvaeConfig::new(
            4,
            2,
            Conditioning::Guided {
                branches: vec![
                    GuidedBranchSpec { width: 3, hidden_dims: vec![8] },
                    GuidedBranchSpec { width: 1, hidden_dims: vec![] },
                ],
            },
        );
        assert_eq!(cfg.input_layout().describe(), "x:4, cond_1:3, cond_2:1");
    }

    #[test]
    fn test_bandwidth_must_be_positive() {
        let cfg = CvaeConfig::new(4, 2, Conditioning::Guided { branches: vec![] }).with_info_vae(true);
        for h in [0.0, -1.0, f64::NAN] {
            let err = cfg.clone().with_info_bandwidth(Some(h)).validate().unwrap_err();
            assert!(matches!(err, ConfigError::InvalidBandwidth(_)), "{h}: {err}");
        }
        assert!(cfg.with_info_bandwidth(Some(0.5)).validate().is_ok());
    }

    #[test]
    fn test_gamma_only_counts_with_info_vae() {
        let cfg = CvaeConfig::new(4, 2, Conditioning::Guided { branches: vec![] }).with_gamma(2.0);
        assert_eq!(cfg.loss_weights().gamma, 0.0);
        assert_eq!(cfg.with_info_vae(true).loss_weights().gamma, 2.0);
    }
}
