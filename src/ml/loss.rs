// ============================================================
// Layer 5 — Loss Composer
// ============================================================
// Builds the named loss terms of one forward pass:
//
//   reconstruction  per sample, Σ (y - ŷ)²  or  Σ |y - ŷ|
//   kl              per sample, closed form against the prior
//   info            scalar MMD between mu and z (InfoVAE only)
//
// The terms stay separate until `weighted_total`, so the weights
// can change between steps without touching the graph:
//
//   total = alpha · mean(reconstruction) + beta · mean(kl) [+ gamma · info]
//
// KL formulas (lv = log_dispersion, p = anisotropic prior):
//   Gaussian        ½ Σ (e^lv + mu² - 1 - lv)
//   Gaussian, p     ½ Σ (p + (e^lv + mu²) / e^p - 1 - lv)
//   Laplace         Σ (|mu| + b·e^(-|mu|/b) - 1 - lv),          b = e^lv
//   Laplace, p      Σ ((|mu| + b·e^(-|mu|/b)) / e^p - 1 - lv + p)

use burn::{prelude::*, tensor::ElementConversion};
use serde::{Deserialize, Serialize};

use crate::domain::{options::ReconstructionKind, prior::Prior};
use crate::ml::{config::CvaeConfig, model::CvaeOutput, sampling::LatentDistribution};

/// Laplace log-scale floor; a zero scale makes the KL undefined.
pub const LAPLACE_MIN_LOG_SCALE: f64 = -13.815_510_557_964_274; // ln(1e-6)

/// Mutable per-term weights.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LossWeights {
    pub alpha: f64,
    pub beta:  f64,
    pub gamma: f64,
}

impl Default for LossWeights {
    fn default() -> Self {
        Self { alpha: 1.0, beta: 1.0, gamma: 0.0 }
    }
}

/// Named loss terms of one batch.
#[derive(Debug, Clone)]
pub struct LossTerms<B: Backend> {
    /// [batch]
    pub reconstruction: Tensor<B, 1>,
    /// [batch]
    pub kl:   Tensor<B, 1>,
    /// [1], present in InfoVAE mode.
    pub info: Option<Tensor<B, 1>>,
}

impl<B: Backend> LossTerms<B> {
    pub fn weighted_total(&self, weights: &LossWeights) -> Tensor<B, 1> {
        let total = self.reconstruction.clone().mean().mul_scalar(weights.alpha)
            + self.kl.clone().mean().mul_scalar(weights.beta);
        match &self.info {
            Some(info) => total + info.clone().mul_scalar(weights.gamma),
            None => total,
        }
    }

    /// Batch means as plain numbers, for logging and history.
    pub fn summarize(&self, weights: &LossWeights) -> StepLosses {
        StepLosses {
            total:          scalar(self.weighted_total(weights)),
            reconstruction: scalar(self.reconstruction.clone()),
            kl:             scalar(self.kl.clone()),
            info:           self.info.clone().map(scalar),
        }
    }
}

/// Loss values of one step or one evaluation pass.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct StepLosses {
    pub total:          f64,
    pub reconstruction: f64,
    pub kl:             f64,
    pub info:           Option<f64>,
}

impl StepLosses {
    pub fn is_finite(&self) -> bool {
        self.total.is_finite()
            && self.reconstruction.is_finite()
            && self.kl.is_finite()
            && self.info.map_or(true, f64::is_finite)
    }

    /// Sample-weighted running mean over batches.
    pub fn accumulate(&mut self, other: &StepLosses, weight: f64) {
        self.total          += other.total * weight;
        self.reconstruction += other.reconstruction * weight;
        self.kl             += other.kl * weight;
        self.info = match (self.info, other.info) {
            (Some(a), Some(b)) => Some(a + b * weight),
            (None, Some(b))    => Some(b * weight),
            (a, None)          => a,
        };
    }

    pub fn scaled(mut self, factor: f64) -> Self {
        self.total          *= factor;
        self.reconstruction *= factor;
        self.kl             *= factor;
        self.info = self.info.map(|v| v * factor);
        self
    }
}

fn scalar<B: Backend>(t: Tensor<B, 1>) -> f64 {
    t.mean().into_scalar().elem::<f64>()
}

#[derive(Debug, Clone)]
pub struct LossComposer {
    pub reconstruction: ReconstructionKind,
    pub prior:          Prior,
    pub anisotropic:    Option<Vec<f32>>,
    /// MMD bandwidth, set only in InfoVAE mode.
    pub info_bandwidth: Option<f64>,
}

impl LossComposer {
    pub fn from_config(config: &CvaeConfig) -> Self {
        Self {
            reconstruction: config.reconstruction,
            prior:          config.prior,
            anisotropic:    config.anisotropic_prior.clone(),
            info_bandwidth: config.info_vae.then(|| config.mmd_bandwidth()),
        }
    }

    /// Per-sample reconstruction error, summed over features.
    pub fn reconstruction<B: Backend>(&self, y_true: Tensor<B, 2>, y_pred: Tensor<B, 2>) -> Tensor<B, 1> {
        let diff = y_pred - y_true;
        let err = match self.reconstruction {
            ReconstructionKind::L2 => diff.clone() * diff,
            ReconstructionKind::L1 => diff.abs(),
        };
        err.sum_dim(1).squeeze::<1>(1)
    }

    /// Per-sample KL divergence to the prior.
    pub fn kl<B: Backend>(&self, latent: &LatentDistribution<B>) -> Tensor<B, 1> {
        let mu = latent.mu.clone();
        let lv = latent.log_dispersion.clone();
        let prior = self.anisotropic.as_deref().map(|p| {
            Tensor::<B, 1>::from_floats(p, &mu.device())
                .unsqueeze::<2>()
                .expand(mu.dims())
        });

        let per_dim = match (self.prior, prior) {
            (Prior::Gaussian, None) => {
                (lv.clone().exp() + mu.powf_scalar(2.0) - lv).sub_scalar(1.0).mul_scalar(0.5)
            }
            (Prior::Gaussian, Some(p)) => {
                let ratio = (lv.clone().exp() + mu.powf_scalar(2.0)) / p.clone().exp();
                (p + ratio - lv).sub_scalar(1.0).mul_scalar(0.5)
            }
            (Prior::Laplace, None) => {
                let lv = lv.clamp_min(LAPLACE_MIN_LOG_SCALE);
                laplace_core(mu, lv.clone()) - lv.add_scalar(1.0)
            }
            (Prior::Laplace, Some(p)) => {
                let lv = lv.clamp_min(LAPLACE_MIN_LOG_SCALE);
                laplace_core(mu, lv.clone()) / p.clone().exp() - lv.add_scalar(1.0) + p
            }
        };
        per_dim.sum_dim(1).squeeze::<1>(1)
    }

    /// MMD between mu and z, if InfoVAE is on.
    pub fn info<B: Backend>(&self, mu: Tensor<B, 2>, z: Tensor<B, 2>) -> Option<Tensor<B, 1>> {
        self.info_bandwidth.map(|h| mmd(mu, z, h))
    }

    pub fn compose<B: Backend>(&self, output: &CvaeOutput<B>, target: Tensor<B, 2>) -> LossTerms<B> {
        LossTerms {
            reconstruction: self.reconstruction(target, output.reconstruction.clone()),
            kl:             self.kl(&output.latent),
            info:           self.info(output.latent.mu.clone(), output.z.clone()),
        }
    }
}

/// `|mu| + b·exp(-|mu| / b)` with `b = exp(lv)`.
fn laplace_core<B: Backend>(mu: Tensor<B, 2>, lv: Tensor<B, 2>) -> Tensor<B, 2> {
    let abs_mu = mu.abs();
    let scale  = lv.exp();
    abs_mu.clone() + scale.clone() * (abs_mu.neg() / scale).exp()
}

/// Pairwise `exp(-½ ‖a_i - b_j‖² / h)`, shape [n, m].
pub fn gaussian_kernel<B: Backend>(a: Tensor<B, 2>, b: Tensor<B, 2>, bandwidth: f64) -> Tensor<B, 2> {
    let [n, d] = a.dims();
    let [m, _] = b.dims();
    let a = a.unsqueeze_dim::<3>(1).expand([n, m, d]);
    let b = b.unsqueeze_dim::<3>(0).expand([n, m, d]);
    let diff = a - b;
    let sq_dist = (diff.clone() * diff).sum_dim(2).reshape([n, m]);
    sq_dist.mul_scalar(-0.5 / bandwidth).exp()
}

/// `mean k(mu,mu) + mean k(z,z) - 2 mean k(mu,z)`, shape [1].
pub fn mmd<B: Backend>(mu: Tensor<B, 2>, z: Tensor<B, 2>, bandwidth: f64) -> Tensor<B, 1> {
    let k_mu = gaussian_kernel(mu.clone(), mu.clone(), bandwidth).mean();
    let k_z  = gaussian_kernel(z.clone(), z.clone(), bandwidth).mean();
    let k_mz = gaussian_kernel(mu, z, bandwidth).mean();
    k_mu + k_z - k_mz.mul_scalar(2.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ml::config::Conditioning;
    use burn::backend::NdArray;

    type TestBackend = NdArray;

    fn composer(prior: Prior, anisotropic: Option<Vec<f32>>) -> LossComposer {
        LossComposer {
            reconstruction: ReconstructionKind::L2,
            prior,
            anisotropic,
            info_bandwidth: None,
        }
    }

    fn latent(mu: f32, lv: f32, z: usize) -> LatentDistribution<TestBackend> {
        let device = Default::default();
        LatentDistribution::new(Tensor::full([2, z], mu, &device), Tensor::full([2, z], lv, &device))
    }

    fn values(t: Tensor<TestBackend, 1>) -> Vec<f32> {
        t.into_data().to_vec().unwrap()
    }

    #[test]
    fn test_kl_vanishes_at_the_prior() {
        for prior in Prior::ALL {
            for aniso in [None, Some(vec![0.0, 0.0, 0.0])] {
                let kl = values(composer(prior, aniso).kl(&latent(0.0, 0.0, 3)));
                assert!(kl.iter().all(|v| v.abs() < 1e-6), "{prior}: {kl:?}");
            }
        }
    }

    #[test]
    fn test_kl_is_positive_away_from_the_prior() {
        for prior in Prior::ALL {
            let kl = values(composer(prior, None).kl(&latent(0.8, -0.5, 2)));
            assert!(kl.iter().all(|&v| v > 0.0), "{prior}: {kl:?}");
        }
    }

    #[test]
    fn test_anisotropic_gaussian_known_value() {
        // mu=1, lv=0, p=ln 2: ½ (ln 2 + 2/2 - 1) = ½ ln 2
        let p = std::f32::consts::LN_2;
        let kl = values(composer(Prior::Gaussian, Some(vec![p])).kl(&latent(1.0, 0.0, 1)));
        assert!((kl[0] - 0.5 * p).abs() < 1e-5, "{kl:?}");
    }

    #[test]
    fn test_anisotropic_laplace_known_value() {
        // mu=1, lv=0, p=ln 2: (1 + e^-1)/2 - 1 + ln 2
        let p = std::f32::consts::LN_2;
        let expected = (1.0 + (-1.0f32).exp()) / 2.0 - 1.0 + p;
        let kl = values(composer(Prior::Laplace, Some(vec![p, p])).kl(&latent(1.0, 0.0, 2)));
        assert!(kl.iter().all(|v| (v - 2.0 * expected).abs() < 1e-5), "{kl:?}");
    }

    #[test]
    fn test_laplace_kl_is_finite_for_collapsed_scale() {
        let kl = values(composer(Prior::Laplace, None).kl(&latent(0.5, -1e4, 2)));
        assert!(kl.iter().all(|v| v.is_finite()), "{kl:?}");
    }

    #[test]
    fn test_reconstruction_zero_iff_equal() {
        let device = Default::default();
        let y = Tensor::<TestBackend, 2>::from_floats([[1.0, -2.0, 3.0], [0.5, 0.0, 1.0]], &device);
        let y_hat = Tensor::<TestBackend, 2>::from_floats([[1.0, -2.0, 3.0], [0.5, 1.0, -1.0]], &device);

        for kind in [ReconstructionKind::L2, ReconstructionKind::L1] {
            let c = LossComposer { reconstruction: kind, ..composer(Prior::Gaussian, None) };
            let same = values(c.reconstruction(y.clone(), y.clone()));
            assert_eq!(same, vec![0.0, 0.0]);

            let diff = values(c.reconstruction(y.clone(), y_hat.clone()));
            assert_eq!(diff[0], 0.0);
            let expected = match kind {
                ReconstructionKind::L2 => 1.0 + 4.0,
                ReconstructionKind::L1 => 1.0 + 2.0,
            };
            assert!((diff[1] - expected).abs() < 1e-6, "{kind:?}: {diff:?}");
        }
    }

    #[test]
    fn test_mmd_of_identical_sets_is_zero() {
        let device = Default::default();
        let a = Tensor::<TestBackend, 2>::from_floats([[0.1, 0.2], [-1.0, 0.5], [2.0, 0.0]], &device);
        let v = values(mmd(a.clone(), a, 1.0));
        assert!(v[0].abs() < 1e-6);
    }

    #[test]
    fn test_mmd_grows_with_separation() {
        let device = Default::default();
        let a = Tensor::<TestBackend, 2>::zeros([4, 2], &device);
        let near = Tensor::<TestBackend, 2>::full([4, 2], 0.1, &device);
        let far  = Tensor::<TestBackend, 2>::full([4, 2], 3.0, &device);
        let d_near = values(mmd(a.clone(), near, 1.0))[0];
        let d_far  = values(mmd(a, far, 1.0))[0];
        assert!(d_near < d_far);
    }

    #[test]
    fn test_kernel_diagonal_is_one() {
        let device = Default::default();
        let a = Tensor::<TestBackend, 2>::from_floats([[1.0, 2.0], [3.0, -1.0]], &device);
        let k: Vec<f32> = gaussian_kernel(a.clone(), a, 0.5).into_data().to_vec().unwrap();
        assert_eq!(k[0], 1.0);
        assert_eq!(k[3], 1.0);
        assert!(k[1] < 1.0 && k[1] == k[2]);
    }

    #[test]
    fn test_weighted_total_and_info_switch() {
        let device = Default::default();
        let terms = LossTerms::<TestBackend> {
            reconstruction: Tensor::from_floats([2.0, 4.0], &device),
            kl:             Tensor::from_floats([1.0, 1.0], &device),
            info:           Some(Tensor::from_floats([0.5], &device)),
        };
        let w = LossWeights { alpha: 1.0, beta: 0.5, gamma: 2.0 };
        let s = terms.summarize(&w);
        assert!((s.total - (3.0 + 0.5 + 1.0)).abs() < 1e-6);
        assert_eq!(s.info, Some(0.5));

        let cfg = CvaeConfig::new(4, 2, Conditioning::Guided { branches: vec![] });
        assert!(LossComposer::from_config(&cfg).info_bandwidth.is_none());
        assert_eq!(LossComposer::from_config(&cfg.with_info_vae(true)).info_bandwidth, Some(1.0));
    }
}
