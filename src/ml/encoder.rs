// ============================================================
// Layer 5 — Encoder
// ============================================================
// Maps (signal, conditions) to the latent distribution
// (mu, log_dispersion).
//
//   signal ─► [concat cond] ─► dense ─► [concat cond] ─► ... ─► dense ─► h
//                                                                        │
//                               log_dispersion = linear(h) ◄─────────────┤
//                               mu = linear(h) [+ LEAP(mu, gate)] ◄──────┘
//
// Guided variant: the signal path only yields log_dispersion. The
// mean is built from the condition branches:
//
//   mu = Σ_i dense_i(stack_i(cond_i)) ⊙ hard_sigmoid(W · one_hot(i))
//
// Conditioning only ever touches mu, never log_dispersion.

use burn::{
    nn::{Linear, LinearConfig},
    prelude::*,
    tensor::activation::relu,
};

use crate::ml::{
    config::{Conditioning, CvaeConfig},
    layers::{hard_sigmoid, DenseStack},
    leap::LeapBlock,
    sampling::LatentDistribution,
};

/// Condition tensors routed to the encoder.
#[derive(Debug, Clone)]
pub struct EncoderInput<B: Backend> {
    /// [batch, input_dim]
    pub signal:   Tensor<B, 2>,
    /// Drives the LEAP gate (`cond` for LEAP, `tau` for the conditional variants).
    pub gate:     Option<Tensor<B, 2>>,
    /// Concatenated into the input and every hidden layer but the last.
    pub residual: Option<Tensor<B, 2>>,
    /// One tensor per guided branch.
    pub branches: Vec<Tensor<B, 2>>,
}

impl<B: Backend> EncoderInput<B> {
    pub fn signal_only(signal: Tensor<B, 2>) -> Self {
        Self { signal, gate: None, residual: None, branches: Vec::new() }
    }
}

/// One guided condition branch and its class gate.
#[derive(Module, Debug)]
pub struct GuidedBranch<B: Backend> {
    pub hidden: DenseStack<B>,
    pub dense:  Linear<B>,
    pub class_gate: Linear<B>,
    /// Position of this branch in the one-hot class code.
    pub index:  usize,
    pub n_branches: usize,
}

impl<B: Backend> GuidedBranch<B> {
    fn new(
        index:      usize,
        n_branches: usize,
        width:      usize,
        hidden:     &[usize],
        z_dim:      usize,
        device:     &B::Device,
    ) -> Self {
        let (hidden, out) = DenseStack::new(width, hidden, device);
        Self {
            hidden,
            dense: LinearConfig::new(out, z_dim).init(device),
            class_gate: LinearConfig::new(n_branches, z_dim).init(device),
            index,
            n_branches,
        }
    }

    pub fn forward(&self, cond: Tensor<B, 2>) -> Tensor<B, 2> {
        let device = cond.device();
        let correction = self.dense.forward(self.hidden.forward(cond));
        let [batch, z_dim] = correction.dims();

        let mut code = vec![0.0_f32; self.n_branches];
        code[self.index] = 1.0;
        let one_hot = Tensor::<B, 2>::from_data(TensorData::new(code, [1, self.n_branches]), &device);
        let gate = hard_sigmoid(self.class_gate.forward(one_hot)).expand([batch, z_dim]);

        correction * gate
    }
}

#[derive(Module, Debug)]
pub struct Encoder<B: Backend> {
    pub hidden: Vec<Linear<B>>,
    /// Absent for the guided variant, whose mean comes from the branches.
    pub mu_head: Option<Linear<B>>,
    pub log_dispersion_head: Linear<B>,
    pub leap:   Option<LeapBlock<B>>,
    pub guided: Vec<GuidedBranch<B>>,
    pub z_dim:  usize,
    /// Residual condition concatenated into the layers.
    pub conditioned: bool,
}

impl<B: Backend> Encoder<B> {
    pub fn new(config: &CvaeConfig, device: &B::Device) -> Self {
        let cond_width  = config.conditioning.residual_width();
        let conditioned = cond_width > 0;

        let mut width  = config.input_dim + cond_width;
        let mut hidden = Vec::with_capacity(config.e_dims.len());
        for (idx, &out) in config.e_dims.iter().enumerate() {
            hidden.push(LinearConfig::new(width, out).init(device));
            width = out;
            if conditioned && idx + 1 < config.e_dims.len() {
                width += cond_width;
            }
        }

        let log_dispersion_head = LinearConfig::new(width, config.z_dim).init(device);

        let (mu_head, leap, guided) = match &config.conditioning {
            Conditioning::Guided { branches } => {
                let guided = branches
                    .iter()
                    .enumerate()
                    .map(|(i, spec)| {
                        GuidedBranch::new(i, branches.len(), spec.width, &spec.hidden_dims, config.z_dim, device)
                    })
                    .collect();
                (None, None, guided)
            }
            other => {
                let mu_head = LinearConfig::new(width, config.z_dim).init(device);
                let leap = other
                    .gate_width()
                    .map(|gate| LeapBlock::new(config.z_dim, gate, other.leap_dims(), device));
                (Some(mu_head), leap, Vec::new())
            }
        };

        tracing::debug!(
            "Encoder[{}]: input={} cond={} e_dims={:?} z={}",
            config.conditioning.name(), config.input_dim, cond_width, config.e_dims, config.z_dim
        );
        Self { hidden, mu_head, log_dispersion_head, leap, guided, z_dim: config.z_dim, conditioned }
    }

    pub fn forward(&self, input: EncoderInput<B>) -> LatentDistribution<B> {
        let EncoderInput { signal, gate, residual, branches } = input;
        let [batch, _] = signal.dims();
        let device = signal.device();

        let residual = if self.conditioned { residual } else { None };
        let mut h = match &residual {
            Some(cond) => Tensor::cat(vec![signal, cond.clone()], 1),
            None => signal,
        };

        let last = self.hidden.len().saturating_sub(1);
        for (idx, layer) in self.hidden.iter().enumerate() {
            h = relu(layer.forward(h));
            if let (Some(cond), true) = (&residual, idx < last) {
                h = Tensor::cat(vec![h, cond.clone()], 1);
            }
        }

        let log_dispersion = self.log_dispersion_head.forward(h.clone());

        let mu = match &self.mu_head {
            Some(head) => {
                let mu = head.forward(h);
                match (&self.leap, gate) {
                    (Some(leap), Some(gate)) => mu.clone() + leap.forward(mu, gate),
                    _ => mu,
                }
            }
            None => self
                .guided
                .iter()
                .zip(branches)
                .map(|(branch, cond)| branch.forward(cond))
                .reduce(|acc, c| acc + c)
                .unwrap_or_else(|| Tensor::zeros([batch, self.z_dim], &device)),
        };

        LatentDistribution::new(mu, log_dispersion)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ml::config::GuidedBranchSpec;
    use burn::backend::NdArray;

    type TestBackend = NdArray;

    #[test]
    fn test_guided_without_branches_has_zero_mean() {
        let device = Default::default();
        let cfg = CvaeConfig::new(4, 2, Conditioning::Guided { branches: vec![] }).with_e_dims(vec![8]);
        let enc = Encoder::<TestBackend>::new(&cfg, &device);
        assert!(enc.mu_head.is_none());

        let latent = enc.forward(EncoderInput::signal_only(Tensor::ones([3, 4], &device)));
        assert_eq!(latent.dims(), [3, 2]);
        let mu: Vec<f32> = latent.mu.into_data().to_vec().unwrap();
        assert!(mu.iter().all(|&v| v == 0.0));
    }

    #[test]
    fn test_guided_branches_sum_into_mean() {
        let device = Default::default();
        let cfg = CvaeConfig::new(
            4,
            3,
            Conditioning::Guided {
                branches: vec![
                    GuidedBranchSpec { width: 2, hidden_dims: vec![5] },
                    GuidedBranchSpec { width: 1, hidden_dims: vec![] },
                ],
            },
        );
        let enc = Encoder::<TestBackend>::new(&cfg, &device);
        assert_eq!(enc.guided[1].index, 1);

        let input = EncoderInput {
            signal:   Tensor::ones([2, 4], &device),
            gate:     None,
            residual: None,
            branches: vec![Tensor::ones([2, 2], &device), Tensor::ones([2, 1], &device)],
        };
        let expected = enc.guided[0].forward(Tensor::ones([2, 2], &device))
            + enc.guided[1].forward(Tensor::ones([2, 1], &device));
        let latent = enc.forward(input);
        let diff: f32 = (latent.mu - expected).abs().max().into_scalar();
        assert!(diff < 1e-6);
    }

    #[test]
    fn test_conditioned_layer_widths() {
        let device = Default::default();
        let cfg = CvaeConfig::new(
            6,
            2,
            Conditioning::LeapConditional { tau_dim: 2, cond_dim: 3, leap_dims: vec![4] },
        )
        .with_e_dims(vec![10, 5]);
        let enc = Encoder::<TestBackend>::new(&cfg, &device);
        // input + cond, then hidden 10 + cond, last hidden not re-concatenated
        assert_eq!(enc.hidden[0].weight.dims(), [9, 10]);
        assert_eq!(enc.hidden[1].weight.dims(), [13, 5]);
        assert_eq!(enc.log_dispersion_head.weight.dims(), [5, 2]);

        let input = EncoderInput {
            signal:   Tensor::ones([4, 6], &device),
            gate:     Some(Tensor::ones([4, 2], &device)),
            residual: Some(Tensor::ones([4, 3], &device)),
            branches: vec![],
        };
        assert_eq!(enc.forward(input).dims(), [4, 2]);
    }

    #[test]
    fn test_gate_only_changes_the_mean() {
        let device = Default::default();
        let cfg = CvaeConfig::new(4, 2, Conditioning::Leap { cond_dim: 3, leap_dims: vec![3] });
        let enc = Encoder::<TestBackend>::new(&cfg, &device);
        assert!(!enc.conditioned);

        let run = |gate: [f32; 3]| {
            enc.forward(EncoderInput {
                signal:   Tensor::ones([1, 4], &device),
                gate:     Some(Tensor::from_floats([gate], &device)),
                residual: None,
                branches: vec![],
            })
        };
        let a = run([0.0, 0.0, 0.0]);
        let b = run([5.0, -3.0, 2.0]);
        assert_eq!(a.log_dispersion.into_data(), b.log_dispersion.into_data());
    }
}
