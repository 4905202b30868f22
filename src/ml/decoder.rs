// ============================================================
// Layer 5 — Residual Decoder
// ============================================================
// Maps (z, cond) back to the signal. The widths in d_dims are
// traversed in reverse. Each step grows the representation:
//
//   has_skip:  h ← concat(relu(dense(h)), h)
//   no skip:   h ← relu(dense(h))
//
// and a linear head maps the final h to input_dim.
//
// Conditioned variants start from concat(z, cond). With
// embedding_before_latent the last step concatenates the condition
// instead of the full representation, so the embedding sits right
// before the output head.

use burn::{
    nn::{Linear, LinearConfig},
    prelude::*,
    tensor::activation::relu,
};

use crate::ml::config::CvaeConfig;

#[derive(Module, Debug)]
pub struct Decoder<B: Backend> {
    pub steps: Vec<Linear<B>>,
    pub head:  Linear<B>,
    pub has_skip:    bool,
    pub conditioned: bool,
    pub embedding_before_latent: bool,
}

impl<B: Backend> Decoder<B> {
    pub fn new(config: &CvaeConfig, device: &B::Device) -> Self {
        let cond_width  = config.conditioning.residual_width();
        let conditioned = cond_width > 0;
        let condition_last = conditioned && config.embedding_before_latent;

        let mut width = config.z_dim + cond_width;
        let n_steps   = config.d_dims.len();
        let mut steps = Vec::with_capacity(n_steps);
        for (idx, &out) in config.d_dims.iter().rev().enumerate() {
            steps.push(LinearConfig::new(width, out).init(device));
            width = if condition_last && idx + 1 == n_steps {
                out + cond_width
            } else if config.has_skip {
                out + width
            } else {
                out
            };
        }
        let head = LinearConfig::new(width, config.input_dim).init(device);

        tracing::debug!(
            "Decoder: z={} cond={} d_dims(rev)={:?} skip={} head_in={}",
            config.z_dim, cond_width, config.d_dims.iter().rev().collect::<Vec<_>>(),
            config.has_skip, width
        );
        Self {
            steps,
            head,
            has_skip: config.has_skip,
            conditioned,
            embedding_before_latent: condition_last,
        }
    }

    /// `cond` is ignored by an unconditioned decoder.
    pub fn forward(&self, z: Tensor<B, 2>, cond: Option<Tensor<B, 2>>) -> Tensor<B, 2> {
        let cond = if self.conditioned { cond } else { None };
        let mut h = match &cond {
            Some(c) => Tensor::cat(vec![z, c.clone()], 1),
            None => z,
        };

        let last = self.steps.len().saturating_sub(1);
        for (idx, step) in self.steps.iter().enumerate() {
            let dense = relu(step.forward(h.clone()));
            h = match (&cond, self.embedding_before_latent && idx == last) {
                (Some(c), true) => Tensor::cat(vec![dense, c.clone()], 1),
                _ if self.has_skip => Tensor::cat(vec![dense, h], 1),
                _ => dense,
            };
        }
        self.head.forward(h)
    }
}
