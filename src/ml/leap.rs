// ============================================================
// Layer 5 — LEAP Conditioning Block
// ============================================================
// Produces an additive correction to the latent mean. The
// condition enters through a learned multiplicative gate:
//
//   mu ─► dense stack (leap_dims) ─► tau = relu(W·h)   (no bias)
//                                          │
//                     condition ─────────► ⊙  gated
//                                          │
//             reverse dense stack (leap_dims reversed)
//                                          │
//                                 linear ─► correction [batch, z_dim]
//
// With a zero condition the gate closes completely and the
// correction no longer depends on mu.

use burn::{
    nn::{Linear, LinearConfig},
    prelude::*,
    tensor::activation::relu,
};

use crate::ml::layers::DenseStack;

#[derive(Module, Debug)]
pub struct LeapBlock<B: Backend> {
    pub encode: DenseStack<B>,
    pub gate:   Linear<B>,
    pub expand: DenseStack<B>,
    pub head:   Linear<B>,
}

impl<B: Backend> LeapBlock<B> {
    pub fn new(z_dim: usize, gate_dim: usize, leap_dims: &[usize], device: &B::Device) -> Self {
        let (encode, width) = DenseStack::new(z_dim, leap_dims, device);
        let gate = LinearConfig::new(width, gate_dim).with_bias(false).init(device);

        let reversed: Vec<usize> = leap_dims.iter().rev().copied().collect();
        let (expand, width) = DenseStack::new(gate_dim, &reversed, device);
        let head = LinearConfig::new(width, z_dim).init(device);

        tracing::debug!("LEAP block: z={z_dim} gate={gate_dim} bottleneck={leap_dims:?}");
        Self { encode, gate, expand, head }
    }

    pub fn forward(&self, mu: Tensor<B, 2>, condition: Tensor<B, 2>) -> Tensor<B, 2> {
        let tau   = relu(self.gate.forward(self.encode.forward(mu)));
        let gated = tau * condition;
        self.head.forward(self.expand.forward(gated))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;

    type TestBackend = NdArray;

    #[test]
    fn test_correction_has_latent_shape() {
        let device = Default::default();
        let block  = LeapBlock::<TestBackend>::new(2, 5, &[3], &device);
        let out = block.forward(Tensor::ones([4, 2], &device), Tensor::ones([4, 5], &device));
        assert_eq!(out.dims(), [4, 2]);
    }

    #[test]
    fn test_zero_condition_closes_the_gate() {
        let device = Default::default();
        let block  = LeapBlock::<TestBackend>::new(2, 3, &[4, 3], &device);
        let zeros  = Tensor::<TestBackend, 2>::zeros([2, 3], &device);

        let mu_a = Tensor::<TestBackend, 2>::from_floats([[0.1, -2.0], [3.0, 0.5]], &device);
        let mu_b = Tensor::<TestBackend, 2>::from_floats([[5.0, 1.0], [-1.0, 0.0]], &device);

        let a = block.forward(mu_a, zeros.clone()).into_data();
        let b = block.forward(mu_b, zeros).into_data();
        assert_eq!(a, b);
    }

    #[test]
    fn test_gate_has_no_bias() {
        let device = Default::default();
        let block  = LeapBlock::<TestBackend>::new(2, 3, &[], &device);
        assert!(block.gate.bias.is_none());
        assert!(block.head.bias.is_some());
    }
}
