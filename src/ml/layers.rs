// ============================================================
// Layer 5 — Shared Layer Helpers
// ============================================================
// Building blocks reused by every sub-network: a stack of dense
// ReLU layers and the piecewise-linear hard sigmoid.

use burn::{
    nn::{Linear, LinearConfig},
    prelude::*,
    tensor::activation::relu,
};

/// Dense layers applied in order, each followed by ReLU.
#[derive(Module, Debug)]
pub struct DenseStack<B: Backend> {
    pub layers: Vec<Linear<B>>,
}

impl<B: Backend> DenseStack<B> {
    /// Build layers `input → widths[0] → widths[1] → ...`.
    /// Returns the stack and its output width (`input` when empty).
    pub fn new(input: usize, widths: &[usize], device: &B::Device) -> (Self, usize) {
        let mut width  = input;
        let mut layers = Vec::with_capacity(widths.len());
        for &out in widths {
            layers.push(LinearConfig::new(width, out).init(device));
            width = out;
        }
        (Self { layers }, width)
    }

    pub fn forward(&self, x: Tensor<B, 2>) -> Tensor<B, 2> {
        self.layers.iter().fold(x, |h, layer| relu(layer.forward(h)))
    }

    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }
}

/// `clamp(0.2 * x + 0.5, 0, 1)`
pub fn hard_sigmoid<B: Backend, const D: usize>(x: Tensor<B, D>) -> Tensor<B, D> {
    x.mul_scalar(0.2).add_scalar(0.5).clamp(0.0, 1.0)
}
