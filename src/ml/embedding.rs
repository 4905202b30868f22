// ============================================================
// Layer 5 — Condition Embedding
// ============================================================
// Maps one or more raw condition tensors (e.g. temperature
// profiles of different widths) to one low-dimensional
// conditioning vector.
//
//   emb_0 ─► branch 0 ─┐
//   emb_1 ─► branch 1 ─┼─► concat ─► reduction steps ─► embedding
//   ...                ┘
//
// Branch:    dense+relu ... dense ─► [batch norm] ─► relu
//            (no widths: a single linear layer at the raw width)
// Reduction: dense ─► [batch norm] ─► relu, per step
//
// The encoder and decoder either share one instance or each get
// their own; that is decided by the model, not here.

use burn::{
    nn::{BatchNorm, BatchNormConfig, Linear, LinearConfig},
    prelude::*,
    tensor::activation::relu,
};

use crate::domain::options::BatchNormLevel;
use crate::ml::config::EmbeddingSpec;

/// Batch normalisation over the feature axis of a [batch, features] tensor.
pub type FeatureNorm<B> = BatchNorm<B, 0>;

#[derive(Module, Debug)]
pub struct EmbeddingBranch<B: Backend> {
    pub layers: Vec<Linear<B>>,
    pub norm:   Option<FeatureNorm<B>>,
    /// False for the single linear layer of a branch without widths.
    pub activate_last: bool,
}

impl<B: Backend> EmbeddingBranch<B> {
    fn new(input: usize, widths: &[usize], norm_last: bool, device: &B::Device) -> (Self, usize) {
        if widths.is_empty() {
            let layers = vec![LinearConfig::new(input, input).init(device)];
            return (Self { layers, norm: None, activate_last: false }, input);
        }

        let mut width  = input;
        let mut layers = Vec::with_capacity(widths.len());
        for &out in widths {
            layers.push(LinearConfig::new(width, out).init(device));
            width = out;
        }
        let norm = norm_last.then(|| BatchNormConfig::new(width).init(device));
        (Self { layers, norm, activate_last: true }, width)
    }

    pub fn forward(&self, x: Tensor<B, 2>) -> Tensor<B, 2> {
        let last = self.layers.len() - 1;
        let mut h = x;
        for (idx, layer) in self.layers.iter().enumerate() {
            h = layer.forward(h);
            if idx < last {
                h = relu(h);
            }
        }
        if let Some(norm) = &self.norm {
            h = norm.forward(h);
        }
        if self.activate_last {
            h = relu(h);
        }
        h
    }
}

#[derive(Module, Debug)]
pub struct ReductionStep<B: Backend> {
    pub linear: Linear<B>,
    pub norm:   Option<FeatureNorm<B>>,
}

impl<B: Backend> ReductionStep<B> {
    pub fn forward(&self, x: Tensor<B, 2>) -> Tensor<B, 2> {
        let h = self.linear.forward(x);
        let h = match &self.norm {
            Some(norm) => norm.forward(h),
            None => h,
        };
        relu(h)
    }
}

#[derive(Module, Debug)]
pub struct ConditionEmbedding<B: Backend> {
    pub branches:  Vec<EmbeddingBranch<B>>,
    pub reduction: Vec<ReductionStep<B>>,
}

impl<B: Backend> ConditionEmbedding<B> {
    /// `spec` must already be validated (branch count matches input count).
    pub fn new(spec: &EmbeddingSpec, batch_norm: BatchNormLevel, device: &B::Device) -> Self {
        let mut concat_width = 0;
        let branches = spec
            .input_dims
            .iter()
            .zip(&spec.branch_dims)
            .map(|(&input, widths)| {
                let (branch, out) = EmbeddingBranch::new(input, widths, batch_norm.on_branches(), device);
                concat_width += out;
                branch
            })
            .collect();

        let mut width = concat_width;
        let reduction = spec
            .reduction_dims
            .iter()
            .map(|&out| {
                let step = ReductionStep {
                    linear: LinearConfig::new(width, out).init(device),
                    norm:   batch_norm.on_reduction().then(|| BatchNormConfig::new(out).init(device)),
                };
                width = out;
                step
            })
            .collect();

        tracing::debug!(
            "Embedding: inputs={:?} concat={} reduction={:?}",
            spec.input_dims, concat_width, spec.reduction_dims
        );
        Self { branches, reduction }
    }

    /// `inputs[j]` feeds branch `j`. `None` unless there is exactly
    /// one input per branch.
    pub fn forward(&self, inputs: &[Tensor<B, 2>]) -> Option<Tensor<B, 2>> {
        if inputs.is_empty() || inputs.len() != self.branches.len() {
            return None;
        }
        let mut outputs: Vec<Tensor<B, 2>> = self
            .branches
            .iter()
            .zip(inputs)
            .map(|(branch, x)| branch.forward(x.clone()))
            .collect();

        let joined = match outputs.len() {
            1 => outputs.pop()?,
            _ => Tensor::cat(outputs, 1),
        };
        Some(self.reduction.iter().fold(joined, |h, step| step.forward(h)))
    }
}
