// ============================================================
// Layer 5 — Composed CVAE
// ============================================================
// Wires the sub-graphs into one module:
//
//   conditions ─► routing ─┬─► encoder(signal, gate, residual) ─► (mu, lv)
//                          │                                        │
//                          │                           sampling layer (noise)
//                          │                                        │
//                          └─► decoder condition ─► decoder(z, cond) ─► x̂
//
// Routing per conditioning scheme (conditions in layout order):
//   Guided          cond_1..cond_n → guided branches; decoder unconditioned
//   Leap            cond → LEAP gate; decoder unconditioned
//   LeapConditional tau → LEAP gate, cond → encoder layers and decoder
//   LeapEmbedding   tau → LEAP gate,
//                   [cond_pre, embedding(emb_*)] → encoder layers and decoder
//
// With a shared embedding only `embedding_enc` exists and the
// decoder reads through it.

use burn::{module::Ignored, prelude::*};

use crate::domain::prior::Prior;
use crate::error::ConfigError;
use crate::ml::{
    config::{Conditioning, CvaeConfig},
    decoder::Decoder,
    embedding::ConditionEmbedding,
    encoder::{Encoder, EncoderInput},
    sampling::{prior_sample, reparameterize, LatentDistribution, LatentNoise},
};

/// Model inputs: the signal plus every condition slot, in layout order.
#[derive(Debug, Clone)]
pub struct CvaeInputs<B: Backend> {
    pub signal:     Tensor<B, 2>,
    pub conditions: Vec<Tensor<B, 2>>,
}

/// Everything one forward pass produces.
#[derive(Debug, Clone)]
pub struct CvaeOutput<B: Backend> {
    pub reconstruction: Tensor<B, 2>,
    pub latent: LatentDistribution<B>,
    pub z:      Tensor<B, 2>,
}

#[derive(Module, Debug)]
pub struct Cvae<B: Backend> {
    pub encoder: Encoder<B>,
    pub decoder: Decoder<B>,
    pub embedding_enc: Option<ConditionEmbedding<B>>,
    /// Present only when the embedding is not shared.
    pub embedding_dec: Option<ConditionEmbedding<B>>,
    pub conditioning:  Ignored<Conditioning>,
    pub prior:         Ignored<Prior>,
    pub anisotropic:   Ignored<Option<Vec<f32>>>,
    pub z_dim:         usize,
}

impl CvaeConfig {
    /// Validate, then build every sub-graph.
    pub fn init<B: Backend>(&self, device: &B::Device) -> Result<Cvae<B>, ConfigError> {
        self.validate()?;

        let encoder = Encoder::new(self, device);
        let decoder = Decoder::new(self, device);

        let (embedding_enc, embedding_dec) = match self.conditioning.embedding() {
            Some(spec) => {
                let enc = ConditionEmbedding::new(spec, self.batch_norm, device);
                let dec = (!spec.shared).then(|| ConditionEmbedding::new(spec, self.batch_norm, device));
                (Some(enc), dec)
            }
            None => (None, None),
        };

        tracing::info!(
            "CVAE built: variant={} prior={} input={} z={} embedding={}",
            self.conditioning.name(),
            self.prior,
            self.input_dim,
            self.z_dim,
            match (&embedding_enc, &embedding_dec) {
                (None, _)          => "none",
                (Some(_), None)    => "shared",
                (Some(_), Some(_)) => "split",
            }
        );

        Ok(Cvae {
            encoder,
            decoder,
            embedding_enc,
            embedding_dec,
            conditioning: Ignored(self.conditioning.clone()),
            prior:        Ignored(self.prior),
            anisotropic:  Ignored(self.anisotropic_prior.clone()),
            z_dim:        self.z_dim,
        })
    }
}

impl<B: Backend> Cvae<B> {
    pub fn prior(&self) -> Prior {
        self.prior.0
    }

    /// Fresh latent noise for every call.
    pub fn forward(&self, inputs: CvaeInputs<B>) -> CvaeOutput<B> {
        let [batch, _] = inputs.signal.dims();
        let noise = LatentNoise::draw(self.prior.0, [batch, self.z_dim], &inputs.signal.device());
        self.forward_with_noise(inputs, noise)
    }

    /// Forward pass with a caller-supplied noise draw.
    pub fn forward_with_noise(&self, inputs: CvaeInputs<B>, noise: LatentNoise<B>) -> CvaeOutput<B> {
        let (enc_input, dec_cond) = self.route(inputs);
        let latent = self.encoder.forward(enc_input);
        let z = reparameterize(&latent, noise);
        let reconstruction = self.decoder.forward(z.clone(), dec_cond);
        CvaeOutput { reconstruction, latent, z }
    }

    pub fn encode(&self, inputs: CvaeInputs<B>) -> LatentDistribution<B> {
        let (enc_input, _) = self.route(inputs);
        self.encoder.forward(enc_input)
    }

    /// `conditions` are the full condition slots, in layout order; the
    /// decoder picks what it needs. An embedding model must receive its
    /// `emb_*` slots, otherwise the decoder sees a narrower condition.
    pub fn decode(&self, z: Tensor<B, 2>, conditions: Vec<Tensor<B, 2>>) -> Tensor<B, 2> {
        let cond = self.decoder_condition(conditions);
        self.decoder.forward(z, cond)
    }

    /// Decode the latent mean, no sampling.
    pub fn reconstruct_mean(&self, inputs: CvaeInputs<B>) -> Tensor<B, 2> {
        let (enc_input, dec_cond) = self.route(inputs);
        let latent = self.encoder.forward(enc_input);
        self.decoder.forward(latent.mu, dec_cond)
    }

    /// Draw `n` latents from the prior and decode them under `conditions`
    /// (each condition tensor with `n` rows; empty for unconditioned decoders).
    /// Same slot requirements as [`Cvae::decode`].
    pub fn generate(&self, n: usize, conditions: Vec<Tensor<B, 2>>, device: &B::Device) -> Tensor<B, 2> {
        let z = prior_sample(self.prior.0, self.anisotropic.0.as_deref(), n, self.z_dim, device);
        self.decode(z, conditions)
    }

    // ── Routing ──────────────────────────────────────────────────────────────

    fn route(&self, inputs: CvaeInputs<B>) -> (EncoderInput<B>, Option<Tensor<B, 2>>) {
        let CvaeInputs { signal, conditions } = inputs;
        let mut slots = conditions.into_iter();

        match &self.conditioning.0 {
            Conditioning::Guided { .. } => {
                let branches = slots.collect();
                (EncoderInput { signal, gate: None, residual: None, branches }, None)
            }
            Conditioning::Leap { .. } => {
                let gate = slots.next();
                (EncoderInput { signal, gate, residual: None, branches: Vec::new() }, None)
            }
            Conditioning::LeapConditional { .. } => {
                let gate = slots.next();
                let cond = slots.next();
                let input = EncoderInput { signal, gate, residual: cond.clone(), branches: Vec::new() };
                (input, cond)
            }
            Conditioning::LeapEmbedding { cond_pre_dim, .. } => {
                let gate = slots.next();
                let pre  = if *cond_pre_dim > 0 { slots.next() } else { None };
                let emb_inputs: Vec<Tensor<B, 2>> = slots.collect();

                let enc_cond = embedded_condition(pre.clone(), &emb_inputs, self.embedding_enc.as_ref());
                let dec_cond = match &self.embedding_dec {
                    Some(split) => embedded_condition(pre, &emb_inputs, Some(split)),
                    None => enc_cond.clone(),
                };
                let input = EncoderInput { signal, gate, residual: enc_cond, branches: Vec::new() };
                (input, dec_cond)
            }
        }
    }

    fn decoder_condition(&self, conditions: Vec<Tensor<B, 2>>) -> Option<Tensor<B, 2>> {
        let mut slots = conditions.into_iter();
        match &self.conditioning.0 {
            Conditioning::Guided { .. } | Conditioning::Leap { .. } => None,
            Conditioning::LeapConditional { .. } => slots.nth(1),
            Conditioning::LeapEmbedding { cond_pre_dim, .. } => {
                let _tau = slots.next();
                let pre  = if *cond_pre_dim > 0 { slots.next() } else { None };
                let emb_inputs: Vec<Tensor<B, 2>> = slots.collect();
                let embedding = self.embedding_dec.as_ref().or(self.embedding_enc.as_ref());
                embedded_condition(pre, &emb_inputs, embedding)
            }
        }
    }
}

/// `concat(cond_pre, embedding(emb_inputs))`, either part optional.
fn embedded_condition<B: Backend>(
    pre:        Option<Tensor<B, 2>>,
    emb_inputs: &[Tensor<B, 2>],
    embedding:  Option<&ConditionEmbedding<B>>,
) -> Option<Tensor<B, 2>> {
    let mut parts: Vec<Tensor<B, 2>> = pre.into_iter().collect();
    if let Some(embedded) = embedding.and_then(|e| e.forward(emb_inputs)) {
        parts.push(embedded);
    }
    match parts.len() {
        0 => None,
        1 => parts.pop(),
        _ => Some(Tensor::cat(parts, 1)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ml::config::{EmbeddingSpec, GuidedBranchSpec};
    use burn::backend::NdArray;

    type TestBackend = NdArray;

    fn embedding_config(shared: bool) -> CvaeConfig {
        CvaeConfig::new(
            6,
            2,
            Conditioning::LeapEmbedding {
                tau_dim:      2,
                cond_pre_dim: 1,
                leap_dims:    vec![3],
                embedding: EmbeddingSpec {
                    input_dims:     vec![4, 3],
                    branch_dims:    vec![vec![5], vec![]],
                    reduction_dims: vec![3],
                    shared,
                },
            },
        )
        .with_e_dims(vec![8, 6])
        .with_d_dims(vec![6, 8])
        .with_batch_norm(crate::domain::options::BatchNormLevel::None)
    }

    fn embedding_inputs(batch: usize) -> CvaeInputs<TestBackend> {
        let device = Default::default();
        CvaeInputs {
            signal: Tensor::ones([batch, 6], &device),
            conditions: vec![
                Tensor::ones([batch, 2], &device),
                Tensor::ones([batch, 1], &device),
                Tensor::ones([batch, 4], &device),
                Tensor::ones([batch, 3], &device),
            ],
        }
    }

    #[test]
    fn test_invalid_config_is_not_built() {
        let device = Default::default();
        let cfg = CvaeConfig::new(0, 2, Conditioning::Guided { branches: vec![] });
        assert!(cfg.init::<TestBackend>(&device).is_err());
    }

    #[test]
    fn test_shared_embedding_has_no_decoder_copy() {
        let device = Default::default();
        let shared = embedding_config(true).init::<TestBackend>(&device).unwrap();
        assert!(shared.embedding_enc.is_some());
        assert!(shared.embedding_dec.is_none());

        let split = embedding_config(false).init::<TestBackend>(&device).unwrap();
        assert!(split.embedding_dec.is_some());
    }

    #[test]
    fn test_embedding_forward_shapes() {
        let device = Default::default();
        let model = embedding_config(false).init::<TestBackend>(&device).unwrap();
        let out = model.forward(embedding_inputs(3));
        assert_eq!(out.reconstruction.dims(), [3, 6]);
        assert_eq!(out.latent.dims(), [3, 2]);
        assert_eq!(out.z.dims(), [3, 2]);
    }

    #[test]
    fn test_fixed_noise_forward_is_repeatable() {
        let device = Default::default();
        let model = embedding_config(true).init::<TestBackend>(&device).unwrap();
        let noise = LatentNoise::draw(Prior::Gaussian, [2, 2], &device);
        let a = model.forward_with_noise(embedding_inputs(2), noise.clone()).reconstruction;
        let b = model.forward_with_noise(embedding_inputs(2), noise).reconstruction;
        assert_eq!(a.into_data(), b.into_data());
    }

    #[test]
    fn test_reconstruct_mean_matches_decode_of_mu() {
        let device = Default::default();
        let model = embedding_config(false).init::<TestBackend>(&device).unwrap();
        let inputs = embedding_inputs(2);
        let mu = model.encode(inputs.clone()).mu;
        let via_decode = model.decode(mu, inputs.conditions.clone());
        let direct = model.reconstruct_mean(inputs);
        assert_eq!(via_decode.into_data(), direct.into_data());
    }

    #[test]
    fn test_generate_unconditioned() {
        let device = Default::default();
        let cfg = CvaeConfig::new(
            4,
            2,
            Conditioning::Guided { branches: vec![GuidedBranchSpec { width: 1, hidden_dims: vec![] }] },
        )
        .with_prior(Prior::Laplace)
        .with_anisotropic_prior(Some(vec![0.0, -1.0]));
        let model = cfg.init::<TestBackend>(&device).unwrap();
        assert_eq!(model.generate(5, vec![], &device).dims(), [5, 4]);
    }
}
