// ============================================================
// Layer 5 — Trainable Graph and Training Loop
// ============================================================
// CvaeTrainer owns everything that changes during training:
// the model, the mutable loss weights, the set of frozen
// sub-graphs and the Adam optimiser.
//
// One step:
//   forward (fresh noise) → LossTerms → weighted total
//   → backward → GradientsParams
//   → drop gradients of frozen sub-graphs
//   → Adam step
//
// Frozen parameters have no gradient when Adam runs, so they are
// left bit-identical. Batch-norm statistics of a frozen embedding
// are restored after the step. freeze/unfreeze recompile: the
// optimiser is rebuilt from the config (fresh moments, same
// learning rate).
//
// Batches come from Burn's DataLoader: shuffled with the fit seed
// for training, in row order on the inner backend for validation.
//
// The graph is eager, so update_loss_weight only has to change
// the number used for the next weighted total.
//
// Adam:
//   m = β1*m + (1-β1)*g        (mean)
//   v = β2*v + (1-β2)*g²       (variance)
//   θ = θ - lr * m / (√v + ε)  (update)
//
// Reference: Burn Book §5, Kingma & Ba (2015) Adam

use burn::{
    data::{dataloader::DataLoader, dataset::Dataset},
    grad_clipping::GradientClippingConfig,
    module::{AutodiffModule, ModuleVisitor, ParamId},
    optim::{adaptor::OptimizerAdaptor, Adam, AdamConfig, GradientsParams, Optimizer},
    prelude::*,
    tensor::backend::AutodiffBackend,
};
use std::{collections::BTreeSet, path::Path};

use crate::data::{
    batcher::{CvaeBatch, CvaeBatcher},
    dataset::{CvaeDataset, CvaeSample},
    splitter::split_tail,
};
use crate::domain::subgraph::SubGraph;
use crate::error::{ConfigError, CvaeError, CvaeResult, DataError};
use crate::infra::{
    checkpoint::{CheckpointManager, WeightSnapshot},
    history::LossHistory,
};
use crate::ml::{
    callbacks::{EpochCallback, EpochControl, EpochSummary},
    config::CvaeConfig,
    loss::{LossComposer, LossWeights, StepLosses},
    embedding::ConditionEmbedding,
    model::{Cvae, CvaeInputs},
    sampling::LatentNoise,
};

type CvaeOptimizer<B> = OptimizerAdaptor<Adam, Cvae<B>, B>;
type EmbeddingRecord<B> = <ConditionEmbedding<B> as Module<B>>::Record;
type ValidationLoader<B> = dyn DataLoader<B, CvaeBatch<B>>;

/// Records of the frozen embeddings taken before a step.
struct PinnedEmbeddings<B: Backend> {
    enc: Option<EmbeddingRecord<B>>,
    dec: Option<EmbeddingRecord<B>>,
}

/// Where validation losses come from.
#[derive(Debug, Clone)]
pub enum Validation {
    None,
    /// The trailing fraction of the training samples, not shuffled in.
    Split(f64),
    Data(CvaeDataset),
}

#[derive(Debug, Clone)]
pub struct FitOptions {
    pub epochs:       usize,
    pub batch_size:   usize,
    pub validation:   Validation,
    pub shuffle_seed: u64,
}

impl Default for FitOptions {
    fn default() -> Self {
        Self { epochs: 100, batch_size: 100, validation: Validation::None, shuffle_seed: 42 }
    }
}

pub struct CvaeTrainer<B: AutodiffBackend> {
    name:     String,
    config:   CvaeConfig,
    model:    Cvae<B>,
    composer: LossComposer,
    weights:  LossWeights,
    frozen:   BTreeSet<SubGraph>,
    optim:    CvaeOptimizer<B>,
    device:   B::Device,
}

impl<B: AutodiffBackend> CvaeTrainer<B> {
    pub fn new(name: impl Into<String>, config: CvaeConfig, device: B::Device) -> CvaeResult<Self> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(ConfigError::MissingName.into());
        }

        let model    = config.init::<B>(&device)?;
        let composer = LossComposer::from_config(&config);
        let weights  = config.loss_weights();
        let optim    = build_optimizer::<B>(&config);

        tracing::info!(
            "Trainer '{}' ready: alpha={} beta={} gamma={} lr={}",
            name, weights.alpha, weights.beta, weights.gamma, config.lr
        );
        Ok(Self {
            name,
            config,
            model,
            composer,
            weights,
            frozen: BTreeSet::new(),
            optim,
            device,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &CvaeConfig {
        &self.config
    }

    pub fn model(&self) -> &Cvae<B> {
        &self.model
    }

    pub fn composer(&self) -> &LossComposer {
        &self.composer
    }

    pub fn weights(&self) -> &LossWeights {
        &self.weights
    }

    pub fn frozen(&self) -> impl Iterator<Item = SubGraph> + '_ {
        self.frozen.iter().copied()
    }

    pub fn device(&self) -> &B::Device {
        &self.device
    }

    /// `embedding_dec` exists whenever an embedding does (shared or not).
    pub fn has_subgraph(&self, subgraph: SubGraph) -> bool {
        match subgraph {
            SubGraph::Cvae | SubGraph::Encoder | SubGraph::Decoder => true,
            SubGraph::EmbeddingEnc | SubGraph::EmbeddingDec => self.model.embedding_enc.is_some(),
        }
    }

    // ── Compile / freeze ─────────────────────────────────────────────────────

    /// Rebuild the optimiser. Moments restart from zero.
    pub fn compile(&mut self) {
        self.optim = build_optimizer::<B>(&self.config);
        tracing::info!(
            "Compiled '{}': lr={} frozen={:?}",
            self.name,
            self.config.lr,
            self.frozen.iter().map(SubGraph::name).collect::<Vec<_>>()
        );
    }

    pub fn freeze(&mut self, subgraphs: &[SubGraph]) -> CvaeResult<()> {
        for &sg in subgraphs {
            self.require(sg)?;
        }
        self.frozen.extend(subgraphs.iter().copied());
        self.compile();
        Ok(())
    }

    pub fn unfreeze(&mut self, subgraphs: &[SubGraph]) -> CvaeResult<()> {
        for sg in subgraphs {
            self.require(*sg)?;
            self.frozen.remove(sg);
        }
        self.compile();
        Ok(())
    }

    /// Change the KL weight used from the next step on.
    pub fn update_loss_weight(&mut self, beta: f64) -> CvaeResult<()> {
        if !beta.is_finite() || beta < 0.0 {
            return Err(ConfigError::InvalidLossWeight { name: "beta", value: beta }.into());
        }
        tracing::debug!("KL weight {} → {}", self.weights.beta, beta);
        self.weights.beta = beta;
        Ok(())
    }

    fn require(&self, subgraph: SubGraph) -> CvaeResult<()> {
        if self.has_subgraph(subgraph) {
            Ok(())
        } else {
            Err(CvaeError::MissingSubGraph(subgraph))
        }
    }

    // ── Steps ────────────────────────────────────────────────────────────────

    /// One optimiser step on one batch. Returns the losses before the update.
    pub fn train_step(&mut self, batch: CvaeBatch<B>) -> StepLosses {
        let pinned = self.pin_frozen_embeddings();
        let CvaeBatch { signal, conditions, target } = batch;
        let output = self.model.forward(CvaeInputs { signal, conditions });
        let terms  = self.composer.compose(&output, target);

        let losses = terms.summarize(&self.weights);
        if !losses.is_finite() {
            tracing::warn!(
                "Non-finite loss in '{}': total={} reconstruction={} kl={} info={:?}",
                self.name, losses.total, losses.reconstruction, losses.kl, losses.info
            );
        }

        let grads = terms.weighted_total(&self.weights).backward();
        let mut grads = GradientsParams::from_grads(grads, &self.model);
        self.strip_frozen(&mut grads);
        self.model = self.optim.step(self.config.lr, self.model.clone(), grads);
        self.restore_embeddings(pinned);
        losses
    }

    /// Losses of one batch under a fixed noise draw, without updating anything.
    pub fn measure(&self, batch: CvaeBatch<B>, noise: LatentNoise<B>) -> StepLosses {
        let CvaeBatch { signal, conditions, target } = batch;
        let output = self.model.forward_with_noise(CvaeInputs { signal, conditions }, noise);
        self.composer.compose(&output, target).summarize(&self.weights)
    }

    fn strip_frozen(&self, grads: &mut GradientsParams) {
        if self.frozen.is_empty() {
            return;
        }
        let mut stripper = GradientStripper { grads, removed: 0 };
        for sg in &self.frozen {
            match sg {
                SubGraph::Cvae    => self.model.visit(&mut stripper),
                SubGraph::Encoder => self.model.encoder.visit(&mut stripper),
                SubGraph::Decoder => self.model.decoder.visit(&mut stripper),
                SubGraph::EmbeddingEnc => {
                    if let Some(e) = &self.model.embedding_enc {
                        e.visit(&mut stripper);
                    }
                }
                SubGraph::EmbeddingDec => {
                    if let Some(e) = self.model.embedding_dec.as_ref().or(self.model.embedding_enc.as_ref()) {
                        e.visit(&mut stripper);
                    }
                }
            }
        }
        tracing::trace!("Dropped {} frozen gradients", stripper.removed);
    }

    /// A training forward updates batch-norm running statistics even
    /// without gradients; frozen embeddings get theirs back afterwards.
    fn pin_frozen_embeddings(&self) -> PinnedEmbeddings<B> {
        let none = PinnedEmbeddings { enc: None, dec: None };
        if self.frozen.is_empty() || !self.config.batch_norm.on_reduction() {
            return none;
        }
        let whole  = self.frozen.contains(&SubGraph::Cvae);
        let shared = self.model.embedding_dec.is_none();
        let enc_frozen = whole
            || self.frozen.contains(&SubGraph::EmbeddingEnc)
            || (shared && self.frozen.contains(&SubGraph::EmbeddingDec));
        let dec_frozen = whole || self.frozen.contains(&SubGraph::EmbeddingDec);

        let record = |frozen: bool, e: &Option<ConditionEmbedding<B>>| {
            e.as_ref().filter(|_| frozen).map(|e| e.clone().into_record())
        };
        PinnedEmbeddings {
            enc: record(enc_frozen, &self.model.embedding_enc),
            dec: record(dec_frozen, &self.model.embedding_dec),
        }
    }

    fn restore_embeddings(&mut self, pinned: PinnedEmbeddings<B>) {
        if let Some(record) = pinned.enc {
            self.model.embedding_enc = self.model.embedding_enc.take().map(|e| e.load_record(record));
        }
        if let Some(record) = pinned.dec {
            self.model.embedding_dec = self.model.embedding_dec.take().map(|e| e.load_record(record));
        }
    }

    /// Sample-weighted mean losses over `dataset`, on the inference backend.
    pub fn evaluate(&self, dataset: &CvaeDataset, batch_size: usize) -> CvaeResult<StepLosses> {
        self.check_dataset(dataset)?;
        if batch_size == 0 {
            return Err(DataError::ZeroBatchSize.into());
        }
        let loader = CvaeBatcher::<B::InnerBackend>::new(self.device.clone())
            .loader(dataset.clone(), batch_size, None);
        Ok(self.mean_losses(loader.as_ref()))
    }

    fn mean_losses(&self, loader: &ValidationLoader<B::InnerBackend>) -> StepLosses {
        // model.valid() → Cvae<InnerBackend>, no graph is recorded
        let model    = self.model.valid();
        let mut acc  = StepLosses::default();
        let mut seen = 0usize;
        for batch in loader.iter() {
            let n = batch.size();
            let CvaeBatch { signal, conditions, target } = batch;
            let output = model.forward(CvaeInputs { signal, conditions });
            let terms  = self.composer.compose(&output, target);
            acc.accumulate(&terms.summarize(&self.weights), n as f64);
            seen += n;
        }
        acc.scaled(1.0 / seen.max(1) as f64)
    }

    // ── Training loop ────────────────────────────────────────────────────────

    pub fn train(
        &mut self,
        dataset:   &CvaeDataset,
        options:   &FitOptions,
        callbacks: &mut [&mut dyn EpochCallback],
    ) -> CvaeResult<LossHistory> {
        self.check_dataset(dataset)?;
        if options.batch_size == 0 {
            return Err(DataError::ZeroBatchSize.into());
        }

        let layout = dataset.layout().clone();
        let (train_samples, val_set): (Vec<CvaeSample>, Option<CvaeDataset>) = match &options.validation {
            Validation::None => (dataset.samples().to_vec(), None),
            Validation::Split(fraction) => {
                let (train, val) = split_tail(dataset.samples().to_vec(), *fraction);
                let val = (!val.is_empty()).then(|| CvaeDataset::new(layout.clone(), val));
                (train, val)
            }
            Validation::Data(val) => {
                self.check_dataset(val)?;
                (dataset.samples().to_vec(), Some(val.clone()))
            }
        };
        if train_samples.is_empty() {
            return Err(DataError::EmptyDataset.into());
        }

        let train_set = CvaeDataset::new(layout, train_samples);
        let n_train   = train_set.len();
        let mut history = LossHistory::new();

        tracing::info!(
            "--- START TRAINING '{}' --- {} samples, {} validation, {} epochs, batch {}",
            self.name,
            n_train,
            val_set.as_ref().map_or(0, CvaeDataset::sample_count),
            options.epochs,
            options.batch_size
        );

        // ── Training data loader (AutodiffBackend) ───────────────────────────
        let train_loader = CvaeBatcher::<B>::new(self.device.clone())
            .loader(train_set, options.batch_size, Some(options.shuffle_seed));

        // ── Validation data loader (InnerBackend, no autodiff overhead) ──────
        let val_loader = val_set.map(|val| {
            CvaeBatcher::<B::InnerBackend>::new(self.device.clone())
                .loader(val, options.batch_size, None)
        });

        for epoch in 1..=options.epochs {
            for cb in callbacks.iter_mut() {
                if let Some(beta) = cb.on_epoch_begin(epoch, &self.weights) {
                    self.update_loss_weight(beta)?;
                }
            }

            // ── Training phase ───────────────────────────────────────────────
            let mut acc = StepLosses::default();
            for batch in train_loader.iter() {
                let n    = batch.size();
                let step = self.train_step(batch);
                acc.accumulate(&step, n as f64);
            }
            let train = acc.scaled(1.0 / n_train as f64);

            // ── Validation phase ─────────────────────────────────────────────
            let validation = val_loader.as_ref().map(|loader| self.mean_losses(loader.as_ref()));

            let summary = EpochSummary { epoch, train, validation, beta: self.weights.beta };
            history.record_epoch(&summary);

            tracing::info!(
                "Epoch {:>3}/{} | loss={:.4} | recon={:.4} | kl={:.4} | val_loss={}",
                epoch,
                options.epochs,
                train.total,
                train.reconstruction,
                train.kl,
                validation.map_or_else(|| "-".to_string(), |v| format!("{:.4}", v.total)),
            );

            let mut stop = false;
            for cb in callbacks.iter_mut() {
                stop |= cb.on_epoch_end(&summary) == EpochControl::Stop;
            }
            if stop {
                break;
            }
        }

        tracing::info!("Training '{}' complete: {} epochs", self.name, history.epochs());
        Ok(history)
    }

    fn check_dataset(&self, dataset: &CvaeDataset) -> CvaeResult<()> {
        let expected = self.config.input_layout();
        if dataset.layout() != &expected {
            return Err(DataError::LayoutMismatch {
                expected: expected.describe(),
                found:    dataset.layout().describe(),
            }
            .into());
        }
        if dataset.is_empty() {
            return Err(DataError::EmptyDataset.into());
        }
        Ok(())
    }

    // ── Persistence ──────────────────────────────────────────────────────────

    /// Write every named sub-graph plus the config into `dir`.
    pub fn save(&self, dir: &Path) -> CvaeResult<WeightSnapshot> {
        let manager = CheckpointManager::new(dir)?;
        manager.save_config(&self.config)?;
        manager.save_model(&self.model)
    }

    /// Restore the whole model from `dir`.
    pub fn load(&mut self, dir: &Path) -> CvaeResult<()> {
        let manager = CheckpointManager::new(dir)?;
        self.model = manager.load_model(self.model.clone(), &self.device)?;
        tracing::info!("Loaded '{}' from '{}'", self.name, dir.display());
        Ok(())
    }

    /// Restore one sub-graph, leaving the others untouched.
    pub fn load_subgraph(&mut self, dir: &Path, subgraph: SubGraph) -> CvaeResult<()> {
        self.require(subgraph)?;
        let manager = CheckpointManager::new(dir)?;
        let device  = &self.device;

        match subgraph {
            SubGraph::Cvae => {
                self.model = manager.load_model(self.model.clone(), device)?;
            }
            SubGraph::Encoder => {
                self.model.encoder = manager.load_module(self.model.encoder.clone(), subgraph, device)?;
            }
            SubGraph::Decoder => {
                self.model.decoder = manager.load_module(self.model.decoder.clone(), subgraph, device)?;
            }
            SubGraph::EmbeddingEnc => {
                if let Some(e) = self.model.embedding_enc.clone() {
                    self.model.embedding_enc = Some(manager.load_module(e, subgraph, device)?);
                }
            }
            SubGraph::EmbeddingDec => {
                let slot = match self.model.embedding_dec {
                    Some(_) => &mut self.model.embedding_dec,
                    None => &mut self.model.embedding_enc,
                };
                if let Some(e) = slot.clone() {
                    *slot = Some(manager.load_module(e, subgraph, device)?);
                }
            }
        }
        tracing::info!("Loaded sub-graph '{}' from '{}'", subgraph, dir.display());
        Ok(())
    }
}

fn build_optimizer<B: AutodiffBackend>(config: &CvaeConfig) -> CvaeOptimizer<B> {
    AdamConfig::new()
        .with_epsilon(1e-7)
        .with_grad_clipping(config.grad_clip_norm.map(GradientClippingConfig::Norm))
        .init()
}

/// Removes the gradient of every parameter it visits.
struct GradientStripper<'a> {
    grads:   &'a mut GradientsParams,
    removed: usize,
}

impl<B: AutodiffBackend> ModuleVisitor<B> for GradientStripper<'_> {
    fn visit_float<const D: usize>(&mut self, id: ParamId, _tensor: &Tensor<B, D>) {
        if self.grads.remove::<B::InnerBackend, D>(id).is_some() {
            self.removed += 1;
        }
    }
}
