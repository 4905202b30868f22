// ============================================================
// Layer 2 — TrainUseCase
// ============================================================
// Orchestrates one training run, in order:
//
//   Step 1: Load the model config           (Layer 6 - infra format)
//   Step 2: Load the training columns        (Layer 4 - data)
//   Step 3: Build samples in the model layout (Layer 4 - data)
//   Step 4: Train / validation split         (Layer 4 - data)
//   Step 5: Build the trainer, optionally    (Layer 5 - ml)
//           warm-started and partly frozen
//   Step 6: Run the training loop            (Layer 5 - ml)
//   Step 7: Persist weights, config, history (Layer 6 - infra)
//
// Run layout:
//   <output>/<name>/
//     train_config.json
//     models/   ← weight files, cvae_config.json, snapshot.json
//     results/  ← history.json, metrics.csv

use anyhow::{Context, Result};
use burn::tensor::backend::AutodiffBackend;
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::{Path, PathBuf},
};

use crate::data::{dataset::CvaeDataset, loader::load_training_set, splitter::split_holdout};
use crate::domain::subgraph::SubGraph;
use crate::infra::{history::LossHistory, metrics::MetricsLogger};
use crate::ml::{
    callbacks::{BetaWarmup, EarlyStopping, EpochCallback},
    config::CvaeConfig,
    trainer::{CvaeTrainer, FitOptions, Validation},
};

pub const MODELS_DIR:  &str = "models";
pub const RESULTS_DIR: &str = "results";

// ─── Training Configuration ──────────────────────────────────────────────────
// Everything about a run that is not the architecture itself.
// Saved next to the weights so a run can be reproduced.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainConfig {
    pub config_path:      PathBuf,
    pub data_path:        PathBuf,
    pub output:           PathBuf,
    pub name:             String,
    pub epochs:           usize,
    pub batch_size:       usize,
    /// Held-out fraction; 0 trains on everything.
    pub validation_split: f64,
    /// Epochs without improvement before stopping; 0 disables.
    pub patience:         usize,
    /// Epochs of linear KL warm-up; 0 disables.
    pub warmup_epochs:    usize,
    pub seed:             u64,
    /// Run directory whose weights initialise this run.
    #[serde(default)]
    pub init_from:        Option<PathBuf>,
    /// Sub-graph names kept frozen for the whole run.
    #[serde(default)]
    pub freeze:           Vec<String>,
}

impl Default for TrainConfig {
    fn default() -> Self {
        Self {
            config_path:      PathBuf::from("cvae.json"),
            data_path:        PathBuf::from("data/train.json"),
            output:           PathBuf::from("output"),
            name:             "cvae".to_string(),
            epochs:           100,
            batch_size:       100,
            validation_split: 0.0,
            patience:         0,
            warmup_epochs:    0,
            seed:             42,
            init_from:        None,
            freeze:           Vec::new(),
        }
    }
}

impl TrainConfig {
    pub fn run_dir(&self) -> PathBuf {
        self.output.join(&self.name)
    }
}

/// What a finished run produced.
#[derive(Debug, Clone)]
pub struct TrainReport {
    pub run_dir:    PathBuf,
    pub epochs_run: usize,
    /// 0-based epoch and value of the best monitored loss.
    pub best:       Option<(usize, f64)>,
}

// ─── TrainUseCase ─────────────────────────────────────────────────────────────
pub struct TrainUseCase {
    config: TrainConfig,
}

impl TrainUseCase {
    pub fn new(config: TrainConfig) -> Self {
        Self { config }
    }

    /// Execute the full training pipeline on backend `B`.
    pub fn execute<B: AutodiffBackend>(&self, device: B::Device) -> Result<TrainReport> {
        let cfg = &self.config;

        // ── Step 1: Model config ─────────────────────────────────────────────
        let model_config = load_model_config(&cfg.config_path)?;
        tracing::info!(
            "Model '{}': {} variant, input {}, latent {}",
            cfg.name,
            model_config.conditioning.name(),
            model_config.input_dim,
            model_config.z_dim
        );

        // ── Step 2-3: Training data in the model's layout ────────────────────
        let training_set = load_training_set(&cfg.data_path)?;
        let layout  = model_config.input_layout();
        let dataset = CvaeDataset::from_training_set(&training_set, layout.clone())
            .with_context(|| format!("'{}' does not fit the model inputs", cfg.data_path.display()))?;

        // ── Step 4: Train / validation split ─────────────────────────────────
        let (train_set, validation) = if cfg.validation_split > 0.0 {
            let (train, val) = split_holdout(dataset.into_samples(), cfg.validation_split, cfg.seed);
            tracing::info!("Split: {} train, {} validation", train.len(), val.len());
            (CvaeDataset::new(layout.clone(), train), Validation::Data(CvaeDataset::new(layout, val)))
        } else {
            (dataset, Validation::None)
        };
        let monitor = match validation {
            Validation::None => "loss",
            _ => "val_loss",
        };

        // ── Step 5: Trainer and run directories ──────────────────────────────
        let run_dir     = cfg.run_dir();
        let models_dir  = run_dir.join(MODELS_DIR);
        let results_dir = run_dir.join(RESULTS_DIR);
        fs::create_dir_all(&models_dir)
            .with_context(|| format!("Cannot create '{}'", models_dir.display()))?;
        fs::write(run_dir.join("train_config.json"), serde_json::to_string_pretty(cfg)?)?;

        let mut trainer = CvaeTrainer::<B>::new(cfg.name.clone(), model_config, device)
            .context("Cannot build the model")?;

        // ── Transfer: warm start and frozen parts ────────────────────────────
        if let Some(source) = &cfg.init_from {
            trainer
                .load(&source.join(MODELS_DIR))
                .with_context(|| format!("Cannot initialise from run '{}'", source.display()))?;
        }
        if !cfg.freeze.is_empty() {
            let frozen = SubGraph::parse_list(&cfg.freeze)?;
            trainer.freeze(&frozen)?;
        }

        // ── Step 6: Training loop ────────────────────────────────────────────
        let mut metrics  = MetricsLogger::new(&results_dir)?;
        let mut stopping = EarlyStopping::new(monitor, cfg.patience);
        let mut warmup   = BetaWarmup { target: trainer.weights().beta, epochs: cfg.warmup_epochs };

        let mut callbacks: Vec<&mut dyn EpochCallback> = vec![&mut metrics];
        if cfg.patience > 0 {
            callbacks.push(&mut stopping);
        }
        if cfg.warmup_epochs > 0 {
            callbacks.push(&mut warmup);
        }

        let options = FitOptions {
            epochs:       cfg.epochs,
            batch_size:   cfg.batch_size,
            validation,
            shuffle_seed: cfg.seed,
        };
        let history = trainer.train(&train_set, &options, &mut callbacks)?;

        // ── Step 7: Persist ──────────────────────────────────────────────────
        trainer.save(&models_dir)?;
        save_history(&history, &results_dir)?;

        let report = TrainReport {
            epochs_run: history.epochs(),
            best:       history.best_epoch(monitor),
            run_dir,
        };
        if let Some((epoch, value)) = report.best {
            tracing::info!("Best {}: {:.4} at epoch {}", monitor, value, epoch + 1);
        }
        Ok(report)
    }
}

fn load_model_config(path: &Path) -> Result<CvaeConfig> {
    let json = fs::read_to_string(path)
        .with_context(|| format!("Cannot read model config '{}'", path.display()))?;
    serde_json::from_str(&json).with_context(|| format!("Invalid model config '{}'", path.display()))
}

fn save_history(history: &LossHistory, results_dir: &Path) -> Result<()> {
    let path = results_dir.join("history.json");
    history
        .save(&path)
        .with_context(|| format!("Cannot write '{}'", path.display()))
}
