// ============================================================
// Layer 1 — CLI Commands and Arguments
// ============================================================
// Defines the two subcommands, `train` and `encode`, and all
// their configurable flags.
//
// clap's derive macros automatically generate:
//   - help text (--help)
//   - error messages for missing args
//   - type conversion (string → usize, f64, PathBuf)

use clap::{Args, Subcommand};
use std::path::PathBuf;

use crate::application::train_use_case::TrainConfig;

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Train a CVAE variant on a JSON column file
    Train(TrainArgs),

    /// Encode a dataset with a trained run and export the latents
    Encode(EncodeArgs),
}

/// All arguments for the `train` command.
#[derive(Args, Debug)]
pub struct TrainArgs {
    /// Model architecture (CvaeConfig as JSON)
    #[arg(long)]
    pub config: PathBuf,

    /// Training data: JSON object with "x", "y" and one column per condition
    #[arg(long)]
    pub data: PathBuf,

    /// Root directory for runs
    #[arg(long, default_value = "output")]
    pub output: PathBuf,

    /// Run name; weights land in <output>/<name>/models
    #[arg(long, default_value = "cvae")]
    pub name: String,

    #[arg(long, default_value_t = 100)]
    pub epochs: usize,

    #[arg(long, default_value_t = 100)]
    pub batch_size: usize,

    /// Fraction of samples held out for validation
    #[arg(long, default_value_t = 0.0)]
    pub validation_split: f64,

    /// Stop after this many epochs without improvement (0 = never)
    #[arg(long, default_value_t = 0)]
    pub patience: usize,

    /// Ramp the KL weight up from 0 over this many epochs (0 = off)
    #[arg(long, default_value_t = 0)]
    pub warmup_epochs: usize,

    /// Seed for shuffling and the validation split
    #[arg(long, default_value_t = 42)]
    pub seed: u64,

    /// Start from the weights of an earlier run directory
    #[arg(long)]
    pub init_from: Option<PathBuf>,

    /// Sub-graphs to keep frozen, e.g. `encoder,embedding_enc`
    #[arg(long, value_delimiter = ',')]
    pub freeze: Vec<String>,
}

/// Convert CLI TrainArgs into the application-layer TrainConfig.
/// The application layer never sees clap types.
impl From<TrainArgs> for TrainConfig {
    fn from(a: TrainArgs) -> Self {
        TrainConfig {
            config_path:      a.config,
            data_path:        a.data,
            output:           a.output,
            name:             a.name,
            epochs:           a.epochs,
            batch_size:       a.batch_size,
            validation_split: a.validation_split,
            patience:         a.patience,
            warmup_epochs:    a.warmup_epochs,
            seed:             a.seed,
            init_from:        a.init_from,
            freeze:           a.freeze,
        }
    }
}

/// All arguments for the `encode` command
#[derive(Args, Debug)]
pub struct EncodeArgs {
    /// Run directory written by `train` (<output>/<name>)
    #[arg(long)]
    pub run_dir: PathBuf,

    /// Data to encode, same column format as training data
    #[arg(long)]
    pub data: PathBuf,

    /// Where to write the latent JSON
    #[arg(long, default_value = "latents.json")]
    pub out: PathBuf,
}
