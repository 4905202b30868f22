// ============================================================
// Layer 1 — CLI / Presentation Layer
// ============================================================
// This is the entry point for all user interaction.
// It uses the `clap` crate to parse command line arguments.
// All business logic is delegated to Layer 2 (application).
//
// Two commands are supported:
//   1. `train`  trains a CVAE variant and saves the run
//   2. `encode` loads a run and exports latent parameters
//
// Training runs on Autodiff<Wgpu>; encoding needs no gradients
// and runs on plain Wgpu.

pub mod commands;

use anyhow::Result;
use burn::backend::{wgpu::WgpuDevice, Autodiff, Wgpu};
use clap::Parser;
use commands::{Commands, EncodeArgs, TrainArgs};

type TrainBackend  = Autodiff<Wgpu>;
type EncodeBackend = Wgpu;

#[derive(Parser, Debug)]
#[command(
    name = "leap-cvae",
    version = "0.1.0",
    about = "Train conditional VAEs with LEAP conditioning, then encode data with them."
)]
pub struct Cli {
    /// The subcommand to run (train or encode)
    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    /// Dispatch to the matching use case. The CLI only routes.
    pub fn run(self) -> Result<()> {
        match self.command {
            Commands::Train(args)  => run_train(args),
            Commands::Encode(args) => run_encode(args),
        }
    }
}

fn run_train(args: TrainArgs) -> Result<()> {
    use crate::application::train_use_case::TrainUseCase;

    tracing::info!("Training on '{}'", args.data.display());
    let report = TrainUseCase::new(args.into()).execute::<TrainBackend>(WgpuDevice::default())?;

    println!("Training complete: {} epochs.", report.epochs_run);
    if let Some((epoch, value)) = report.best {
        println!("Best loss {value:.4} at epoch {}.", epoch + 1);
    }
    println!("Run saved to '{}'.", report.run_dir.display());
    Ok(())
}

fn run_encode(args: EncodeArgs) -> Result<()> {
    use crate::application::encode_use_case::EncodeUseCase;

    let use_case = EncodeUseCase::<EncodeBackend>::new(&args.run_dir, WgpuDevice::default())?;
    let out = use_case.encode_file(&args.data, &args.out)?;
    println!("Latents written to '{}'.", out.display());
    Ok(())
}
