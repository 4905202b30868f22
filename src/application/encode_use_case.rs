// ============================================================
// Layer 2 — Encode Use Case
// ============================================================
// Loads a finished run and maps a dataset into latent space:
//
//   1. Rebuild the model from <run>/models/cvae_config.json
//   2. Pour the saved weights into it
//   3. Encode every sample through an unshuffled DataLoader
//      (no sampling, no gradients)
//   4. Write { "mu": [[...]], "log_dispersion": [[...]] } as JSON
//
// log_dispersion is a log-variance under the Gaussian prior and
// a log-scale under the Laplace prior; the prior is written
// alongside so a reader knows which.

use anyhow::{Context, Result};
use burn::prelude::*;
use serde::{Deserialize, Serialize};
use std::{fs, path::{Path, PathBuf}};

use crate::application::train_use_case::MODELS_DIR;
use crate::data::{batcher::CvaeBatcher, dataset::CvaeDataset, loader::load_training_set};
use crate::domain::{layout::InputLayout, prior::Prior};
use crate::infra::checkpoint::CheckpointManager;
use crate::ml::model::{Cvae, CvaeInputs};

const ENCODE_BATCH: usize = 256;

/// Latent parameters of every encoded sample, row-aligned with the input.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LatentExport {
    pub prior:          Prior,
    pub mu:             Vec<Vec<f32>>,
    pub log_dispersion: Vec<Vec<f32>>,
}

pub struct EncodeUseCase<B: Backend> {
    model:  Cvae<B>,
    layout: InputLayout,
    device: B::Device,
}

impl<B: Backend> EncodeUseCase<B> {
    /// Rebuild and load the model saved under `<run_dir>/models`.
    pub fn new(run_dir: &Path, device: B::Device) -> Result<Self> {
        let manager = CheckpointManager::new(run_dir.join(MODELS_DIR))?;
        let config  = manager
            .load_config()
            .with_context(|| format!("No model config under '{}'", manager.dir().display()))?;
        let model = config.init::<B>(&device).context("Saved model config is invalid")?;
        let model = manager.load_model(model, &device)?;
        tracing::info!("Loaded {} model from '{}'", config.conditioning.name(), run_dir.display());
        Ok(Self { model, layout: config.input_layout(), device })
    }

    /// Encode every sample, in row order.
    pub fn encode(&self, dataset: CvaeDataset) -> Result<LatentExport> {
        let loader = CvaeBatcher::<B>::new(self.device.clone()).loader(dataset, ENCODE_BATCH, None);
        let mut mu = Vec::new();
        let mut log_dispersion = Vec::new();

        for batch in loader.iter() {
            let latent = self.model.encode(CvaeInputs { signal: batch.signal, conditions: batch.conditions });
            mu.extend(rows(latent.mu)?);
            log_dispersion.extend(rows(latent.log_dispersion)?);
        }
        Ok(LatentExport { prior: self.model.prior(), mu, log_dispersion })
    }

    /// Encode a JSON data file and write the latents to `out`.
    pub fn encode_file(&self, data: &Path, out: &Path) -> Result<PathBuf> {
        let set = load_training_set(data)?;
        let dataset = CvaeDataset::from_training_set(&set, self.layout.clone())
            .with_context(|| format!("'{}' does not fit the model inputs", data.display()))?;

        let export = self.encode(dataset)?;
        fs::write(out, serde_json::to_string(&export)?)
            .with_context(|| format!("Cannot write '{}'", out.display()))?;
        tracing::info!("Wrote {} latent rows to '{}'", export.mu.len(), out.display());
        Ok(out.to_path_buf())
    }
}

/// Split a [batch, width] tensor into row vectors.
fn rows<B: Backend>(tensor: Tensor<B, 2>) -> Result<Vec<Vec<f32>>> {
    let [_, width] = tensor.dims();
    let values = tensor
        .into_data()
        .convert::<f32>()
        .to_vec::<f32>()
        .map_err(|e| anyhow::anyhow!("Cannot read latent tensor: {e:?}"))?;
    Ok(values.chunks(width.max(1)).map(<[f32]>::to_vec).collect())
}
