// ============================================================
// Layer 6 — Metrics Logger
// ============================================================
// Records training metrics to a CSV file after each epoch.
// Hooked into the training loop as an EpochCallback.
//
// Example CSV output (results/metrics.csv):
//   epoch,loss,reconstruction_loss,kl_loss,info_loss,val_loss,beta
//   1,3.124500,2.981200,0.143300,,3.089200,1.000000
//   2,2.890100,2.700400,0.189700,,2.854300,1.000000
//
// Empty cells mean the term was not computed (no InfoVAE term,
// no validation data).
//
// How to read the curves:
//   - reconstruction_loss falling while kl_loss rises is normal
//     early on: the encoder starts using the latent space
//   - val_loss rising while loss falls → overfitting
//   - a non-finite entry means the step diverged

use std::{
    fs::{self, OpenOptions},
    io::Write,
    path::{Path, PathBuf},
};
use serde::{Deserialize, Serialize};

use crate::error::CvaeResult;
use crate::ml::callbacks::{EpochCallback, EpochControl, EpochSummary};

const HEADER: &str = "epoch,loss,reconstruction_loss,kl_loss,info_loss,val_loss,beta";

/// One row of metrics data for a single training epoch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpochMetrics {
    pub epoch:          usize,
    pub loss:           f64,
    pub reconstruction: f64,
    pub kl:             f64,
    pub info:           Option<f64>,
    pub val_loss:       Option<f64>,
    pub beta:           f64,
}

impl EpochMetrics {
    pub fn from_summary(summary: &EpochSummary) -> Self {
        Self {
            epoch:          summary.epoch,
            loss:           summary.train.total,
            reconstruction: summary.train.reconstruction,
            kl:             summary.train.kl,
            info:           summary.train.info,
            val_loss:       summary.validation.map(|v| v.total),
            beta:           summary.beta,
        }
    }

    /// Returns true if this epoch beat `best` on validation loss
    /// (training loss when there is no validation set).
    pub fn is_improvement(&self, best: f64) -> bool {
        self.val_loss.unwrap_or(self.loss) < best
    }

    fn csv_row(&self) -> String {
        let opt = |v: Option<f64>| v.map(|x| format!("{x:.6}")).unwrap_or_default();
        format!(
            "{},{:.6},{:.6},{:.6},{},{},{:.6}",
            self.epoch,
            self.loss,
            self.reconstruction,
            self.kl,
            opt(self.info),
            opt(self.val_loss),
            self.beta,
        )
    }
}

/// Appends one CSV row per epoch.
pub struct MetricsLogger {
    csv_path: PathBuf,
}

impl MetricsLogger {
    /// Writes the CSV header if the file doesn't exist yet.
    pub fn new(dir: &Path) -> CvaeResult<Self> {
        fs::create_dir_all(dir)?;
        let csv_path = dir.join("metrics.csv");

        if !csv_path.exists() {
            let mut f = fs::File::create(&csv_path)?;
            writeln!(f, "{HEADER}")?;
            tracing::debug!("Created metrics CSV: '{}'", csv_path.display());
        }
        Ok(Self { csv_path })
    }

    pub fn log(&self, m: &EpochMetrics) -> CvaeResult<()> {
        let mut f = OpenOptions::new().append(true).open(&self.csv_path)?;
        writeln!(f, "{}", m.csv_row())?;
        tracing::debug!("Logged epoch {} metrics: loss={:.4}", m.epoch, m.loss);
        Ok(())
    }

    pub fn csv_path(&self) -> &Path {
        &self.csv_path
    }
}

impl EpochCallback for MetricsLogger {
    fn on_epoch_end(&mut self, summary: &EpochSummary) -> EpochControl {
        if let Err(e) = self.log(&EpochMetrics::from_summary(summary)) {
            tracing::warn!("Could not append to '{}': {}", self.csv_path.display(), e);
        }
        EpochControl::Continue
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use crate::ml::loss::StepLosses;

    fn summary(epoch: usize, validation: Option<f64>) -> EpochSummary {
        let losses = |v: f64| StepLosses { total: v, reconstruction: v, kl: 0.5, info: None };
        EpochSummary { epoch, train: losses(2.5), validation: validation.map(losses), beta: 1.0 }
    }

    #[test]
    fn test_is_improvement() {
        let m = EpochMetrics::from_summary(&summary(2, Some(2.3)));
        assert!(m.is_improvement(3.0));
        assert!(!m.is_improvement(2.0));

        // falls back to training loss
        let m = EpochMetrics::from_summary(&summary(2, None));
        assert!(m.is_improvement(2.6));
    }

    #[test]
    fn test_rows_are_appended_under_header() {
        let dir = tempfile::tempdir().unwrap();
        let mut logger = MetricsLogger::new(dir.path()).unwrap();
        logger.on_epoch_end(&summary(1, Some(3.0)));
        logger.on_epoch_end(&summary(2, None));

        let csv = std::fs::read_to_string(logger.csv_path()).unwrap();
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(lines[0], HEADER);
        assert_eq!(lines[1], "1,2.500000,2.500000,0.500000,,3.000000,1.000000");
        assert_eq!(lines[2], "2,2.500000,2.500000,0.500000,,,1.000000");
    }
}
