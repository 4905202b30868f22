// ============================================================
// Layer 6 — Loss History
// ============================================================
// One numeric sequence per tracked loss name, one entry per
// epoch, written to results/history.json:
//
//   {
//     "loss":                [3.12, 2.80, ...],
//     "reconstruction_loss": [...],
//     "kl_loss":             [...],
//     "val_loss":            [...],
//     "beta":                [1.0, 1.0, ...]
//   }
//
// best_epoch() is the argmin a loss-curve report marks as
// "min: ..., epoch: ...".

use serde::{Deserialize, Serialize};
use std::{collections::BTreeMap, fs, path::Path};

use crate::error::CvaeResult;
use crate::ml::{callbacks::EpochSummary, loss::StepLosses};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LossHistory {
    series: BTreeMap<String, Vec<f64>>,
}

impl LossHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, name: &str, value: f64) {
        self.series.entry(name.to_string()).or_default().push(value);
    }

    pub fn get(&self, name: &str) -> Option<&[f64]> {
        self.series.get(name).map(Vec::as_slice)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.series.keys().map(String::as_str)
    }

    /// Number of recorded epochs.
    pub fn epochs(&self) -> usize {
        self.get("loss").map_or(0, <[f64]>::len)
    }

    /// 0-based epoch index and value of the smallest entry of `name`.
    pub fn best_epoch(&self, name: &str) -> Option<(usize, f64)> {
        self.get(name)?
            .iter()
            .copied()
            .enumerate()
            .min_by(|a, b| a.1.total_cmp(&b.1))
    }

    pub fn record_epoch(&mut self, summary: &EpochSummary) {
        self.record_losses("", &summary.train);
        if let Some(val) = &summary.validation {
            self.record_losses("val_", val);
        }
        self.push("beta", summary.beta);
    }

    fn record_losses(&mut self, prefix: &str, losses: &StepLosses) {
        self.push(&format!("{prefix}loss"), losses.total);
        self.push(&format!("{prefix}reconstruction_loss"), losses.reconstruction);
        self.push(&format!("{prefix}kl_loss"), losses.kl);
        if let Some(info) = losses.info {
            self.push(&format!("{prefix}info_loss"), info);
        }
    }

    pub fn save(&self, path: &Path) -> CvaeResult<()> {
        fs::write(path, serde_json::to_string_pretty(self)?)?;
        tracing::debug!("Saved loss history ({} epochs) to '{}'", self.epochs(), path.display());
        Ok(())
    }

    pub fn load(path: &Path) -> CvaeResult<Self> {
        let json = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&json)?)
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;

    fn summary(epoch: usize, train: f64, val: Option<f64>) -> EpochSummary {
        let losses = |v: f64| StepLosses { total: v, reconstruction: v * 0.8, kl: v * 0.2, info: None };
        EpochSummary { epoch, train: losses(train), validation: val.map(losses), beta: 0.5 }
    }

    #[test]
    fn test_record_and_best_epoch() {
        let mut history = LossHistory::new();
        history.record_epoch(&summary(1, 3.0, Some(3.5)));
        history.record_epoch(&summary(2, 2.0, Some(2.2)));
        history.record_epoch(&summary(3, 1.5, Some(2.4)));

        assert_eq!(history.epochs(), 3);
        assert_eq!(history.best_epoch("val_loss"), Some((1, 2.2)));
        assert_eq!(history.best_epoch("loss"), Some((2, 1.5)));
        assert_eq!(history.get("beta"), Some(&[0.5, 0.5, 0.5][..]));
        assert!(history.get("info_loss").is_none());
    }

    #[test]
    fn test_json_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("history.json");

        let mut history = LossHistory::new();
        history.record_epoch(&summary(1, 1.25, None));
        history.save(&path).unwrap();

        let raw = std::fs::read_to_string(&path).unwrap();
        assert!(raw.contains("\"kl_loss\""));
        assert_eq!(LossHistory::load(&path).unwrap(), history);
    }
}
