// ============================================================
// Layer 5 — Training Callbacks
// ============================================================
// Hooks the training loop calls around every epoch.
//
//   on_epoch_begin → may return a new KL weight (beta)
//   on_epoch_end   → may stop training
//
// Two are provided: early stopping on a monitored loss curve and
// a linear KL warm-up. Anything else (CSV logging, custom
// schedules) implements the same trait.

use crate::ml::loss::{LossWeights, StepLosses};

/// What one finished epoch looked like.
#[derive(Debug, Clone, PartialEq)]
pub struct EpochSummary {
    /// 1-based.
    pub epoch:      usize,
    pub train:      StepLosses,
    pub validation: Option<StepLosses>,
    /// KL weight in effect during the epoch.
    pub beta:       f64,
}

impl EpochSummary {
    /// Look up a curve by its history name (`loss`, `kl_loss`, `val_loss`, ...).
    pub fn metric(&self, name: &str) -> Option<f64> {
        let (losses, key) = match name.strip_prefix("val_") {
            Some(key) => (self.validation.as_ref()?, key),
            None => (&self.train, name),
        };
        match key {
            "loss"                => Some(losses.total),
            "reconstruction_loss" => Some(losses.reconstruction),
            "kl_loss"             => Some(losses.kl),
            "info_loss"           => losses.info,
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EpochControl {
    Continue,
    Stop,
}

pub trait EpochCallback {
    /// Returning `Some(beta)` updates the KL weight before the epoch runs.
    fn on_epoch_begin(&mut self, _epoch: usize, _weights: &LossWeights) -> Option<f64> {
        None
    }

    fn on_epoch_end(&mut self, _summary: &EpochSummary) -> EpochControl {
        EpochControl::Continue
    }
}

// ─── Early Stopping ───────────────────────────────────────────────────────────

/// Stop once `monitor` has not improved by more than `min_delta`
/// for `patience` consecutive epochs.
#[derive(Debug, Clone)]
pub struct EarlyStopping {
    pub monitor:   String,
    pub patience:  usize,
    pub min_delta: f64,
    best:       f64,
    best_epoch: Option<usize>,
    wait:       usize,
}

impl EarlyStopping {
    pub fn new(monitor: impl Into<String>, patience: usize) -> Self {
        Self {
            monitor: monitor.into(),
            patience,
            min_delta: 0.0,
            best: f64::INFINITY,
            best_epoch: None,
            wait: 0,
        }
    }

    pub fn with_min_delta(mut self, min_delta: f64) -> Self {
        self.min_delta = min_delta;
        self
    }

    pub fn best_epoch(&self) -> Option<usize> {
        self.best_epoch
    }
}

impl EpochCallback for EarlyStopping {
    fn on_epoch_end(&mut self, summary: &EpochSummary) -> EpochControl {
        let Some(current) = summary.metric(&self.monitor) else {
            tracing::warn!("Early stopping: '{}' is not recorded, ignoring", self.monitor);
            return EpochControl::Continue;
        };

        if current < self.best - self.min_delta {
            self.best       = current;
            self.best_epoch = Some(summary.epoch);
            self.wait       = 0;
            return EpochControl::Continue;
        }

        self.wait += 1;
        if self.wait >= self.patience {
            tracing::info!(
                "Early stopping at epoch {}: {} did not improve on {:.6} (epoch {:?})",
                summary.epoch, self.monitor, self.best, self.best_epoch
            );
            return EpochControl::Stop;
        }
        EpochControl::Continue
    }
}

// ─── KL Warm-up ───────────────────────────────────────────────────────────────

/// Ramp beta linearly from 0 to `target` over the first `epochs` epochs.
#[derive(Debug, Clone, Copy)]
pub struct BetaWarmup {
    pub target: f64,
    pub epochs: usize,
}

impl BetaWarmup {
    pub fn beta_at(&self, epoch: usize) -> f64 {
        if self.epochs == 0 {
            return self.target;
        }
        let progress = epoch.saturating_sub(1) as f64 / self.epochs as f64;
        self.target * progress.min(1.0)
    }
}

impl EpochCallback for BetaWarmup {
    fn on_epoch_begin(&mut self, epoch: usize, _weights: &LossWeights) -> Option<f64> {
        Some(self.beta_at(epoch))
    }
}
