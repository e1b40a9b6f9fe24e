//! Loss snapshots and per-epoch training history.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::evaluation::Performance;

/// Scalar values of every loss term from the latest optimization step.
///
/// `err_d = err_d_real + err_d_fake` and
/// `err_g = err_g_bce + alpha * err_g_l1l + err_g_enc`, both computed in f64
/// from the component values.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct LossSnapshot {
    pub err_d: f64,
    pub err_g: f64,
    pub err_d_real: f64,
    pub err_d_fake: f64,
    pub err_g_bce: f64,
    pub err_g_l1l: f64,
    pub err_g_enc: f64,
}

impl LossSnapshot {
    /// Loss names and values in reporting order.
    pub fn entries(&self) -> [(&'static str, f64); 7] {
        [
            ("err_d", self.err_d),
            ("err_g", self.err_g),
            ("err_d_real", self.err_d_real),
            ("err_d_fake", self.err_d_fake),
            ("err_g_bce", self.err_g_bce),
            ("err_g_l1l", self.err_g_l1l),
            ("err_g_enc", self.err_g_enc),
        ]
    }
}

impl fmt::Display for LossSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self
            .entries()
            .iter()
            .map(|(name, value)| format!("{name}: {value:.3}"))
            .collect();
        write!(f, "{}", parts.join(" "))
    }
}

/// Best AUC seen in the current run. Starts at 0 on every `train()` call.
#[derive(Debug, Clone, Copy, Default)]
pub struct BestAuc {
    value: f64,
}

impl BestAuc {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `auc`; returns `true` only if it strictly beats the previous best.
    pub fn observe(&mut self, auc: f64) -> bool {
        if auc > self.value {
            self.value = auc;
            true
        } else {
            false
        }
    }

    pub fn value(&self) -> f64 {
        self.value
    }
}

/// Outcome of one training epoch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EpochRecord {
    pub epoch: usize,
    pub losses: LossSnapshot,
    pub performance: Performance,
    /// Whether this epoch's AUC was a new best and weights were saved.
    pub checkpointed: bool,
    /// Discriminator re-initializations during the epoch.
    pub discriminator_resets: usize,
}

/// Summary of a full `train()` run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TrainReport {
    pub best_auc: f64,
    pub epochs: Vec<EpochRecord>,
}

impl TrainReport {
    /// Epoch indices after which a checkpoint was written.
    pub fn checkpoint_epochs(&self) -> Vec<usize> {
        self.epochs
            .iter()
            .filter(|r| r.checkpointed)
            .map(|r| r.epoch)
            .collect()
    }
}
