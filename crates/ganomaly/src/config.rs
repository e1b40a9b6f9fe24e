//! Run options for training and evaluation.

use std::path::PathBuf;

use burn::optim::AdamConfig;
use burn::prelude::*;
use serde::{Deserialize, Serialize};

use crate::error::GanomalyError;
use crate::model::NetworkConfig;

/// Whether a run trains or only evaluates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Train,
    Test,
}

/// Full option set for a GANomaly run.
#[derive(Config, Debug)]
pub struct GanomalyConfig {
    /// Network geometry and widths.
    pub network: NetworkConfig,
    /// Samples per batch.
    #[config(default = 64)]
    pub batch_size: usize,
    /// Adam learning rate for both networks.
    #[config(default = 0.0002)]
    pub lr: f64,
    /// Adam beta1 for both networks (beta2 is 0.999).
    #[config(default = 0.5)]
    pub beta1: f64,
    /// Weight of the pixel-level L1 reconstruction term in the generator loss.
    #[config(default = 50.0)]
    pub alpha: f64,
    /// Epoch to start from. Overwritten from the checkpoint when resuming.
    #[config(default = 0)]
    pub iter: usize,
    /// Number of epochs to train (exclusive upper bound on the epoch index).
    #[config(default = 15)]
    pub niter: usize,
    /// Emit losses every `print_freq` samples.
    #[config(default = 100)]
    pub print_freq: usize,
    /// Save current images every `save_image_freq` samples.
    #[config(default = 100)]
    pub save_image_freq: usize,
    /// Root directory for all run artifacts.
    #[config(default = "String::from(\"./output\")")]
    pub outf: String,
    /// Run name; artifacts go to `<outf>/<name>`.
    #[config(default = "String::from(\"ganomaly/cifar10\")")]
    pub name: String,
    /// Weights directory to resume from (containing `netG`/`netD`).
    #[config(default = "None")]
    pub resume: Option<String>,
    /// Train or test.
    #[config(default = "Phase::Train")]
    pub phase: Phase,
    /// Accelerator ids; empty means CPU.
    #[config(default = "Vec::new()")]
    pub gpu_ids: Vec<usize>,
    /// Save real/reconstructed pairs for every test batch.
    #[config(default = false)]
    pub save_test_images: bool,
    /// Load the generator from the run's weights directory before testing.
    #[config(default = false)]
    pub load_weights: bool,
    /// Forward per-step plots to the visualizer.
    #[config(default = true)]
    pub display: bool,
    /// Seed for data shuffling.
    #[config(default = 0)]
    pub seed: u64,
}

impl GanomalyConfig {
    /// Reject option combinations that cannot run.
    pub fn validate(&self) -> crate::error::Result<()> {
        self.network.validate().map_err(GanomalyError::InvalidConfig)?;
        if self.batch_size == 0 {
            return Err(GanomalyError::InvalidConfig("batch_size must be > 0".into()));
        }
        if self.print_freq == 0 || self.save_image_freq == 0 {
            return Err(GanomalyError::InvalidConfig(
                "print_freq and save_image_freq must be > 0".into(),
            ));
        }
        if !(0.0..1.0).contains(&self.beta1) {
            return Err(GanomalyError::InvalidConfig(format!(
                "beta1 must be in [0, 1), got {}",
                self.beta1
            )));
        }
        Ok(())
    }

    /// Adam settings shared by both networks.
    pub fn optimizer(&self) -> AdamConfig {
        AdamConfig::new()
            .with_beta_1(self.beta1 as f32)
            .with_beta_2(0.999)
    }

    /// `<outf>/<name>`
    pub fn run_dir(&self) -> PathBuf {
        PathBuf::from(&self.outf).join(&self.name)
    }

    /// `<outf>/<name>/train`
    pub fn train_dir(&self) -> PathBuf {
        self.run_dir().join("train")
    }

    /// `<outf>/<name>/test`
    pub fn test_dir(&self) -> PathBuf {
        self.run_dir().join("test")
    }

    /// `<outf>/<name>/train/weights`
    pub fn weights_dir(&self) -> PathBuf {
        self.train_dir().join("weights")
    }

    /// Write the effective options to `<outf>/<name>/opt.json`.
    pub fn save_options(&self) -> crate::error::Result<PathBuf> {
        let dir = self.run_dir();
        std::fs::create_dir_all(&dir)?;
        let path = dir.join("opt.json");
        self.save(&path)?;
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> GanomalyConfig {
        GanomalyConfig::new(NetworkConfig::new())
    }

    #[test]
    fn test_defaults() {
        let c = config();
        assert_eq!(c.batch_size, 64);
        assert_eq!(c.niter, 15);
        assert!((c.lr - 2e-4).abs() < 1e-12);
        assert!((c.alpha - 50.0).abs() < 1e-12);
        assert_eq!(c.phase, Phase::Train);
        assert!(c.resume.is_none());
        assert!(c.validate().is_ok());
    }

    #[test]
    fn test_paths() {
        let c = config().with_outf("/tmp/out".into()).with_name("exp".into());
        assert_eq!(c.weights_dir(), PathBuf::from("/tmp/out/exp/train/weights"));
        assert_eq!(c.test_dir(), PathBuf::from("/tmp/out/exp/test"));
    }

    #[test]
    fn test_validate_rejects_zero_frequencies() {
        assert!(config().with_batch_size(0).validate().is_err());
        assert!(config().with_print_freq(0).validate().is_err());
        assert!(config().with_save_image_freq(0).validate().is_err());
        assert!(config().with_beta1(1.0).validate().is_err());
    }

    #[test]
    fn test_save_options_round_trip() {
        let tmp = tempfile::TempDir::new().unwrap();
        let c = config()
            .with_outf(tmp.path().to_string_lossy().into_owned())
            .with_alpha(12.5);
        let path = c.save_options().unwrap();
        let loaded = GanomalyConfig::load(&path).unwrap();
        assert!((loaded.alpha - 12.5).abs() < 1e-12);
        assert_eq!(loaded.network.isize, 32);
    }

    #[test]
    fn test_derived_config_io() {
        let c = config().with_seed(7).with_phase(Phase::Test);
        let loaded = GanomalyConfig::load_binary(c.to_string().as_bytes()).unwrap();
        assert_eq!(loaded.seed, 7);
        assert_eq!(loaded.phase, Phase::Test);
        assert!(GanomalyConfig::load_binary(b"{ not json").is_err());
    }
}
