//! Option loading for the CLI.
//!
//! Reads an optional TOML file with an `[options]` table, then applies CLI
//! flags on top. Priority chain: `GanomalyConfig` defaults < TOML < CLI.

use std::path::{Path, PathBuf};

use clap::Args;
use serde::Deserialize;

use ganomaly::{GanomalyConfig, NetworkConfig, Phase};

/// Top-level structure of a run config file.
#[derive(Debug, Default, Deserialize)]
pub struct RunToml {
    #[serde(default)]
    pub options: Options,
}

/// Optional overrides for every run option. Shared by the TOML `[options]`
/// table and the CLI flags.
#[derive(Debug, Clone, Default, Deserialize, Args)]
#[serde(default, deny_unknown_fields)]
pub struct Options {
    /// Samples per batch.
    #[arg(long)]
    pub batch_size: Option<usize>,
    /// Input image side length (multiple of 16).
    #[arg(long)]
    pub isize: Option<usize>,
    /// Image channels.
    #[arg(long)]
    pub nc: Option<usize>,
    /// Latent dimension.
    #[arg(long)]
    pub nz: Option<usize>,
    /// Generator base width.
    #[arg(long)]
    pub ngf: Option<usize>,
    /// Discriminator base width.
    #[arg(long)]
    pub ndf: Option<usize>,
    /// Extra conv blocks per network.
    #[arg(long)]
    pub extralayers: Option<usize>,
    /// Adam learning rate.
    #[arg(long)]
    pub lr: Option<f64>,
    /// Adam beta1.
    #[arg(long)]
    pub beta1: Option<f64>,
    /// Weight of the L1 reconstruction loss.
    #[arg(long)]
    pub alpha: Option<f64>,
    /// Number of epochs.
    #[arg(long)]
    pub niter: Option<usize>,
    /// Loss reporting cadence, in samples.
    #[arg(long)]
    pub print_freq: Option<usize>,
    /// Image saving cadence, in samples.
    #[arg(long)]
    pub save_image_freq: Option<usize>,
    /// Output root directory.
    #[arg(long)]
    pub outf: Option<String>,
    /// Run name under the output root.
    #[arg(long)]
    pub name: Option<String>,
    /// Weights directory to resume training from.
    #[arg(long)]
    pub resume: Option<String>,
    /// Comma-separated accelerator ids.
    #[arg(long, value_delimiter = ',')]
    pub gpu_ids: Option<Vec<usize>>,
    /// Save real/reconstructed images for every test batch.
    #[arg(long, num_args = 0..=1, default_missing_value = "true")]
    pub save_test_images: Option<bool>,
    /// Load generator weights before evaluating.
    #[arg(long, num_args = 0..=1, default_missing_value = "true")]
    pub load_weights: Option<bool>,
    /// Forward per-step losses and performance to the visualizer.
    #[arg(long, num_args = 0..=1, default_missing_value = "true")]
    pub display: Option<bool>,
    /// Shuffle seed.
    #[arg(long)]
    pub seed: Option<u64>,
}

macro_rules! overlay {
    ($base:expr, $top:expr, $($field:ident),+ $(,)?) => {
        $( if $top.$field.is_some() { $base.$field = $top.$field.clone(); } )+
    };
}

impl Options {
    /// Overlay `other` on `self`; fields set in `other` win.
    pub fn merge(mut self, other: &Options) -> Options {
        overlay!(
            self, other, batch_size, isize, nc, nz, ngf, ndf, extralayers, lr, beta1, alpha,
            niter, print_freq, save_image_freq, outf, name, resume, gpu_ids, save_test_images,
            load_weights, display, seed,
        );
        self
    }

    /// Build the run options from defaults plus every set field.
    pub fn into_config(self, phase: Phase) -> GanomalyConfig {
        let defaults = NetworkConfig::new();
        let network = NetworkConfig::new()
            .with_isize(self.isize.unwrap_or(defaults.isize))
            .with_nc(self.nc.unwrap_or(defaults.nc))
            .with_nz(self.nz.unwrap_or(defaults.nz))
            .with_ngf(self.ngf.unwrap_or(defaults.ngf))
            .with_ndf(self.ndf.unwrap_or(defaults.ndf))
            .with_extralayers(self.extralayers.unwrap_or(defaults.extralayers));

        let mut config = GanomalyConfig::new(network).with_phase(phase);
        if let Some(v) = self.batch_size {
            config.batch_size = v;
        }
        if let Some(v) = self.lr {
            config.lr = v;
        }
        if let Some(v) = self.beta1 {
            config.beta1 = v;
        }
        if let Some(v) = self.alpha {
            config.alpha = v;
        }
        if let Some(v) = self.niter {
            config.niter = v;
        }
        if let Some(v) = self.print_freq {
            config.print_freq = v;
        }
        if let Some(v) = self.save_image_freq {
            config.save_image_freq = v;
        }
        if let Some(v) = self.outf {
            config.outf = v;
        }
        if let Some(v) = self.name {
            config.name = v;
        }
        if self.resume.is_some() {
            config.resume = self.resume;
        }
        if let Some(v) = self.gpu_ids {
            config.gpu_ids = v;
        }
        if let Some(v) = self.save_test_images {
            config.save_test_images = v;
        }
        if let Some(v) = self.load_weights {
            config.load_weights = v;
        }
        if let Some(v) = self.display {
            config.display = v;
        }
        if let Some(v) = self.seed {
            config.seed = v;
        }
        config
    }
}

/// Load and deserialize a `RunToml` from a TOML file.
pub fn load_run_toml(path: &Path) -> anyhow::Result<RunToml> {
    let contents = std::fs::read_to_string(path)
        .map_err(|e| anyhow::anyhow!("Failed to read {}: {e}", path.display()))?;
    let config: RunToml = toml::from_str(&contents)?;
    tracing::info!(path = %path.display(), "Loaded run config");
    Ok(config)
}

/// Resolve the effective options for a run.
pub fn build_config(
    toml_path: Option<&PathBuf>,
    cli: &Options,
    phase: Phase,
) -> anyhow::Result<GanomalyConfig> {
    let file = match toml_path {
        Some(path) => load_run_toml(path)?.options,
        None => Options::default(),
    };
    let config = file.merge(cli).into_config(phase);
    config.validate()?;
    Ok(config)
}
