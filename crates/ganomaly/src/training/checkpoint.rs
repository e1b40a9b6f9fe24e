//! Weight checkpoints for both networks.
//!
//! Layout under a weights directory:
//!
//! ```text
//! netG.mpk  netG.json   generator weights + {"epoch": n}
//! netD.mpk  netD.json   discriminator weights + {"epoch": n}
//! ```
//!
//! Writes are not atomic: a crash mid-save can leave a truncated `.mpk`.

use std::path::{Path, PathBuf};

use burn::prelude::*;
use burn::record::{FullPrecisionSettings, NamedMpkFileRecorder};
use serde::{Deserialize, Serialize};

use crate::error::{GanomalyError, Result};
use crate::model::{Discriminator, Generator};

pub const GENERATOR_FILE: &str = "netG";
pub const DISCRIMINATOR_FILE: &str = "netD";

/// Metadata saved alongside each network's weights.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckpointMeta {
    /// Epoch to resume from (last completed epoch + 1).
    pub epoch: usize,
}

fn recorder() -> NamedMpkFileRecorder<FullPrecisionSettings> {
    NamedMpkFileRecorder::<FullPrecisionSettings>::new()
}

/// Path of the weights file for `stem` inside `dir`.
pub fn weights_path(dir: &Path, stem: &str) -> PathBuf {
    dir.join(format!("{stem}.mpk"))
}

fn write_meta(dir: &Path, stem: &str, meta: CheckpointMeta) -> Result<()> {
    let path = dir.join(format!("{stem}.json"));
    serde_json::to_writer(std::fs::File::create(path)?, &meta)?;
    Ok(())
}

fn read_meta(dir: &Path, stem: &str) -> Result<CheckpointMeta> {
    let path = dir.join(format!("{stem}.json"));
    if !path.exists() {
        return Err(GanomalyError::WeightsNotFound(path));
    }
    Ok(serde_json::from_reader(std::fs::File::open(path)?)?)
}

/// Save both networks after `epoch` finished; the stored epoch is `epoch + 1`.
///
/// Creates `dir` if it does not exist.
pub fn save_weights<B: Backend>(
    dir: &Path,
    epoch: usize,
    netg: &Generator<B>,
    netd: &Discriminator<B>,
) -> Result<()> {
    std::fs::create_dir_all(dir)?;
    let meta = CheckpointMeta { epoch: epoch + 1 };
    let recorder = recorder();

    netg.clone().save_file(dir.join(GENERATOR_FILE), &recorder)?;
    write_meta(dir, GENERATOR_FILE, meta)?;
    netd.clone().save_file(dir.join(DISCRIMINATOR_FILE), &recorder)?;
    write_meta(dir, DISCRIMINATOR_FILE, meta)?;

    tracing::info!(dir = %dir.display(), epoch = meta.epoch, "Saved netG and netD weights");
    Ok(())
}

/// Load generator weights from `dir` onto `netg`.
///
/// Fails with [`GanomalyError::WeightsNotFound`] if `netG.mpk` is missing.
pub fn load_generator<B: Backend>(
    dir: &Path,
    netg: Generator<B>,
    device: &B::Device,
) -> Result<(Generator<B>, CheckpointMeta)> {
    let path = weights_path(dir, GENERATOR_FILE);
    if !path.exists() {
        return Err(GanomalyError::WeightsNotFound(path));
    }
    let netg = netg.load_file(dir.join(GENERATOR_FILE), &recorder(), device)?;
    Ok((netg, read_meta(dir, GENERATOR_FILE)?))
}

/// Load discriminator weights from `dir` onto `netd`.
pub fn load_discriminator<B: Backend>(
    dir: &Path,
    netd: Discriminator<B>,
    device: &B::Device,
) -> Result<(Discriminator<B>, CheckpointMeta)> {
    let path = weights_path(dir, DISCRIMINATOR_FILE);
    if !path.exists() {
        return Err(GanomalyError::WeightsNotFound(path));
    }
    let netd = netd.load_file(dir.join(DISCRIMINATOR_FILE), &recorder(), device)?;
    Ok((netd, read_meta(dir, DISCRIMINATOR_FILE)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::ndarray::NdArray;
    use burn::tensor::Distribution;
    use tempfile::TempDir;

    use crate::model::NetworkConfig;

    type TestBackend = NdArray<f32>;

    fn tiny() -> NetworkConfig {
        NetworkConfig::new()
            .with_isize(16)
            .with_nc(1)
            .with_nz(4)
            .with_ngf(4)
            .with_ndf(4)
    }

    #[test]
    fn test_save_and_load_round_trip() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().join("train").join("weights");
        let device = Default::default();
        let config = tiny();
        let netg = config.init_generator::<TestBackend>(&device);
        let netd = config.init_discriminator::<TestBackend>(&device);

        save_weights(&dir, 2, &netg, &netd).unwrap();
        assert!(weights_path(&dir, GENERATOR_FILE).exists());
        assert!(weights_path(&dir, DISCRIMINATOR_FILE).exists());

        let input = Tensor::<TestBackend, 4>::random(
            [2, 1, 16, 16],
            Distribution::Normal(0.0, 1.0),
            &device,
        );
        let expected: Vec<f32> = netg
            .forward(input.clone())
            .latent_i
            .into_data()
            .to_vec()
            .unwrap();

        let fresh = config.init_generator::<TestBackend>(&device);
        let (loaded, meta) = load_generator(&dir, fresh, &device).unwrap();
        assert_eq!(meta.epoch, 3);
        let actual: Vec<f32> = loaded.forward(input).latent_i.into_data().to_vec().unwrap();
        for (a, e) in actual.iter().zip(&expected) {
            assert!((a - e).abs() < 1e-6);
        }

        let (_, meta_d) =
            load_discriminator(&dir, config.init_discriminator::<TestBackend>(&device), &device)
                .unwrap();
        assert_eq!(meta_d.epoch, 3);
    }

    #[test]
    fn test_missing_weights() {
        let tmp = TempDir::new().unwrap();
        let device = Default::default();
        let netg = tiny().init_generator::<TestBackend>(&device);
        match load_generator(tmp.path(), netg, &device) {
            Err(GanomalyError::WeightsNotFound(path)) => {
                assert!(path.ends_with("netG.mpk"));
            }
            other => panic!("expected WeightsNotFound, got {other:?}"),
        }
    }
}
