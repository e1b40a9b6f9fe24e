//! GANomaly networks: a DCGAN encoder-decoder-encoder generator and a DCGAN
//! discriminator, plus tensor/host conversion helpers.

pub mod bridge;
pub mod discriminator;
pub mod encoder;
pub mod generator;

use burn::prelude::*;

pub use discriminator::{Discriminator, DiscriminatorConfig};
pub use generator::{Generator, GeneratorConfig, GeneratorOutput};

/// Geometry and width hyperparameters shared by both networks.
#[derive(Config, Debug)]
pub struct NetworkConfig {
    /// Input image side length. Must be a multiple of 16.
    #[config(default = 32)]
    pub isize: usize,
    /// Number of image channels.
    #[config(default = 3)]
    pub nc: usize,
    /// Latent code dimension.
    #[config(default = 100)]
    pub nz: usize,
    /// Generator base width.
    #[config(default = 64)]
    pub ngf: usize,
    /// Discriminator base width.
    #[config(default = 64)]
    pub ndf: usize,
    /// Extra 3×3 conv blocks in encoders and decoder.
    #[config(default = 0)]
    pub extralayers: usize,
}

impl NetworkConfig {
    pub fn generator(&self) -> GeneratorConfig {
        GeneratorConfig::new(self.isize, self.nc, self.nz, self.ngf)
            .with_extralayers(self.extralayers)
    }

    pub fn discriminator(&self) -> DiscriminatorConfig {
        DiscriminatorConfig::new(self.isize, self.nc, self.ndf).with_extralayers(self.extralayers)
    }

    /// Build a freshly initialized generator.
    pub fn init_generator<B: Backend>(&self, device: &B::Device) -> Generator<B> {
        self.generator().init(device)
    }

    /// Build a freshly initialized discriminator.
    ///
    /// Also used to re-initialize a collapsed discriminator.
    pub fn init_discriminator<B: Backend>(&self, device: &B::Device) -> Discriminator<B> {
        self.discriminator().init(device)
    }

    /// Per-sample input shape `[nc, isize, isize]`.
    pub fn image_dims(&self) -> [usize; 3] {
        [self.nc, self.isize, self.isize]
    }

    /// Check that the pyramids can be built for this geometry.
    pub fn validate(&self) -> Result<(), String> {
        if self.isize == 0 || self.isize % 16 != 0 {
            return Err(format!("isize has to be a multiple of 16, got {}", self.isize));
        }
        if self.nc == 0 || self.nz == 0 {
            return Err("nc and nz must be > 0".to_string());
        }
        if self.ngf < 2 || self.ngf % 2 != 0 {
            return Err(format!("ngf must be an even number >= 2, got {}", self.ngf));
        }
        if self.ndf == 0 {
            return Err("ndf must be > 0".to_string());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_rejects_bad_isize() {
        assert!(NetworkConfig::new().validate().is_ok());
        assert!(NetworkConfig::new().with_isize(24).validate().is_err());
        assert!(NetworkConfig::new().with_isize(0).validate().is_err());
    }

    #[test]
    fn test_validate_rejects_odd_ngf() {
        assert!(NetworkConfig::new().with_ngf(3).validate().is_err());
        assert!(NetworkConfig::new().with_ngf(2).validate().is_ok());
    }

    #[test]
    fn test_image_dims() {
        let config = NetworkConfig::new().with_nc(1).with_isize(64);
        assert_eq!(config.image_dims(), [1, 64, 64]);
    }
}
