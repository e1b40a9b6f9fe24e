use burn::prelude::*;

use crate::model::encoder::{Decoder, DecoderConfig, Encoder, EncoderConfig};

/// Configuration for the encoder-decoder-encoder generator.
#[derive(Config, Debug)]
pub struct GeneratorConfig {
    pub isize: usize,
    pub nc: usize,
    pub nz: usize,
    pub ngf: usize,
    #[config(default = 0)]
    pub extralayers: usize,
}

/// Generator outputs for one batch.
#[derive(Debug, Clone)]
pub struct GeneratorOutput<B: Backend> {
    /// Reconstruction, same shape as the input: `(B, nc, isize, isize)`.
    pub reconstruction: Tensor<B, 4>,
    /// Latent code of the input: `(B, nz, 1, 1)`.
    pub latent_i: Tensor<B, 4>,
    /// Latent code of the reconstruction: `(B, nz, 1, 1)`.
    pub latent_o: Tensor<B, 4>,
}

/// GANomaly generator.
///
/// ```text
/// x → encoder1 → latent_i → decoder → x̂ → encoder2 → latent_o
/// ```
///
/// Both encoders share the generator's base width `ngf`.
#[derive(Module, Debug)]
pub struct Generator<B: Backend> {
    encoder1: Encoder<B>,
    decoder: Decoder<B>,
    encoder2: Encoder<B>,
}

impl GeneratorConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> Generator<B> {
        let encoder = EncoderConfig::new(self.isize, self.nz, self.nc, self.ngf)
            .with_extralayers(self.extralayers);
        Generator {
            encoder1: encoder.init(device),
            decoder: DecoderConfig::new(self.isize, self.nz, self.nc, self.ngf)
                .with_extralayers(self.extralayers)
                .init(device),
            encoder2: encoder.init(device),
        }
    }
}

impl<B: Backend> Generator<B> {
    pub fn forward(&self, input: Tensor<B, 4>) -> GeneratorOutput<B> {
        let latent_i = self.encoder1.forward(input);
        let reconstruction = self.decoder.forward(latent_i.clone());
        let latent_o = self.encoder2.forward(reconstruction.clone());
        GeneratorOutput {
            reconstruction,
            latent_i,
            latent_o,
        }
    }
}
