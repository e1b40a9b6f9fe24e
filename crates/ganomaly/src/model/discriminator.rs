use burn::nn::conv::{Conv2d, Conv2dConfig};
use burn::nn::Initializer;
use burn::prelude::*;
use burn::tensor::activation::sigmoid;

use crate::model::encoder::{Encoder, EncoderConfig, CONV_INIT_STD};

/// Configuration for the DCGAN discriminator.
#[derive(Config, Debug)]
pub struct DiscriminatorConfig {
    pub isize: usize,
    pub nc: usize,
    pub ndf: usize,
    #[config(default = 0)]
    pub extralayers: usize,
}

/// Real/fake classifier over images.
///
/// The feature trunk is an encoder without its final convolution; the
/// classifier collapses the 4×4 map to one probability per sample.
#[derive(Module, Debug)]
pub struct Discriminator<B: Backend> {
    features: Encoder<B>,
    classifier: Conv2d<B>,
}

impl DiscriminatorConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> Discriminator<B> {
        let trunk = EncoderConfig::new(self.isize, 1, self.nc, self.ndf)
            .with_extralayers(self.extralayers)
            .with_add_final_conv(false);
        let classifier = Conv2dConfig::new([trunk.feature_channels(), 1], [4, 4])
            .with_bias(false)
            .with_initializer(Initializer::Normal {
                mean: 0.0,
                std: CONV_INIT_STD,
            })
            .init(device);
        Discriminator {
            features: trunk.init(device),
            classifier,
        }
    }
}

impl<B: Backend> Discriminator<B> {
    /// Returns `(probability, features)`: probability `(B,)` in [0, 1],
    /// features `(B, cndf, 4, 4)`.
    pub fn forward(&self, input: Tensor<B, 4>) -> (Tensor<B, 1>, Tensor<B, 4>) {
        let features = self.features.forward(input);
        let [batch, _, _, _] = features.dims();
        let logits = self.classifier.forward(features.clone()).reshape([batch]);
        (sigmoid(logits), features)
    }
}
