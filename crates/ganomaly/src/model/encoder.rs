//! DCGAN convolutional encoder and transposed-convolution decoder.
//!
//! Both are pyramids sized from the image size: the encoder halves the
//! spatial map (doubling channels) until it is 4×4, the decoder mirrors it.
//!
//! ```text
//! Encoder: (B, nc, isize, isize) → ... → (B, cndf, 4, 4) → [final conv] → (B, nz, 1, 1)
//! Decoder: (B, nz, 1, 1) → (B, cngf, 4, 4) → ... → (B, nc, isize, isize), tanh
//! ```

use burn::nn::conv::{Conv2d, Conv2dConfig, ConvTranspose2d, ConvTranspose2dConfig};
use burn::nn::{BatchNorm, BatchNormConfig, Initializer, PaddingConfig2d};
use burn::prelude::*;
use burn::tensor::activation::{leaky_relu, tanh};

/// Standard deviation of the normal initializer applied to every convolution.
pub const CONV_INIT_STD: f64 = 0.02;

/// Negative slope used by the encoder activations.
const LEAKY_SLOPE: f64 = 0.2;

fn conv_initializer() -> Initializer {
    Initializer::Normal {
        mean: 0.0,
        std: CONV_INIT_STD,
    }
}

fn conv2d<B: Backend>(
    channels: [usize; 2],
    kernel: usize,
    stride: usize,
    padding: usize,
    device: &B::Device,
) -> Conv2d<B> {
    Conv2dConfig::new(channels, [kernel, kernel])
        .with_stride([stride, stride])
        .with_padding(PaddingConfig2d::Explicit(padding, padding))
        .with_bias(false)
        .with_initializer(conv_initializer())
        .init(device)
}

fn conv_transpose2d<B: Backend>(
    channels: [usize; 2],
    kernel: usize,
    stride: usize,
    padding: usize,
    device: &B::Device,
) -> ConvTranspose2d<B> {
    ConvTranspose2dConfig::new(channels, [kernel, kernel])
        .with_stride([stride, stride])
        .with_padding([padding, padding])
        .with_bias(false)
        .with_initializer(conv_initializer())
        .init(device)
}

/// Conv → optional BatchNorm → (leaky) ReLU.
#[derive(Module, Debug)]
pub struct ConvBlock<B: Backend> {
    conv: Conv2d<B>,
    norm: Option<BatchNorm<B, 2>>,
    /// 0.0 gives a plain ReLU.
    negative_slope: f64,
}

impl<B: Backend> ConvBlock<B> {
    fn new(
        channels: [usize; 2],
        kernel: usize,
        stride: usize,
        padding: usize,
        batch_norm: bool,
        negative_slope: f64,
        device: &B::Device,
    ) -> Self {
        let norm = batch_norm.then(|| BatchNormConfig::new(channels[1]).init(device));
        Self {
            conv: conv2d(channels, kernel, stride, padding, device),
            norm,
            negative_slope,
        }
    }

    pub fn forward(&self, input: Tensor<B, 4>) -> Tensor<B, 4> {
        let x = self.conv.forward(input);
        let x = match &self.norm {
            Some(norm) => norm.forward(x),
            None => x,
        };
        leaky_relu(x, self.negative_slope)
    }
}

/// Transposed conv → BatchNorm → ReLU.
#[derive(Module, Debug)]
pub struct DeconvBlock<B: Backend> {
    deconv: ConvTranspose2d<B>,
    norm: BatchNorm<B, 2>,
}

impl<B: Backend> DeconvBlock<B> {
    fn new(
        channels: [usize; 2],
        kernel: usize,
        stride: usize,
        padding: usize,
        device: &B::Device,
    ) -> Self {
        Self {
            deconv: conv_transpose2d(channels, kernel, stride, padding, device),
            norm: BatchNormConfig::new(channels[1]).init(device),
        }
    }

    pub fn forward(&self, input: Tensor<B, 4>) -> Tensor<B, 4> {
        let x = self.deconv.forward(input);
        let x = self.norm.forward(x);
        leaky_relu(x, 0.0)
    }
}

/// Configuration for the DCGAN encoder.
#[derive(Config, Debug)]
pub struct EncoderConfig {
    /// Input image side length (multiple of 16).
    pub isize: usize,
    /// Latent dimension produced by the final convolution.
    pub nz: usize,
    /// Input channels.
    pub nc: usize,
    /// Channels after the first convolution.
    pub ndf: usize,
    /// Additional 3×3 conv blocks at the first resolution.
    #[config(default = 0)]
    pub extralayers: usize,
    /// Whether to end with the conv that maps 4×4 features to the latent code.
    /// The discriminator drops it to expose feature maps.
    #[config(default = true)]
    pub add_final_conv: bool,
}

impl EncoderConfig {
    /// Channel count of the 4×4 feature map before the final convolution.
    pub fn feature_channels(&self) -> usize {
        let mut csize = self.isize / 2;
        let mut cndf = self.ndf;
        while csize > 4 {
            cndf *= 2;
            csize /= 2;
        }
        cndf
    }

    pub fn init<B: Backend>(&self, device: &B::Device) -> Encoder<B> {
        let initial = ConvBlock::new([self.nc, self.ndf], 4, 2, 1, false, LEAKY_SLOPE, device);

        let extra = (0..self.extralayers)
            .map(|_| ConvBlock::new([self.ndf, self.ndf], 3, 1, 1, true, LEAKY_SLOPE, device))
            .collect();

        let mut pyramid = Vec::new();
        let mut csize = self.isize / 2;
        let mut cndf = self.ndf;
        while csize > 4 {
            pyramid.push(ConvBlock::new([cndf, cndf * 2], 4, 2, 1, true, LEAKY_SLOPE, device));
            cndf *= 2;
            csize /= 2;
        }

        let last = self
            .add_final_conv
            .then(|| conv2d([cndf, self.nz], 4, 1, 0, device));

        Encoder {
            initial,
            extra,
            pyramid,
            last,
        }
    }
}

/// DCGAN encoder: image batch to latent code (or 4×4 features).
#[derive(Module, Debug)]
pub struct Encoder<B: Backend> {
    initial: ConvBlock<B>,
    extra: Vec<ConvBlock<B>>,
    pyramid: Vec<ConvBlock<B>>,
    last: Option<Conv2d<B>>,
}

impl<B: Backend> Encoder<B> {
    /// Input `(B, nc, isize, isize)`; output `(B, nz, 1, 1)` with the final
    /// conv, `(B, cndf, 4, 4)` without it.
    pub fn forward(&self, input: Tensor<B, 4>) -> Tensor<B, 4> {
        let mut x = self.initial.forward(input);
        for block in &self.extra {
            x = block.forward(x);
        }
        for block in &self.pyramid {
            x = block.forward(x);
        }
        match &self.last {
            Some(conv) => conv.forward(x),
            None => x,
        }
    }
}

/// Configuration for the DCGAN decoder.
#[derive(Config, Debug)]
pub struct DecoderConfig {
    /// Output image side length (multiple of 16).
    pub isize: usize,
    /// Latent dimension consumed by the first transposed convolution.
    pub nz: usize,
    /// Output channels.
    pub nc: usize,
    /// Channels before the final transposed convolution.
    pub ngf: usize,
    /// Additional 3×3 conv blocks at the last resolution.
    #[config(default = 0)]
    pub extralayers: usize,
}

impl DecoderConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> Decoder<B> {
        let mut cngf = self.ngf / 2;
        let mut tisize = 4;
        while tisize < self.isize {
            cngf *= 2;
            tisize *= 2;
        }

        let initial = DeconvBlock::new([self.nz, cngf], 4, 1, 0, device);

        let mut pyramid = Vec::new();
        let mut csize = 4;
        while csize < self.isize / 2 {
            pyramid.push(DeconvBlock::new([cngf, cngf / 2], 4, 2, 1, device));
            cngf /= 2;
            csize *= 2;
        }

        let extra = (0..self.extralayers)
            .map(|_| ConvBlock::new([cngf, cngf], 3, 1, 1, true, 0.0, device))
            .collect();

        Decoder {
            initial,
            pyramid,
            extra,
            last: conv_transpose2d([cngf, self.nc], 4, 2, 1, device),
        }
    }
}

/// DCGAN decoder: latent code to image batch in [-1, 1].
#[derive(Module, Debug)]
pub struct Decoder<B: Backend> {
    initial: DeconvBlock<B>,
    pyramid: Vec<DeconvBlock<B>>,
    extra: Vec<ConvBlock<B>>,
    last: ConvTranspose2d<B>,
}

impl<B: Backend> Decoder<B> {
    /// Input `(B, nz, 1, 1)`; output `(B, nc, isize, isize)`.
    pub fn forward(&self, latent: Tensor<B, 4>) -> Tensor<B, 4> {
        let mut x = self.initial.forward(latent);
        for block in &self.pyramid {
            x = block.forward(x);
        }
        for block in &self.extra {
            x = block.forward(x);
        }
        tanh(self.last.forward(x))
    }
}
