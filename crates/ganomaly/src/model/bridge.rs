//! Tensor bridge: conversions between burn tensors and host-side buffers.
//!
//! Data loading, score tables and image sinks all work on plain `Vec<f32>`;
//! the networks need `Tensor<B, 4>` batches. Everything that crosses that
//! boundary goes through here.

use burn::prelude::*;
use burn::tensor::TensorData;

use crate::error::{GanomalyError, Result};

/// Host copy of an image batch in `(B, C, H, W)` row-major order.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageBatch {
    pub dims: [usize; 4],
    pub data: Vec<f32>,
}

impl ImageBatch {
    /// Read a 4D tensor back to the host.
    pub fn from_tensor<B: Backend>(tensor: Tensor<B, 4>) -> Result<Self> {
        let dims = tensor.dims();
        let data = tensor
            .into_data()
            .convert::<f32>()
            .to_vec::<f32>()
            .map_err(|e| GanomalyError::TensorRead(format!("{e:?}")))?;
        Ok(Self { dims, data })
    }

    pub fn batch_size(&self) -> usize {
        self.dims[0]
    }

    /// Pixels of sample `index`, `C * H * W` values.
    pub fn sample(&self, index: usize) -> &[f32] {
        let stride = self.dims[1] * self.dims[2] * self.dims[3];
        &self.data[index * stride..(index + 1) * stride]
    }
}

/// Build a `(B, C, H, W)` tensor from a flat buffer.
///
/// # Panics
/// Panics if `data.len()` does not match the product of `dims`.
pub fn images_to_tensor<B: Backend>(
    data: Vec<f32>,
    dims: [usize; 4],
    device: &B::Device,
) -> Tensor<B, 4> {
    assert_eq!(
        data.len(),
        dims.iter().product::<usize>(),
        "image buffer length does not match dims {dims:?}"
    );
    Tensor::from_data(TensorData::new(data, dims), device)
}

/// Extract f32 values from a burn 1D tensor.
pub fn tensor_to_vec<B: Backend>(tensor: Tensor<B, 1>) -> Result<Vec<f32>> {
    tensor
        .into_data()
        .convert::<f32>()
        .to_vec::<f32>()
        .map_err(|e| GanomalyError::TensorRead(format!("{e:?}")))
}

/// Extract a single f64 scalar from a one-element tensor.
pub fn tensor_to_f64<B: Backend>(tensor: Tensor<B, 1>) -> f64 {
    tensor.into_scalar().elem::<f64>()
}

/// Flatten `(B, nz, 1, 1)` latent codes to `(B, nz)`.
pub fn flatten_latent<B: Backend>(latent: Tensor<B, 4>) -> Tensor<B, 2> {
    let [batch, nz, h, w] = latent.dims();
    latent.reshape([batch, nz * h * w])
}
