use crate::error::{GanomalyError, Result};

/// Labeled images in `(N, C, H, W)` row-major order.
#[derive(Debug, Clone, PartialEq)]
pub struct InMemoryDataset {
    dims: [usize; 3],
    images: Vec<f32>,
    labels: Vec<i64>,
}

impl InMemoryDataset {
    /// `dims` is the per-sample shape `[C, H, W]`.
    pub fn new(dims: [usize; 3], images: Vec<f32>, labels: Vec<i64>) -> Result<Self> {
        let stride: usize = dims.iter().product();
        if stride == 0 {
            return Err(GanomalyError::Data(format!("empty sample shape {dims:?}")));
        }
        if images.len() != stride * labels.len() {
            return Err(GanomalyError::Data(format!(
                "{} labels need {} pixel values, got {}",
                labels.len(),
                stride * labels.len(),
                images.len()
            )));
        }
        Ok(Self {
            dims,
            images,
            labels,
        })
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    /// Per-sample shape `[C, H, W]`.
    pub fn dims(&self) -> [usize; 3] {
        self.dims
    }

    fn stride(&self) -> usize {
        self.dims.iter().product()
    }

    /// Pixels and label of sample `index`.
    pub fn get(&self, index: usize) -> Option<(&[f32], i64)> {
        let label = *self.labels.get(index)?;
        let stride = self.stride();
        Some((&self.images[index * stride..(index + 1) * stride], label))
    }

    pub fn labels(&self) -> &[i64] {
        &self.labels
    }

    /// Gather `indices` into one flat pixel buffer and a label vector.
    pub(crate) fn gather(&self, indices: &[usize]) -> (Vec<f32>, Vec<i64>) {
        let stride = self.stride();
        let mut images = Vec::with_capacity(indices.len() * stride);
        let mut labels = Vec::with_capacity(indices.len());
        for &i in indices {
            images.extend_from_slice(&self.images[i * stride..(i + 1) * stride]);
            labels.push(self.labels[i]);
        }
        (images, labels)
    }

    /// Number of samples per label value, sorted by label.
    pub fn label_counts(&self) -> Vec<(i64, usize)> {
        let mut counts = std::collections::BTreeMap::new();
        for &label in &self.labels {
            *counts.entry(label).or_insert(0usize) += 1;
        }
        counts.into_iter().collect()
    }
}
