use std::marker::PhantomData;
use std::sync::Arc;

use burn::prelude::*;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

use crate::data::InMemoryDataset;
use crate::model::bridge::images_to_tensor;

/// One batch of images and their labels.
#[derive(Debug, Clone)]
pub struct Batch<B: Backend> {
    /// `(n, C, H, W)` with `n <= batch_size`.
    pub images: Tensor<B, 4>,
    /// One label per image: 0 normal, 1 abnormal.
    pub labels: Vec<i64>,
}

impl<B: Backend> Batch<B> {
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }
}

/// Splits a dataset into batches, optionally shuffled per epoch.
#[derive(Debug, Clone)]
pub struct DataLoader {
    dataset: Arc<InMemoryDataset>,
    batch_size: usize,
    shuffle_seed: Option<u64>,
    drop_last: bool,
}

impl DataLoader {
    /// In-order loader that keeps the last partial batch.
    pub fn new(dataset: InMemoryDataset, batch_size: usize) -> Self {
        Self {
            dataset: Arc::new(dataset),
            batch_size: batch_size.max(1),
            shuffle_seed: None,
            drop_last: false,
        }
    }

    /// Shuffle sample order each epoch, deterministically from `seed`.
    pub fn with_shuffle(mut self, seed: u64) -> Self {
        self.shuffle_seed = Some(seed);
        self
    }

    /// Skip the last batch if it is smaller than `batch_size`.
    pub fn with_drop_last(mut self, drop_last: bool) -> Self {
        self.drop_last = drop_last;
        self
    }

    pub fn dataset(&self) -> &InMemoryDataset {
        &self.dataset
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Number of samples in the underlying dataset.
    pub fn num_samples(&self) -> usize {
        self.dataset.len()
    }

    /// Number of batches one pass yields.
    pub fn num_batches(&self) -> usize {
        let n = self.dataset.len();
        if self.drop_last {
            n / self.batch_size
        } else {
            n.div_ceil(self.batch_size)
        }
    }

    /// Sample order for `epoch`.
    fn order(&self, epoch: usize) -> Vec<usize> {
        let mut order: Vec<usize> = (0..self.dataset.len()).collect();
        if let Some(seed) = self.shuffle_seed {
            let mut rng = StdRng::seed_from_u64(seed.wrapping_add(epoch as u64));
            order.shuffle(&mut rng);
        }
        order
    }

    /// Single pass over the dataset for `epoch`.
    pub fn iter<B: Backend>(&self, device: &B::Device, epoch: usize) -> BatchIter<B> {
        let mut order = self.order(epoch);
        if self.drop_last {
            order.truncate(self.num_batches() * self.batch_size);
        }
        BatchIter {
            dataset: Arc::clone(&self.dataset),
            order,
            batch_size: self.batch_size,
            cursor: 0,
            device: device.clone(),
            _backend: PhantomData,
        }
    }
}

/// Iterator over the batches of one epoch.
pub struct BatchIter<B: Backend> {
    dataset: Arc<InMemoryDataset>,
    order: Vec<usize>,
    batch_size: usize,
    cursor: usize,
    device: B::Device,
    _backend: PhantomData<B>,
}

impl<B: Backend> Iterator for BatchIter<B> {
    type Item = Batch<B>;

    fn next(&mut self) -> Option<Batch<B>> {
        if self.cursor >= self.order.len() {
            return None;
        }
        let end = (self.cursor + self.batch_size).min(self.order.len());
        let indices = &self.order[self.cursor..end];
        self.cursor = end;

        let (images, labels) = self.dataset.gather(indices);
        let [c, h, w] = self.dataset.dims();
        let images = images_to_tensor::<B>(images, [labels.len(), c, h, w], &self.device);
        Some(Batch { images, labels })
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = (self.order.len() - self.cursor).div_ceil(self.batch_size);
        (remaining, Some(remaining))
    }
}

impl<B: Backend> ExactSizeIterator for BatchIter<B> {}
