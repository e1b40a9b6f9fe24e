//! Image datasets and batch streams.
//!
//! Datasets are held in memory as flat `(N, C, H, W)` buffers with one
//! integer label per sample (0 = normal, 1 = abnormal). The loader turns a
//! dataset into a stream of [`Batch`]es on any burn backend.

pub mod dataset;
pub mod folder;
pub mod loader;

pub use dataset::InMemoryDataset;
pub use folder::load_image_folder;
pub use loader::{Batch, BatchIter, DataLoader};

use std::path::Path;

use crate::config::GanomalyConfig;
use crate::error::Result;

/// Build the train and test loaders for `<root>/train` and `<root>/test`.
///
/// Training batches are shuffled and drop the last partial batch; test
/// batches keep dataset order and keep the partial batch.
pub fn load_data(root: &Path, config: &GanomalyConfig) -> Result<(DataLoader, DataLoader)> {
    let dims = config.network.image_dims();
    let train = load_image_folder(&root.join("train"), dims)?;
    let test = load_image_folder(&root.join("test"), dims)?;
    tracing::info!(
        train = train.len(),
        test = test.len(),
        root = %root.display(),
        "Loaded image folders"
    );
    Ok(loaders(train, test, config))
}

/// Wrap in-memory datasets in train/test loaders.
pub fn loaders(
    train: InMemoryDataset,
    test: InMemoryDataset,
    config: &GanomalyConfig,
) -> (DataLoader, DataLoader) {
    (
        DataLoader::new(train, config.batch_size)
            .with_shuffle(config.seed)
            .with_drop_last(true),
        DataLoader::new(test, config.batch_size),
    )
}
