//! GANomaly: semi-supervised anomaly detection with an adversarially
//! trained encoder-decoder-encoder.
//!
//! The generator maps an image to a latent code, reconstructs it, and
//! encodes the reconstruction again. Trained on normal samples only, the
//! two latent codes agree for normal inputs and drift apart for anomalies;
//! their mean squared difference is the anomaly score. A DCGAN
//! discriminator supplies the adversarial signal during training.

pub mod config;
pub mod data;
pub mod error;
pub mod evaluation;
pub mod model;
pub mod training;
pub mod visualizer;

pub use config::{GanomalyConfig, Phase};
pub use data::{Batch, DataLoader, InMemoryDataset};
pub use error::{GanomalyError, Result};
pub use evaluation::{EvaluatorState, Performance};
pub use model::NetworkConfig;
pub use training::{with_adam, Ganomaly, LossSnapshot, TrainReport};
pub use visualizer::{FileVisualizer, NullVisualizer, Visualizer};
