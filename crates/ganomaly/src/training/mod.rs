//! GANomaly training: losses, the two-network optimization step, epoch
//! orchestration with best-AUC checkpointing, and weight I/O.

pub mod checkpoint;
pub mod epoch;
pub mod loss;
pub mod metrics;
pub mod trainer;

pub use checkpoint::CheckpointMeta;
pub use metrics::{BestAuc, EpochRecord, LossSnapshot, TrainReport};
pub use trainer::{should_reinitialize, with_adam, CurrentImages, Ganomaly};
