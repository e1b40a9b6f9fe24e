//! Streaming evaluation over a test set.
//!
//! Every sample gets one score, the mean squared difference between its
//! two latent codes. Scores and labels go into tables preallocated to the
//! stream's declared length, at offset `batch_index * batch_size`. After
//! the stream ends the score table is min-max normalized and handed to the
//! ROC computation.

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Instant;

use burn::prelude::*;
use serde::{Deserialize, Serialize};

use crate::data::{Batch, DataLoader};
use crate::error::{GanomalyError, Result};
use crate::evaluation::roc::roc;
use crate::model::bridge::{flatten_latent, tensor_to_vec, ImageBatch};
use crate::model::Generator;
use crate::visualizer::save_image_grid;

/// Number of leading per-batch timings averaged into the reported run time.
pub const TIMING_WINDOW: usize = 100;

/// Result of one evaluation pass.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Performance {
    /// Mean forward time per batch over the first [`TIMING_WINDOW`] batches.
    pub avg_run_time_ms: f64,
    pub eer: f64,
    pub auc: f64,
}

impl fmt::Display for Performance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Avg Run Time (ms/batch): {:.3} EER: {:.3} AUC: {:.3}",
            self.avg_run_time_ms, self.eer, self.auc
        )
    }
}

/// Per-sample anomaly score: mean over the latent dimension of
/// `(latent_i - latent_o)^2`.
///
/// Latents are `(B, nz, 1, 1)`; the result has shape `(B,)`.
pub fn anomaly_scores<B: Backend>(latent_i: Tensor<B, 4>, latent_o: Tensor<B, 4>) -> Tensor<B, 1> {
    let diff = flatten_latent(latent_i) - flatten_latent(latent_o);
    diff.powf_scalar(2.0).mean_dim(1).squeeze::<1>(1)
}

/// Mean of the first [`TIMING_WINDOW`] timings (seconds), in milliseconds.
///
/// Returns 0 for an empty slice.
pub fn average_first_timings(times: &[f64]) -> f64 {
    let window = &times[..times.len().min(TIMING_WINDOW)];
    if window.is_empty() {
        return 0.0;
    }
    window.iter().sum::<f64>() / window.len() as f64 * 1000.0
}

/// Min-max normalize in place to [0, 1].
///
/// When every score is equal the range is degenerate and all scores become 0.
pub fn normalize_scores(scores: &mut [f32]) {
    let (min, max) = scores
        .iter()
        .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), &s| (lo.min(s), hi.max(s)));
    let range = max - min;
    if range <= 0.0 || !range.is_finite() {
        scores.iter_mut().for_each(|s| *s = 0.0);
        return;
    }
    for s in scores.iter_mut() {
        *s = (*s - min) / range;
    }
}

/// Score, label and latent tables for one evaluation pass.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluatorState {
    /// Anomaly score per sample; normalized once the pass finishes.
    pub scores: Vec<f32>,
    pub labels: Vec<i64>,
    /// `latent_i` per sample, `nz` values each.
    pub latent_i: Vec<f32>,
    /// `latent_o` per sample, `nz` values each.
    pub latent_o: Vec<f32>,
    pub nz: usize,
    /// Per-batch forward time in seconds.
    pub times: Vec<f64>,
    #[serde(skip)]
    filled: usize,
}

impl EvaluatorState {
    /// Zero-filled tables for `num_samples` samples.
    pub fn new(num_samples: usize, nz: usize) -> Self {
        Self {
            scores: vec![0.0; num_samples],
            labels: vec![0; num_samples],
            latent_i: vec![0.0; num_samples * nz],
            latent_o: vec![0.0; num_samples * nz],
            nz,
            times: Vec::new(),
            filled: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.scores.len()
    }

    /// Number of samples recorded so far.
    pub fn filled(&self) -> usize {
        self.filled
    }

    /// Write one batch's results starting at sample `offset`.
    pub fn record(
        &mut self,
        offset: usize,
        scores: &[f32],
        labels: &[i64],
        latent_i: &[f32],
        latent_o: &[f32],
    ) -> Result<()> {
        let n = scores.len();
        if labels.len() != n || latent_i.len() != n * self.nz || latent_o.len() != n * self.nz {
            return Err(GanomalyError::shape(
                (n, n * self.nz),
                (labels.len(), latent_i.len().max(latent_o.len())),
            ));
        }
        if offset + n > self.capacity() {
            return Err(GanomalyError::Data(format!(
                "batch at offset {offset} with {n} samples overruns {} declared samples",
                self.capacity()
            )));
        }

        self.scores[offset..offset + n].copy_from_slice(scores);
        self.labels[offset..offset + n].copy_from_slice(labels);
        let (lo, hi) = (offset * self.nz, (offset + n) * self.nz);
        self.latent_i[lo..hi].copy_from_slice(latent_i);
        self.latent_o[lo..hi].copy_from_slice(latent_o);
        self.filled += n;
        Ok(())
    }

    /// Latent codes of sample `index`.
    pub fn latents(&self, index: usize) -> (&[f32], &[f32]) {
        let range = index * self.nz..(index + 1) * self.nz;
        (&self.latent_i[range.clone()], &self.latent_o[range])
    }

    /// Average timing, normalize the scores and compute AUC/EER.
    pub fn finalize(&mut self) -> Result<Performance> {
        if self.filled != self.capacity() {
            return Err(GanomalyError::Data(format!(
                "stream yielded {} of {} declared samples",
                self.filled,
                self.capacity()
            )));
        }
        if let Some(index) = self.scores.iter().position(|s| !s.is_finite()) {
            return Err(GanomalyError::Data(format!(
                "non-finite anomaly score {} at sample {index}",
                self.scores[index]
            )));
        }
        let avg_run_time_ms = average_first_timings(&self.times);
        normalize_scores(&mut self.scores);
        let metrics = roc(&self.labels, &self.scores)?;
        Ok(Performance {
            avg_run_time_ms,
            eer: metrics.eer,
            auc: metrics.auc,
        })
    }

    /// Write all tables as JSON.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        serde_json::to_writer(std::fs::File::create(path)?, self)?;
        Ok(())
    }
}

/// Runs the generator over a test stream and scores every sample.
///
/// Works on any backend; pass `netg.valid()` from a training model so
/// batch norm uses its running statistics.
pub struct Evaluator<'a, B: Backend> {
    generator: &'a Generator<B>,
    device: B::Device,
    image_dims: [usize; 3],
    nz: usize,
    image_dir: Option<PathBuf>,
}

impl<'a, B: Backend> Evaluator<'a, B> {
    pub fn new(
        generator: &'a Generator<B>,
        device: &B::Device,
        image_dims: [usize; 3],
        nz: usize,
    ) -> Self {
        Self {
            generator,
            device: device.clone(),
            image_dims,
            nz,
            image_dir: None,
        }
    }

    /// Save `real_NNN.png` / `fake_NNN.png` for every batch into `dir`.
    pub fn with_image_dir(mut self, dir: PathBuf) -> Self {
        self.image_dir = Some(dir);
        self
    }

    fn check(&self, batch: &Batch<B>, batch_size: usize) -> Result<usize> {
        let dims = batch.images.dims();
        let [c, h, w] = self.image_dims;
        if dims[0] == 0 || dims[0] > batch_size || dims[1..] != [c, h, w] || batch.len() != dims[0] {
            return Err(GanomalyError::shape([batch_size, c, h, w], dims));
        }
        Ok(dims[0])
    }

    /// Score every batch of `loader` in order and compute performance.
    pub fn run(&self, loader: &DataLoader) -> Result<(Performance, EvaluatorState)> {
        let batch_size = loader.batch_size();
        let mut state = EvaluatorState::new(loader.num_samples(), self.nz);
        if let Some(dir) = &self.image_dir {
            std::fs::create_dir_all(dir)?;
        }

        for (i, batch) in loader.iter::<B>(&self.device, 0).enumerate() {
            let n = self.check(&batch, batch_size)?;

            let start = Instant::now();
            let output = self.generator.forward(batch.images.clone());
            let scores = tensor_to_vec(anomaly_scores(
                output.latent_i.clone(),
                output.latent_o.clone(),
            ))?;
            state.times.push(start.elapsed().as_secs_f64());

            let latent_i = tensor_to_vec(flatten_latent(output.latent_i).flatten::<1>(0, 1))?;
            let latent_o = tensor_to_vec(flatten_latent(output.latent_o).flatten::<1>(0, 1))?;
            state.record(i * batch_size, &scores, &batch.labels, &latent_i, &latent_o)?;

            if let Some(dir) = &self.image_dir {
                save_image_grid(
                    &ImageBatch::from_tensor(batch.images)?,
                    &dir.join(format!("real_{:03}.png", i + 1)),
                )?;
                save_image_grid(
                    &ImageBatch::from_tensor(output.reconstruction)?,
                    &dir.join(format!("fake_{:03}.png", i + 1)),
                )?;
            }
            tracing::trace!(batch = i, samples = n, "Scored batch");
        }

        if state.times.is_empty() {
            return Err(GanomalyError::EmptyStream("test".into()));
        }
        let performance = state.finalize()?;
        Ok((performance, state))
    }
}
