//! Epoch orchestration: training passes, evaluation after every epoch and
//! best-AUC checkpointing.

use burn::module::AutodiffModule;
use burn::optim::Optimizer;
use burn::tensor::backend::AutodiffBackend;
use indicatif::{ProgressBar, ProgressStyle};

use crate::data::DataLoader;
use crate::error::{GanomalyError, Result};
use crate::evaluation::{Evaluator, Performance};
use crate::model::bridge::ImageBatch;
use crate::model::{Discriminator, Generator};
use crate::training::metrics::{BestAuc, EpochRecord, LossSnapshot, TrainReport};
use crate::training::trainer::Ganomaly;

fn progress_bar(len: usize, message: String) -> ProgressBar {
    let pb = ProgressBar::new(len as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta}) {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("=> "),
    );
    pb.set_message(message);
    pb
}

impl<B, OG, OD> Ganomaly<B, OG, OD>
where
    B: AutodiffBackend,
    OG: Optimizer<Generator<B>, B>,
    OD: Optimizer<Discriminator<B>, B>,
{
    /// One pass over the training stream.
    ///
    /// Losses go to the visualizer every `print_freq` samples and images
    /// every `save_image_freq` samples, both counted in `total_steps`.
    /// Returns the losses of the last step.
    pub fn train_epoch(&mut self, loader: &DataLoader) -> Result<LossSnapshot> {
        let batch_size = self.config.batch_size;
        let num_samples = loader.num_samples().max(1);
        let mut epoch_iter = 0usize;
        let mut batches = 0usize;

        let pb = progress_bar(
            loader.num_batches(),
            format!("Epoch {}/{}", self.epoch + 1, self.config.niter),
        );

        for batch in loader.iter::<B>(&self.device, self.epoch) {
            self.total_steps += batch_size;
            epoch_iter += batch_size;
            batches += 1;

            self.set_input(&batch)?;
            self.optimize()?;

            if self.total_steps % self.config.print_freq == 0 {
                let errors = self.get_errors();
                tracing::debug!(
                    epoch = self.epoch,
                    total_steps = self.total_steps,
                    err_d = errors.err_d,
                    err_g = errors.err_g,
                    "Losses"
                );
                if self.config.display {
                    let counter_ratio = epoch_iter as f64 / num_samples as f64;
                    self.visualizer
                        .plot_current_errors(self.epoch, counter_ratio, &errors)?;
                }
            }

            if self.total_steps % self.config.save_image_freq == 0 {
                let images = self.get_current_images()?;
                self.visualizer.save_current_images(
                    self.epoch,
                    &ImageBatch::from_tensor(images.reals)?,
                    &ImageBatch::from_tensor(images.fakes)?,
                    &ImageBatch::from_tensor(images.fixed)?,
                )?;
            }
            pb.inc(1);
        }
        pb.finish_and_clear();

        if batches == 0 {
            return Err(GanomalyError::EmptyStream("train".into()));
        }

        let errors = self.get_errors();
        tracing::info!(
            epoch = self.epoch + 1,
            niter = self.config.niter,
            batches,
            "Training model Ganomaly. {errors}"
        );
        self.visualizer.print_current_errors(self.epoch, &errors)?;
        Ok(errors)
    }

    /// Train from `config.iter` to `config.niter`, evaluating after every
    /// epoch and saving weights whenever the AUC strictly improves.
    ///
    /// The best AUC starts at 0 on every call, including resumed runs.
    pub fn train(&mut self, train: &DataLoader, test: &DataLoader) -> Result<TrainReport> {
        self.total_steps = 0;
        let mut best = BestAuc::new();
        let mut report = TrainReport::default();

        tracing::info!(
            start = self.config.iter,
            niter = self.config.niter,
            samples = train.num_samples(),
            "Training model Ganomaly"
        );

        for epoch in self.config.iter..self.config.niter {
            self.epoch = epoch;
            let resets_before = self.discriminator_resets;

            let losses = self.train_epoch(train)?;
            let performance = self.test(test)?;

            let checkpointed = best.observe(performance.auc);
            if checkpointed {
                self.save_weights(epoch)?;
            }
            self.visualizer
                .print_current_performance(&performance, best.value())?;
            tracing::info!(
                epoch,
                auc = performance.auc,
                eer = performance.eer,
                best_auc = best.value(),
                "{performance}"
            );

            report.epochs.push(EpochRecord {
                epoch,
                losses,
                performance,
                checkpointed,
                discriminator_resets: self.discriminator_resets - resets_before,
            });
        }

        report.best_auc = best.value();
        tracing::info!(best_auc = report.best_auc, "Training model Ganomaly. [Done]");
        Ok(report)
    }

    /// Score the test stream with the generator in inference mode.
    ///
    /// With `load_weights` set, the generator is first loaded from the run's
    /// weights directory. Resets `total_steps`, so the next training batch
    /// re-caches the fixed input. The score tables stay available through
    /// [`evaluation`](Self::evaluation).
    pub fn test(&mut self, loader: &DataLoader) -> Result<Performance> {
        if self.config.load_weights {
            self.load_generator_weights()?;
        }
        self.total_steps = 0;

        let generator = self.netg.valid();
        let mut evaluator = Evaluator::new(
            &generator,
            &self.device,
            self.config.network.image_dims(),
            self.config.network.nz,
        );
        if self.config.save_test_images {
            evaluator = evaluator.with_image_dir(self.config.test_dir().join("images"));
        }
        let (performance, state) = evaluator.run(loader)?;

        if self.config.display {
            let seen = loader.num_batches() * loader.batch_size();
            let counter_ratio = seen as f64 / loader.num_samples().max(1) as f64;
            self.visualizer
                .plot_performance(self.epoch, counter_ratio, &performance)?;
        }
        self.evaluation = Some(state);
        Ok(performance)
    }
}
