//! Sinks for losses, images and performance records.
//!
//! The training loop only pushes into a [`Visualizer`]; nothing it returns
//! is read back. [`FileVisualizer`] writes everything under the run
//! directory:
//!
//! ```text
//! <outf>/<name>/train/loss_log.txt            text log of losses and performance
//! <outf>/<name>/train/plot_errors.jsonl       one LossSnapshot per print cadence
//! <outf>/<name>/train/images/{reals,fakes}.png
//! <outf>/<name>/train/images/fixed_fakes_NNN.png
//! <outf>/<name>/test/plot_performance.jsonl   one Performance per evaluation
//! ```

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use image::{Rgb, RgbImage};
use serde::Serialize;

use crate::config::GanomalyConfig;
use crate::error::{GanomalyError, Result};
use crate::evaluation::Performance;
use crate::model::bridge::ImageBatch;
use crate::training::metrics::LossSnapshot;

/// Images per row in saved grids.
const GRID_COLUMNS: usize = 8;
/// Pixels between grid cells.
const GRID_PADDING: usize = 2;

/// Receives training progress. All methods default to doing nothing.
pub trait Visualizer {
    /// Loss values at a print cadence; `counter_ratio` is the fraction of
    /// the epoch completed.
    fn plot_current_errors(
        &mut self,
        _epoch: usize,
        _counter_ratio: f64,
        _errors: &LossSnapshot,
    ) -> Result<()> {
        Ok(())
    }

    /// Loss values at the end of an epoch.
    fn print_current_errors(&mut self, _epoch: usize, _errors: &LossSnapshot) -> Result<()> {
        Ok(())
    }

    /// Current inputs, their reconstructions and the fixed-input reconstruction.
    fn save_current_images(
        &mut self,
        _epoch: usize,
        _reals: &ImageBatch,
        _fakes: &ImageBatch,
        _fixed: &ImageBatch,
    ) -> Result<()> {
        Ok(())
    }

    /// Performance of an evaluation pass.
    fn plot_performance(
        &mut self,
        _epoch: usize,
        _counter_ratio: f64,
        _performance: &Performance,
    ) -> Result<()> {
        Ok(())
    }

    /// Performance after an epoch, with the best AUC so far.
    fn print_current_performance(&mut self, _performance: &Performance, _best_auc: f64) -> Result<()> {
        Ok(())
    }
}

/// Discards everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullVisualizer;

impl Visualizer for NullVisualizer {}

/// Writes logs, JSON lines and PNG grids under the run directory.
#[derive(Debug, Clone)]
pub struct FileVisualizer {
    niter: usize,
    loss_log: PathBuf,
    error_plot: PathBuf,
    performance_plot: PathBuf,
    image_dir: PathBuf,
}

fn append(path: &Path) -> Result<File> {
    Ok(OpenOptions::new().create(true).append(true).open(path)?)
}

fn append_json<T: Serialize>(path: &Path, record: &T) -> Result<()> {
    let mut file = append(path)?;
    serde_json::to_writer(&mut file, record)?;
    writeln!(file)?;
    Ok(())
}

#[derive(Serialize)]
struct PlotPoint<'a, T> {
    epoch: usize,
    counter_ratio: f64,
    #[serde(flatten)]
    values: &'a T,
}

impl FileVisualizer {
    /// Create the train/test directories and start a new loss log section.
    pub fn new(config: &GanomalyConfig) -> Result<Self> {
        let train_dir = config.train_dir();
        let test_dir = config.test_dir();
        let image_dir = train_dir.join("images");
        std::fs::create_dir_all(&image_dir)?;
        std::fs::create_dir_all(&test_dir)?;

        let loss_log = train_dir.join("loss_log.txt");
        let started = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);
        writeln!(
            append(&loss_log)?,
            "================ Training Loss (unix {started}) ================"
        )?;

        Ok(Self {
            niter: config.niter,
            loss_log,
            error_plot: train_dir.join("plot_errors.jsonl"),
            performance_plot: test_dir.join("plot_performance.jsonl"),
            image_dir,
        })
    }

    pub fn loss_log(&self) -> &Path {
        &self.loss_log
    }

    pub fn image_dir(&self) -> &Path {
        &self.image_dir
    }
}

impl Visualizer for FileVisualizer {
    fn plot_current_errors(
        &mut self,
        epoch: usize,
        counter_ratio: f64,
        errors: &LossSnapshot,
    ) -> Result<()> {
        append_json(
            &self.error_plot,
            &PlotPoint {
                epoch,
                counter_ratio,
                values: errors,
            },
        )
    }

    fn print_current_errors(&mut self, epoch: usize, errors: &LossSnapshot) -> Result<()> {
        writeln!(
            append(&self.loss_log)?,
            "   Loss: [{epoch}/{}] {errors}",
            self.niter
        )?;
        Ok(())
    }

    fn save_current_images(
        &mut self,
        epoch: usize,
        reals: &ImageBatch,
        fakes: &ImageBatch,
        fixed: &ImageBatch,
    ) -> Result<()> {
        save_image_grid(reals, &self.image_dir.join("reals.png"))?;
        save_image_grid(fakes, &self.image_dir.join("fakes.png"))?;
        save_image_grid(fixed, &self.image_dir.join(format!("fixed_fakes_{epoch:03}.png")))
    }

    fn plot_performance(
        &mut self,
        epoch: usize,
        counter_ratio: f64,
        performance: &Performance,
    ) -> Result<()> {
        append_json(
            &self.performance_plot,
            &PlotPoint {
                epoch,
                counter_ratio,
                values: performance,
            },
        )
    }

    fn print_current_performance(&mut self, performance: &Performance, best_auc: f64) -> Result<()> {
        writeln!(
            append(&self.loss_log)?,
            "   {performance} max AUC: {best_auc:.3}"
        )?;
        Ok(())
    }
}

/// Save a batch as a PNG grid of up to 8 images per row.
///
/// Values are min-max scaled over the whole batch. Single-channel images
/// are written as gray, three-channel as RGB.
pub fn save_image_grid(batch: &ImageBatch, path: &Path) -> Result<()> {
    let [n, c, h, w] = batch.dims;
    if n == 0 || !(c == 1 || c == 3) {
        return Err(GanomalyError::shape("(n > 0, 1 | 3, H, W)", batch.dims));
    }

    let (min, max) = batch
        .data
        .iter()
        .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), &v| (lo.min(v), hi.max(v)));
    let range = if max > min { max - min } else { 1.0 };
    let to_byte = |v: f32| (((v - min) / range).clamp(0.0, 1.0) * 255.0).round() as u8;

    let columns = n.min(GRID_COLUMNS);
    let rows = n.div_ceil(GRID_COLUMNS);
    let cell_w = w + GRID_PADDING;
    let cell_h = h + GRID_PADDING;
    let mut grid = RgbImage::new(
        (columns * cell_w + GRID_PADDING) as u32,
        (rows * cell_h + GRID_PADDING) as u32,
    );

    for index in 0..n {
        let sample = batch.sample(index);
        let x0 = (index % GRID_COLUMNS) * cell_w + GRID_PADDING;
        let y0 = (index / GRID_COLUMNS) * cell_h + GRID_PADDING;
        for y in 0..h {
            for x in 0..w {
                let at = |ch: usize| to_byte(sample[ch * h * w + y * w + x]);
                let pixel = if c == 1 {
                    let v = at(0);
                    Rgb([v, v, v])
                } else {
                    Rgb([at(0), at(1), at(2)])
                };
                grid.put_pixel((x0 + x) as u32, (y0 + y) as u32, pixel);
            }
        }
    }

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    grid.save(path)?;
    Ok(())
}
