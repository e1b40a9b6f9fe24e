//! Train and test pipelines behind the CLI subcommands.

use std::path::PathBuf;
use std::time::Instant;

use anyhow::Context;
use burn::backend::Autodiff;
use serde::Serialize;

use ganomaly::data::load_data;
use ganomaly::{with_adam, FileVisualizer, GanomalyConfig, Performance, Phase};

use crate::config::{build_config, Options};

#[cfg(not(feature = "wgpu"))]
mod backend {
    use burn::backend::ndarray::{NdArray, NdArrayDevice};

    pub type Inner = NdArray<f32>;

    pub fn device(gpu_ids: &[usize]) -> NdArrayDevice {
        if !gpu_ids.is_empty() {
            tracing::warn!(?gpu_ids, "Built without the wgpu feature; running on CPU");
        }
        NdArrayDevice::Cpu
    }
}

#[cfg(feature = "wgpu")]
mod backend {
    use burn::backend::wgpu::{Wgpu, WgpuDevice};

    pub type Inner = Wgpu;

    pub fn device(gpu_ids: &[usize]) -> WgpuDevice {
        match gpu_ids.first() {
            Some(&id) => WgpuDevice::DiscreteGpu(id),
            None => WgpuDevice::default(),
        }
    }
}

type TrainBackend = Autodiff<backend::Inner>;

/// Arguments shared by the `train` and `test` subcommands.
#[derive(Debug)]
pub struct RunArgs {
    /// Optional TOML file with an `[options]` table.
    pub config: Option<PathBuf>,
    /// Dataset root containing `train/` and `test/` image folders.
    pub dataroot: PathBuf,
    /// CLI option overrides.
    pub options: Options,
}

/// Written to `<outf>/<name>/test/performance.json` by `test`.
#[derive(Debug, Serialize)]
struct TestSummary<'a> {
    weights: String,
    samples: usize,
    performance: &'a Performance,
}

fn prepare(args: &RunArgs, phase: Phase) -> anyhow::Result<GanomalyConfig> {
    let mut config = build_config(args.config.as_ref(), &args.options, phase)?;
    if phase == Phase::Test {
        config.load_weights = true;
    }
    let opt_path = config.save_options()?;
    tracing::info!(path = %opt_path.display(), "Saved options");
    Ok(config)
}

/// Train, evaluating after every epoch and checkpointing on AUC improvement.
pub fn run_train(args: RunArgs) -> anyhow::Result<()> {
    let start = Instant::now();
    let config = prepare(&args, Phase::Train)?;
    let device = backend::device(&config.gpu_ids);

    let (train, test) = load_data(&args.dataroot, &config)
        .with_context(|| format!("Failed to load data from {}", args.dataroot.display()))?;
    let visualizer = FileVisualizer::new(&config)?;
    let mut model = with_adam::<TrainBackend>(config.clone(), &device)?
        .with_visualizer(Box::new(visualizer));

    let report = model.train(&train, &test).context("Training failed")?;

    let report_path = config.train_dir().join("report.json");
    serde_json::to_writer_pretty(std::fs::File::create(&report_path)?, &report)?;

    let resets: usize = report.epochs.iter().map(|r| r.discriminator_resets).sum();
    tracing::info!(
        best_auc = report.best_auc,
        checkpoints = report.checkpoint_epochs().len(),
        discriminator_resets = resets,
        elapsed_secs = start.elapsed().as_secs(),
        report = %report_path.display(),
        "Training finished"
    );
    println!("Best AUC: {:.4}", report.best_auc);
    Ok(())
}

/// Evaluate saved generator weights on the test split.
pub fn run_test(args: RunArgs) -> anyhow::Result<()> {
    let config = prepare(&args, Phase::Test)?;
    let device = backend::device(&config.gpu_ids);

    let (_, test) = load_data(&args.dataroot, &config)
        .with_context(|| format!("Failed to load data from {}", args.dataroot.display()))?;
    let mut model = with_adam::<TrainBackend>(config.clone(), &device)?;
    let performance = model.test(&test).context("Evaluation failed")?;

    let test_dir = config.test_dir();
    std::fs::create_dir_all(&test_dir)?;
    if let Some(state) = model.evaluation() {
        state.save(&test_dir.join("scores.json"))?;
    }
    let summary = TestSummary {
        weights: config.weights_dir().display().to_string(),
        samples: test.num_samples(),
        performance: &performance,
    };
    serde_json::to_writer_pretty(
        std::fs::File::create(test_dir.join("performance.json"))?,
        &summary,
    )?;

    tracing::info!(
        auc = performance.auc,
        eer = performance.eer,
        avg_run_time_ms = performance.avg_run_time_ms,
        "Evaluation finished"
    );
    println!("{performance}");
    Ok(())
}
