mod config;
mod pipeline;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use config::Options;
use pipeline::RunArgs;

/// ganomaly: adversarially trained autoencoder for image anomaly detection.
#[derive(Parser)]
#[command(name = "ganomaly", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

/// CLI subcommands for training and evaluation.
#[derive(Subcommand)]
enum Command {
    /// Train on `<dataroot>/train`, evaluating on `<dataroot>/test` every epoch.
    Train {
        /// Path to a run config TOML file with an `[options]` table.
        #[arg(long)]
        config: Option<PathBuf>,
        /// Dataset root with `train/` and `test/` class folders.
        #[arg(long)]
        dataroot: PathBuf,
        #[command(flatten)]
        options: Options,
    },
    /// Evaluate the saved generator on `<dataroot>/test`.
    Test {
        /// Path to a run config TOML file with an `[options]` table.
        #[arg(long)]
        config: Option<PathBuf>,
        /// Dataset root with a `test/` class folder.
        #[arg(long)]
        dataroot: PathBuf,
        #[command(flatten)]
        options: Options,
    },
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Train {
            config,
            dataroot,
            options,
        } => pipeline::run_train(RunArgs {
            config,
            dataroot,
            options,
        }),
        Command::Test {
            config,
            dataroot,
            options,
        } => pipeline::run_test(RunArgs {
            config,
            dataroot,
            options,
        }),
    }
}
