use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use tetmag::{pipeline, DipoleKernel, ProcessContext, RunConfig};

// ----------------------------------------------------------------------------
// Command line arguments
// ----------------------------------------------------------------------------
#[derive(Debug, Parser)]
#[command(
    name = "tetmag",
    version,
    about = "Prepare a tetrahedral mesh and magnetic properties for a magnetic adjoint kernel and run it."
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run the magnetic adjoint solve described by a configuration file
    Run {
        /// Configuration file in YAML format
        #[arg(long = "config_file", value_name = "PATH")]
        config_file: PathBuf,
    },
}

fn run(config_file: &Path, context: ProcessContext) -> anyhow::Result<()> {
    let config = RunConfig::load(config_file)?;
    let output = pipeline::run(&config, context, &DipoleKernel)?;

    if !output.is_empty() {
        let (min, max) = output
            .iter()
            .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), v| {
                (lo.min(*v), hi.max(*v))
            });
        #[allow(clippy::cast_precision_loss)]
        let mean = output.iter().map(|v| f64::from(*v)).sum::<f64>() / output.len() as f64;
        info!(ncells = output.len(), min, max, mean, "Migrated field");
    }
    Ok(())
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    let context = ProcessContext::from_env();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug")),
        )
        .with_target(false)
        .init();

    match cli.command {
        Command::Run { config_file } => match run(&config_file, context) {
            Ok(()) => ExitCode::SUCCESS,
            Err(e) => {
                error!("{context}: {e:#}");
                ExitCode::FAILURE
            }
        },
    }
}
