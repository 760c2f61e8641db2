//! Rexsort CLI - sort replica-exchange histories by thermodynamic state
//!
//! Provides subcommands for running a demultiplexing pass and for writing
//! a starter configuration file.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use rexsort::demux::layout::{self, RunConfig};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "rexsort")]
#[command(about = "Demultiplex replica-exchange history logs into per-state trajectories", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a demultiplexing pass
    Run {
        /// JSON configuration file (flags below override it)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Number of replicas
        #[arg(short = 'n', long)]
        replicas: Option<usize>,

        /// Job (restart segment) number
        #[arg(short, long)]
        job: Option<u32>,

        /// File name prefix
        #[arg(long)]
        prefix: Option<String>,

        /// Stop at this timestep instead of inferring it
        #[arg(long)]
        final_step: Option<i64>,

        /// Offset between record timestamps and physical steps
        #[arg(long)]
        round_offset: Option<i64>,

        /// Directory holding the per-replica histories
        #[arg(long)]
        input_root: Option<PathBuf>,

        /// Directory receiving the per-state trajectories
        #[arg(long)]
        output_root: Option<PathBuf>,

        /// Route by the tracked permutation even when a record's state label disagrees
        #[arg(long)]
        lenient: bool,

        /// Write the run summary as JSON to this path
        #[arg(long)]
        summary: Option<PathBuf>,
    },

    /// Write a default configuration file
    InitConfig {
        /// Destination path
        path: PathBuf,

        /// Number of replicas
        #[arg(short = 'n', long, default_value = "1")]
        replicas: usize,
    },
}

fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            config,
            replicas,
            job,
            prefix,
            final_step,
            round_offset,
            input_root,
            output_root,
            lenient,
            summary,
        } => {
            let mut run = match config {
                Some(path) => layout::load_config(&path)?,
                None => RunConfig::default(),
            };

            if let Some(n) = replicas {
                run.demux.num_replicas = n;
            }
            if final_step.is_some() {
                run.demux.final_step = final_step;
            }
            if let Some(offset) = round_offset {
                run.demux.round_offset = offset;
            }
            if lenient {
                run.demux.verify_state_labels = false;
            }
            if let Some(job) = job {
                run.layout.job = job;
            }
            if let Some(prefix) = prefix {
                run.layout.prefix = prefix;
            }
            if let Some(root) = input_root {
                run.layout.input_root = root;
            }
            if let Some(root) = output_root {
                run.layout.output_root = root;
            }

            let report = run.open()?.run()?;

            println!(
                "Sorted {} replicas in {} rounds",
                report.num_replicas, report.rounds
            );
            if let Some(step) = report.last_step {
                println!("  Last step: {}", step);
            }
            for (state, count) in report.records_written.iter().enumerate() {
                println!("  State {}: {} records", state, count);
            }

            if let Some(path) = summary {
                let json = serde_json::to_vec_pretty(&report)
                    .context("Failed to serialize summary")?;
                std::fs::write(&path, json)
                    .with_context(|| format!("Failed to write summary: {:?}", path))?;
            }
        }

        Commands::InitConfig { path, replicas } => {
            let mut config = RunConfig::default();
            config.demux.num_replicas = replicas;
            layout::write_config(&path, &config)?;
            println!("Wrote configuration to {:?}", path);
        }
    }

    Ok(())
}
