//! forcebridge - command line entry point
//!
//! Loads a run configuration, rebuilds (or reuses) the variable trees and
//! writes one force file per requested variable.

use anyhow::Context;
use clap::Parser;
use forcebridge_rs::diagnostics::CsvSink;
use forcebridge_rs::{Pipeline, RunConfig, RunOptions};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "forcebridge", version, about)]
struct Cli {
    /// Run configuration (JSON, or TOML with a .toml extension)
    config: PathBuf,

    /// Also write logs to a daily-rotated file in this directory
    #[arg(long, value_name = "DIR")]
    log_dir: Option<PathBuf>,

    /// Resolve and transform variables without writing force files or caches
    #[arg(long)]
    dry_run: bool,

    /// Put the generation time into force file headers
    #[arg(long)]
    timestamp: bool,

    /// Write original/transformed pairs of every transformed variable here
    #[arg(long, value_name = "FILE")]
    diagnostics_csv: Option<PathBuf>,
}

fn init_logging(log_dir: Option<&PathBuf>) -> Option<WorkerGuard> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,forcebridge_rs=debug"));

    match log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "forcebridge.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer())
                .with(
                    tracing_subscriber::fmt::layer()
                        .with_ansi(false)
                        .with_writer(writer),
                )
                .init();
            Some(guard)
        }
        None => {
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer())
                .init();
            None
        }
    }
}

fn run(cli: &Cli) -> anyhow::Result<()> {
    let config = RunConfig::load(&cli.config)
        .with_context(|| format!("Loading configuration {:?}", cli.config))?;
    tracing::info!(
        "Configuration '{}': {} source(s), {} variable(s)",
        config.config_name,
        config.inputs().len(),
        config.var_to_process.len()
    );

    let options = RunOptions {
        dry_run: cli.dry_run,
        timestamp: cli.timestamp,
    };
    let summary = match &cli.diagnostics_csv {
        Some(path) => {
            let sink = CsvSink::create(path)
                .with_context(|| format!("Opening diagnostics file {:?}", path))?;
            let mut pipeline = Pipeline::with_sink(config, options, sink);
            let summary = pipeline.run().context("Run aborted")?;
            pipeline
                .into_sink()
                .flush()
                .context("Flushing diagnostics file")?;
            summary
        }
        None => Pipeline::new(config, options)
            .run()
            .context("Run aborted")?,
    };

    println!("{}", summary);
    Ok(())
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    let _guard = init_logging(cli.log_dir.as_ref());

    tracing::info!("Starting forcebridge {}", env!("CARGO_PKG_VERSION"));

    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{:#}", e);
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}
