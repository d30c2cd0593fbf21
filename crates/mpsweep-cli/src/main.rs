use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, ValueEnum};
use tracing_subscriber::EnvFilter;

mod commands;

#[derive(Parser)]
#[command(
    name = "faulty-device-cleanup",
    about = "Remove faulty iSCSI paths and empty multipath devices left by detached volumes",
    version
)]
struct Cli {
    /// TOML configuration file (inventory source, filesystem roots, lock)
    #[arg(long)]
    config_file: PathBuf,
    /// Count faulty paths and devices without deleting anything
    #[arg(long)]
    detection_only: bool,
    /// Report format
    #[arg(short, long, value_enum, default_value_t = Format::Text)]
    format: Format,
    /// Log each multipath invocation with its raw output
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Format {
    Text,
    Json,
}

fn init_tracing(verbose: bool) -> anyhow::Result<()> {
    let level = if verbose { "debug" } else { "info" };
    let mut filter = EnvFilter::from_default_env();
    for target in ["faulty_device_cleanup", "mpsweep_core", "mpsweep_engine"] {
        filter = filter.add_directive(format!("{target}={level}").parse()?);
    }
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
    Ok(())
}

fn main() -> ExitCode {
    // clap exits with 2 on usage errors; this tool reports 1.
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let _ = e.print();
            return if e.use_stderr() {
                ExitCode::FAILURE
            } else {
                ExitCode::SUCCESS
            };
        }
    };

    if let Err(e) = init_tracing(cli.verbose) {
        eprintln!("error: {e:#}");
        return ExitCode::FAILURE;
    }

    match commands::cleanup::run(&cli.config_file, cli.detection_only, cli.format) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{e:#}");
            ExitCode::FAILURE
        }
    }
}
