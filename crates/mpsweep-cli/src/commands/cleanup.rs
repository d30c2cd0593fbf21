use std::path::Path;

use anyhow::Context;
use tracing::{info, warn};

use mpsweep_core::SweepConfig;
use mpsweep_engine::{
    Cleaner, CleanupOptions, Mode, Multipath, MultipathCli, RunSummary, format_report,
};

use crate::Format;

pub fn run(config_file: &Path, detection_only: bool, format: Format) -> anyhow::Result<()> {
    let config = SweepConfig::from_file(config_file)?;
    let tool = MultipathCli::new(&config.multipath.binary);
    let mode = if detection_only {
        Mode::DetectionOnly
    } else {
        Mode::Cleanup
    };

    // Without multipath tools there is nothing to reconcile, whatever the
    // inventory settings say.
    if !tool.is_installed() {
        info!("multipath tools not installed, no cleanup needed");
        return print_summary(&RunSummary::new(mode), format);
    }

    let inventory = config
        .inventory
        .open()
        .context("unusable inventory connection configuration")?;
    let options = CleanupOptions::from_config(&config, mode)?;
    info!(host = %options.host, mode = ?mode, "starting faulty device cleanup");

    let mut cleaner = Cleaner::new(&tool, inventory.as_ref(), options)?;
    let summary = cleaner.run()?;
    if summary.has_leftovers() {
        warn!("some faulty paths or devices could not be removed; rerun later");
    }

    print_summary(&summary, format)
}

fn print_summary(summary: &RunSummary, format: Format) -> anyhow::Result<()> {
    match format {
        Format::Json => println!("{}", serde_json::to_string_pretty(summary)?),
        Format::Text => println!("{}", format_report(summary)),
    }
    Ok(())
}
