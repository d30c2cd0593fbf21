//! Flushes aggregate devices left without any real member path.

use serde::Serialize;
use std::collections::HashSet;
use tracing::{info, warn};

use mpsweep_core::AggregateDevice;

use crate::error::SweepResult;
use crate::multipath::Multipath;
use crate::topology::TopologyParser;

/// Substring in `multipath -f` output when the map still has openers.
pub const IN_USE_MARKER: &str = "in use";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum FlushOutcome {
    Flushed { identity: String },
    /// Not retried; needs `fail_if_no_path` and a later rerun.
    InUse { identity: String },
    Failed { identity: String, error: String },
}

impl FlushOutcome {
    pub fn identity(&self) -> &str {
        match self {
            FlushOutcome::Flushed { identity }
            | FlushOutcome::InUse { identity }
            | FlushOutcome::Failed { identity, .. } => identity,
        }
    }
}

pub struct Sweeper<'a> {
    tool: &'a dyn Multipath,
    parser: &'a TopologyParser,
}

impl<'a> Sweeper<'a> {
    pub fn new(tool: &'a dyn Multipath, parser: &'a TopologyParser) -> Self {
        Self { tool, parser }
    }

    /// Parse a fresh `multipath -ll` listing.
    pub fn topology(&self) -> SweepResult<Vec<AggregateDevice>> {
        let listing = self.tool.list()?;
        Ok(self.parser.parse(&listing.stdout))
    }

    /// Flush every drained device in a fresh listing.
    pub fn sweep(&self) -> SweepResult<Vec<FlushOutcome>> {
        let outcomes = self
            .topology()?
            .iter()
            .filter(|d| d.is_drained())
            .map(|d| self.flush(d))
            .collect();
        Ok(outcomes)
    }

    pub fn flush(&self, device: &AggregateDevice) -> FlushOutcome {
        let identity = device.identity.clone();
        match self.tool.flush(&identity) {
            Ok(out) if out.contains(IN_USE_MARKER) => {
                warn!(
                    identity = %identity,
                    "could not flush faulty multipath device; retry later or run \
                     'dmsetup message {identity} 0 fail_if_no_path' before retrying"
                );
                FlushOutcome::InUse { identity }
            }
            Ok(out) if !out.success => {
                let error = format!("multipath -f exited unsuccessfully: {}", out.stderr.trim());
                warn!(identity = %identity, error = %error, "could not flush faulty multipath device");
                FlushOutcome::Failed { identity, error }
            }
            Ok(_) => {
                info!(identity = %identity, "deleted faulty multipath device");
                FlushOutcome::Flushed { identity }
            }
            Err(e) => {
                warn!(identity = %identity, error = %e, "could not flush faulty multipath device");
                FlushOutcome::Failed {
                    identity,
                    error: e.to_string(),
                }
            }
        }
    }
}

/// Devices that are drained now, or would be once every path device in
/// `pending` is removed.
pub fn would_drain<'d>(
    devices: &'d [AggregateDevice],
    pending: &HashSet<String>,
) -> Vec<&'d AggregateDevice> {
    devices
        .iter()
        .filter(|d| {
            d.real_paths().all(|m| {
                m.device
                    .as_deref()
                    .is_some_and(|dev| pending.contains(dev))
            })
        })
        .collect()
}
