//! One-shot reconciliation pass over the host's multipath state.
//!
//! Phases advance `Idle → PreflightChecked → PathsReconciled → DevicesSwept
//! → Done`. Nothing is retried. A host without multipath tools stops at
//! `Idle` with a clean summary. An inventory failure aborts the pass before
//! anything is mutated. In detection-only mode the same decisions are made
//! and counted, but no control file is written and no map is flushed.

use serde::Serialize;
use std::collections::HashSet;
use std::path::PathBuf;
use tracing::{debug, info};

use mpsweep_core::config::LockConfig;
use mpsweep_core::inventory::{live_targets, local_hostname};
use mpsweep_core::{Inventory, SweepConfig};

use crate::error::{SweepError, SweepResult};
use crate::lock::ExternalLock;
use crate::multipath::Multipath;
use crate::preflight::{Preflight, preflight};
use crate::reconcile::{discover, group_is_faulty, live_keys, orphaned_groups};
use crate::remover::PathRemover;
use crate::report::RunSummary;
use crate::scanner::PathScanner;
use crate::sweeper::{Sweeper, would_drain};
use crate::topology::TopologyParser;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Phase {
    Idle,
    PreflightChecked,
    PathsReconciled,
    DevicesSwept,
    Done,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    Cleanup,
    DetectionOnly,
}

#[derive(Debug, Clone)]
pub struct CleanupOptions {
    pub mode: Mode,
    /// Host whose inventory records are considered live.
    pub host: String,
    pub vendor_marker: String,
    pub multipath_conf: PathBuf,
    pub by_path_dir: PathBuf,
    pub sys_block_dir: PathBuf,
    /// `None` skips locking; only tests run that way.
    pub lock: Option<LockConfig>,
}

impl CleanupOptions {
    pub fn from_config(config: &SweepConfig, mode: Mode) -> SweepResult<Self> {
        let host = match &config.inventory.host {
            Some(host) => host.clone(),
            None => local_hostname().ok_or(SweepError::UnknownHost)?,
        };
        Ok(Self {
            mode,
            host,
            vendor_marker: config.vendor_marker.clone(),
            multipath_conf: config.multipath.config_path.clone(),
            by_path_dir: config.paths.by_path_dir.clone(),
            sys_block_dir: config.paths.sys_block_dir.clone(),
            lock: Some(config.lock.clone()),
        })
    }
}

pub struct Cleaner<'a> {
    tool: &'a dyn Multipath,
    inventory: &'a dyn Inventory,
    parser: TopologyParser,
    options: CleanupOptions,
    phase: Phase,
}

impl<'a> Cleaner<'a> {
    pub fn new(
        tool: &'a dyn Multipath,
        inventory: &'a dyn Inventory,
        options: CleanupOptions,
    ) -> SweepResult<Self> {
        Ok(Self {
            tool,
            inventory,
            parser: TopologyParser::new()?,
            options,
            phase: Phase::Idle,
        })
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    fn advance(&mut self, next: Phase) {
        debug!(from = ?self.phase, to = ?next, "cleanup phase");
        self.phase = next;
    }

    pub fn run(&mut self) -> SweepResult<RunSummary> {
        let mut summary = RunSummary::new(self.options.mode);

        match preflight(self.tool, &self.options.multipath_conf) {
            Preflight::NotInstalled => return Ok(summary),
            Preflight::Ready { flush_on_last_del } => {
                summary.multipath_installed = true;
                summary.flush_on_last_del = flush_on_last_del;
            }
        }
        self.advance(Phase::PreflightChecked);

        let _lock = match &self.options.lock {
            Some(lock) => Some(ExternalLock::acquire(&lock.dir, &lock.prefix, &lock.name)?),
            None => None,
        };

        let pending = self.reconcile_paths(&mut summary)?;
        self.advance(Phase::PathsReconciled);

        self.sweep_devices(&mut summary, &pending)?;
        self.advance(Phase::DevicesSwept);

        self.advance(Phase::Done);
        Ok(summary)
    }

    /// Remove (or count) fully faulty orphaned groups. Returns the block
    /// device names that detection mode treats as already removed.
    fn reconcile_paths(&self, summary: &mut RunSummary) -> SweepResult<HashSet<String>> {
        let records = self.inventory.records()?;
        let targets = live_targets(&records, &self.options.host)?;
        let live = live_keys(&targets, &self.options.vendor_marker);
        info!(targets = live.len(), host = %self.options.host, "loaded live targets");

        let scanner = PathScanner::new(&self.options.by_path_dir, &self.options.vendor_marker)?;
        let discovery = discover(scanner.scan()?);
        summary.malformed_paths = discovery.malformed;
        let groups = orphaned_groups(discovery.paths, &live);
        debug!(
            dir = %scanner.by_path_dir().display(),
            groups = groups.len(),
            "orphaned path groups"
        );

        let remover = PathRemover::new(&self.options.sys_block_dir);
        let mut pending = HashSet::new();
        for (key, paths) in &groups {
            if !group_is_faulty(self.tool, paths) {
                debug!(key = %key, "orphaned target still has an active path, keeping it");
                summary.live_orphaned_groups += 1;
                continue;
            }
            summary.faulty_path_num += paths.len();
            match self.options.mode {
                Mode::DetectionOnly => {
                    pending.extend(paths.iter().filter_map(|p| p.device_name()).map(String::from));
                }
                Mode::Cleanup => summary.path_removals.extend(remover.remove_group(paths)),
            }
        }

        if self.options.mode == Mode::DetectionOnly {
            info!(count = summary.faulty_path_num, "found faulty iSCSI paths to be deleted");
        }
        Ok(pending)
    }

    fn sweep_devices(&self, summary: &mut RunSummary, pending: &HashSet<String>) -> SweepResult<()> {
        let sweeper = Sweeper::new(self.tool, &self.parser);
        match self.options.mode {
            Mode::Cleanup => {
                summary.flushes = sweeper.sweep()?;
                summary.faulty_device_num = summary.flushes.len();
            }
            Mode::DetectionOnly => {
                let devices = sweeper.topology()?;
                summary.faulty_devices = devices
                    .iter()
                    .filter(|d| d.is_drained())
                    .map(|d| d.identity.clone())
                    .collect();
                summary.faulty_device_num = summary.faulty_devices.len();
                summary.projected_devices = would_drain(&devices, pending)
                    .into_iter()
                    .filter(|d| !d.is_drained())
                    .map(|d| d.identity.clone())
                    .collect();
                info!(count = summary.faulty_device_num, "found multipath faulty devices to be deleted");
                for identity in &summary.faulty_devices {
                    info!(identity = %identity, "multipath device is faulty");
                }
                for identity in &summary.projected_devices {
                    info!(identity = %identity, "multipath device would be drained by path removal");
                }
            }
        }
        Ok(())
    }
}
