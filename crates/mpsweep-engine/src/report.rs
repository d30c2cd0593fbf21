//! Run summary and its human-readable rendering.

use serde::Serialize;
use std::path::PathBuf;

use crate::cleaner::Mode;
use crate::remover::PathRemoval;
use crate::sweeper::FlushOutcome;

#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub mode: Mode,
    pub multipath_installed: bool,
    pub flush_on_last_del: bool,
    /// Paths in orphaned groups whose every path is faulty.
    pub faulty_path_num: usize,
    /// Aggregate devices flushed, or drained right now in detection mode.
    pub faulty_device_num: usize,
    /// Orphaned groups kept because a path still reports active-ready.
    pub live_orphaned_groups: usize,
    pub malformed_paths: Vec<PathBuf>,
    pub path_removals: Vec<PathRemoval>,
    pub flushes: Vec<FlushOutcome>,
    /// Drained identities counted in detection mode.
    pub faulty_devices: Vec<String>,
    /// Devices that detection mode expects to drain once the faulty paths
    /// are removed. A cleanup run flushes them in its sweep.
    pub projected_devices: Vec<String>,
}

impl RunSummary {
    pub fn new(mode: Mode) -> Self {
        Self {
            mode,
            multipath_installed: false,
            flush_on_last_del: false,
            faulty_path_num: 0,
            faulty_device_num: 0,
            live_orphaned_groups: 0,
            malformed_paths: Vec::new(),
            path_removals: Vec::new(),
            flushes: Vec::new(),
            faulty_devices: Vec::new(),
            projected_devices: Vec::new(),
        }
    }

    pub fn deleted_paths(&self) -> usize {
        self.path_removals.iter().filter(|r| r.is_deleted()).count()
    }

    pub fn flushed_devices(&self) -> usize {
        self.flushes
            .iter()
            .filter(|f| matches!(f, FlushOutcome::Flushed { .. }))
            .count()
    }

    /// Any unit that needs a rerun or manual intervention.
    pub fn has_leftovers(&self) -> bool {
        self.deleted_paths() < self.path_removals.len()
            || self.flushed_devices() < self.flushes.len()
    }
}

pub fn format_report(summary: &RunSummary) -> String {
    let mut out = String::new();

    let mode = match summary.mode {
        Mode::Cleanup => "cleanup",
        Mode::DetectionOnly => "detection only",
    };
    out.push_str("\n╔══════════════════════════════════════════╗\n");
    out.push_str("║  Multipath Faulty Device Cleanup         ║\n");
    out.push_str("╠══════════════════════════════════════════╣\n");
    out.push_str(&format!("║  Mode:    {:<31}║\n", mode));
    out.push_str(&format!("║  Paths:   {:<31}║\n", summary.faulty_path_num));
    out.push_str(&format!("║  Devices: {:<31}║\n", summary.faulty_device_num));
    out.push_str("╚══════════════════════════════════════════╝\n\n");

    if !summary.multipath_installed {
        out.push_str("Multipath tools not installed. No cleanup needed.\n");
        return out;
    }

    match summary.mode {
        Mode::DetectionOnly => {
            out.push_str(&format!(
                "Found {} faulty iSCSI paths to be deleted.\n",
                summary.faulty_path_num
            ));
            out.push_str(&format!(
                "Found {} multipath faulty devices to be deleted.\n",
                summary.faulty_device_num
            ));
            for identity in &summary.faulty_devices {
                out.push_str(&format!("  • {identity} is faulty\n"));
            }
            if !summary.projected_devices.is_empty() {
                out.push_str("Devices left empty once those paths are deleted:\n");
                for identity in &summary.projected_devices {
                    out.push_str(&format!("  • {identity}\n"));
                }
            }
        }
        Mode::Cleanup => {
            if !summary.path_removals.is_empty() {
                out.push_str("Paths:\n");
                for removal in &summary.path_removals {
                    match removal {
                        PathRemoval::Deleted { path, .. } => {
                            out.push_str(&format!("  ✓ deleted {}\n", path.display()));
                        }
                        PathRemoval::ControlFileMissing { resolved, .. } => {
                            out.push_str(&format!("  ✗ unable to delete {}\n", resolved.display()));
                        }
                        PathRemoval::WriteFailed { path, error, .. } => {
                            out.push_str(&format!("  ✗ unable to delete {}: {error}\n", path.display()));
                        }
                    }
                }
                out.push('\n');
            }
            if !summary.flushes.is_empty() {
                out.push_str("Multipath devices:\n");
                for flush in &summary.flushes {
                    match flush {
                        FlushOutcome::Flushed { identity } => {
                            out.push_str(&format!("  ✓ flushed {identity}\n"));
                        }
                        FlushOutcome::InUse { identity } => {
                            out.push_str(&format!("  ✗ {identity} in use\n"));
                            out.push_str(&format!(
                                "     Retry later or run 'dmsetup message {identity} 0 fail_if_no_path' first.\n"
                            ));
                        }
                        FlushOutcome::Failed { identity, error } => {
                            out.push_str(&format!("  ✗ {identity}: {error}\n"));
                        }
                    }
                }
                out.push('\n');
            }
            if summary.has_leftovers() {
                out.push_str("Some paths or devices were left behind; rerun once they are released.\n");
            }
        }
    }

    if summary.live_orphaned_groups > 0 {
        out.push_str(&format!(
            "{} orphaned target(s) kept: at least one path still active.\n",
            summary.live_orphaned_groups
        ));
    }
    if !summary.malformed_paths.is_empty() {
        out.push_str("Ignored malformed device paths:\n");
        for path in &summary.malformed_paths {
            out.push_str(&format!("  • {}\n", path.display()));
        }
    }
    if !summary.flush_on_last_del {
        out.push_str("Warning: 'flush_on_last_del yes' is not set in multipath.conf.\n");
    }

    out
}
