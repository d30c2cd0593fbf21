//! Deletes faulty SCSI paths through `/sys/block/<dev>/device/delete`.

use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use mpsweep_core::DiscoveredPath;

/// What happened to one path of a group submitted for removal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum PathRemoval {
    Deleted { path: PathBuf, device: String },
    /// The device is already gone, or never resolved to a block device.
    ControlFileMissing { path: PathBuf, resolved: PathBuf },
    WriteFailed { path: PathBuf, control: PathBuf, error: String },
}

impl PathRemoval {
    pub fn is_deleted(&self) -> bool {
        matches!(self, PathRemoval::Deleted { .. })
    }

    pub fn path(&self) -> &Path {
        match self {
            PathRemoval::Deleted { path, .. }
            | PathRemoval::ControlFileMissing { path, .. }
            | PathRemoval::WriteFailed { path, .. } => path,
        }
    }
}

#[derive(Debug, Clone)]
pub struct PathRemover {
    sys_block_dir: PathBuf,
}

impl PathRemover {
    pub fn new(sys_block_dir: impl Into<PathBuf>) -> Self {
        Self {
            sys_block_dir: sys_block_dir.into(),
        }
    }

    pub fn control_file(&self, device: &str) -> PathBuf {
        self.sys_block_dir.join(device).join("device").join("delete")
    }

    /// Remove every path of a group. Each path is handled independently;
    /// no retries.
    pub fn remove_group(&self, paths: &[DiscoveredPath]) -> Vec<PathRemoval> {
        paths.iter().map(|p| self.remove(p)).collect()
    }

    pub fn remove(&self, path: &DiscoveredPath) -> PathRemoval {
        let resolved = fs::canonicalize(&path.raw_path).unwrap_or_else(|_| path.resolved_path.clone());
        let device = resolved
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let control = self.control_file(&device);

        if device.is_empty() || !control.exists() {
            warn!(path = %resolved.display(), "unable to delete path: no delete control file");
            return PathRemoval::ControlFileMissing {
                path: path.raw_path.clone(),
                resolved,
            };
        }

        match fs::write(&control, "1") {
            Ok(()) => {
                info!(path = %path.raw_path.display(), device = %device, "deleted faulty iSCSI path");
                PathRemoval::Deleted {
                    path: path.raw_path.clone(),
                    device,
                }
            }
            Err(e) => {
                warn!(path = %resolved.display(), control = %control.display(), error = %e, "unable to delete path");
                PathRemoval::WriteFailed {
                    path: path.raw_path.clone(),
                    control,
                    error: e.to_string(),
                }
            }
        }
    }
}
