//! Shared types used across the multipath sweep crates.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

use crate::target_key::CorrelationKey;

/// Substring the topology tool prints for a path that is serving I/O.
pub const ACTIVE_READY_MARKER: &str = "active ready";

/// Vendor substring used when the config does not override it.
pub const DEFAULT_VENDOR_MARKER: &str = "com.emc";

/// A storage target a running workload still depends on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetRecord {
    pub target_identifier: String,
    pub lun: String,
}

impl TargetRecord {
    pub fn new(target_identifier: impl Into<String>, lun: impl Into<String>) -> Self {
        Self {
            target_identifier: target_identifier.into(),
            lun: lun.into(),
        }
    }

    pub fn correlation_key(&self) -> CorrelationKey {
        CorrelationKey::from_inventory(&self.target_identifier, &self.lun)
    }
}

/// One `/dev/disk/by-path` entry together with its symlink target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DiscoveredPath {
    pub raw_path: PathBuf,
    pub resolved_path: PathBuf,
    pub correlation_key: CorrelationKey,
}

impl DiscoveredPath {
    /// Kernel block device name (`sdX`) behind this path.
    pub fn device_name(&self) -> Option<&str> {
        self.resolved_path.file_name().and_then(|n| n.to_str())
    }
}

/// Whether the topology tool reports a path or device as serving I/O.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PathStatus {
    ActiveReady,
    NotReady,
}

impl PathStatus {
    /// Classify a chunk of topology text by looking for the active-ready marker.
    pub fn from_listing(text: &str) -> Self {
        if text.contains(ACTIVE_READY_MARKER) {
            PathStatus::ActiveReady
        } else {
            PathStatus::NotReady
        }
    }

    pub fn is_active(&self) -> bool {
        matches!(self, PathStatus::ActiveReady)
    }
}

/// SCSI `host:channel:target:lun` address of one member path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ScsiAddress {
    pub host: u64,
    pub channel: u64,
    pub target: u64,
    pub lun: u64,
}

impl fmt::Display for ScsiAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}:{}", self.host, self.channel, self.target, self.lun)
    }
}

/// One path line inside an aggregate device section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberPath {
    /// The line as printed, tree glyphs included.
    pub line: String,
    /// The `#:#:#:#` entry left behind by a removed path.
    pub placeholder: bool,
    /// `None` for a placeholder, or when a field does not fit in 64 bits.
    pub address: Option<ScsiAddress>,
    /// Block device name (`sdX`) when the path still exists.
    pub device: Option<String>,
}

impl MemberPath {
    pub fn is_placeholder(&self) -> bool {
        self.placeholder
    }

    pub fn status(&self) -> PathStatus {
        PathStatus::from_listing(&self.line)
    }
}

/// A kernel multipath device and its constituent paths as reported at parse time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregateDevice {
    /// WWN-like hex token from the header line.
    pub identity: String,
    /// User-friendly name (`mpatha`) when the header carries one.
    pub alias: Option<String>,
    /// Device-mapper node name (`dm-3`).
    pub dm_name: Option<String>,
    /// Whole section text, header to last branch.
    pub raw_section: String,
    pub member_path_lines: Vec<MemberPath>,
}

impl AggregateDevice {
    /// Member lines that still name a real SCSI address.
    pub fn real_paths(&self) -> impl Iterator<Item = &MemberPath> {
        self.member_path_lines.iter().filter(|m| !m.is_placeholder())
    }

    /// True once every underlying path is gone, leaving an empty shell.
    pub fn is_drained(&self) -> bool {
        self.real_paths().next().is_none()
    }

    pub fn status(&self) -> PathStatus {
        PathStatus::from_listing(&self.raw_section)
    }
}
