//! Boundary adapter for the Inventory Service.
//!
//! The service exports block-device-mapping records whose `connection_info`
//! blob carries either parallel `target_iqns`/`target_luns` lists or scalar
//! `target_iqn`/`target_lun` fields. Both shapes are flattened into
//! [`TargetRecord`] pairs here; nothing downstream sees the raw JSON.

use serde::Deserialize;
use std::fmt;
use std::path::{Path, PathBuf};
use std::process::Command;
use thiserror::Error;
use tracing::debug;

use crate::types::TargetRecord;

#[derive(Debug, Error)]
pub enum InventoryError {
    #[error("inventory source unavailable: {0}")]
    Unavailable(String),

    #[error("malformed inventory data: {0}")]
    Malformed(String),
}

/// Source of the block-device-mapping records for this host.
pub trait Inventory {
    fn records(&self) -> Result<Vec<InventoryRecord>, InventoryError>;
}

/// One block-device-mapping row.
#[derive(Debug, Clone, Deserialize)]
pub struct InventoryRecord {
    #[serde(default)]
    pub instance_host: Option<String>,
    #[serde(default)]
    pub deleted: Deleted,
    #[serde(default)]
    pub connection_info: Option<ConnectionInfoField>,
}

/// Soft-delete marker: a boolean, or the row id when deleted (0 when live).
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum Deleted {
    Flag(bool),
    Id(i64),
}

impl Default for Deleted {
    fn default() -> Self {
        Deleted::Flag(false)
    }
}

impl Deleted {
    pub fn is_deleted(&self) -> bool {
        match self {
            Deleted::Flag(flag) => *flag,
            Deleted::Id(id) => *id != 0,
        }
    }
}

/// `connection_info` as stored (a JSON string) or already decoded.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum ConnectionInfoField {
    Encoded(String),
    Inline(serde_json::Value),
}

#[derive(Debug, Deserialize)]
struct ConnectionInfo {
    #[serde(default)]
    data: Option<RawTargetData>,
}

#[derive(Debug, Default, Deserialize)]
struct RawTargetData {
    target_iqns: Option<Vec<String>>,
    target_luns: Option<Vec<Lun>>,
    target_iqn: Option<String>,
    target_lun: Option<Lun>,
}

/// LUNs arrive as JSON numbers from some drivers and strings from others.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum Lun {
    Number(u64),
    Text(String),
}

impl fmt::Display for Lun {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Lun::Number(n) => write!(f, "{n}"),
            Lun::Text(s) => f.write_str(s),
        }
    }
}

/// The two target shapes, normalized once at the boundary.
#[derive(Debug)]
enum TargetFields {
    Multi { iqns: Vec<String>, luns: Vec<Lun> },
    Single { iqn: String, lun: Lun },
    Absent,
}

impl TargetFields {
    fn from_raw(raw: RawTargetData) -> Result<Self, InventoryError> {
        if let Some(iqns) = raw.target_iqns {
            let luns = raw.target_luns.ok_or_else(|| {
                InventoryError::Malformed("target_iqns present without target_luns".to_string())
            })?;
            return Ok(TargetFields::Multi { iqns, luns });
        }
        if let Some(iqn) = raw.target_iqn {
            let lun = raw.target_lun.ok_or_else(|| {
                InventoryError::Malformed(format!("target_iqn {iqn} present without target_lun"))
            })?;
            return Ok(TargetFields::Single { iqn, lun });
        }
        Ok(TargetFields::Absent)
    }

    fn into_pairs(self) -> Vec<(String, String)> {
        match self {
            TargetFields::Multi { iqns, luns } => iqns
                .into_iter()
                .zip(luns)
                .map(|(iqn, lun)| (iqn, lun.to_string()))
                .collect(),
            TargetFields::Single { iqn, lun } => vec![(iqn, lun.to_string())],
            TargetFields::Absent => vec![],
        }
    }
}

impl InventoryRecord {
    /// Every `(identifier, lun)` pair this record references.
    pub fn target_pairs(&self) -> Result<Vec<(String, String)>, InventoryError> {
        let info: ConnectionInfo = match &self.connection_info {
            None => return Ok(vec![]),
            Some(ConnectionInfoField::Encoded(text)) => serde_json::from_str(text)
                .map_err(|e| InventoryError::Malformed(format!("connection_info: {e}")))?,
            Some(ConnectionInfoField::Inline(value)) => serde_json::from_value(value.clone())
                .map_err(|e| InventoryError::Malformed(format!("connection_info: {e}")))?,
        };
        let raw = info.data.unwrap_or_default();
        Ok(TargetFields::from_raw(raw)?.into_pairs())
    }
}

/// Targets still claimed by workloads on `host`.
pub fn live_targets(
    records: &[InventoryRecord],
    host: &str,
) -> Result<Vec<TargetRecord>, InventoryError> {
    let mut targets = Vec::new();
    for record in records {
        if record.deleted.is_deleted() || record.connection_info.is_none() {
            continue;
        }
        if record.instance_host.as_deref().map(str::trim) != Some(host) {
            continue;
        }
        for (identifier, lun) in record.target_pairs()? {
            targets.push(TargetRecord::new(identifier, lun));
        }
    }
    debug!(count = targets.len(), host, "collected live inventory targets");
    Ok(targets)
}

/// Records read from a JSON array exported by the inventory store.
#[derive(Debug, Clone)]
pub struct FileInventory {
    path: PathBuf,
}

impl FileInventory {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl Inventory for FileInventory {
    fn records(&self) -> Result<Vec<InventoryRecord>, InventoryError> {
        let content = std::fs::read_to_string(&self.path).map_err(|e| {
            InventoryError::Unavailable(format!("{}: {e}", self.path.display()))
        })?;
        parse_records(&content)
    }
}

/// Records printed as a JSON array on stdout of an export program.
#[derive(Debug, Clone)]
pub struct CommandInventory {
    program: PathBuf,
    args: Vec<String>,
}

impl CommandInventory {
    pub fn new(program: impl Into<PathBuf>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }
}

impl Inventory for CommandInventory {
    fn records(&self) -> Result<Vec<InventoryRecord>, InventoryError> {
        let output = Command::new(&self.program)
            .args(&self.args)
            .output()
            .map_err(|e| {
                InventoryError::Unavailable(format!("failed to run {}: {e}", self.program.display()))
            })?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(InventoryError::Unavailable(format!(
                "{} exited with {}: {}",
                self.program.display(),
                output.status,
                stderr.trim()
            )));
        }
        parse_records(&String::from_utf8_lossy(&output.stdout))
    }
}

fn parse_records(content: &str) -> Result<Vec<InventoryRecord>, InventoryError> {
    serde_json::from_str(content).map_err(|e| InventoryError::Malformed(e.to_string()))
}

/// Kernel host name, used to select this host's records.
pub fn local_hostname() -> Option<String> {
    read_trimmed(Path::new("/proc/sys/kernel/hostname"))
}

fn read_trimmed(path: &Path) -> Option<String> {
    std::fs::read_to_string(path)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}
