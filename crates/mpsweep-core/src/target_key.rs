//! Correlation keys tying inventory targets to discovered device paths.
//!
//! Both sides reduce an iSCSI qualified name to its base form by dropping
//! the last dotted segment, then append the LUN:
//!
//! ```text
//! iqn.1992-04.com.emc:cx.fnm00130200235.a7 + 203
//!     -> iqn.1992-04.com.emc:cx.fnm00130200235-203
//! ```
//!
//! The dropped segment is the storage-processor port suffix in EMC-style
//! names (`.a7`, `.b4`). This is a format assumption about those arrays,
//! not an iSCSI rule.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Marks the start of the target name in a by-path entry.
pub const ISCSI_DELIMITER: &str = "-iscsi-";
/// Marks the start of the LUN in a by-path entry.
pub const LUN_DELIMITER: &str = "-lun-";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum KeyError {
    #[error("missing '-lun-' segment in device path: {0}")]
    MissingLun(String),
    #[error("missing '-iscsi-' segment in device path: {0}")]
    MissingTarget(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CorrelationKey(String);

impl CorrelationKey {
    /// Key for a target identifier and LUN taken from the inventory.
    pub fn from_inventory(identifier: &str, lun: &str) -> Self {
        CorrelationKey(format!("{}-{}", base_identifier(identifier), lun))
    }

    /// Key for a by-path entry such as
    /// `ip-192.168.3.52:3260-iscsi-iqn.1992-04.com.emc:cx.fnm00130200235.a7-lun-203`.
    pub fn from_path(raw_path: &str) -> Result<Self, KeyError> {
        let (head, lun) = raw_path
            .split_once(LUN_DELIMITER)
            .ok_or_else(|| KeyError::MissingLun(raw_path.to_string()))?;
        let identifier = head
            .split(ISCSI_DELIMITER)
            .nth(1)
            .ok_or_else(|| KeyError::MissingTarget(raw_path.to_string()))?;
        Ok(Self::from_inventory(identifier, lun))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CorrelationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identifier minus its trailing dotted segment; unchanged if it has no dot.
fn base_identifier(identifier: &str) -> &str {
    identifier
        .rsplit_once('.')
        .map(|(base, _)| base)
        .unwrap_or(identifier)
}
