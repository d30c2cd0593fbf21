//! Candidate path discovery under `/dev/disk/by-path`.
//!
//! Equivalent to the glob `ip-*-iscsi-iqn*<vendor>*-lun-*`, minus LUN 0
//! (the array's control LUN) and `-partN` partition links.

use regex::Regex;
use std::collections::BTreeSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::error::{SweepError, SweepResult};

#[derive(Debug, Clone)]
pub struct PathScanner {
    by_path_dir: PathBuf,
    pattern: Regex,
}

impl PathScanner {
    pub fn new(by_path_dir: impl Into<PathBuf>, vendor_marker: &str) -> Result<Self, regex::Error> {
        let pattern = Regex::new(&format!(
            r"^ip-.*-iscsi-iqn.*{}.*-lun-.*$",
            regex::escape(vendor_marker)
        ))?;
        Ok(Self {
            by_path_dir: by_path_dir.into(),
            pattern,
        })
    }

    /// All matching entries, sorted by path.
    pub fn scan(&self) -> SweepResult<BTreeSet<PathBuf>> {
        let entries = match fs::read_dir(&self.by_path_dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!(dir = %self.by_path_dir.display(), "by-path directory absent, nothing to scan");
                return Ok(BTreeSet::new());
            }
            Err(source) => {
                return Err(SweepError::Scan {
                    path: self.by_path_dir.clone(),
                    source,
                });
            }
        };

        let mut paths = BTreeSet::new();
        for entry in entries {
            let entry = entry.map_err(|source| SweepError::Scan {
                path: self.by_path_dir.clone(),
                source,
            })?;
            let name = entry.file_name().to_string_lossy().to_string();
            if self.accepts(&name) {
                paths.insert(entry.path());
            }
        }
        debug!(count = paths.len(), "discovered candidate device paths");
        Ok(paths)
    }

    fn accepts(&self, name: &str) -> bool {
        if !self.pattern.is_match(name) || name.contains("-part") {
            return false;
        }
        !matches!(lun_segment(name), Some("0"))
    }

    pub fn by_path_dir(&self) -> &Path {
        &self.by_path_dir
    }
}

fn lun_segment(name: &str) -> Option<&str> {
    name.rsplit_once("-lun-").map(|(_, lun)| lun)
}
