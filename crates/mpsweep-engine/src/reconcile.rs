//! Correlates discovered paths with the live inventory and classifies
//! orphaned groups.

use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::PathBuf;
use tracing::{debug, warn};

use mpsweep_core::{CorrelationKey, DiscoveredPath, PathStatus, TargetRecord};

use crate::multipath::Multipath;

/// Orphaned paths grouped by correlation key, in key order.
pub type PathGroups = BTreeMap<CorrelationKey, Vec<DiscoveredPath>>;

/// Result of resolving and keying the scanner's raw paths.
#[derive(Debug, Default)]
pub struct Discovery {
    pub paths: Vec<DiscoveredPath>,
    /// Entries whose name could not be split into target and LUN.
    pub malformed: Vec<PathBuf>,
}

/// Resolve symlinks and derive a correlation key for every raw path.
/// Malformed entries are logged and set aside.
pub fn discover(raw_paths: impl IntoIterator<Item = PathBuf>) -> Discovery {
    let mut discovery = Discovery::default();
    for raw_path in raw_paths {
        // Only the entry name is keyed; the directory is configurable.
        let name = raw_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| raw_path.to_string_lossy().into_owned());
        let key = match CorrelationKey::from_path(&name) {
            Ok(key) => key,
            Err(e) => {
                warn!(path = %raw_path.display(), error = %e, "ignoring malformed device path");
                discovery.malformed.push(raw_path);
                continue;
            }
        };
        let resolved_path = fs::canonicalize(&raw_path).unwrap_or_else(|_| raw_path.clone());
        discovery.paths.push(DiscoveredPath {
            raw_path,
            resolved_path,
            correlation_key: key,
        });
    }
    discovery
}

/// Keys of inventory targets carrying the vendor marker.
pub fn live_keys(targets: &[TargetRecord], vendor_marker: &str) -> HashSet<CorrelationKey> {
    targets
        .iter()
        .filter(|t| t.target_identifier.contains(vendor_marker))
        .map(TargetRecord::correlation_key)
        .collect()
}

/// Group paths by key, dropping every group the inventory still claims.
pub fn orphaned_groups(paths: Vec<DiscoveredPath>, live: &HashSet<CorrelationKey>) -> PathGroups {
    let mut groups = PathGroups::new();
    for path in paths {
        if live.contains(&path.correlation_key) {
            debug!(path = %path.raw_path.display(), key = %path.correlation_key, "path in use");
            continue;
        }
        groups
            .entry(path.correlation_key.clone())
            .or_default()
            .push(path);
    }
    groups
}

/// Deletion policy for a group: eligible only when at least one status was
/// observed and none of them is active-ready. Stops at the first healthy path.
pub fn all_paths_faulty(statuses: impl IntoIterator<Item = PathStatus>) -> bool {
    let mut observed = false;
    for status in statuses {
        if status.is_active() {
            return false;
        }
        observed = true;
    }
    observed
}

/// Query the topology tool for one path. A failed query counts as live.
pub fn probe_path(tool: &dyn Multipath, path: &DiscoveredPath) -> PathStatus {
    match tool.list_path(&path.resolved_path) {
        Ok(out) => PathStatus::from_listing(&out.stdout),
        Err(e) => {
            warn!(path = %path.resolved_path.display(), error = %e, "cannot query path status, treating as live");
            PathStatus::ActiveReady
        }
    }
}

/// Whether every path of an orphaned group reports faulty.
pub fn group_is_faulty(tool: &dyn Multipath, paths: &[DiscoveredPath]) -> bool {
    all_paths_faulty(paths.iter().map(|p| probe_path(tool, p)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::multipath::ToolOutput;
    use crate::error::SweepResult;
    use std::cell::RefCell;
    use std::collections::HashMap;
    use std::path::Path;

    const A7: &str = "/dev/disk/by-path/ip-192.168.3.52:3260-iscsi-iqn.1992-04.com.emc:cx.fnm00130200235.a7-lun-203";
    const B7: &str = "/dev/disk/by-path/ip-192.168.4.52:3260-iscsi-iqn.1992-04.com.emc:cx.fnm00130200235.b7-lun-203";
    const OTHER: &str = "/dev/disk/by-path/ip-192.168.3.52:3260-iscsi-iqn.1992-04.com.emc:cx.fnm00130200235.a7-lun-5";

    struct ScriptedTool {
        statuses: HashMap<PathBuf, &'static str>,
        queried: RefCell<Vec<PathBuf>>,
    }

    impl Multipath for ScriptedTool {
        fn is_installed(&self) -> bool {
            true
        }
        fn list(&self) -> SweepResult<ToolOutput> {
            Ok(ToolOutput::default())
        }
        fn list_path(&self, device: &Path) -> SweepResult<ToolOutput> {
            self.queried.borrow_mut().push(device.to_path_buf());
            Ok(ToolOutput {
                stdout: self.statuses.get(device).copied().unwrap_or("").to_string(),
                stderr: String::new(),
                ..Default::default()
            })
        }
        fn flush(&self, _identity: &str) -> SweepResult<ToolOutput> {
            Ok(ToolOutput::default())
        }
    }

    fn discovered(raw: &str, dev: &str) -> DiscoveredPath {
        DiscoveredPath {
            raw_path: PathBuf::from(raw),
            resolved_path: PathBuf::from(dev),
            correlation_key: CorrelationKey::from_path(raw).unwrap(),
        }
    }

    #[test]
    fn test_malformed_path_is_excluded_without_stopping() {
        let discovery = discover(vec![
            PathBuf::from("/dev/disk/by-path/ip-192.168.3.52:3260-iqn.1992-04.com.emc:cx.x.a7-lun-3"),
            PathBuf::from(A7),
        ]);
        assert_eq!(discovery.malformed.len(), 1);
        assert_eq!(discovery.paths.len(), 1);
        assert_eq!(
            discovery.paths[0].correlation_key.as_str(),
            "iqn.1992-04.com.emc:cx.fnm00130200235-203"
        );
    }

    #[test]
    fn test_key_ignores_delimiters_in_directory() {
        let discovery = discover(vec![PathBuf::from(
            "/srv/mp-lun-fixtures/x-iscsi-y/by-path/ip-192.168.3.52:3260-iscsi-iqn.1992-04.com.emc:cx.fnm00130200235.a7-lun-203",
        )]);
        assert!(discovery.malformed.is_empty());
        assert_eq!(
            discovery.paths[0].correlation_key.as_str(),
            "iqn.1992-04.com.emc:cx.fnm00130200235-203"
        );
    }

    #[test]
    fn test_unresolvable_path_keeps_raw_path() {
        let discovery = discover(vec![PathBuf::from(A7)]);
        assert_eq!(discovery.paths[0].resolved_path, PathBuf::from(A7));
    }

    #[test]
    fn test_live_keys_filter_vendor() {
        let targets = vec![
            TargetRecord::new("iqn.1992-04.com.emc:cx.fnm00130200235.a7", "203"),
            TargetRecord::new("iqn.2010-10.org.openstack:volume-1", "1"),
        ];
        let keys = live_keys(&targets, "com.emc");
        assert_eq!(keys.len(), 1);
        assert!(keys.contains(&CorrelationKey::from_inventory(
            "iqn.1992-04.com.emc:cx.fnm00130200235.b2",
            "203"
        )));
    }

    #[test]
    fn test_groups_drop_live_keys() {
        let paths = vec![
            discovered(A7, "/dev/sdb"),
            discovered(B7, "/dev/sdc"),
            discovered(OTHER, "/dev/sdd"),
        ];
        let live = live_keys(
            &[TargetRecord::new("iqn.1992-04.com.emc:cx.fnm00130200235.a4", "5")],
            "com.emc",
        );
        let groups = orphaned_groups(paths, &live);
        assert_eq!(groups.len(), 1);
        let group = groups.values().next().unwrap();
        assert_eq!(group.len(), 2);
        assert_eq!(group[0].resolved_path, PathBuf::from("/dev/sdb"));
        assert_eq!(group[1].resolved_path, PathBuf::from("/dev/sdc"));
    }

    #[test]
    fn test_policy() {
        use PathStatus::*;
        assert!(all_paths_faulty([NotReady, NotReady]));
        assert!(!all_paths_faulty([ActiveReady, NotReady]));
        assert!(!all_paths_faulty([NotReady, ActiveReady]));
        assert!(!all_paths_faulty(Vec::<PathStatus>::new()));
    }

    #[test]
    fn test_one_healthy_path_keeps_group() {
        let tool = ScriptedTool {
            statuses: HashMap::from([
                (PathBuf::from("/dev/sdb"), "`- 3:0:0:203 sdb 8:16 active ready running"),
                (PathBuf::from("/dev/sdc"), "`- 4:0:0:203 sdc 8:32 failed faulty running"),
            ]),
            queried: RefCell::new(Vec::new()),
        };
        let group = vec![discovered(A7, "/dev/sdb"), discovered(B7, "/dev/sdc")];
        assert!(!group_is_faulty(&tool, &group));
        // Stops probing at the first healthy path.
        assert_eq!(tool.queried.borrow().len(), 1);
    }

    #[test]
    fn test_all_faulty_group() {
        let tool = ScriptedTool {
            statuses: HashMap::from([
                (PathBuf::from("/dev/sdb"), "`- 3:0:0:203 sdb 8:16 failed faulty running"),
                (PathBuf::from("/dev/sdc"), ""),
            ]),
            queried: RefCell::new(Vec::new()),
        };
        let group = vec![discovered(A7, "/dev/sdb"), discovered(B7, "/dev/sdc")];
        assert!(group_is_faulty(&tool, &group));
        assert_eq!(tool.queried.borrow().len(), 2);
    }
}
