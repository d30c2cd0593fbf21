//! Environmental checks run before any inventory or topology work.

use std::fs;
use std::path::Path;
use tracing::{info, warn};

use crate::multipath::Multipath;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Preflight {
    /// Multipath tools are absent; there is nothing to clean up.
    NotInstalled,
    Ready { flush_on_last_del: bool },
}

pub fn preflight(tool: &dyn Multipath, multipath_conf: &Path) -> Preflight {
    if !tool.is_installed() {
        info!("multipath tools not installed, no cleanup needed");
        return Preflight::NotInstalled;
    }
    let flush_on_last_del = flush_on_last_del_enabled(multipath_conf);
    if !flush_on_last_del {
        warn!(
            config = %multipath_conf.display(),
            "'flush_on_last_del yes' is not set; 'map in use' failures may show up during cleanup"
        );
    }
    Preflight::Ready { flush_on_last_del }
}

/// Whether any line reads `flush_on_last_del ... yes`. A missing file counts
/// as unset.
pub fn flush_on_last_del_enabled(multipath_conf: &Path) -> bool {
    let Ok(content) = fs::read_to_string(multipath_conf) else {
        return false;
    };
    content.lines().any(|line| {
        line.trim_start()
            .strip_prefix("flush_on_last_del")
            .is_some_and(|rest| rest.contains("yes"))
    })
}
