//! Seam over the `multipath` command line tool.

use std::path::{Path, PathBuf};
use std::process::Command;
use tracing::debug;

use crate::error::{SweepError, SweepResult};

/// Captured output of one tool invocation. `multipath` reports most
/// conditions on stdout/stderr, so callers inspect the text first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolOutput {
    pub stdout: String,
    pub stderr: String,
    /// Exit status was zero.
    pub success: bool,
}

/// Empty output of a successful run.
impl Default for ToolOutput {
    fn default() -> Self {
        Self {
            stdout: String::new(),
            stderr: String::new(),
            success: true,
        }
    }
}

impl ToolOutput {
    pub fn contains(&self, needle: &str) -> bool {
        self.stdout.contains(needle) || self.stderr.contains(needle)
    }
}

pub trait Multipath {
    /// Whether the tool is present on this host.
    fn is_installed(&self) -> bool;

    /// `multipath -ll`
    fn list(&self) -> SweepResult<ToolOutput>;

    /// `multipath -ll <device>`
    fn list_path(&self, device: &Path) -> SweepResult<ToolOutput>;

    /// `multipath -f <identity>`
    fn flush(&self, identity: &str) -> SweepResult<ToolOutput>;
}

#[derive(Debug, Clone)]
pub struct MultipathCli {
    binary: PathBuf,
}

impl MultipathCli {
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    fn run(&self, args: &[&str]) -> SweepResult<ToolOutput> {
        let output = Command::new(&self.binary)
            .args(args)
            .output()
            .map_err(|source| SweepError::Spawn {
                program: self.binary.clone(),
                source,
            })?;
        let out = ToolOutput {
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            success: output.status.success(),
        };
        debug!(
            command = ?args,
            status = %output.status,
            stdout = %out.stdout,
            stderr = %out.stderr,
            "multipath"
        );
        Ok(out)
    }
}

impl Multipath for MultipathCli {
    fn is_installed(&self) -> bool {
        let name = self
            .binary
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "multipath".to_string());
        match Command::new("which").arg(&self.binary).output() {
            Ok(output) => String::from_utf8_lossy(&output.stdout).contains(&name),
            Err(e) => {
                debug!(error = %e, "failed to run which");
                false
            }
        }
    }

    fn list(&self) -> SweepResult<ToolOutput> {
        self.run(&["-ll"])
    }

    fn list_path(&self, device: &Path) -> SweepResult<ToolOutput> {
        let device = device.to_string_lossy();
        self.run(&["-ll", &device])
    }

    fn flush(&self, identity: &str) -> SweepResult<ToolOutput> {
        self.run(&["-f", identity])
    }
}
