//! TOML configuration for a sweep run.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::inventory::{CommandInventory, FileInventory, Inventory};
use crate::types::DEFAULT_VENDOR_MARKER;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("invalid config file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("unusable inventory configuration: {0}")]
    Inventory(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SweepConfig {
    #[serde(default = "default_vendor_marker")]
    pub vendor_marker: String,
    pub inventory: InventoryConfig,
    #[serde(default)]
    pub multipath: MultipathConfig,
    #[serde(default)]
    pub paths: PathsConfig,
    #[serde(default)]
    pub lock: LockConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InventoryConfig {
    /// `file` or `command`.
    pub source: String,
    pub path: Option<PathBuf>,
    pub program: Option<PathBuf>,
    #[serde(default)]
    pub args: Vec<String>,
    /// Defaults to the kernel host name.
    pub host: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MultipathConfig {
    pub binary: PathBuf,
    pub config_path: PathBuf,
}

impl Default for MultipathConfig {
    fn default() -> Self {
        Self {
            binary: PathBuf::from("multipath"),
            config_path: PathBuf::from("/etc/multipath.conf"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    pub by_path_dir: PathBuf,
    pub sys_block_dir: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            by_path_dir: PathBuf::from("/dev/disk/by-path"),
            sys_block_dir: PathBuf::from("/sys/block"),
        }
    }
}

/// Where the attach/detach component keeps its external lock files.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LockConfig {
    pub dir: PathBuf,
    pub name: String,
    pub prefix: String,
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("/var/lib/nova/tmp"),
            name: "connect_volume".to_string(),
            prefix: "nova-".to_string(),
        }
    }
}

fn default_vendor_marker() -> String {
    DEFAULT_VENDOR_MARKER.to_string()
}

impl SweepConfig {
    /// Parse only. The `[inventory]` settings are checked by
    /// [`InventoryConfig::open`], after the multipath tools are found.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config: SweepConfig = toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(config)
    }

    pub fn to_toml_string(&self) -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }
}

impl InventoryConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        match self.source.as_str() {
            "file" if self.path.is_none() => Err(ConfigError::Inventory(
                "source = \"file\" requires `path`".to_string(),
            )),
            "command" if self.program.is_none() => Err(ConfigError::Inventory(
                "source = \"command\" requires `program`".to_string(),
            )),
            "file" | "command" => Ok(()),
            other => Err(ConfigError::Inventory(format!(
                "unsupported source: {other}. Supported: file, command"
            ))),
        }
    }

    /// Build the configured inventory source.
    pub fn open(&self) -> Result<Box<dyn Inventory>, ConfigError> {
        self.validate()?;
        match (self.source.as_str(), &self.path, &self.program) {
            ("file", Some(path), _) => Ok(Box::new(FileInventory::new(path))),
            ("command", _, Some(program)) => {
                Ok(Box::new(CommandInventory::new(program, self.args.clone())))
            }
            _ => Err(ConfigError::Inventory(format!(
                "cannot open source {}",
                self.source
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_parse_minimal() {
        let toml_str = r#"
[inventory]
source = "file"
path = "/var/lib/nova/bdm.json"
"#;
        let config: SweepConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.vendor_marker, "com.emc");
        assert_eq!(config.multipath.binary, PathBuf::from("multipath"));
        assert_eq!(config.paths.sys_block_dir, PathBuf::from("/sys/block"));
        assert_eq!(config.lock.name, "connect_volume");
        assert!(config.inventory.open().is_ok());
    }

    #[test]
    fn test_partial_sections_keep_defaults() {
        let toml_str = r#"
vendor_marker = "com.example"

[inventory]
source = "command"
program = "/usr/local/bin/bdm-export"
args = ["--host", "compute-1"]

[paths]
by_path_dir = "/tmp/by-path"
"#;
        let config: SweepConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.vendor_marker, "com.example");
        assert_eq!(config.paths.by_path_dir, PathBuf::from("/tmp/by-path"));
        assert_eq!(config.paths.sys_block_dir, PathBuf::from("/sys/block"));
        assert_eq!(config.inventory.args.len(), 2);
    }

    #[test]
    fn test_missing_inventory_section_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sweep.toml");
        fs::write(&path, "vendor_marker = \"com.emc\"\n").unwrap();
        assert!(matches!(
            SweepConfig::from_file(&path),
            Err(ConfigError::Parse { .. })
        ));
    }

    #[test]
    fn test_file_source_without_path_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sweep.toml");
        fs::write(&path, "[inventory]\nsource = \"file\"\n").unwrap();
        let config = SweepConfig::from_file(&path).unwrap();
        assert!(matches!(
            config.inventory.open(),
            Err(ConfigError::Inventory(_))
        ));
    }

    #[test]
    fn test_unknown_source_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sweep.toml");
        fs::write(&path, "[inventory]\nsource = \"mysql\"\n").unwrap();
        let config = SweepConfig::from_file(&path).unwrap();
        assert!(matches!(
            config.inventory.open(),
            Err(ConfigError::Inventory(_))
        ));
    }

    #[test]
    fn test_round_trips_through_toml() {
        let toml_str = "[inventory]\nsource = \"file\"\npath = \"/x.json\"\n";
        let config: SweepConfig = toml::from_str(toml_str).unwrap();
        let rendered = config.to_toml_string().unwrap();
        assert!(rendered.contains("connect_volume"));
        assert!(rendered.contains("/x.json"));
    }
}
