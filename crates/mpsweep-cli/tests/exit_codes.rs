//! Runs the built binary as a subprocess against hermetic fixture trees.

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};

fn bin() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_faulty-device-cleanup"))
}

fn run(args: &[&str]) -> Output {
    Command::new(bin())
        .args(args)
        .env_remove("RUST_LOG")
        .output()
        .unwrap()
}

fn write_config(dir: &Path, multipath: &Path, inventory: &str) -> PathBuf {
    let config = format!(
        r#"
{inventory}

[multipath]
binary = "{multipath}"
config_path = "{root}/multipath.conf"

[paths]
by_path_dir = "{root}/by-path"
sys_block_dir = "{root}/sys/block"

[lock]
dir = "{root}/lock"
name = "connect_volume"
prefix = "nova-"
"#,
        multipath = multipath.display(),
        root = dir.display(),
    );
    let path = dir.join("sweep.toml");
    fs::write(&path, config).unwrap();
    path
}

fn file_inventory(dir: &Path, records: &str) -> String {
    let path = dir.join("bdm.json");
    fs::write(&path, records).unwrap();
    format!(
        "[inventory]\nsource = \"file\"\npath = \"{}\"\nhost = \"compute-1\"",
        path.display()
    )
}

#[test]
fn missing_config_argument_exits_one() {
    let out = run(&[]);
    assert_eq!(out.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&out.stderr).contains("--config-file"));
}

#[test]
fn help_exits_zero() {
    let out = run(&["--help"]);
    assert_eq!(out.status.code(), Some(0));
}

#[test]
fn unusable_inventory_configuration_exits_one() {
    let dir = tempfile::tempdir().unwrap();
    let multipath = fake_multipath(dir.path());
    let config = write_config(dir.path(), &multipath, "[inventory]\nsource = \"file\"");

    if !which_available() {
        return;
    }
    let out = run(&["--config-file", config.to_str().unwrap()]);
    assert_eq!(out.status.code(), Some(1));
    assert!(!dir.path().join("flushed").exists());
}

#[test]
fn unusable_inventory_configuration_without_multipath_exits_zero() {
    let dir = tempfile::tempdir().unwrap();
    let config = write_config(
        dir.path(),
        Path::new("/nonexistent/multipath"),
        "[inventory]\nsource = \"file\"",
    );
    let out = run(&["--config-file", config.to_str().unwrap(), "--format", "json"]);
    assert_eq!(out.status.code(), Some(0));
    let summary: serde_json::Value = serde_json::from_slice(&out.stdout).unwrap();
    assert_eq!(summary["multipath_installed"], false);
}

#[test]
fn missing_multipath_tool_exits_zero() {
    let dir = tempfile::tempdir().unwrap();
    let inventory = file_inventory(dir.path(), "[]");
    let config = write_config(dir.path(), Path::new("/nonexistent/multipath"), &inventory);

    let out = run(&["--config-file", config.to_str().unwrap(), "--format", "json"]);
    assert_eq!(out.status.code(), Some(0));
    let summary: serde_json::Value = serde_json::from_slice(&out.stdout).unwrap();
    assert_eq!(summary["multipath_installed"], false);
    assert_eq!(summary["path_removals"].as_array().unwrap().len(), 0);
}

#[test]
fn unreadable_inventory_exits_one_without_mutation() {
    let dir = tempfile::tempdir().unwrap();
    let inventory = format!(
        "[inventory]\nsource = \"file\"\npath = \"{}/missing.json\"\nhost = \"compute-1\"",
        dir.path().display()
    );
    let multipath = fake_multipath(dir.path());
    let config = write_config(dir.path(), &multipath, &inventory);
    let control = add_orphan(dir.path());

    if !which_available() {
        return;
    }
    let out = run(&["--config-file", config.to_str().unwrap()]);
    assert_eq!(out.status.code(), Some(1));
    assert_eq!(fs::read_to_string(control).unwrap(), "");
}

#[test]
fn detection_only_reports_counts_and_leaves_paths() {
    let dir = tempfile::tempdir().unwrap();
    let inventory = file_inventory(dir.path(), "[]");
    let multipath = fake_multipath(dir.path());
    let config = write_config(dir.path(), &multipath, &inventory);
    fs::write(dir.path().join("multipath.conf"), "defaults {\n  flush_on_last_del yes\n}\n").unwrap();
    let control = add_orphan(dir.path());

    if !which_available() {
        return;
    }
    let out = run(&[
        "--config-file",
        config.to_str().unwrap(),
        "--detection-only",
        "--format",
        "json",
    ]);
    assert_eq!(out.status.code(), Some(0), "{}", String::from_utf8_lossy(&out.stderr));
    let summary: serde_json::Value = serde_json::from_slice(&out.stdout).unwrap();
    assert_eq!(summary["mode"], "detection_only");
    assert_eq!(summary["faulty_path_num"], 1);
    assert_eq!(summary["faulty_device_num"], 1);
    assert_eq!(summary["flush_on_last_del"], true);
    assert_eq!(fs::read_to_string(control).unwrap(), "");
    assert!(!dir.path().join("flushed").exists());
}

fn which_available() -> bool {
    Command::new("which").arg("sh").output().is_ok()
}

/// A `multipath` stand-in that lists one drained map, reports every single
/// path as faulty, and records any flush.
fn fake_multipath(dir: &Path) -> PathBuf {
    let script = dir.join("multipath");
    let body = format!(
        r#"#!/bin/sh
if [ "$1" = "-f" ]; then
    echo "$2" >> "{root}/flushed"
    exit 0
fi
if [ "$1" = "-ll" ] && [ -z "$2" ]; then
    cat <<'LISTING'
3600601601bd032007c097518e96ae422 dm-4 DGC,VRAID
size=1.0G features='1 queue_if_no_path' hwhandler='1 alua' wp=rw
`-+- policy='round-robin 0' prio=0 status=active
  `- #:#:#:# -   #:#   active faulty running
LISTING
    exit 0
fi
echo "  \`- 3:0:0:203 sdb 8:16 failed faulty running"
"#,
        root = dir.display()
    );
    fs::write(&script, body).unwrap();
    fs::set_permissions(&script, fs::Permissions::from_mode(0o755)).unwrap();
    script
}

/// One orphaned LUN 203 path to `sdb`. Returns its delete control file.
fn add_orphan(dir: &Path) -> PathBuf {
    let by_path = dir.join("by-path");
    let control_dir = dir.join("sys/block/sdb/device");
    fs::create_dir_all(&by_path).unwrap();
    fs::create_dir_all(&control_dir).unwrap();
    fs::create_dir_all(dir.join("dev")).unwrap();
    let node = dir.join("dev/sdb");
    fs::write(&node, "").unwrap();
    std::os::unix::fs::symlink(
        &node,
        by_path.join("ip-192.168.3.52:3260-iscsi-iqn.1992-04.com.emc:cx.fnm00130200235.a7-lun-203"),
    )
    .unwrap();
    let control = control_dir.join("delete");
    fs::write(&control, "").unwrap();
    control
}
