#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};

use assert_cmd::Command;
use tempfile::{TempDir, tempdir};

pub const ENERGY_A: &str = "Site,Energy_kWh,CO2_kg\nNorth,10,4\nNorth,20,6\nNorth,,\n";
pub const ENERGY_B: &str = "Site,Energy_kWh,CO2_kg\nNorth,5,1\nNorth,NA,\nNorth,5,1\n";

/// Scratch directory holding uploads and a store, removed on drop.
pub struct TestWorkspace {
    temp_dir: TempDir,
}

impl TestWorkspace {
    pub fn new() -> Self {
        Self {
            temp_dir: tempdir().expect("temp dir"),
        }
    }

    pub fn path(&self) -> &Path {
        self.temp_dir.path()
    }

    pub fn store_dir(&self) -> PathBuf {
        self.temp_dir.path().join("store")
    }

    /// Writes `contents` into a file under the workspace and returns the path.
    pub fn write(&self, name: &str, contents: &str) -> PathBuf {
        let path = self.temp_dir.path().join(name);
        fs::write(&path, contents).expect("write temp file contents");
        path
    }

    /// The binary, pointed at this workspace's store.
    pub fn command(&self) -> Command {
        let mut cmd = Command::cargo_bin("esg-rollup").expect("binary exists");
        cmd.arg("--store-dir").arg(self.store_dir());
        cmd
    }
}

pub fn stdout_json(output: &std::process::Output) -> serde_json::Value {
    serde_json::from_slice(&output.stdout).expect("stdout is JSON")
}
