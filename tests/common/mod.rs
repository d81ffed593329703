//! Shared test infrastructure for integration tests.

use std::fs;
use std::path::PathBuf;
use std::process::{Command, Output, Stdio};
use tempfile::TempDir;

/// Isolated home, config, and workbook paths for one CLI invocation chain.
pub struct Workspace {
    pub dir: TempDir,
    pub workbook: PathBuf,
    pub config: PathBuf,
}

impl Workspace {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().expect("temp dir");
        let workbook = dir.path().join("leads.json");
        let config = dir.path().join("conf").join("config.json");
        Self {
            dir,
            workbook,
            config,
        }
    }

    /// Credential file location used by a config written with `init`.
    pub fn credential(&self) -> PathBuf {
        self.config
            .parent()
            .expect("config dir")
            .join("session.txt")
    }

    pub fn write_credential(&self, token: &str) {
        fs::write(self.credential(), token).expect("write credential");
    }

    /// Run the binary with stdin closed and the per-user config dir pointed
    /// into the workspace.
    pub fn run(&self, args: &[&str]) -> Output {
        let home = self.dir.path().join("home");
        Command::new(env!("CARGO_BIN_EXE_lead-enrich"))
            .args(args)
            .env("HOME", &home)
            .env("XDG_CONFIG_HOME", home.join(".config"))
            .env("RUST_LOG", "warn")
            .stdin(Stdio::null())
            .output()
            .expect("run lead-enrich")
    }

    pub fn init(&self) -> Output {
        let workbook = self.workbook.to_str().expect("utf-8 path");
        let config = self.config.to_str().expect("utf-8 path");
        self.run(&["init", "--workbook", workbook, "--config", config])
    }
}

pub fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

pub fn stderr(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).into_owned()
}
