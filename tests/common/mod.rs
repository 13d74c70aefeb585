//! Shared fixtures for integration tests.
#![allow(dead_code)]

use sfsearch::config::Config;
use sfsearch::streamer::{RecordSink, StreamRecord};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

/// Temporary tree with a `root/` to search and sibling dirs for backups,
/// logs and files that must stay unreachable.
pub struct TestEnvironment {
    temp_dir: TempDir,
    root: PathBuf,
}

impl TestEnvironment {
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let root = temp_dir.path().join("root");
        fs::create_dir_all(&root).expect("Failed to create root");
        let root = fs::canonicalize(&root).expect("Failed to canonicalize root");
        Self { temp_dir, root }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn outside(&self) -> &Path {
        self.temp_dir.path()
    }

    pub fn create_file(&self, name: &str, content: &str) -> PathBuf {
        let path = self.root.join(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("Failed to create parent");
        }
        fs::write(&path, content).expect("Failed to write test file");
        path
    }

    /// The `a.txt` / `b.log` / `node_modules/c.txt` tree.
    pub fn needle_fixture(&self) {
        self.create_file("a.txt", "hay\nsome needle here\nhay\n");
        self.create_file("b.log", "nothing to see\n");
        self.create_file("node_modules/c.txt", "needle in a dependency\n");
    }

    pub fn config(&self) -> Config {
        let mut config = Config::for_root(&self.root).expect("Failed to build config");
        config.search.pacing_delay_ms = 0;
        config.security.backup_dir = self.temp_dir.path().join("backup");
        config.security.audit_log = self.temp_dir.path().join("logs/security.log");
        config
    }
}

/// Collects parsed records in memory.
#[derive(Default)]
pub struct CollectingSink {
    pub lines: Vec<serde_json::Value>,
    pub flushes: usize,
    /// Cancel this token once this many file records were written.
    pub cancel_after: Option<(usize, CancellationToken)>,
    /// Report a disconnect once this many file records were written.
    pub disconnect_after: Option<usize>,
}

impl CollectingSink {
    pub fn files(&self) -> Vec<&serde_json::Value> {
        self.lines.iter().filter(|l| l["type"] == "file").collect()
    }

    pub fn file_names(&self) -> Vec<String> {
        self.files()
            .iter()
            .map(|l| l["data"]["name"].as_str().unwrap_or_default().to_string())
            .collect()
    }

    pub fn terminal(&self) -> Option<&serde_json::Value> {
        self.lines.iter().find(|l| l["type"] != "file")
    }
}

impl RecordSink for CollectingSink {
    fn write_record(&mut self, record: &StreamRecord) -> io::Result<()> {
        let value = serde_json::to_value(record)?;
        self.lines.push(value);
        let files = self.files().len();
        if let Some((after, token)) = &self.cancel_after
            && files >= *after
        {
            token.cancel();
        }
        Ok(())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.flushes += 1;
        Ok(())
    }

    fn is_disconnected(&self) -> bool {
        self.disconnect_after
            .is_some_and(|after| self.files().len() >= after)
    }
}
