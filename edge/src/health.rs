//! Health heartbeat file for the edge daemon.
//!
//! Tracks the most recent poll, the most recent successful upload, and the
//! current spool depth, rewriting a small JSON file after every change so
//! external supervision can inspect liveness. Writes go to a temp file in
//! the same directory followed by a rename, so readers never observe a
//! partial file.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::Serialize;

#[derive(Debug, Serialize)]
struct HealthStatus<'a> {
    last_poll_ts: Option<&'a str>,
    last_upload_ts: Option<&'a str>,
    spool_count: i64,
}

/// Writes edge health status to a JSON file.
#[derive(Debug)]
pub struct HealthWriter {
    path: PathBuf,
    last_poll_ts: Option<DateTime<Utc>>,
    last_upload_ts: Option<DateTime<Utc>>,
    spool_count: i64,
}

impl HealthWriter {
    pub fn new(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
            last_poll_ts: None,
            last_upload_ts: None,
            spool_count: 0,
        }
    }

    /// Records a poll event and rewrites the health file.
    pub fn record_poll(&mut self) -> io::Result<()> {
        self.last_poll_ts = Some(Utc::now());
        self.write()
    }

    /// Records a successful upload and rewrites the health file.
    pub fn record_upload(&mut self) -> io::Result<()> {
        self.last_upload_ts = Some(Utc::now());
        self.write()
    }

    /// Updates the spool depth and rewrites the health file.
    pub fn set_spool_count(&mut self, count: i64) -> io::Result<()> {
        self.spool_count = count;
        self.write()
    }

    fn write(&self) -> io::Result<()> {
        let last_poll = self.last_poll_ts.map(|ts| ts.to_rfc3339());
        let last_upload = self.last_upload_ts.map(|ts| ts.to_rfc3339());
        let status = HealthStatus {
            last_poll_ts: last_poll.as_deref(),
            last_upload_ts: last_upload.as_deref(),
            spool_count: self.spool_count,
        };
        let body = serde_json::to_vec(&status)?;

        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, body)?;
        fs::rename(&tmp, &self.path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn writes_all_three_fields() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("health.json");
        let mut health = HealthWriter::new(&path);

        health.set_spool_count(7).unwrap();
        health.record_poll().unwrap();
        health.record_upload().unwrap();

        let content = fs::read_to_string(&path).unwrap();
        let value: serde_json::Value = serde_json::from_str(&content).unwrap();
        assert_eq!(value["spool_count"], 7);
        assert!(value["last_poll_ts"].is_string());
        assert!(value["last_upload_ts"].is_string());
    }

    #[test]
    fn timestamps_start_as_null() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("health.json");
        let mut health = HealthWriter::new(&path);

        health.set_spool_count(0).unwrap();

        let value: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert!(value["last_poll_ts"].is_null());
        assert!(value["last_upload_ts"].is_null());
    }

    #[test]
    fn rewrite_leaves_no_temp_file_behind() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("health.json");
        let mut health = HealthWriter::new(&path);

        health.record_poll().unwrap();
        health.record_poll().unwrap();

        let entries: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(entries, vec![std::ffi::OsString::from("health.json")]);
    }
}
