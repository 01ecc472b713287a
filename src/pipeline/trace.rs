// Pipeline progress tracing
// Append-only JSONL log of preprocessing and sweep stages, one line per event

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Trace file name inside an output directory
pub const TRACE_FILE: &str = "trace.jsonl";

#[derive(Debug, Error)]
pub enum TraceError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Pipeline stage an entry belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Preprocess,
    Train,
    Evaluate,
    Sweep,
}

/// Outcome recorded by an entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TraceStatus {
    Started,
    Progress,
    Completed,
    Skipped,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TraceEntry {
    /// RFC 3339 timestamp
    pub timestamp: String,

    pub stage: Stage,

    /// Recording name or combination key the entry refers to
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,

    pub status: TraceStatus,

    /// Progress in [0.0, 1.0]
    pub progress: f32,

    pub message: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl TraceEntry {
    pub fn to_json_line(&self) -> Result<String, serde_json::Error> {
        let json = serde_json::to_string(self)?;
        Ok(format!("{}\n", json))
    }
}

/// Appends entries to a JSONL file, creating it on first write
#[derive(Debug, Clone)]
pub struct TraceWriter {
    file_path: PathBuf,
}

impl TraceWriter {
    pub fn new(file_path: PathBuf) -> Self {
        TraceWriter { file_path }
    }

    /// Writer for `<dir>/trace.jsonl`
    pub fn in_dir(dir: &Path) -> Self {
        TraceWriter::new(dir.join(TRACE_FILE))
    }

    pub fn write(&self, entry: &TraceEntry) -> Result<(), TraceError> {
        if let Some(parent) = self.file_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.file_path)?;

        file.write_all(entry.to_json_line()?.as_bytes())?;
        file.flush()?;
        Ok(())
    }

    /// Write and log a warning instead of failing; tracing never aborts a run
    pub fn record(&self, entry: TraceEntry) {
        if let Err(e) = self.write(&entry) {
            log::warn!("Failed to write trace {}: {}", self.file_path.display(), e);
        }
    }

    pub fn path(&self) -> &Path {
        &self.file_path
    }
}

/// Builder for entries of one stage
pub struct TraceBuilder {
    stage: Stage,
    key: Option<String>,
}

impl TraceBuilder {
    pub fn stage(stage: Stage) -> Self {
        TraceBuilder { stage, key: None }
    }

    pub fn key(mut self, key: impl Into<String>) -> Self {
        self.key = Some(key.into());
        self
    }

    fn entry(self, status: TraceStatus, progress: f32, message: String) -> TraceEntry {
        TraceEntry {
            timestamp: Utc::now().to_rfc3339(),
            stage: self.stage,
            key: self.key,
            status,
            progress: progress.clamp(0.0, 1.0),
            message,
            data: None,
        }
    }

    pub fn start(self, message: impl Into<String>) -> TraceEntry {
        self.entry(TraceStatus::Started, 0.0, message.into())
    }

    pub fn progress(self, progress: f32, message: impl Into<String>) -> TraceEntry {
        self.entry(TraceStatus::Progress, progress, message.into())
    }

    pub fn complete(self, message: impl Into<String>, data: serde_json::Value) -> TraceEntry {
        let mut entry = self.entry(TraceStatus::Completed, 1.0, message.into());
        entry.data = Some(data);
        entry
    }

    pub fn skipped(self, message: impl Into<String>) -> TraceEntry {
        self.entry(TraceStatus::Skipped, 1.0, message.into())
    }

    pub fn failed(self, error: impl std::fmt::Display) -> TraceEntry {
        self.entry(TraceStatus::Failed, 1.0, error.to_string())
    }
}

pub fn read_trace_file(path: &Path) -> Result<Vec<TraceEntry>, TraceError> {
    let contents = std::fs::read_to_string(path)?;
    let mut entries = Vec::new();

    for line in contents.lines() {
        if line.trim().is_empty() {
            continue;
        }
        entries.push(serde_json::from_str(line)?);
    }

    Ok(entries)
}

/// Latest status per (stage, key)
pub fn latest_status(entries: &[TraceEntry]) -> BTreeMap<(Stage, String), TraceStatus> {
    let mut latest = BTreeMap::new();
    for entry in entries {
        let key = entry.key.clone().unwrap_or_default();
        latest.insert((entry.stage, key), entry.status);
    }
    latest
}
