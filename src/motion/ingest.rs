// Motion ingestion
// Reads exported motion tables into frame sequences

use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::motion::types::{FrameSequence, MotionError};

/// Anything that can produce a frame sequence with its frame rate
pub trait MotionSource {
    fn load(&self) -> Result<FrameSequence, MotionError>;
}

/// Motion table exported from a skeleton recording
///
/// Either `frame_rate` (fps) or `frame_time` (seconds per frame, as in BVH
/// headers) must be present.
#[derive(Debug, Deserialize)]
struct MotionTable {
    #[serde(default)]
    frame_rate: Option<f64>,

    #[serde(default)]
    frame_time: Option<f64>,

    channels: Vec<String>,

    frames: Vec<Vec<f64>>,
}

/// Ingest a JSON motion table from raw bytes
pub fn ingest_motion_json(data: &[u8]) -> Result<FrameSequence, MotionError> {
    let table: MotionTable = serde_json::from_slice(data)?;

    let frame_rate = match (table.frame_rate, table.frame_time) {
        (Some(rate), _) => rate,
        (None, Some(time)) if time > 0.0 => 1.0 / time,
        (None, Some(time)) => return Err(MotionError::InvalidFrameRate(time)),
        (None, None) => return Err(MotionError::InvalidFrameRate(0.0)),
    };

    FrameSequence::new(table.channels, frame_rate, table.frames)
}

/// JSON motion file on disk
#[derive(Debug, Clone)]
pub struct JsonMotionFile {
    path: PathBuf,
}

impl JsonMotionFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        JsonMotionFile { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl MotionSource for JsonMotionFile {
    fn load(&self) -> Result<FrameSequence, MotionError> {
        if !self.path.exists() {
            return Err(MotionError::NotFound(self.path.display().to_string()));
        }
        let data = std::fs::read(&self.path)?;
        let frames = ingest_motion_json(&data)?;
        log::debug!(
            "Loaded {} frames x {} channels at {:.1} fps from {}",
            frames.len(),
            frames.channels().len(),
            frames.frame_rate(),
            self.path.display()
        );
        Ok(frames)
    }
}

/// In-memory source, handy for tests and synthetic data
impl MotionSource for FrameSequence {
    fn load(&self) -> Result<FrameSequence, MotionError> {
        Ok(self.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ingest_with_frame_rate() {
        let json = br#"{"frame_rate": 60.0, "channels": ["a", "b"], "frames": [[1, 2], [3, 4]]}"#;
        let seq = ingest_motion_json(json).unwrap();
        assert_eq!(seq.frame_rate(), 60.0);
        assert_eq!(seq.frames()[1], vec![3.0, 4.0]);
    }

    #[test]
    fn test_ingest_with_frame_time() {
        let json = br#"{"frame_time": 0.025, "channels": ["a"], "frames": [[1]]}"#;
        let seq = ingest_motion_json(json).unwrap();
        assert!((seq.frame_rate() - 40.0).abs() < 1e-9);
    }

    #[test]
    fn test_ingest_without_rate_fails() {
        let json = br#"{"channels": ["a"], "frames": [[1]]}"#;
        assert!(matches!(
            ingest_motion_json(json),
            Err(MotionError::InvalidFrameRate(_))
        ));
    }

    #[test]
    fn test_json_file_source() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("motion.json");

        let missing = JsonMotionFile::new(&path).load();
        assert!(matches!(missing, Err(MotionError::NotFound(_))));

        std::fs::write(&path, r#"{"frame_rate": 30, "channels": ["x"], "frames": [[0.5]]}"#)
            .unwrap();
        let seq = JsonMotionFile::new(&path).load().unwrap();
        assert_eq!(seq.len(), 1);
    }
}
