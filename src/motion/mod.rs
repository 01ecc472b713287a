// Motion module
// Frame sequences and motion ingestion

pub mod ingest;
pub mod types;

pub use ingest::{ingest_motion_json, JsonMotionFile, MotionSource};
pub use types::{FrameSequence, MotionError};
