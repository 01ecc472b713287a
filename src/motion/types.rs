// Motion frame types
// A frame sequence is an ordered table of named numeric channels sampled at a fixed frame rate

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MotionError {
    #[error("Motion file not found: {0}")]
    NotFound(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid motion JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Frame {index} has {found} values, expected {expected}")]
    RaggedFrame {
        index: usize,
        expected: usize,
        found: usize,
    },

    #[error("Invalid frame rate: {0}")]
    InvalidFrameRate(f64),

    #[error("Unknown channel: {0}")]
    UnknownChannel(String),

    #[error("Duplicate channel: {0}")]
    DuplicateChannel(String),
}

/// Ordered motion frames sharing one channel schema
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrameSequence {
    /// Channel names, e.g. "l_hand_Xrotation"
    channels: Vec<String>,

    /// Frames per second
    frame_rate: f64,

    /// One row per frame, one value per channel
    frames: Vec<Vec<f64>>,
}

impl FrameSequence {
    /// Build a sequence, checking the frame rate and that every frame matches the schema
    pub fn new(
        channels: Vec<String>,
        frame_rate: f64,
        frames: Vec<Vec<f64>>,
    ) -> Result<Self, MotionError> {
        if !frame_rate.is_finite() || frame_rate <= 0.0 {
            return Err(MotionError::InvalidFrameRate(frame_rate));
        }

        for (i, name) in channels.iter().enumerate() {
            if channels[..i].contains(name) {
                return Err(MotionError::DuplicateChannel(name.clone()));
            }
        }

        for (index, frame) in frames.iter().enumerate() {
            if frame.len() != channels.len() {
                return Err(MotionError::RaggedFrame {
                    index,
                    expected: channels.len(),
                    found: frame.len(),
                });
            }
        }

        Ok(FrameSequence {
            channels,
            frame_rate,
            frames,
        })
    }

    pub fn channels(&self) -> &[String] {
        &self.channels
    }

    pub fn frame_rate(&self) -> f64 {
        self.frame_rate
    }

    pub fn frames(&self) -> &[Vec<f64>] {
        &self.frames
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Duration in seconds
    pub fn duration_secs(&self) -> f64 {
        self.frames.len() as f64 / self.frame_rate
    }

    pub fn channel_index(&self, name: &str) -> Option<usize> {
        self.channels.iter().position(|c| c == name)
    }

    /// Values of one channel across all frames
    pub fn channel_values(&self, name: &str) -> Result<Vec<f64>, MotionError> {
        let idx = self
            .channel_index(name)
            .ok_or_else(|| MotionError::UnknownChannel(name.to_string()))?;
        Ok(self.frames.iter().map(|f| f[idx]).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(n: &[&str]) -> Vec<String> {
        n.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_valid_sequence() {
        let seq = FrameSequence::new(
            names(&["x", "y"]),
            60.0,
            vec![vec![0.0, 1.0], vec![2.0, 3.0], vec![4.0, 5.0]],
        )
        .unwrap();

        assert_eq!(seq.len(), 3);
        assert_eq!(seq.channel_index("y"), Some(1));
        assert_eq!(seq.channel_values("y").unwrap(), vec![1.0, 3.0, 5.0]);
        assert!((seq.duration_secs() - 0.05).abs() < 1e-12);
    }

    #[test]
    fn test_ragged_frame_rejected() {
        let result = FrameSequence::new(names(&["x", "y"]), 60.0, vec![vec![0.0, 1.0], vec![2.0]]);
        assert!(matches!(
            result,
            Err(MotionError::RaggedFrame {
                index: 1,
                expected: 2,
                found: 1
            })
        ));
    }

    #[test]
    fn test_invalid_frame_rate() {
        assert!(FrameSequence::new(names(&["x"]), 0.0, vec![]).is_err());
        assert!(FrameSequence::new(names(&["x"]), f64::NAN, vec![]).is_err());
    }

    #[test]
    fn test_duplicate_channel() {
        let result = FrameSequence::new(names(&["x", "x"]), 30.0, vec![]);
        assert!(matches!(result, Err(MotionError::DuplicateChannel(_))));
    }
}
