//! Media handles and ffprobe metadata
//!
//! A [`VideoSegment`] is the immutable description of a decodable clip:
//! where it lives, its frame geometry, duration and frame rate. Segments are
//! produced by [`Prober`] and consumed by the overlay renderer (frame size)
//! and the composer (durations, audio presence).

pub mod probe;

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

pub use probe::Prober;

/// Immutable handle to a video resource on local, seekable storage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoSegment {
    /// Location of the clip
    pub path: PathBuf,
    /// Frame width in pixels
    pub width: u32,
    /// Frame height in pixels
    pub height: u32,
    /// Duration in seconds
    pub duration: f64,
    /// Frames per second
    pub frame_rate: f64,
    /// Whether the clip carries an audio stream
    pub has_audio: bool,
}

impl VideoSegment {
    /// Describe a segment from already known metadata
    pub fn new(path: impl Into<PathBuf>, width: u32, height: u32, duration: f64, frame_rate: f64) -> Self {
        Self {
            path: path.into(),
            width,
            height,
            duration,
            frame_rate,
            has_audio: false,
        }
    }

    /// Mark the segment as carrying an audio stream
    #[must_use]
    pub fn with_audio(mut self, has_audio: bool) -> Self {
        self.has_audio = has_audio;
        self
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Encoded audio resource on disk, as produced by the audio timeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AudioFile {
    pub path: PathBuf,
    pub duration: f64,
    pub sample_rate: u32,
}
